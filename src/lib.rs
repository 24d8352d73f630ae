//! # paperless-ocr-webhook
//!
//! Webhook-driven OCR enrichment for Paperless-ngx.
//!
//! Paperless calls the webhook when a document is added; the service
//! downloads the original file, rasterises it, runs OCR over every page in
//! order, derives a title, and patches `content` and `title` back.
//!
//! ## Pipeline Overview
//!
//! ```text
//! POST /paperless-webhook {"doc_url": ".../documents/42/"}
//!  │
//!  ├─ 1. Fetch      parse id 42, GET /api/documents/42/download/?original=true
//!  ├─ 2. Raster     classify by signature; decode image or render PDF pages (pdfium)
//!  ├─ 3. Recognise  tesseract per page, concatenated in page order
//!  ├─ 4. Refine     title (first line or LLM) and optional LLM reformatting
//!  └─ 5. Write back PATCH /api/documents/42/ {"content", "title"}
//! ```
//!
//! ## Library use
//!
//! ```rust,no_run
//! use paperless_ocr_webhook::{Enricher, PipelineConfig, Refiner, TesseractRecognizer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .paperless_base_url("http://paperless:8000")
//!         .paperless_api_token("0123456789abcdef")
//!         .lang("en")
//!         .build()?;
//!     let recognizer = TesseractRecognizer::new(&config.ocr).await?;
//!     let refiner = Refiner::deterministic();
//!     let enricher = Enricher::from_config(&config, Arc::new(recognizer), refiner)?;
//!     let (id, result) = enricher.enrich(Some("http://paperless:8000/documents/42/")).await?;
//!     println!("{id}: {}", result.title);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum router and the `paperless-ocr` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod enrich;
pub mod error;
pub mod pipeline;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    LlmSettings, OcrSettings, PipelineConfig, PipelineConfigBuilder, RasterSettings,
    RefinementMode, SourceSettings,
};
pub use document::{DocumentId, EnrichmentResult, WebhookEvent};
pub use enrich::Enricher;
pub use error::{Fault, PipelineError, RefineError};
pub use pipeline::fetch::{parse_reference, DocumentStore, PaperlessClient};
pub use pipeline::recognize::{TesseractRecognizer, TextRecognizer};
pub use pipeline::refine::{build_model, first_line_title, Refiner, TextModel};
