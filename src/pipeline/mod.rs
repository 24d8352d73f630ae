//! Pipeline stages for webhook-driven OCR enrichment.
//!
//! Each submodule implements exactly one transformation step, so every
//! stage can be tested in isolation and the engines behind the traits
//! ([`fetch::DocumentStore`], [`recognize::TextRecognizer`],
//! [`refine::TextModel`]) can be swapped without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ raster ──▶ recognize ──▶ refine ──▶ fetch (write-back)
//! (HTTP)   (pdfium)   (tesseract)   (LLM or     (PATCH)
//!                                    fallback)
//! ```
//!
//! 1. [`fetch`]: parse the document id, download the original, patch it back
//! 2. [`raster`]: classify by signature; decode an image or render PDF pages
//!    inside `spawn_blocking`
//! 3. [`recognize`]: OCR each page in order and concatenate
//! 4. [`refine`]: derive the title and optionally reformat, with fallbacks
//! 5. [`normalize`]: deterministic cleanup of model output used by `refine`

pub mod fetch;
pub mod normalize;
pub mod raster;
pub mod recognize;
pub mod refine;
