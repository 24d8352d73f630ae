//! One webhook delivery, start to finish.
//!
//! [`Enricher`] owns the process-wide collaborators (document store,
//! recognition engine, refiner) and runs the strict forward sequence
//! fetch → rasterise → recognise → refine → write back for each delivery.
//! Stages never run concurrently within a delivery; concurrent deliveries
//! share the `Enricher` behind an `Arc`.

use crate::config::{PipelineConfig, RasterSettings};
use crate::document::{preview, DocumentId, EnrichmentResult};
use crate::error::PipelineError;
use crate::pipeline::fetch::{parse_reference, DocumentStore, PaperlessClient};
use crate::pipeline::raster;
use crate::pipeline::recognize::{recognize_pages, TextRecognizer};
use crate::pipeline::refine::Refiner;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Characters of recognised content shown in the log line.
pub const CONTENT_LOG_PREVIEW_CHARS: usize = 200;

/// The assembled pipeline.
#[derive(Clone)]
pub struct Enricher {
    /// `Err` holds the reason the source system is not configured; every
    /// delivery then fails with `MissingConfig` before any work is done.
    store: Result<Arc<dyn DocumentStore>, String>,
    recognizer: Arc<dyn TextRecognizer>,
    refiner: Refiner,
    raster: RasterSettings,
}

impl Enricher {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        recognizer: Arc<dyn TextRecognizer>,
        refiner: Refiner,
        raster: RasterSettings,
    ) -> Self {
        Self {
            store: Ok(store),
            recognizer,
            refiner,
            raster,
        }
    }

    /// Wire the pipeline from configuration.
    ///
    /// Missing Paperless settings do not fail here; they are remembered and
    /// reported on every delivery instead.
    pub fn from_config(
        config: &PipelineConfig,
        recognizer: Arc<dyn TextRecognizer>,
        refiner: Refiner,
    ) -> Result<Self, PipelineError> {
        let store = match PaperlessClient::from_settings(&config.source) {
            Ok(client) => Ok(Arc::new(client) as Arc<dyn DocumentStore>),
            Err(PipelineError::MissingConfig(reason)) => Err(reason),
            Err(other) => return Err(other),
        };
        Ok(Self {
            store,
            recognizer,
            refiner,
            raster: config.raster.clone(),
        })
    }

    /// Whether the source system is configured.
    pub fn is_configured(&self) -> bool {
        self.store.is_ok()
    }

    /// Run the pipeline for one document reference.
    ///
    /// Returns the identifier and the payload that was written back.
    pub async fn enrich(
        &self,
        reference: Option<&str>,
    ) -> Result<(DocumentId, EnrichmentResult), PipelineError> {
        let store = self
            .store
            .as_ref()
            .map_err(|reason| PipelineError::MissingConfig(reason.clone()))?;
        let doc_id = parse_reference(reference)?;
        let start = Instant::now();
        info!("Processing document {}", doc_id);

        // ── Step 1: Download original ────────────────────────────────────
        let raw = store.download_original(doc_id).await?;

        // ── Step 2: Rasterise ────────────────────────────────────────────
        let pages = raster::rasterize(raw, self.raster.clone()).await?;
        let page_count = pages.len();
        debug!("Document {}: {} page image(s)", doc_id, page_count);

        // ── Step 3: Recognise ────────────────────────────────────────────
        let recognized = recognize_pages(self.recognizer.as_ref(), &pages).await?;
        drop(pages);
        let ocr_text = recognized.full_text();

        // ── Step 4: Refine (never fails) ─────────────────────────────────
        let result = self.refiner.refine(&ocr_text).await;
        info!(
            "OCR done for document {}: {} pages, {} lines, title={:?}, content={:?}",
            doc_id,
            page_count,
            recognized.line_count(),
            result.title,
            preview(&result.content, CONTENT_LOG_PREVIEW_CHARS)
        );

        // ── Step 5: Write back ───────────────────────────────────────────
        store.update_document(doc_id, &result).await?;
        info!(
            "Document {} enriched in {}ms",
            doc_id,
            start.elapsed().as_millis()
        );

        Ok((doc_id, result))
    }
}
