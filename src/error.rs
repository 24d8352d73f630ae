//! Error types for the enrichment pipeline.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PipelineError`]: **Fatal** for the current webhook delivery: the
//!   document cannot be fetched, rasterised, recognised or written back.
//!   Returned as `Err(PipelineError)` from [`crate::enrich::enrich_document`]
//!   and mapped to an HTTP status by the server.
//!
//! * [`RefineError`]: **Absorbed**: a language-model call failed. It never
//!   leaves [`crate::pipeline::refine`]; the refiner logs it and substitutes
//!   the deterministic fallback.

use thiserror::Error;

/// Whether a rasterisation failure is caused by the input or by the host.
///
/// A corrupt or encrypted upload is the sender's problem (4xx); a missing
/// pdfium library is ours (5xx).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The bytes could not be parsed as a supported document.
    Data,
    /// The rendering backend itself is unavailable or crashed.
    Environment,
}

/// All fatal errors a single pipeline run can produce.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Inbound ───────────────────────────────────────────────────────────
    /// The webhook body is not a JSON object we can read.
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    /// No document identifier could be parsed from the reference.
    #[error("No document id found in reference {reference:?}")]
    InvalidReference { reference: Option<String> },

    // ── Configuration ─────────────────────────────────────────────────────
    /// Source-system address or credential was not configured.
    #[error("Paperless API config missing: {0}")]
    MissingConfig(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Source system ─────────────────────────────────────────────────────
    /// The source system rejected our credential (401/403).
    #[error("Paperless rejected the API token (HTTP {status}) for '{url}'")]
    Unauthorized { url: String, status: u16 },

    /// The source system was unreachable or returned a non-success status.
    #[error("Paperless unavailable at '{url}': {reason}")]
    UpstreamUnavailable { url: String, reason: String },

    /// The patch call was rejected.
    #[error("Write-back of document {doc_id} failed: {reason}")]
    WriteBackFailed { doc_id: u64, reason: String },

    // ── Processing ────────────────────────────────────────────────────────
    /// The document could not be turned into page images.
    #[error("Rasterisation failed: {detail}")]
    RasterizationFailed { detail: String, fault: Fault },

    /// The OCR engine faulted (not "no text found").
    #[error("Recognition engine error: {0}")]
    RecognitionEngineError(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task panic, temp file failure).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// HTTP status the webhook endpoint answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            PipelineError::InvalidPayload(_) | PipelineError::InvalidReference { .. } => 400,
            PipelineError::RasterizationFailed {
                fault: Fault::Data, ..
            } => 422,
            PipelineError::Unauthorized { .. }
            | PipelineError::UpstreamUnavailable { .. }
            | PipelineError::WriteBackFailed { .. } => 502,
            PipelineError::RasterizationFailed {
                fault: Fault::Environment,
                ..
            }
            | PipelineError::RecognitionEngineError(_)
            | PipelineError::MissingConfig(_)
            | PipelineError::InvalidConfig(_)
            | PipelineError::Internal(_) => 500,
        }
    }

    /// Short machine-readable name of the failing stage.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::InvalidPayload(_) | PipelineError::InvalidReference { .. } => "webhook",
            PipelineError::MissingConfig(_) | PipelineError::InvalidConfig(_) => "config",
            PipelineError::Unauthorized { .. } | PipelineError::UpstreamUnavailable { .. } => {
                "fetch"
            }
            PipelineError::RasterizationFailed { .. } => "rasterize",
            PipelineError::RecognitionEngineError(_) => "recognize",
            PipelineError::WriteBackFailed { .. } => "write_back",
            PipelineError::Internal(_) => "internal",
        }
    }

    pub(crate) fn data_fault(detail: impl Into<String>) -> Self {
        PipelineError::RasterizationFailed {
            detail: detail.into(),
            fault: Fault::Data,
        }
    }

    pub(crate) fn environment_fault(detail: impl Into<String>) -> Self {
        PipelineError::RasterizationFailed {
            detail: detail.into(),
            fault: Fault::Environment,
        }
    }
}

/// A language-model failure. Never propagated past the refiner.
#[derive(Debug, Clone, Error)]
pub enum RefineError {
    /// The call did not finish within the configured timeout.
    #[error("model call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The endpoint answered with a non-success HTTP status.
    #[error("model endpoint returned HTTP {status}")]
    Status { status: u16 },

    /// The model answered, but with nothing usable.
    #[error("model returned an empty response")]
    EmptyResponse,

    /// The answer stopped at the token limit and is incomplete.
    #[error("model output was cut off by the token limit")]
    Truncated,

    /// The response body could not be decoded.
    #[error("malformed model response: {0}")]
    Malformed(String),

    /// Provider construction or provider-side error.
    #[error("provider error: {0}")]
    Provider(String),

    /// Network-level failure.
    #[error("transport error: {0}")]
    Transport(String),
}
