//! Fetcher and write-back: talk to the Paperless REST API.
//!
//! [`DocumentStore`] is the seam between the pipeline and the source system.
//! [`PaperlessClient`] implements it over HTTP; tests substitute an
//! in-memory store. Every call is a single attempt with no retry: Paperless
//! redelivers the webhook if we answer with an error.

use crate::config::SourceSettings;
use crate::document::{DocumentId, EnrichmentResult, RawDocument};
use crate::error::PipelineError;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{header, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

static RE_DOCUMENT_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"/documents/(\d+)/").unwrap());

/// Extract the document id from a webhook reference.
///
/// Accepts a URL containing `/documents/{id}/` or a bare decimal id. Pure and
/// idempotent; id `0` is rejected since Paperless never issues it.
pub fn parse_reference(reference: Option<&str>) -> Result<DocumentId, PipelineError> {
    let invalid = || PipelineError::InvalidReference {
        reference: reference.map(str::to_string),
    };
    let raw = reference.map(str::trim).filter(|s| !s.is_empty()).ok_or_else(invalid)?;

    let digits = if raw.bytes().all(|b| b.is_ascii_digit()) {
        raw
    } else {
        RE_DOCUMENT_PATH
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .ok_or_else(invalid)?
    };

    match digits.parse::<u64>() {
        Ok(id) if id > 0 => Ok(DocumentId(id)),
        _ => Err(invalid()),
    }
}

/// Source-system capabilities used by the pipeline.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Download the original file.
    async fn download_original(&self, id: DocumentId) -> Result<RawDocument, PipelineError>;

    /// Patch the document's content and (when non-empty) title.
    async fn update_document(
        &self,
        id: DocumentId,
        result: &EnrichmentResult,
    ) -> Result<(), PipelineError>;
}

/// JSON body of the patch call. `title` is omitted when empty so an
/// unreadable scan never wipes an existing title.
#[derive(Debug, Serialize)]
struct PatchBody<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
}

/// Paperless-ngx REST client.
#[derive(Debug, Clone)]
pub struct PaperlessClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl PaperlessClient {
    /// Build a client from settings, failing with `MissingConfig` if the
    /// address or token is absent.
    pub fn from_settings(settings: &SourceSettings) -> Result<Self, PipelineError> {
        let (base_url, token) = settings.credentials()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| PipelineError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn download_url(&self, id: DocumentId) -> String {
        format!("{}/api/documents/{}/download/?original=true", self.base_url, id)
    }

    pub fn document_url(&self, id: DocumentId) -> String {
        format!("{}/api/documents/{}/", self.base_url, id)
    }

    fn auth_value(&self) -> String {
        format!("Token {}", self.token)
    }
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

#[async_trait]
impl DocumentStore for PaperlessClient {
    async fn download_original(&self, id: DocumentId) -> Result<RawDocument, PipelineError> {
        let url = self.download_url(id);
        debug!("Downloading original of document {} from {}", id, url);

        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, self.auth_value())
            .send()
            .await
            .map_err(|e| PipelineError::UpstreamUnavailable {
                url: url.clone(),
                reason: if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                },
            })?;

        let status = response.status();
        if is_auth_failure(status) {
            return Err(PipelineError::Unauthorized {
                url,
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(PipelineError::UpstreamUnavailable {
                url,
                reason: format!("HTTP {status}"),
            });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::UpstreamUnavailable {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        info!(
            "Downloaded document {}: {} bytes ({})",
            id,
            bytes.len(),
            content_type.as_deref().unwrap_or("no content-type")
        );

        Ok(RawDocument {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    async fn update_document(
        &self,
        id: DocumentId,
        result: &EnrichmentResult,
    ) -> Result<(), PipelineError> {
        let url = self.document_url(id);
        let body = PatchBody {
            content: &result.content,
            title: Some(result.title.as_str()).filter(|t| !t.is_empty()),
        };

        let response = self
            .http
            .patch(&url)
            .header(header::AUTHORIZATION, self.auth_value())
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::WriteBackFailed {
                doc_id: id.get(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::WriteBackFailed {
                doc_id: id.get(),
                reason: format!("HTTP {status}"),
            });
        }

        info!("Updated document {} ({} chars)", id, result.content.chars().count());
        Ok(())
    }
}
