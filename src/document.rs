//! Request-scoped data types that flow through the pipeline.
//!
//! Nothing here outlives a single webhook delivery.

use image::DynamicImage;
use serde::Deserialize;
use std::fmt;

/// Maximum title length accepted by the write-back, in characters.
pub const MAX_TITLE_CHARS: usize = 80;

/// Inbound webhook body.
///
/// Paperless workflows let the user template the JSON body; both `doc_url`
/// and `url` are common, so either is accepted. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub doc_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl WebhookEvent {
    /// The document reference: `doc_url`, or `url` if the former is absent or empty.
    pub fn reference(&self) -> Option<&str> {
        self.doc_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.url.as_deref().filter(|s| !s.trim().is_empty()))
    }
}

/// Paperless document id, parsed once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentId(pub u64);

impl DocumentId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content classification of a downloaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// A single raster image (PNG, JPEG, TIFF, ...).
    Image,
    /// A paginated document that must be rendered page by page (PDF).
    Paginated,
}

/// Downloaded original file.
#[derive(Clone)]
pub struct RawDocument {
    pub bytes: Vec<u8>,
    /// `Content-Type` reported by the source system, if any.
    pub content_type: Option<String>,
}

impl fmt::Debug for RawDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawDocument")
            .field("len", &self.bytes.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// One rasterised page, 1-based.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub page_num: usize,
    pub image: DynamicImage,
}

/// Text recognised on one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageText {
    pub page_num: usize,
    /// Trimmed, non-empty lines in reading order.
    pub lines: Vec<String>,
}

impl PageText {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// All pages' text, in page order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecognizedText {
    pub pages: Vec<PageText>,
}

impl RecognizedText {
    /// Page texts joined with `\n`, in page order. Empty pages contribute nothing.
    pub fn full_text(&self) -> String {
        self.pages
            .iter()
            .filter(|p| !p.is_empty())
            .map(PageText::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn line_count(&self) -> usize {
        self.pages.iter().map(|p| p.lines.len()).sum()
    }
}

/// Final payload handed to the write-back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentResult {
    pub content: String,
    /// At most [`MAX_TITLE_CHARS`] characters; empty means "leave title alone".
    pub title: String,
}

/// Truncate to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Truncate for log output, appending `...` when cut.
pub fn preview(s: &str, max: usize) -> String {
    let cut = truncate_chars(s, max);
    if cut.len() < s.len() {
        format!("{cut}...")
    } else {
        cut.to_string()
    }
}
