//! Recognition: page images → page-ordered text.
//!
//! The engine sits behind [`TextRecognizer`] and is constructed once per
//! process, then shared as `Arc<dyn TextRecognizer>` by every request.
//!
//! ## Concurrency contract
//!
//! [`TesseractRecognizer`] runs one child process per page. Processes share
//! nothing, so the recogniser is reentrant and needs no lock; a semaphore
//! only bounds how many engine processes run at once so that a burst of
//! webhooks cannot fork-bomb the host.

use crate::config::OcrSettings;
use crate::document::{PageImage, PageText, RecognizedText};
use crate::error::PipelineError;
use async_trait::async_trait;
use image::DynamicImage;
use std::io::Cursor;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// An OCR engine.
///
/// Implementations must be safe to call from many requests at once.
/// "No text on this page" is `Ok(vec![])`, never an error.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognise one page, returning raw text lines in reading order.
    async fn recognize(&self, image: &DynamicImage) -> Result<Vec<String>, PipelineError>;
}

/// Run the recogniser over every page, strictly in page order.
///
/// Lines are trimmed and blank lines dropped.
pub async fn recognize_pages(
    recognizer: &dyn TextRecognizer,
    pages: &[PageImage],
) -> Result<RecognizedText, PipelineError> {
    let mut out = Vec::with_capacity(pages.len());
    for page in pages {
        let lines = recognizer
            .recognize(&page.image)
            .await?
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>();
        debug!("Page {}: {} lines recognised", page.page_num, lines.len());
        out.push(PageText {
            page_num: page.page_num,
            lines,
        });
    }
    Ok(RecognizedText { pages: out })
}

/// Tesseract driven through its command-line interface.
pub struct TesseractRecognizer {
    bin: String,
    lang: String,
    auto_orient: bool,
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for TesseractRecognizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TesseractRecognizer")
            .field("bin", &self.bin)
            .field("lang", &self.lang)
            .field("auto_orient", &self.auto_orient)
            .finish()
    }
}

impl TesseractRecognizer {
    /// Construct the engine once at startup.
    ///
    /// Verifies the executable runs and that every requested language pack
    /// (`chi_sim+eng` → `chi_sim`, `eng`) is installed. With auto-orientation
    /// the `osd` pack is required as well.
    pub async fn new(settings: &OcrSettings) -> Result<Self, PipelineError> {
        let output = Command::new(&settings.tesseract_bin)
            .arg("--list-langs")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                PipelineError::RecognitionEngineError(format!(
                    "cannot run '{}': {e}",
                    settings.tesseract_bin
                ))
            })?;

        if !output.status.success() {
            return Err(PipelineError::RecognitionEngineError(format!(
                "'{} --list-langs' exited with {}",
                settings.tesseract_bin, output.status
            )));
        }

        // Older releases print the list on stderr.
        let listing = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let installed = installed_languages(&listing);

        let mut missing: Vec<&str> = settings
            .lang
            .split('+')
            .map(str::trim)
            .filter(|l| !l.is_empty() && !installed.iter().any(|i| i == l))
            .collect();
        if settings.auto_orient && !installed.iter().any(|i| i == "osd") {
            missing.push("osd");
        }
        if !missing.is_empty() {
            return Err(PipelineError::RecognitionEngineError(format!(
                "tesseract language data missing: {}",
                missing.join(", ")
            )));
        }

        info!(
            "OCR engine initialized, lang={} auto_orient={}",
            settings.lang, settings.auto_orient
        );

        Ok(Self {
            bin: settings.tesseract_bin.clone(),
            lang: settings.lang.clone(),
            auto_orient: settings.auto_orient,
            permits: Arc::new(Semaphore::new(settings.concurrency.max(1))),
        })
    }

    /// Page segmentation mode: 1 = automatic with orientation detection, 3 = automatic.
    fn psm(&self) -> &'static str {
        if self.auto_orient {
            "1"
        } else {
            "3"
        }
    }
}

/// Parse `tesseract --list-langs` output.
fn installed_languages(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of available languages"))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl TextRecognizer for TesseractRecognizer {
    async fn recognize(&self, image: &DynamicImage) -> Result<Vec<String>, PipelineError> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| PipelineError::Internal(format!("PNG encode: {e}")))?;

        let tmp = tempfile::Builder::new()
            .prefix("paperless-ocr-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| PipelineError::Internal(format!("tempfile: {e}")))?;
        tokio::fs::write(tmp.path(), &png)
            .await
            .map_err(|e| PipelineError::Internal(format!("tempfile write: {e}")))?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| PipelineError::RecognitionEngineError(e.to_string()))?;

        let output = Command::new(&self.bin)
            .arg(tmp.path())
            .arg("stdout")
            .args(["-l", self.lang.as_str(), "--psm", self.psm()])
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PipelineError::RecognitionEngineError(format!("spawn failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::RecognitionEngineError(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text.lines().map(str::to_string).collect())
    }
}
