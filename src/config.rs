//! Configuration types for the enrichment pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. The binary reads flags and environment once
//! at startup, builds the config, and shares it behind an `Arc`; nothing in it
//! changes for the lifetime of the process.

use crate::error::PipelineError;
use std::fmt;
use std::path::PathBuf;

/// Configuration for the enrichment pipeline.
///
/// # Example
/// ```rust
/// use paperless_ocr_webhook::{PipelineConfig, RefinementMode};
///
/// let config = PipelineConfig::builder()
///     .paperless_base_url("http://paperless:8000/")
///     .paperless_api_token("secret")
///     .lang("en")
///     .refinement(RefinementMode::TitleOnly)
///     .build()
///     .unwrap();
/// assert_eq!(config.source.base_url.as_deref(), Some("http://paperless:8000"));
/// assert_eq!(config.ocr.lang, "eng");
/// ```
#[derive(Clone, Default)]
pub struct PipelineConfig {
    /// Where the documents live and how to authenticate.
    pub source: SourceSettings,
    /// PDF rendering knobs.
    pub raster: RasterSettings,
    /// Recognition engine knobs.
    pub ocr: OcrSettings,
    /// Which model-assisted sub-steps run.
    pub refinement: RefinementMode,
    /// Model endpoint, credential and sampling.
    pub llm: LlmSettings,
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("source", &self.source)
            .field("raster", &self.raster)
            .field("ocr", &self.ocr)
            .field("refinement", &self.refinement)
            .field("llm", &self.llm)
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

// ── Source system ────────────────────────────────────────────────────────

/// Paperless address and credential.
///
/// Both are optional at this level: a missing value does not stop the
/// process from starting, it makes every webhook call fail with
/// [`PipelineError::MissingConfig`] (see [`SourceSettings::credentials`]).
#[derive(Clone)]
pub struct SourceSettings {
    /// Base URL without trailing slash, e.g. `http://paperless:8000`.
    pub base_url: Option<String>,
    /// API token sent as `Authorization: Token <token>`.
    pub api_token: Option<String>,
    /// Timeout for each download / patch call in seconds. Default: 30.
    pub request_timeout_secs: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_token: None,
            request_timeout_secs: 30,
        }
    }
}

impl fmt::Debug for SourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSettings")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl SourceSettings {
    /// Return `(base_url, api_token)` or name whatever is missing.
    pub fn credentials(&self) -> Result<(&str, &str), PipelineError> {
        let base = self.base_url.as_deref().filter(|s| !s.is_empty());
        let token = self.api_token.as_deref().filter(|s| !s.is_empty());
        match (base, token) {
            (Some(b), Some(t)) => Ok((b, t)),
            (None, Some(_)) => Err(PipelineError::MissingConfig(
                "PAPERLESS_BASE_URL is not set".into(),
            )),
            (Some(_), None) => Err(PipelineError::MissingConfig(
                "PAPERLESS_API_TOKEN is not set".into(),
            )),
            (None, None) => Err(PipelineError::MissingConfig(
                "PAPERLESS_BASE_URL and PAPERLESS_API_TOKEN are not set".into(),
            )),
        }
    }
}

// ── Rasteriser ───────────────────────────────────────────────────────────

/// PDF rendering settings.
#[derive(Debug, Clone)]
pub struct RasterSettings {
    /// Rendering DPI used when rasterising each PDF page. Range: 72–400. Default: 200.
    ///
    /// OCR engines are trained on ~300 DPI scans; 200 keeps small print
    /// legible while halving the pixel count.
    pub dpi: u32,

    /// Maximum rendered image dimension (width or height) in pixels.
    /// Range: 100–20000. Default: 4000.
    ///
    /// An A0 poster at 200 DPI would be ~6600 × 9400 px; the cap keeps
    /// memory bounded regardless of physical page size.
    pub max_rendered_pixels: u32,

    /// Explicit path to the pdfium shared library. When `None`, the
    /// platform library name is tried in the working directory, then the
    /// system library search path.
    pub pdfium_lib_path: Option<PathBuf>,
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self {
            dpi: 200,
            max_rendered_pixels: 4000,
            pdfium_lib_path: None,
        }
    }
}

// ── Recogniser ───────────────────────────────────────────────────────────

/// Recognition engine settings, fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct OcrSettings {
    /// Tesseract language string, e.g. `eng` or `chi_sim+eng`.
    pub lang: String,
    /// Tesseract executable. Default: `tesseract`.
    pub tesseract_bin: String,
    /// Run orientation and script detection before recognition. Default: true.
    pub auto_orient: bool,
    /// Maximum number of engine invocations in flight. Default: 2.
    pub concurrency: usize,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            lang: tesseract_language("ch"),
            tesseract_bin: "tesseract".to_string(),
            auto_orient: true,
            concurrency: 2,
        }
    }
}

/// Map a PaddleOCR-style language code to a Tesseract language string.
///
/// Unknown codes pass through unchanged so that native Tesseract strings
/// (`deu+eng`) work too.
pub fn tesseract_language(code: &str) -> String {
    let code = code.trim();
    let mapped = match code.to_ascii_lowercase().as_str() {
        "ch" => "chi_sim+eng",
        "chinese_cht" => "chi_tra+eng",
        "en" => "eng",
        "japan" => "jpn+eng",
        "korean" => "kor+eng",
        "german" => "deu",
        "french" => "fra",
        "it" => "ita",
        "es" => "spa",
        "pt" => "por",
        "ru" => "rus",
        "ar" => "ara",
        _ => code,
    };
    mapped.to_string()
}

// ── Refiner ──────────────────────────────────────────────────────────────

/// Which language-model sub-steps the refiner performs.
///
/// Every variant has a fully deterministic fallback, so the refiner's output
/// is defined for every mode and every model failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefinementMode {
    /// No model calls; first-line title, verbatim content. (default)
    #[default]
    None,
    /// Model-generated title; verbatim content.
    TitleOnly,
    /// Model-generated title and whitespace-normalised content.
    TitleAndFormat,
}

impl RefinementMode {
    /// Derive the mode from the two configuration toggles.
    ///
    /// Format-fixing is only meaningful on the model path, so
    /// `(false, true)` collapses to [`RefinementMode::None`].
    pub fn from_flags(llm_enabled: bool, format_fix: bool) -> Self {
        match (llm_enabled, format_fix) {
            (false, _) => RefinementMode::None,
            (true, false) => RefinementMode::TitleOnly,
            (true, true) => RefinementMode::TitleAndFormat,
        }
    }

    pub fn wants_title(self) -> bool {
        !matches!(self, RefinementMode::None)
    }

    pub fn wants_format(self) -> bool {
        matches!(self, RefinementMode::TitleAndFormat)
    }
}

/// Language-model connection settings.
#[derive(Clone)]
pub struct LlmSettings {
    /// Explicit OpenAI-compatible endpoint, e.g. `http://ollama:11434/v1`.
    /// When `None`, the provider is created by name via the provider factory.
    pub base_url: Option<String>,
    /// Credential for `base_url`. Optional for keyless local servers.
    pub api_key: Option<String>,
    /// Model identifier. Default: `gpt-4.1-nano`.
    pub model: String,
    /// Provider name used when `base_url` is unset. Default: `openai`.
    pub provider_name: String,
    /// Per-call timeout in seconds. Default: 30.
    pub timeout_secs: u64,
    /// Sampling temperature. Default: 0.0; reformatting must not be creative.
    pub temperature: f32,
    /// Maximum tokens the model may generate per call. Default: 4096.
    pub max_tokens: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            model: "gpt-4.1-nano".to_string(),
            provider_name: "openai".to_string(),
            timeout_secs: 30,
            temperature: 0.0,
            max_tokens: 4096,
        }
    }
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

// ── Builder ──────────────────────────────────────────────────────────────

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn paperless_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        let trimmed = url.trim().trim_end_matches('/').to_string();
        self.config.source.base_url = Some(trimmed).filter(|s| !s.is_empty());
        self
    }

    pub fn paperless_api_token(mut self, token: impl Into<String>) -> Self {
        self.config.source.api_token = Some(token.into()).filter(|s| !s.is_empty());
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.source.request_timeout_secs = secs;
        self
    }

    /// Recognition language, PaddleOCR short code or Tesseract language string.
    pub fn lang(mut self, code: impl AsRef<str>) -> Self {
        self.config.ocr.lang = tesseract_language(code.as_ref());
        self
    }

    pub fn tesseract_bin(mut self, bin: impl Into<String>) -> Self {
        self.config.ocr.tesseract_bin = bin.into();
        self
    }

    pub fn auto_orient(mut self, v: bool) -> Self {
        self.config.ocr.auto_orient = v;
        self
    }

    pub fn ocr_concurrency(mut self, n: usize) -> Self {
        self.config.ocr.concurrency = n.max(1);
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.raster.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.raster.max_rendered_pixels = px.clamp(100, 20_000);
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.raster.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn refinement(mut self, mode: RefinementMode) -> Self {
        self.config.refinement = mode;
        self
    }

    pub fn llm_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        let trimmed = url.trim().trim_end_matches('/').to_string();
        self.config.llm.base_url = Some(trimmed).filter(|s| !s.is_empty());
        self
    }

    pub fn llm_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.llm.api_key = Some(key.into()).filter(|s| !s.is_empty());
        self
    }

    pub fn llm_model(mut self, model: impl Into<String>) -> Self {
        self.config.llm.model = model.into();
        self
    }

    pub fn llm_provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.llm.provider_name = name.into();
        self
    }

    pub fn llm_timeout_secs(mut self, secs: u64) -> Self {
        self.config.llm.timeout_secs = secs;
        self
    }

    pub fn llm_temperature(mut self, t: f32) -> Self {
        self.config.llm.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn llm_max_tokens(mut self, n: usize) -> Self {
        self.config.llm.max_tokens = n;
        self
    }

    /// Build the configuration, validating constraints.
    ///
    /// Missing Paperless settings are deliberately *not* an error here; see
    /// [`SourceSettings::credentials`].
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if c.ocr.lang.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Recognition language must not be empty".into(),
            ));
        }
        if c.refinement.wants_title() && c.llm.model.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "LLM refinement enabled but no model configured".into(),
            ));
        }
        if c.source.request_timeout_secs == 0 || c.llm.timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}
