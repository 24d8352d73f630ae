//! Webhook server binary for paperless-ocr-webhook.
//!
//! A thin shim over the library crate: maps flags and environment to
//! `PipelineConfig`, constructs the OCR engine and model once, and serves.

use anyhow::{Context, Result};
use clap::Parser;
use paperless_ocr_webhook::{
    build_model, server, Enricher, PipelineConfig, Refiner, RefinementMode, TesseractRecognizer,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"
PAPERLESS SETUP:
  Create a workflow with trigger "Document Added" and a Webhook action:
    URL:   http://<this-host>:8000/paperless-webhook
    Body:  {"doc_url": "{{ doc_url }}"}

  The service downloads the original, runs OCR, and patches the document's
  content and title back through the REST API.

LANGUAGE CODES:
  ch (default)  chi_sim+eng     en       eng
  chinese_cht   chi_tra+eng     japan    jpn+eng
  korean        kor+eng         german   deu
  french        fra             any other value is passed to tesseract as-is

LLM REFINEMENT:
  LLM_ENABLED=true                 model-generated title
  LLM_ENABLED=true LLM_FORMAT_FIX=true   title + whitespace reformatting
  Without LLM_BASE_URL the provider is chosen by LLM_PROVIDER and reads its
  usual key variable (OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, ...).
  Any model failure falls back to the first OCR line as title.
"#;

/// OCR webhook for Paperless-ngx.
#[derive(Parser, Debug)]
#[command(
    name = "paperless-ocr",
    version,
    about = "OCR webhook for Paperless-ngx: recognise text and write content and title back",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Paperless base URL, e.g. http://paperless:8000.
    #[arg(long, env = "PAPERLESS_BASE_URL")]
    paperless_base_url: Option<String>,

    /// Paperless API token.
    #[arg(long, env = "PAPERLESS_API_TOKEN", hide_env_values = true)]
    paperless_api_token: Option<String>,

    /// Recognition language (short code or tesseract language string).
    #[arg(long, env = "PAPERLESS_LANG", default_value = "ch")]
    lang: String,

    /// Default log filter when RUST_LOG is unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Generate titles with a language model.
    #[arg(long, env = "LLM_ENABLED")]
    llm_enabled: bool,

    /// Also let the model fix line breaks and spacing (requires --llm-enabled).
    #[arg(long, env = "LLM_FORMAT_FIX")]
    llm_format_fix: bool,

    /// OpenAI-compatible endpoint, e.g. http://ollama:11434/v1.
    #[arg(long, env = "LLM_BASE_URL")]
    llm_base_url: Option<String>,

    /// API key for --llm-base-url.
    #[arg(long, env = "LLM_API_KEY", hide_env_values = true)]
    llm_api_key: Option<String>,

    /// Model name.
    #[arg(long, env = "LLM_MODEL", default_value = "gpt-4.1-nano")]
    llm_model: String,

    /// Provider used when --llm-base-url is not set: openai, anthropic, gemini, ollama, ...
    #[arg(long, env = "LLM_PROVIDER", default_value = "openai")]
    llm_provider: String,

    /// Per-call model timeout in seconds.
    #[arg(long, env = "LLM_TIMEOUT_SECS", default_value_t = 30)]
    llm_timeout_secs: u64,

    /// Paperless request timeout in seconds.
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,

    /// PDF rendering DPI (72–400).
    #[arg(long, env = "RASTER_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Longest rendered page edge in pixels (100–20000).
    #[arg(long, env = "RASTER_MAX_PIXELS", default_value_t = 4000,
          value_parser = clap::value_parser!(u32).range(100..=20000))]
    max_rendered_pixels: u32,

    /// Path to the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Tesseract executable.
    #[arg(long, env = "TESSERACT_BIN", default_value = "tesseract")]
    tesseract_bin: String,

    /// Maximum simultaneous tesseract processes.
    #[arg(long, env = "OCR_CONCURRENCY", default_value_t = 2)]
    ocr_concurrency: usize,

    /// Skip orientation detection.
    #[arg(long, env = "OCR_NO_AUTO_ORIENT")]
    no_auto_orient: bool,

    /// Listen address.
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    /// Listen port.
    #[arg(long, env = "PORT", default_value_t = 8000)]
    port: u16,
}

impl Cli {
    fn to_config(&self) -> Result<PipelineConfig> {
        let mut builder = PipelineConfig::builder()
            .lang(&self.lang)
            .request_timeout_secs(self.request_timeout_secs)
            .dpi(self.dpi)
            .max_rendered_pixels(self.max_rendered_pixels)
            .tesseract_bin(&self.tesseract_bin)
            .ocr_concurrency(self.ocr_concurrency)
            .auto_orient(!self.no_auto_orient)
            .refinement(RefinementMode::from_flags(self.llm_enabled, self.llm_format_fix))
            .llm_model(&self.llm_model)
            .llm_provider_name(&self.llm_provider)
            .llm_timeout_secs(self.llm_timeout_secs);

        if let Some(url) = &self.paperless_base_url {
            builder = builder.paperless_base_url(url);
        }
        if let Some(token) = &self.paperless_api_token {
            builder = builder.paperless_api_token(token);
        }
        if let Some(url) = &self.llm_base_url {
            builder = builder.llm_base_url(url);
        }
        if let Some(key) = &self.llm_api_key {
            builder = builder.llm_api_key(key);
        }
        if let Some(path) = &self.pdfium_lib_path {
            builder = builder.pdfium_lib_path(path);
        }

        builder.build().context("Invalid configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.to_lowercase())),
        )
        .init();

    let config = cli.to_config()?;
    info!("Configuration: {:?}", config);

    if let Err(e) = config.source.credentials() {
        warn!("{}; every webhook call will fail until it is set", e);
    }
    if cli.llm_format_fix && !cli.llm_enabled {
        warn!("LLM_FORMAT_FIX has no effect without LLM_ENABLED");
    }

    // ── OCR engine (constructed once) ────────────────────────────────────
    let recognizer = TesseractRecognizer::new(&config.ocr)
        .await
        .context("Failed to initialise the OCR engine")?;

    // ── Refiner ──────────────────────────────────────────────────────────
    let refiner = if config.refinement == RefinementMode::None {
        Refiner::deterministic()
    } else {
        let model = match build_model(&config.llm) {
            Ok(model) => {
                info!("LLM refinement {:?} via {}", config.refinement, model.name());
                Some(model)
            }
            Err(e) => {
                warn!("LLM unavailable ({}); using first-line titles", e);
                None
            }
        };
        Refiner::new(
            config.refinement,
            model,
            Duration::from_secs(config.llm.timeout_secs),
        )
    };

    let enricher = Enricher::from_config(&config, Arc::new(recognizer), refiner)
        .context("Failed to build the pipeline")?;

    // ── Serve ────────────────────────────────────────────────────────────
    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    server::serve(listener, Arc::new(enricher))
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}
