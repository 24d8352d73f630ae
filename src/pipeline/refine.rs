//! Refiner and title deriver: OCR text → `{content, title}`.
//!
//! The deterministic path is always available: content is the OCR text
//! verbatim and the title is its first non-blank line. The model path, when
//! [`RefinementMode`] asks for it, may replace either value, but any model
//! failure (timeout, HTTP error, empty or malformed answer) silently falls
//! back to the deterministic value for that sub-step only. Nothing in this
//! module returns an error to the caller.

use crate::config::{LlmSettings, RefinementMode};
use crate::document::{truncate_chars, EnrichmentResult, MAX_TITLE_CHARS};
use crate::error::RefineError;
use crate::pipeline::normalize;
use crate::prompts::{title_request, FORMAT_SYSTEM_PROMPT, TITLE_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Deterministic title: first line that is non-empty after trimming,
/// truncated to [`MAX_TITLE_CHARS`] characters; empty if there is none.
pub fn first_line_title(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| truncate_chars(l, MAX_TITLE_CHARS).to_string())
        .unwrap_or_default()
}

/// Whether a provider finish reason means the token limit cut the answer
/// short. OpenAI reports `length`, Anthropic `max_tokens`, Gemini `MAX_TOKENS`.
fn hit_token_limit(finish_reason: Option<&str>) -> bool {
    finish_reason.is_some_and(|r| {
        r.eq_ignore_ascii_case("length") || r.eq_ignore_ascii_case("max_tokens")
    })
}

/// Deterministic result used whenever the model path is off or fails.
pub fn fallback(ocr_text: &str) -> EnrichmentResult {
    EnrichmentResult {
        content: ocr_text.to_string(),
        title: first_line_title(ocr_text),
    }
}

// ── Model seam ───────────────────────────────────────────────────────────

/// A text-in, text-out language model.
#[async_trait]
pub trait TextModel: Send + Sync {
    /// One system + user exchange; returns the assistant's text.
    async fn complete(&self, system: &str, user: &str) -> Result<String, RefineError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Any `edgequake-llm` provider (OpenAI, Anthropic, Gemini, Ollama, ...).
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    label: String,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, settings: &LlmSettings) -> Self {
        Self {
            provider,
            options: CompletionOptions {
                temperature: Some(settings.temperature),
                max_tokens: Some(settings.max_tokens),
                ..Default::default()
            },
            label: format!("{}:{}", settings.provider_name, settings.model),
        }
    }
}

#[async_trait]
impl TextModel for ProviderModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String, RefineError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| RefineError::Provider(e.to_string()))?;
        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );
        if hit_token_limit(response.finish_reason.as_deref()) {
            return Err(RefineError::Truncated);
        }
        Ok(response.content)
    }

    fn name(&self) -> &str {
        &self.label
    }
}

/// An OpenAI-compatible `/chat/completions` endpoint at an explicit address
/// (self-hosted gateways, Ollama, vLLM, LM Studio).
pub struct ChatCompletionsModel {
    http: reqwest::Client,
    url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 2],
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsModel {
    pub fn new(base_url: &str, settings: &LlmSettings) -> Result<Self, RefineError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| RefineError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }
}

#[async_trait]
impl TextModel for ChatCompletionsModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String, RefineError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                WireMessage {
                    role: "system",
                    content: system,
                },
                WireMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let mut request = self.http.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RefineError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RefineError::Status {
                status: status.as_u16(),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RefineError::Malformed(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(RefineError::EmptyResponse)?;
        if hit_token_limit(choice.finish_reason.as_deref()) {
            return Err(RefineError::Truncated);
        }
        choice.message.content.ok_or(RefineError::EmptyResponse)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

/// Construct the model backend described by `settings`.
///
/// An explicit `base_url` selects [`ChatCompletionsModel`]; otherwise the
/// provider factory creates `provider_name`/`model`, reading that provider's
/// usual API-key variable (`OPENAI_API_KEY`, ...).
pub fn build_model(settings: &LlmSettings) -> Result<Arc<dyn TextModel>, RefineError> {
    if let Some(base) = settings.base_url.as_deref() {
        return Ok(Arc::new(ChatCompletionsModel::new(base, settings)?));
    }
    let provider = ProviderFactory::create_llm_provider(&settings.provider_name, &settings.model)
        .map_err(|e| RefineError::Provider(e.to_string()))?;
    Ok(Arc::new(ProviderModel::new(provider, settings)))
}

// ── Refiner ──────────────────────────────────────────────────────────────

/// Produces the final `{content, title}` pair.
#[derive(Clone)]
pub struct Refiner {
    mode: RefinementMode,
    model: Option<Arc<dyn TextModel>>,
    timeout: Duration,
}

impl Refiner {
    /// A refiner that never calls a model.
    pub fn deterministic() -> Self {
        Self {
            mode: RefinementMode::None,
            model: None,
            timeout: Duration::from_secs(1),
        }
    }

    /// A refiner that calls `model` for the sub-steps `mode` enables.
    ///
    /// With `model = None` every sub-step uses its fallback, whatever `mode` says.
    pub fn new(
        mode: RefinementMode,
        model: Option<Arc<dyn TextModel>>,
        timeout: Duration,
    ) -> Self {
        Self {
            mode,
            model,
            timeout,
        }
    }

    /// Refine `ocr_text`. Infallible by contract.
    pub async fn refine(&self, ocr_text: &str) -> EnrichmentResult {
        let base = fallback(ocr_text);
        let model = match (&self.model, self.mode) {
            (Some(model), mode) if mode != RefinementMode::None => model,
            _ => return base,
        };
        if ocr_text.trim().is_empty() {
            debug!("No OCR text; skipping model refinement");
            return base;
        }

        let title_step = async {
            if !self.mode.wants_title() {
                return None;
            }
            let request = title_request(ocr_text);
            self.ask(model.as_ref(), "title", TITLE_SYSTEM_PROMPT, &request)
                .await
                .map(|raw| normalize::clean_title(&raw))
                .filter(|t| !t.is_empty())
        };
        let format_step = async {
            if !self.mode.wants_format() {
                return None;
            }
            let content = self
                .ask(model.as_ref(), "format", FORMAT_SYSTEM_PROMPT, ocr_text)
                .await
                .map(|raw| normalize::clean_content(&raw))
                .filter(|c| !c.trim().is_empty())?;
            if !normalize::same_text(&content, ocr_text) {
                warn!(
                    "LLM format step via {} changed more than whitespace, keeping OCR text",
                    model.name()
                );
                return None;
            }
            Some(content)
        };
        let (title, content) = tokio::join!(title_step, format_step);

        if title.is_none() && self.mode.wants_title() {
            info!("Using first-line title fallback");
        }
        EnrichmentResult {
            content: content.unwrap_or(base.content),
            title: title.unwrap_or(base.title),
        }
    }

    /// One model call with timeout; failures are logged and become `None`.
    async fn ask(
        &self,
        model: &dyn TextModel,
        step: &str,
        system: &str,
        user: &str,
    ) -> Option<String> {
        let call = model.complete(system, user);
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) if text.trim().is_empty() => Err(RefineError::EmptyResponse),
            Ok(r) => r,
            Err(_) => Err(RefineError::Timeout {
                secs: self.timeout.as_secs(),
            }),
        };
        match result {
            Ok(text) => {
                debug!("{} {}: {} chars", model.name(), step, text.chars().count());
                Some(text)
            }
            Err(e) => {
                warn!(
                    "LLM {} step via {} failed, falling back: {}",
                    step,
                    model.name(),
                    e
                );
                None
            }
        }
    }
}
