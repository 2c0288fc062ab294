//! Text conversion service: the one seam to the remote model.
//!
//! [`ConversionService`] is the trait the router and orchestrator depend on;
//! [`LlmConversionService`] implements it on top of an `edgequake-llm`
//! provider. Prompt text lives in [`crate::prompts`], answer cleanup in
//! [`super::postprocess`], so this module only deals with message layout,
//! retries, timeouts and errors.
//!
//! ## Retry Strategy
//!
//! HTTP 429 / 503 errors from LLM APIs are transient and frequent when a
//! batch runs attempts concurrently. Exponential backoff
//! (`retry_backoff_ms * 2^attempt`) spreads retries out: with 500 ms base and
//! 2 retries the wait sequence is 500 ms → 1 s. Each attempt is bounded by
//! `api_timeout_secs`; a timed-out attempt counts as a failed one.

use crate::config::{ConverterConfig, DEFAULT_MODEL};
use crate::error::ConvertError;
use crate::prompts::{
    conversion_request, detection_request, DEFAULT_SYSTEM_PROMPT, DETECTION_SYSTEM_PROMPT,
};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

/// Remote text generation used by the router (conversions) and the
/// orchestrator (source-format detection).
///
/// Implementations return the raw model answer; callers clean it.
#[async_trait]
pub trait ConversionService: Send + Sync {
    /// Rewrite `content` from `source` into `target`.
    async fn generate(
        &self,
        source: &str,
        target: &str,
        content: &str,
    ) -> Result<String, ConvertError>;

    /// Name the format of a content sample.
    async fn detect(&self, sample: &str) -> Result<String, ConvertError>;
}

/// [`ConversionService`] backed by an `edgequake-llm` chat provider.
pub struct LlmConversionService {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
    api_timeout: Duration,
}

impl LlmConversionService {
    /// Wrap an already-resolved provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ConverterConfig) -> Self {
        Self {
            provider,
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            api_timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }

    /// Resolve the provider from `config` and wrap it.
    pub fn from_config(config: &ConverterConfig) -> Result<Self, ConvertError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config))
    }

    /// Send `messages`, retrying with backoff until a non-empty answer comes
    /// back or retries run out.
    async fn chat_with_retry(
        &self,
        what: &str,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, ConvertError> {
        let start = Instant::now();
        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "{}: retry {}/{} after {}ms",
                    what, attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match timeout(self.api_timeout, self.provider.chat(messages, Some(options))).await {
                Ok(Ok(response)) => {
                    debug!(
                        "{}: {} input tokens, {} output tokens, {:?}",
                        what,
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    if response.content.trim().is_empty() {
                        warn!("{}: attempt {} returned no text", what, attempt + 1);
                        last_err = Some("service returned no text".to_string());
                        continue;
                    }
                    return Ok(response.content);
                }
                Ok(Err(e)) => {
                    let err_msg = format!("{}", e);
                    warn!("{}: attempt {} failed: {}", what, attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
                Err(_) => {
                    let err_msg = format!("timed out after {}s", self.api_timeout.as_secs());
                    warn!("{}: attempt {} {}", what, attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(ConvertError::RemoteConversion {
            message: format!(
                "{} failed after {} attempts: {}",
                what,
                self.max_retries + 1,
                last_err.unwrap_or_else(|| "Unknown error".to_string())
            ),
        })
    }
}

#[async_trait]
impl ConversionService for LlmConversionService {
    async fn generate(
        &self,
        source: &str,
        target: &str,
        content: &str,
    ) -> Result<String, ConvertError> {
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(conversion_request(source, target, content)),
        ];
        let options = build_options(self.temperature, self.max_tokens);
        let what = format!("{source} → {target}");
        self.chat_with_retry(&what, &messages, &options).await
    }

    async fn detect(&self, sample: &str) -> Result<String, ConvertError> {
        let messages = vec![
            ChatMessage::system(DETECTION_SYSTEM_PROMPT),
            ChatMessage::user(detection_request(sample)),
        ];
        // A format name is a single short word; sample deterministically.
        let options = build_options(0.0, 16);
        self.chat_with_retry("format detection", &messages, &options)
            .await
    }
}

fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ConvertError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ConvertError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider + model** (`config.provider_name`); the factory reads
///    the matching API key from the environment.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    both non-empty.
/// 4. **OpenAI** when `OPENAI_API_KEY` is set, with [`DEFAULT_MODEL`].
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &ConverterConfig) -> Result<Arc<dyn LLMProvider>, ConvertError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ConvertError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
