//! Metadata enrichment: ask a vision model for a filename, alt text and
//! description.
//!
//! The batch only ever sees the [`MetadataEnricher`] trait, so the concrete
//! provider is swappable and tests can script answers. [`LlmEnricher`] is the
//! implementation over `edgequake_llm`.
//!
//! ## Retry Strategy
//!
//! Quota and overload errors from LLM APIs are transient. Failed calls are
//! retried with exponential backoff (`retry_backoff_ms * 2^(retry - 1)`,
//! saturating); each attempt is bounded by `api_timeout_secs`. A response that
//! arrives but does not parse is not retried.

use crate::config::EnrichmentConfig;
use crate::error::{ConvertError, EnrichmentError};
use crate::prompts::{metadata_user_prompt, METADATA_SYSTEM_PROMPT};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{
    ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory,
};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

const DEFAULT_MODEL: &str = "gpt-4.1-nano";
const MAX_FILENAME_LEN: usize = 100;

/// Anything that can look at image bytes and propose metadata.
pub trait MetadataEnricher: Send + Sync {
    fn analyze<'a>(
        &'a self,
        image: &'a [u8],
        content_type: &'a str,
    ) -> BoxFuture<'a, Result<MetadataRecord, EnrichmentError>>;
}

// ── MetadataRecord ───────────────────────────────────────────────────────

/// Suggested filename, alt text and description for one image.
///
/// Built only through [`MetadataRecord::new`], which guarantees a non-empty,
/// filesystem-safe `suggested_filename`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    suggested_filename: String,
    alt_text: String,
    description: String,
}

impl MetadataRecord {
    /// Sanitise and validate the three fields.
    ///
    /// # Errors
    /// [`EnrichmentError::MissingField`] when a field is blank, or when the
    /// filename has nothing left after sanitising.
    pub fn new(
        suggested_filename: &str,
        alt_text: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Self, EnrichmentError> {
        let alt_text = alt_text.into().trim().to_string();
        let description = description.into().trim().to_string();

        let suggested_filename = sanitize_filename(suggested_filename)
            .ok_or(EnrichmentError::MissingField("suggestedFilename"))?;
        if alt_text.is_empty() {
            return Err(EnrichmentError::MissingField("altText"));
        }
        if description.is_empty() {
            return Err(EnrichmentError::MissingField("description"));
        }

        Ok(Self {
            suggested_filename,
            alt_text,
            description,
        })
    }

    pub fn suggested_filename(&self) -> &str {
        &self.suggested_filename
    }

    pub fn alt_text(&self) -> &str {
        &self.alt_text
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Raw wire shape of the model's answer.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataResponse {
    suggested_filename: Option<String>,
    alt_text: Option<String>,
    description: Option<String>,
}

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());
static DASH_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"-{2,}").unwrap());
static IMAGE_EXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.(png|jpe?g|webp|bmp|avif|gif)$").unwrap()
});
static JSON_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```(?:json)?\s*\n?(.*?)\n?\s*```\s*$").unwrap()
});

/// Reduce a model-suggested name to `[A-Za-z0-9._-]`, without a trailing
/// image extension, at most 100 characters. `None` if nothing is left.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let replaced = UNSAFE_CHARS.replace_all(raw.trim(), "-");
    let collapsed = DASH_RUNS.replace_all(&replaced, "-");
    let stripped = IMAGE_EXT.replace(&collapsed, "");

    let mut name: String = stripped
        .trim_matches(|c| c == '-' || c == '.' || c == '_')
        .chars()
        .take(MAX_FILENAME_LEN)
        .collect();
    // Truncation may leave a dangling separator.
    while name.ends_with(['-', '.', '_']) {
        name.pop();
    }

    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

/// Parse a model answer into a [`MetadataRecord`].
///
/// Accepts the bare JSON object or one wrapped in a markdown code fence.
pub fn parse_metadata_response(text: &str) -> Result<MetadataRecord, EnrichmentError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(EnrichmentError::EmptyResponse);
    }

    let body = JSON_FENCE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(trimmed);

    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| EnrichmentError::Malformed(e.to_string()))?;
    if !value.is_object() {
        return Err(EnrichmentError::Malformed(
            "expected a JSON object".to_string(),
        ));
    }

    let response: MetadataResponse =
        serde_json::from_value(value).map_err(|e| EnrichmentError::Malformed(e.to_string()))?;

    let suggested = response
        .suggested_filename
        .ok_or(EnrichmentError::MissingField("suggestedFilename"))?;
    let alt_text = response
        .alt_text
        .ok_or(EnrichmentError::MissingField("altText"))?;
    let description = response
        .description
        .ok_or(EnrichmentError::MissingField("description"))?;

    MetadataRecord::new(&suggested, alt_text, description)
}

// ── LlmEnricher ──────────────────────────────────────────────────────────

/// [`MetadataEnricher`] backed by an `edgequake_llm` vision provider.
pub struct LlmEnricher {
    provider: Arc<dyn LLMProvider>,
    config: EnrichmentConfig,
}

impl std::fmt::Debug for LlmEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmEnricher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LlmEnricher {
    pub fn new(provider: Arc<dyn LLMProvider>, config: EnrichmentConfig) -> Self {
        Self { provider, config }
    }

    /// Resolve a provider from `config` (or the environment) and wrap it.
    pub fn from_config(config: EnrichmentConfig) -> Result<Self, ConvertError> {
        let provider = resolve_provider(&config)?;
        Ok(Self::new(provider, config))
    }

    async fn analyze_inner(
        &self,
        image: &[u8],
        content_type: &str,
    ) -> Result<MetadataRecord, EnrichmentError> {
        if image.is_empty() {
            return Err(EnrichmentError::Transport("empty image payload".into()));
        }

        let system_prompt = self
            .config
            .system_prompt
            .as_deref()
            .unwrap_or(METADATA_SYSTEM_PROMPT);

        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user_with_images(
                &metadata_user_prompt(content_type),
                vec![ImageData::new(STANDARD.encode(image), content_type)],
            ),
        ];
        let options = build_options(&self.config);

        let response = call_with_retry(&self.config, || {
            self.provider.chat(&messages, Some(&options))
        })
        .await?;

        debug!(
            "Enrichment: {} prompt tokens, {} completion tokens",
            response.prompt_tokens, response.completion_tokens
        );
        parse_metadata_response(&response.content)
    }
}

/// Run `call` until it succeeds, at most `1 + max_retries` times, each
/// attempt bounded by `api_timeout_secs`.
///
/// # Errors
/// The last attempt's failure: [`EnrichmentError::Transport`] or
/// [`EnrichmentError::Timeout`].
async fn call_with_retry<T, E, F, Fut>(
    config: &EnrichmentConfig,
    mut call: F,
) -> Result<T, EnrichmentError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let per_call = Duration::from_secs(config.api_timeout_secs);
    let mut last_err = EnrichmentError::Transport("no attempt made".into());

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = backoff_delay(config.retry_backoff_ms, attempt);
            warn!(
                "Enrichment: retry {}/{} after {}ms",
                attempt,
                config.max_retries,
                backoff.as_millis()
            );
            sleep(backoff).await;
        }

        match timeout(per_call, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                warn!("Enrichment: attempt {} failed: {}", attempt + 1, e);
                last_err = EnrichmentError::Transport(e.to_string());
            }
            Err(_) => {
                warn!(
                    "Enrichment: attempt {} timed out after {}s",
                    attempt + 1,
                    config.api_timeout_secs
                );
                last_err = EnrichmentError::Timeout {
                    secs: config.api_timeout_secs,
                };
            }
        }
    }

    Err(last_err)
}

/// `base_ms * 2^(retry - 1)`, saturating instead of overflowing.
fn backoff_delay(base_ms: u64, retry: u32) -> Duration {
    let factor = 1u64
        .checked_shl(retry.saturating_sub(1))
        .unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

impl MetadataEnricher for LlmEnricher {
    fn analyze<'a>(
        &'a self,
        image: &'a [u8],
        content_type: &'a str,
    ) -> BoxFuture<'a, Result<MetadataRecord, EnrichmentError>> {
        Box::pin(self.analyze_inner(image, content_type))
    }
}

fn build_options(config: &EnrichmentConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

/// Instantiate a named provider with the given model.
fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ConvertError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ConvertError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. a pre-built provider in `config.provider`;
/// 2. `config.provider_name` with `config.model` (default `gpt-4.1-nano`);
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set;
/// 4. OpenAI, when `OPENAI_API_KEY` is set;
/// 5. whatever [`ProviderFactory::from_env`] detects.
pub fn resolve_provider(config: &EnrichmentConfig) -> Result<Arc<dyn LLMProvider>, ConvertError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_vision_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ConvertError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
