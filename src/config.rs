//! Configuration types for batch conversion and metadata enrichment.
//!
//! Per-run choices (target format, quality) live in [`ConversionOptions`];
//! they change between runs of the same batch. Everything that shapes *how*
//! the pipeline runs lives in [`ConverterConfig`], and the enrichment
//! collaborator gets its own [`EnrichmentConfig`] so the conversion core
//! never depends on LLM settings.
//!
//! Both configs are built through builders with clamped setters and a
//! validating `build()`.

use crate::error::ConvertError;
use crate::format::SupportedFormat;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Maximum number of images accepted into one batch.
pub const MAX_BATCH_ITEMS: usize = 5;

/// Upper bound for [`EnrichmentConfigBuilder::max_retries`].
pub const MAX_RETRIES: u32 = 10;

// ── Per-run options ──────────────────────────────────────────────────────

/// Target format and quality for one batch run.
///
/// `quality` is validated when a run starts, not when the struct is built, so
/// a bad value is reported once per run before any image is touched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConversionOptions {
    pub format: SupportedFormat,
    /// Quality scalar in `[0.0, 1.0]`. Ignored by formats without a lossy axis.
    pub quality: f32,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            format: SupportedFormat::default(),
            quality: 1.0,
        }
    }
}

impl ConversionOptions {
    pub fn new(format: SupportedFormat, quality: f32) -> Self {
        Self { format, quality }
    }

    /// Reject quality values outside `[0.0, 1.0]`, including NaN.
    pub fn validate(&self) -> Result<Quality, ConvertError> {
        Quality::new(self.quality)
    }
}

/// A quality scalar known to lie in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
pub struct Quality(f32);

impl Quality {
    /// Highest quality; what the conversion runs use when nothing is chosen.
    pub const MAX: Quality = Quality(1.0);

    pub fn new(value: f32) -> Result<Self, ConvertError> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ConvertError::InvalidQuality { value })
        }
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// The 1–100 scale used by the JPEG and AVIF encoders.
    pub fn percent(self) -> u8 {
        (self.0 * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

impl TryFrom<f32> for Quality {
    type Error = ConvertError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

// ── Converter config ─────────────────────────────────────────────────────

/// Pipeline configuration shared by every run of a batch.
///
/// # Example
/// ```rust
/// use fchanger::ConverterConfig;
///
/// let config = ConverterConfig::builder()
///     .concurrency(2)
///     .avif_speed(6)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 2);
/// ```
#[derive(Clone)]
pub struct ConverterConfig {
    /// Number of images converted at once. Default: 5 (one task per item).
    ///
    /// Decoding and encoding are CPU-bound and run on tokio's blocking pool,
    /// so this also bounds how many blocking threads a run occupies.
    pub concurrency: usize,

    /// rav1e speed preset used for AVIF output, 1 (slowest) to 10. Default: 8.
    pub avif_speed: u8,

    /// Largest accepted source width or height in pixels. Default: 16384.
    ///
    /// Checked from the image header before pixels are allocated.
    pub max_decode_dimension: u32,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            concurrency: MAX_BATCH_ITEMS,
            avif_speed: 8,
            max_decode_dimension: 16_384,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConverterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterConfig")
            .field("concurrency", &self.concurrency)
            .field("avif_speed", &self.avif_speed)
            .field("max_decode_dimension", &self.max_decode_dimension)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl ConverterConfig {
    /// Create a new builder for `ConverterConfig`.
    pub fn builder() -> ConverterConfigBuilder {
        ConverterConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConverterConfig`].
#[derive(Debug)]
pub struct ConverterConfigBuilder {
    config: ConverterConfig,
}

impl ConverterConfigBuilder {
    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn avif_speed(mut self, speed: u8) -> Self {
        self.config.avif_speed = speed.clamp(1, 10);
        self
    }

    pub fn max_decode_dimension(mut self, px: u32) -> Self {
        self.config.max_decode_dimension = px.max(1);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConverterConfig, ConvertError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(ConvertError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if !(1..=10).contains(&c.avif_speed) {
            return Err(ConvertError::InvalidConfig(format!(
                "AVIF speed must be 1–10, got {}",
                c.avif_speed
            )));
        }
        Ok(self.config)
    }
}

// ── Enrichment config ────────────────────────────────────────────────────

/// Configuration for [`crate::enrich::LlmEnricher`].
#[derive(Clone)]
pub struct EnrichmentConfig {
    /// LLM model identifier. If None, uses `gpt-4.1-nano`.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "gemini", "ollama").
    /// If None along with `provider`, the provider is auto-detected.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 512.
    ///
    /// The answer is three short strings; 512 leaves room for models that
    /// insist on wrapping JSON in prose.
    pub max_tokens: usize,

    /// Retry attempts on a failed call. Default: 2, at most [`MAX_RETRIES`].
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Custom system prompt. If None, uses [`crate::prompts::METADATA_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.2,
            max_tokens: 512,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for EnrichmentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrichmentConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl EnrichmentConfig {
    /// Create a new builder for `EnrichmentConfig`.
    pub fn builder() -> EnrichmentConfigBuilder {
        EnrichmentConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`EnrichmentConfig`].
#[derive(Debug)]
pub struct EnrichmentConfigBuilder {
    config: EnrichmentConfig,
}

impl EnrichmentConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    /// Clamped to [`MAX_RETRIES`].
    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EnrichmentConfig, ConvertError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(ConvertError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(ConvertError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}
