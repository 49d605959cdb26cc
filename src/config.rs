//! Configuration for the receipt-to-ledger pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share a config across stages, log it, and diff two runs to
//! understand why their outputs differ.
//!
//! # Design choice: builder over constructor
//! A fifteen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::LedgerError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Configuration for one receipt-to-ledger pipeline.
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use receipt2ledger::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .max_dimension(1600)
///     .quality_gate(false)
///     .model("gpt-4.1-nano")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Longest allowed side of a preprocessed image, in pixels. Default: 1920.
    ///
    /// Receipts are tall and narrow; 1920 px on the long side keeps small
    /// print legible to vision models while staying far under inline-payload
    /// limits. Larger captures are downscaled uniformly, never cropped.
    pub max_dimension: u32,

    /// Byte budget for one encoded image. Default: 1 MiB.
    ///
    /// Images are inlined base64 into the model request, so every byte is
    /// paid for twice (upload to the model, upload to the object store).
    /// The preprocessor steps JPEG quality down until the encoded image fits,
    /// or the quality floor is reached — the floor result is accepted even if
    /// still over budget, so the loop always terminates.
    pub max_encoded_bytes: usize,

    /// Initial JPEG quality for re-encoding. Range 1–100. Default: 85.
    pub jpeg_quality: u8,

    /// Quality reduction per step while over the byte budget. Default: 10.
    pub jpeg_quality_step: u8,

    /// Minimum JPEG quality the preprocessor will sink to. Default: 40.
    ///
    /// Below ~40, compression artefacts start eating the digits the whole
    /// exercise is about.
    pub jpeg_quality_floor: u8,

    /// Run the quality pre-check before extraction. Default: true.
    ///
    /// When disabled, unusable photos are not rejected up front — they simply
    /// degrade extraction accuracy and surface as parse failures instead.
    pub quality_gate: bool,

    /// LLM model identifier, e.g. "gpt-4.1-nano", "gemini-2.0-flash".
    /// If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "gemini", "ollama").
    /// If None along with `provider`, the provider is auto-detected from the
    /// environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for extraction calls. Default: 0.1.
    ///
    /// Near-zero keeps the model faithful to what is printed on the paper —
    /// exactly what you want for transcription. Creativity here invents
    /// line items.
    pub temperature: f32,

    /// Maximum tokens the model may generate per call. Default: 2048.
    ///
    /// A long grocery receipt can run past 1 000 output tokens of JSON.
    /// Setting this too low truncates the object mid-item and turns a good
    /// read into a parse failure.
    pub max_tokens: usize,

    /// Maximum retry attempts on a transient extraction failure. Default: 3.
    ///
    /// Retries are bounded so one bad capture cannot run up unbounded
    /// external-API cost; parse failures are never retried automatically —
    /// they go back to the user, who may retake or switch to manual entry.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff). Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s.
    pub retry_backoff_ms: u64,

    /// Per-model-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Timeout for fetching a photo by URL, in seconds. Default: 60.
    pub fetch_timeout_secs: u64,

    /// Concurrent image uploads per submission. Default: 4.
    ///
    /// Uploads are independent of each other; only the final URL list is
    /// re-sorted into capture order.
    pub upload_concurrency: usize,

    /// Custom extraction prompt. If None, uses the built-in default.
    pub extraction_prompt: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1920,
            max_encoded_bytes: 1024 * 1024,
            jpeg_quality: 85,
            jpeg_quality_step: 10,
            jpeg_quality_floor: 40,
            quality_gate: true,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 2048,
            max_retries: 3,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            fetch_timeout_secs: 60,
            upload_concurrency: 4,
            extraction_prompt: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("max_dimension", &self.max_dimension)
            .field("max_encoded_bytes", &self.max_encoded_bytes)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("jpeg_quality_step", &self.jpeg_quality_step)
            .field("jpeg_quality_floor", &self.jpeg_quality_floor)
            .field("quality_gate", &self.quality_gate)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("upload_concurrency", &self.upload_concurrency)
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

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn max_dimension(mut self, px: u32) -> Self {
        self.config.max_dimension = px.max(100);
        self
    }

    pub fn max_encoded_bytes(mut self, bytes: usize) -> Self {
        self.config.max_encoded_bytes = bytes.max(16 * 1024);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn jpeg_quality_step(mut self, step: u8) -> Self {
        self.config.jpeg_quality_step = step.max(1);
        self
    }

    pub fn jpeg_quality_floor(mut self, floor: u8) -> Self {
        self.config.jpeg_quality_floor = floor.clamp(1, 100);
        self
    }

    pub fn quality_gate(mut self, enabled: bool) -> Self {
        self.config.quality_gate = enabled;
        self
    }

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

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
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

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn upload_concurrency(mut self, n: usize) -> Self {
        self.config.upload_concurrency = n.max(1);
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, LedgerError> {
        let c = &self.config;
        if c.jpeg_quality_floor > c.jpeg_quality {
            return Err(LedgerError::InvalidConfig(format!(
                "JPEG quality floor ({}) exceeds the starting quality ({})",
                c.jpeg_quality_floor, c.jpeg_quality
            )));
        }
        if c.upload_concurrency == 0 {
            return Err(LedgerError::InvalidConfig(
                "Upload concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds() {
        let config = PipelineConfig::builder().build().unwrap();
        assert_eq!(config.max_dimension, 1920);
        assert_eq!(config.jpeg_quality, 85);
        assert!(config.quality_gate);
    }

    #[test]
    fn floor_above_start_quality_is_rejected() {
        let err = PipelineConfig::builder()
            .jpeg_quality(50)
            .jpeg_quality_floor(80)
            .build()
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidConfig(_)));
    }

    #[test]
    fn builder_clamps_out_of_range_values() {
        let config = PipelineConfig::builder()
            .max_dimension(10)
            .jpeg_quality(200)
            .upload_concurrency(0)
            .build()
            .unwrap();
        assert_eq!(config.max_dimension, 100);
        assert_eq!(config.jpeg_quality, 100);
        assert_eq!(config.upload_concurrency, 1);
    }
}
