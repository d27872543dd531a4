//! Configuration types for section-wise transcription.
//!
//! All run behaviour is controlled through [`TranscriptionConfig`], built via
//! its [`TranscriptionConfigBuilder`]. One struct holds every knob so a
//! config can be shared across tasks, logged, and diffed between runs.

use crate::error::ScribeError;
use crate::pipeline::encode::EncodeLimits;
use crate::pipeline::recognize::DEFAULT_TIMEOUT_SECS;
use crate::prompts::{DefaultPrompt, PromptStrategy};
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Configuration for a transcription run.
///
/// Built via [`TranscriptionConfig::builder()`] or using
/// [`TranscriptionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_scribe::TranscriptionConfig;
///
/// let config = TranscriptionConfig::builder()
///     .scale(3.0)
///     .max_retries(2)
///     .endpoint("https://example.org/.netlify/functions/transcribe")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct TranscriptionConfig {
    /// Render scale relative to the page's natural size. Range: 0.5–6.0. Default: 2.0.
    ///
    /// Each band is a fraction of the page, so the page must be rendered
    /// large enough for small print to survive the crop.
    pub scale: f32,

    /// Pause between pages in `process_all`, in milliseconds. Default: 100.
    pub page_pause_ms: u64,

    /// Per-request recognition deadline in seconds. Default: 25.
    pub request_timeout_secs: u64,

    /// Extra attempts on a retryable recognition failure. Default: 0.
    ///
    /// Only errors where [`crate::error::RecognitionError::is_retryable`]
    /// holds are retried; a 4xx answer fails the section immediately.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Largest encoded section sent without recompression. Default: 5 MiB.
    pub max_image_bytes: usize,

    /// Longest side of a recompressed section in pixels. Default: 4000.
    pub max_image_dimension: u32,

    /// Lowest JPEG quality tried before the raster is shrunk. Default: 30.
    pub min_jpeg_quality: u8,

    /// Estimated wall-clock seconds per section. Default: 20.
    pub seconds_per_section: f64,

    /// Estimated service cost per section in USD. Default: 0.015.
    pub cost_per_section_usd: f64,

    /// Transcription endpoint URL. When set, sections go to an
    /// [`crate::pipeline::recognize::HttpRecognizer`] instead of an LLM provider.
    pub endpoint: Option<String>,

    /// Credential forwarded to the endpoint. Never printed by `Debug`.
    pub api_key: Option<String>,

    /// LLM model identifier, e.g. "gpt-4.1-mini", "claude-sonnet-4-20250514".
    /// If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, uses `ProviderFactory::from_env()`.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for LLM recognition. Default: 0.0.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate per section. Default: 4096.
    pub max_tokens: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Prompt builder. Default: [`DefaultPrompt`] without vocabulary.
    pub prompt: Arc<dyn PromptStrategy>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            scale: 2.0,
            page_pause_ms: 100,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: 0,
            retry_backoff_ms: 500,
            max_image_bytes: 5 * 1024 * 1024,
            max_image_dimension: 4000,
            min_jpeg_quality: 30,
            seconds_per_section: 20.0,
            cost_per_section_usd: 0.015,
            endpoint: None,
            api_key: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.0,
            max_tokens: 4096,
            password: None,
            pages: PageSelection::default(),
            prompt: Arc::new(DefaultPrompt::new()),
            download_timeout_secs: 120,
        }
    }
}

impl fmt::Debug for TranscriptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscriptionConfig")
            .field("scale", &self.scale)
            .field("page_pause_ms", &self.page_pause_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_image_bytes", &self.max_image_bytes)
            .field("max_image_dimension", &self.max_image_dimension)
            .field("min_jpeg_quality", &self.min_jpeg_quality)
            .field("seconds_per_section", &self.seconds_per_section)
            .field("cost_per_section_usd", &self.cost_per_section_usd)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("pages", &self.pages)
            .finish()
    }
}

impl TranscriptionConfig {
    /// Create a new builder for `TranscriptionConfig`.
    pub fn builder() -> TranscriptionConfigBuilder {
        TranscriptionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Transport limits for the section encoder.
    pub fn encode_limits(&self) -> EncodeLimits {
        EncodeLimits {
            max_bytes: self.max_image_bytes,
            max_dimension: self.max_image_dimension,
            min_quality: self.min_jpeg_quality,
        }
    }
}

/// Builder for [`TranscriptionConfig`].
pub struct TranscriptionConfigBuilder {
    config: TranscriptionConfig,
}

impl fmt::Debug for TranscriptionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscriptionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl TranscriptionConfigBuilder {
    pub fn scale(mut self, scale: f32) -> Self {
        self.config.scale = scale;
        self
    }

    pub fn page_pause_ms(mut self, ms: u64) -> Self {
        self.config.page_pause_ms = ms;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
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

    pub fn max_image_bytes(mut self, bytes: usize) -> Self {
        self.config.max_image_bytes = bytes;
        self
    }

    pub fn max_image_dimension(mut self, px: u32) -> Self {
        self.config.max_image_dimension = px;
        self
    }

    pub fn min_jpeg_quality(mut self, q: u8) -> Self {
        self.config.min_jpeg_quality = q;
        self
    }

    pub fn seconds_per_section(mut self, secs: f64) -> Self {
        self.config.seconds_per_section = secs;
        self
    }

    pub fn cost_per_section_usd(mut self, usd: f64) -> Self {
        self.config.cost_per_section_usd = usd;
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
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

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn prompt(mut self, strategy: Arc<dyn PromptStrategy>) -> Self {
        self.config.prompt = strategy;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<TranscriptionConfig, ScribeError> {
        let c = &self.config;
        if !(0.5..=6.0).contains(&c.scale) {
            return Err(ScribeError::InvalidConfig(format!(
                "scale must be 0.5–6.0, got {}",
                c.scale
            )));
        }
        if c.request_timeout_secs == 0 {
            return Err(ScribeError::InvalidConfig(
                "request timeout must be ≥ 1 second".into(),
            ));
        }
        if c.max_image_bytes < 1024 {
            return Err(ScribeError::InvalidConfig(format!(
                "max image size must be ≥ 1024 bytes, got {}",
                c.max_image_bytes
            )));
        }
        if c.max_image_dimension < 64 {
            return Err(ScribeError::InvalidConfig(format!(
                "max image dimension must be ≥ 64 px, got {}",
                c.max_image_dimension
            )));
        }
        if !(1..=100).contains(&c.min_jpeg_quality) {
            return Err(ScribeError::InvalidConfig(format!(
                "minimum JPEG quality must be 1–100, got {}",
                c.min_jpeg_quality
            )));
        }
        if c.seconds_per_section < 0.0 || c.cost_per_section_usd < 0.0 {
            return Err(ScribeError::InvalidConfig(
                "estimate rates must not be negative".into(),
            ));
        }
        if let PageSelection::Range(start, end) = c.pages {
            if start == 0 || start > end {
                return Err(ScribeError::InvalidConfig(format!(
                    "invalid page range {start}-{end}"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Page selection ───────────────────────────────────────────────────────

/// Specifies which pages of the document to transcribe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// All pages (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 1-indexed
    /// page numbers that exist in a document of `total_pages`.
    pub fn to_pages(&self, total_pages: usize) -> Vec<usize> {
        let mut pages: Vec<usize> = match self {
            PageSelection::All => (1..=total_pages).collect(),
            PageSelection::Single(p) => vec![*p],
            PageSelection::Range(start, end) => ((*start).max(1)..=(*end).min(total_pages)).collect(),
            PageSelection::Set(set) => set.clone(),
        };
        pages.retain(|&p| p >= 1 && p <= total_pages);
        pages.sort_unstable();
        pages.dedup();
        pages
    }

    /// Parse a CLI page spec: `"5"`, `"3-7"` or `"1,4,9"`.
    pub fn parse(spec: &str) -> Result<Self, ScribeError> {
        let spec = spec.trim();
        let bad = || ScribeError::InvalidConfig(format!("invalid page selection '{spec}'"));
        let num = |s: &str| s.trim().parse::<usize>().map_err(|_| bad());

        if spec.eq_ignore_ascii_case("all") || spec.is_empty() {
            Ok(PageSelection::All)
        } else if spec.contains(',') {
            Ok(PageSelection::Set(
                spec.split(',').map(num).collect::<Result<_, _>>()?,
            ))
        } else if let Some((a, b)) = spec.split_once('-') {
            Ok(PageSelection::Range(num(a)?, num(b)?))
        } else {
            Ok(PageSelection::Single(num(spec)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = TranscriptionConfig::default();
        assert_eq!(c.scale, 2.0);
        assert_eq!(c.page_pause_ms, 100);
        assert_eq!(c.request_timeout_secs, 25);
        assert_eq!(c.max_retries, 0);
        assert_eq!(c.encode_limits(), EncodeLimits::default());
    }

    #[test]
    fn scale_out_of_range_is_rejected() {
        assert!(TranscriptionConfig::builder().scale(0.1).build().is_err());
        assert!(TranscriptionConfig::builder().scale(7.0).build().is_err());
        assert!(TranscriptionConfig::builder().scale(4.0).build().is_ok());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = TranscriptionConfig::builder()
            .pages(PageSelection::Range(5, 2))
            .build()
            .unwrap_err();
        assert!(matches!(err, ScribeError::InvalidConfig(_)));
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = TranscriptionConfig::builder()
            .api_key("sk-very-secret")
            .password("hunter2")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-very-secret"));
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn page_selection_to_pages() {
        assert_eq!(PageSelection::All.to_pages(3), vec![1, 2, 3]);
        assert_eq!(PageSelection::Single(3).to_pages(5), vec![3]);
        assert_eq!(PageSelection::Single(6).to_pages(5), Vec::<usize>::new());
        assert_eq!(PageSelection::Range(2, 4).to_pages(5), vec![2, 3, 4]);
        assert_eq!(PageSelection::Range(4, 9).to_pages(5), vec![4, 5]);
        assert_eq!(PageSelection::Set(vec![3, 1, 3, 0, 8]).to_pages(5), vec![1, 3]);
    }

    #[test]
    fn page_selection_parse() {
        assert_eq!(PageSelection::parse("all").unwrap(), PageSelection::All);
        assert_eq!(PageSelection::parse("5").unwrap(), PageSelection::Single(5));
        assert_eq!(PageSelection::parse("3-7").unwrap(), PageSelection::Range(3, 7));
        assert_eq!(
            PageSelection::parse("1, 4,9").unwrap(),
            PageSelection::Set(vec![1, 4, 9])
        );
        assert!(PageSelection::parse("x-2").is_err());
    }
}
