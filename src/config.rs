//! Configuration types for minute-book classification.
//!
//! All classification behaviour is controlled through [`ClassifierConfig`],
//! built via its [`ClassifierConfigBuilder`]. Endpoint and secret may be left
//! unset; they are then read from the environment when the pipeline starts
//! (see [`crate::classify`]).

use crate::error::ClassifyError;
use crate::pipeline::reconcile::ReconcileOptions;
use crate::pipeline::transport::AiBackend;
use crate::progress::ProgressCallback;
use crate::prompts::DEFAULT_SECTION_NAMES;
use std::fmt;
use std::sync::Arc;

/// Model identifier sent with every request when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Configuration for a classification run.
///
/// # Example
/// ```rust
/// use minutebook_sections::ClassifierConfig;
///
/// let config = ClassifierConfig::builder()
///     .api_url("https://ai.example.internal")
///     .api_key("secret")
///     .batch_size(6)
///     .concurrency(10)
///     .build()
///     .unwrap();
/// assert_eq!(config.chunk_strategies, vec![1, 3, 5]);
/// ```
#[derive(Clone)]
pub struct ClassifierConfig {
    /// Base URL of the AI backend, without trailing slash. Falls back to
    /// `MINUTEBOOK_API_URL`.
    pub api_url: Option<String>,

    /// Bearer token. Falls back to `MINUTEBOOK_API_KEY`.
    pub api_key: Option<String>,

    /// Model selector forwarded to the backend. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Pages per vision batch (one grid image each). Default: 6.
    ///
    /// The grid is two columns wide, so 6 pages make a 3-row image the
    /// backend can still read page labels from.
    pub batch_size: usize,

    /// Concurrent vision requests. Default: 10.
    pub concurrency: usize,

    /// Attempts per request, the first one included. Default: 3.
    pub max_retries: u32,

    /// Base of the exponential backoff, in seconds. Default: 1.5.
    ///
    /// Retry `k` (0-indexed) waits `backoff_base_secs × 2^k`: 1.5 s, then 3 s.
    pub backoff_base_secs: f64,

    /// Per-request timeout in seconds. Default: 50.
    pub request_timeout_secs: u64,

    /// Chunk counts tried by the structure resolver, coarsest first.
    /// Default: `[1, 3, 5]`.
    pub chunk_strategies: Vec<usize>,

    /// Largest gap (in pages) the reconciler closes by extending the earlier
    /// section. Default: 5.
    pub max_gap_fill: u32,

    /// Section categories offered to the model, in typical document order.
    pub section_names: Vec<String>,

    /// Pre-constructed backend. Takes precedence over `api_url`/`api_key`.
    pub backend: Option<Arc<dyn AiBackend>>,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            batch_size: 6,
            concurrency: 10,
            max_retries: 3,
            backoff_base_secs: 1.5,
            request_timeout_secs: 50,
            chunk_strategies: vec![1, 3, 5],
            max_gap_fill: 5,
            section_names: DEFAULT_SECTION_NAMES.iter().map(|s| s.to_string()).collect(),
            backend: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("batch_size", &self.batch_size)
            .field("concurrency", &self.concurrency)
            .field("max_retries", &self.max_retries)
            .field("backoff_base_secs", &self.backoff_base_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("chunk_strategies", &self.chunk_strategies)
            .field("max_gap_fill", &self.max_gap_fill)
            .field("section_names", &self.section_names.len())
            .field("backend", &self.backend.as_ref().map(|_| "<dyn AiBackend>"))
            .finish()
    }
}

impl ClassifierConfig {
    /// Create a new builder for `ClassifierConfig`.
    pub fn builder() -> ClassifierConfigBuilder {
        ClassifierConfigBuilder {
            config: Self::default(),
        }
    }

    /// Reconciler options derived from this config.
    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            max_gap_fill: self.max_gap_fill,
        }
    }
}

/// Builder for [`ClassifierConfig`].
pub struct ClassifierConfigBuilder {
    config: ClassifierConfig,
}

impl fmt::Debug for ClassifierConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClassifierConfigBuilder")
            .field(&self.config)
            .finish()
    }
}

impl ClassifierConfigBuilder {
    pub fn api_url(mut self, url: impl Into<String>) -> Self {
        let url: String = url.into();
        self.config.api_url = Some(url.trim_end_matches('/').to_string());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.batch_size = n.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.max(1);
        self
    }

    pub fn backoff_base_secs(mut self, secs: f64) -> Self {
        self.config.backoff_base_secs = secs.max(0.0);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn chunk_strategies(mut self, strategies: Vec<usize>) -> Self {
        self.config.chunk_strategies = strategies;
        self
    }

    pub fn max_gap_fill(mut self, pages: u32) -> Self {
        self.config.max_gap_fill = pages;
        self
    }

    pub fn section_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.section_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn backend(mut self, backend: Arc<dyn AiBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClassifierConfig, ClassifyError> {
        let c = &self.config;
        if c.chunk_strategies.is_empty() {
            return Err(ClassifyError::InvalidConfig(
                "At least one chunk strategy is required".into(),
            ));
        }
        if c.chunk_strategies.contains(&0) {
            return Err(ClassifyError::InvalidConfig(
                "Chunk counts must be ≥ 1".into(),
            ));
        }
        if c.request_timeout_secs == 0 {
            return Err(ClassifyError::InvalidConfig(
                "Request timeout must be ≥ 1s".into(),
            ));
        }
        if c.section_names.is_empty() {
            return Err(ClassifyError::InvalidConfig(
                "Section name list is empty".into(),
            ));
        }
        if !c.backoff_base_secs.is_finite() {
            return Err(ClassifyError::InvalidConfig(format!(
                "Backoff base must be finite, got {}",
                c.backoff_base_secs
            )));
        }
        Ok(self.config)
    }
}
