//! Backend transport: authenticated JSON requests with bounded retry.
//!
//! Two endpoints are used, both returning the envelope `{"result": "..."}`:
//!
//! ```text
//! POST {base}/process-pdf   {"pdfPage": <base64>, "prompt": ..., "model": ...}
//! POST {base}/ask           {"query": ..., "model": ...}
//! ```
//!
//! ## Retry Strategy
//!
//! Timeouts, connection failures and HTTP 500/502/503/504 are retried with
//! exponential backoff (`base × 2^attempt`: 1.5 s → 3 s with the default
//! base). Any other status is permanent and returned at once. A failure
//! outside the network layer (an undecodable 200 body) ends the loop early.
//! No delay follows the last attempt.
//!
//! The HTTP exchange sits behind [`HttpExchange`] so the retry machine can be
//! driven by scripted replies in tests.

use crate::error::TransportError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Vision endpoint path.
pub const VISION_ENDPOINT: &str = "/process-pdf";
/// Text endpoint path.
pub const TEXT_ENDPOINT: &str = "/ask";
/// Longest slice of an error body kept in [`TransportError::Api`].
const ERROR_BODY_LIMIT: usize = 100;

/// The AI backend as seen by the pipeline.
///
/// [`TransportClient`] is the production implementation; tests provide
/// scripted ones.
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Ask a question about an image (base64-encoded).
    async fn vision(&self, image_b64: &str, prompt: &str, model: &str)
        -> Result<String, TransportError>;

    /// Ask a text-only question.
    async fn text(&self, query: &str, model: &str) -> Result<String, TransportError>;

    /// HTTP responses received so far, retries included.
    fn request_count(&self) -> u64 {
        0
    }
}

// ── HTTP exchange seam ───────────────────────────────────────────────────

/// Raw HTTP reply: status code and body text.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// Failure of a single HTTP exchange, before any status is known.
#[derive(Debug, Clone)]
pub enum ExchangeError {
    Timeout,
    Connection(String),
    Other(String),
}

/// One HTTP POST with a JSON body and bearer auth.
#[async_trait]
pub trait HttpExchange: Send + Sync {
    async fn post_json(
        &self,
        url: &str,
        bearer: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<HttpReply, ExchangeError>;
}

/// [`HttpExchange`] over a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestExchange {
    client: reqwest::Client,
}

impl ReqwestExchange {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> ExchangeError {
    if e.is_timeout() {
        ExchangeError::Timeout
    } else if e.is_connect() || e.is_request() || e.is_body() {
        ExchangeError::Connection(e.to_string())
    } else {
        ExchangeError::Other(e.to_string())
    }
}

#[async_trait]
impl HttpExchange for ReqwestExchange {
    async fn post_json(
        &self,
        url: &str,
        bearer: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<HttpReply, ExchangeError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(bearer)
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_reqwest_error)?;
        Ok(HttpReply { status, body })
    }
}

// ── Retry state machine ──────────────────────────────────────────────────

/// Delay before retry `attempt` (0-indexed): `base × 2^attempt` seconds.
pub fn backoff_delay(base_secs: f64, attempt: u32) -> Duration {
    let secs = base_secs * 2f64.powi(attempt.min(30) as i32);
    Duration::from_secs_f64(secs.max(0.0))
}

/// State of the retry loop between attempts.
#[derive(Debug)]
enum RetryState {
    /// About to send attempt `n` (0-indexed).
    Attempting(u32),
    /// Attempt `n` failed in a way worth retrying.
    TransientFailure { attempt: u32, error: TransportError },
    /// Terminal failure; no further attempts.
    PermanentFailure(TransportError),
    /// All attempts used up on transient failures.
    ExhaustedRetries { last: TransportError },
}

/// Decode a 200 body: the `result` field of a JSON object.
fn decode_envelope(body: &str) -> Result<String, TransportError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| TransportError::Unexpected(format!("invalid JSON envelope: {e}")))?;
    let object = value.as_object().ok_or_else(|| {
        TransportError::Unexpected("response envelope is not a JSON object".to_string())
    })?;
    Ok(match object.get("result") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    })
}

fn truncate_body(body: &str) -> String {
    body.chars().take(ERROR_BODY_LIMIT).collect()
}

/// Authenticated backend client with retry, backoff and a request counter.
pub struct TransportClient {
    exchange: Arc<dyn HttpExchange>,
    base_url: String,
    api_key: String,
    max_retries: u32,
    backoff_base_secs: f64,
    timeout: Duration,
    requests: AtomicU64,
}

impl TransportClient {
    /// Client over a fresh `reqwest::Client`, with default retry settings.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_exchange(
            Arc::new(ReqwestExchange::default()),
            base_url,
            api_key,
        )
    }

    /// Client over any [`HttpExchange`].
    pub fn with_exchange(
        exchange: Arc<dyn HttpExchange>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            exchange,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_retries: 3,
            backoff_base_secs: 1.5,
            timeout: Duration::from_secs(50),
            requests: AtomicU64::new(0),
        }
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n.max(1);
        self
    }

    pub fn backoff_base_secs(mut self, secs: f64) -> Self {
        self.backoff_base_secs = secs.max(0.0);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// HTTP responses received so far.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Send one attempt and classify its outcome.
    async fn attempt(&self, url: &str, payload: &Value) -> Result<String, TransportError> {
        let reply = self
            .exchange
            .post_json(url, &self.api_key, payload, self.timeout)
            .await
            .map_err(|e| match e {
                ExchangeError::Timeout => TransportError::Timeout {
                    secs: self.timeout.as_secs(),
                },
                ExchangeError::Connection(msg) => TransportError::Connection(msg),
                ExchangeError::Other(msg) => TransportError::Unexpected(msg),
            })?;

        self.requests.fetch_add(1, Ordering::SeqCst);

        match reply.status {
            200 => decode_envelope(&reply.body),
            500 | 502 | 503 | 504 => Err(TransportError::ServerError {
                status: reply.status,
            }),
            status => Err(TransportError::Api {
                status,
                body: truncate_body(&reply.body),
            }),
        }
    }

    /// POST `payload` to `endpoint`, retrying transient failures.
    pub async fn send(&self, endpoint: &str, payload: &Value) -> Result<String, TransportError> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut state = RetryState::Attempting(0);

        loop {
            state = match state {
                RetryState::Attempting(attempt) => match self.attempt(&url, payload).await {
                    Ok(text) => {
                        debug!("{}: {} chars on attempt {}", endpoint, text.len(), attempt + 1);
                        return Ok(text);
                    }
                    Err(error) if error.is_transient() => {
                        RetryState::TransientFailure { attempt, error }
                    }
                    Err(error) => RetryState::PermanentFailure(error),
                },
                RetryState::TransientFailure { attempt, error } => {
                    if attempt + 1 >= self.max_retries {
                        RetryState::ExhaustedRetries { last: error }
                    } else {
                        let delay = backoff_delay(self.backoff_base_secs, attempt);
                        warn!(
                            "{}: {}; retrying in {:.1}s ({}/{})",
                            endpoint,
                            error,
                            delay.as_secs_f64(),
                            attempt + 2,
                            self.max_retries
                        );
                        sleep(delay).await;
                        RetryState::Attempting(attempt + 1)
                    }
                }
                RetryState::PermanentFailure(error) => {
                    if matches!(error, TransportError::Unexpected(_)) {
                        error!("{}: {}", endpoint, error);
                    } else {
                        warn!("{}: {}", endpoint, error);
                    }
                    return Err(error);
                }
                RetryState::ExhaustedRetries { last } => {
                    warn!("{}: giving up after {} attempts", endpoint, self.max_retries);
                    return Err(TransportError::RetriesExhausted {
                        attempts: self.max_retries,
                        last: last.to_string(),
                    });
                }
            };
        }
    }
}

#[async_trait]
impl AiBackend for TransportClient {
    async fn vision(
        &self,
        image_b64: &str,
        prompt: &str,
        model: &str,
    ) -> Result<String, TransportError> {
        let payload = json!({
            "pdfPage": image_b64,
            "prompt": prompt,
            "model": model,
        });
        self.send(VISION_ENDPOINT, &payload).await
    }

    async fn text(&self, query: &str, model: &str) -> Result<String, TransportError> {
        let payload = json!({
            "query": query,
            "model": model,
        });
        self.send(TEXT_ENDPOINT, &payload).await
    }

    fn request_count(&self) -> u64 {
        self.requests()
    }
}
