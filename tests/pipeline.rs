//! End-to-end pipeline tests without pdfium or a live backend.
//!
//! A fake [`BatchRenderer`] stands in for the grid renderer and a scripted
//! backend answers the vision and text calls, either at the [`AiBackend`]
//! level or underneath a real [`TransportClient`] via a scripted
//! [`HttpExchange`].

use async_trait::async_trait;
use minutebook_sections::pipeline::transport::{
    ExchangeError, HttpExchange, HttpReply, TEXT_ENDPOINT, VISION_ENDPOINT,
};
use minutebook_sections::{
    classify_with_renderer, write_report, AiBackend, BatchRenderer,
    ClassificationProgressCallback, ClassifierConfig, Section, SectionReport, TransportClient,
    TransportError,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Renders every batch as a placeholder string naming its first page.
struct FakeRenderer;

impl BatchRenderer for FakeRenderer {
    fn render_batch(&self, page_indices: &[usize]) -> Option<String> {
        Some(format!("grid-{}", page_indices[0] + 1))
    }
}

/// Heading the "vision model" reports for each page of a 14-page book.
fn heading(page: usize) -> &'static str {
    match page {
        1..=5 => "ARTICLES OF INCORPORATION",
        6..=10 => "BY-LAW NO. 1",
        _ => "REGISTER OF DIRECTORS",
    }
}

/// Pulls `(start, end)` out of the batch prompt.
fn prompt_bounds(prompt: &str) -> (usize, usize) {
    let tail = prompt
        .split("spanning from page ")
        .nth(1)
        .expect("batch prompt names its range");
    let mut nums = tail
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().unwrap());
    (nums.next().unwrap(), nums.next().unwrap())
}

fn vision_reply(prompt: &str) -> String {
    let (start, end) = prompt_bounds(prompt);
    (start..=end)
        .map(|p| format!("Page {p}: {}", heading(p)))
        .collect::<Vec<_>>()
        .join("\n")
}

const STRUCTURE_REPLY: &str = r#"Here is the structure:
```json
{"sections": [
  {"name": "Articles & Amendments", "startPage": 1, "endPage": 5},
  {"name": "By Laws", "startPage": 5, "endPage": 10},
  {"name": "Directors Register", "startPage": 12, "endPage": 14}
]}
```"#;

struct ScriptedBackend {
    fail_vision_for: Option<&'static str>,
    text_reply: &'static str,
    text_queries: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn new(text_reply: &'static str) -> Self {
        Self {
            fail_vision_for: None,
            text_reply,
            text_queries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl AiBackend for ScriptedBackend {
    async fn vision(
        &self,
        image_b64: &str,
        prompt: &str,
        model: &str,
    ) -> Result<String, TransportError> {
        assert_eq!(model, "test-model");
        if self.fail_vision_for == Some(image_b64) {
            return Err(TransportError::RetriesExhausted {
                attempts: 3,
                last: "request timed out after 50s".into(),
            });
        }
        Ok(vision_reply(prompt))
    }

    async fn text(&self, query: &str, _model: &str) -> Result<String, TransportError> {
        self.text_queries.lock().unwrap().push(query.to_string());
        Ok(self.text_reply.to_string())
    }
}

#[derive(Default)]
struct CountingProgress {
    starts: AtomicUsize,
    completes: AtomicUsize,
    errors: AtomicUsize,
    strategies: AtomicUsize,
    failed_strategies: AtomicUsize,
    sections: AtomicUsize,
}

impl ClassificationProgressCallback for CountingProgress {
    fn on_batch_start(&self, _: usize, _: usize) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }
    fn on_batch_complete(&self, _: usize, _: usize, _: usize) {
        self.completes.fetch_add(1, Ordering::SeqCst);
    }
    fn on_batch_error(&self, _: usize, _: usize, _: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
    fn on_strategy_start(&self, _: usize) {
        self.strategies.fetch_add(1, Ordering::SeqCst);
    }
    fn on_strategy_failed(&self, _: usize) {
        self.failed_strategies.fetch_add(1, Ordering::SeqCst);
    }
    fn on_classification_complete(&self, section_count: usize) {
        self.sections.store(section_count, Ordering::SeqCst);
    }
}

fn config_with(backend: Arc<dyn AiBackend>) -> ClassifierConfig {
    ClassifierConfig::builder()
        .model("test-model")
        .backend(backend)
        .build()
        .unwrap()
}

fn expected_sections() -> Vec<Section> {
    vec![
        Section::new("Articles & Amendments", 1, 5),
        Section::new("By Laws", 6, 11),
        Section::new("Directors Register", 12, 14),
    ]
}

// ── AiBackend-level tests ────────────────────────────────────────────────────

#[tokio::test]
async fn classifies_fourteen_page_book() {
    let backend = Arc::new(ScriptedBackend::new(STRUCTURE_REPLY));
    let config = config_with(backend.clone());

    let output = classify_with_renderer(&FakeRenderer, 14, &config)
        .await
        .unwrap();

    // Overlap at page 5 split, one-page gap at 11 absorbed by By Laws.
    assert_eq!(output.sections, expected_sections());
    assert_eq!(output.stats.total_pages, 14);
    assert_eq!(output.stats.batches, 3);
    assert_eq!(output.stats.failed_batches, 0);
    assert_eq!(output.stats.strategy_chunks, Some(1));

    let queries = backend.text_queries.lock().unwrap();
    assert_eq!(queries.len(), 1);
    let q = &queries[0];
    let b1 = q.find("[Batch 1: Pages 1-6]").unwrap();
    let b2 = q.find("[Batch 2: Pages 7-12]").unwrap();
    let b3 = q.find("[Batch 3: Pages 13-14]").unwrap();
    assert!(b1 < b2 && b2 < b3, "batches aggregated in order");
    assert!(q.contains("Page 14: REGISTER OF DIRECTORS"));
}

#[tokio::test]
async fn failed_batch_becomes_marker_and_run_continues() {
    let backend = Arc::new(ScriptedBackend {
        fail_vision_for: Some("grid-7"),
        ..ScriptedBackend::new(STRUCTURE_REPLY)
    });
    let progress = Arc::new(CountingProgress::default());
    let config = ClassifierConfig::builder()
        .model("test-model")
        .backend(backend.clone())
        .progress_callback(progress.clone())
        .build()
        .unwrap();

    let output = classify_with_renderer(&FakeRenderer, 14, &config)
        .await
        .unwrap();
    assert_eq!(output.stats.failed_batches, 1);
    assert_eq!(output.sections.len(), 3);

    let queries = backend.text_queries.lock().unwrap();
    assert!(queries[0]
        .contains("[Batch 2: Pages 7-12]\nERROR: request failed after 3 attempts"));

    assert_eq!(progress.starts.load(Ordering::SeqCst), 3);
    assert_eq!(progress.completes.load(Ordering::SeqCst), 2);
    assert_eq!(progress.errors.load(Ordering::SeqCst), 1);
    assert_eq!(progress.strategies.load(Ordering::SeqCst), 1);
    assert_eq!(progress.sections.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unusable_replies_yield_empty_report() {
    let backend = Arc::new(ScriptedBackend::new("Sorry, I cannot determine the sections."));
    let progress = Arc::new(CountingProgress::default());
    let config = ClassifierConfig::builder()
        .backend(backend.clone())
        .model("test-model")
        .progress_callback(progress.clone())
        .build()
        .unwrap();

    let output = classify_with_renderer(&FakeRenderer, 14, &config)
        .await
        .unwrap();
    assert!(output.sections.is_empty());
    assert_eq!(output.stats.strategy_chunks, None);
    // One aborted call per strategy: 1, 3, then 5 chunks.
    assert_eq!(backend.text_queries.lock().unwrap().len(), 3);
    assert_eq!(progress.failed_strategies.load(Ordering::SeqCst), 3);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("result.json");
    write_report(&output.report(), &path).await.unwrap();
    let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written, json!({"sections": []}));
}

#[tokio::test]
async fn custom_strategies_and_gap_threshold() {
    let backend = Arc::new(ScriptedBackend::new(STRUCTURE_REPLY));
    let config = ClassifierConfig::builder()
        .model("test-model")
        .backend(backend.clone())
        .chunk_strategies(vec![1])
        .max_gap_fill(0)
        .build()
        .unwrap();

    let output = classify_with_renderer(&FakeRenderer, 14, &config)
        .await
        .unwrap();
    // Gap at page 11 stays open.
    assert_eq!(output.sections[1], Section::new("By Laws", 6, 10));
}

// ── HTTP-level test through TransportClient ──────────────────────────────────

/// Answers like the real backend; the first vision request gets a 503.
struct ScriptedHttp {
    vision_calls: AtomicUsize,
    text_calls: AtomicUsize,
}

#[async_trait]
impl HttpExchange for ScriptedHttp {
    async fn post_json(
        &self,
        url: &str,
        bearer: &str,
        payload: &Value,
        _timeout: Duration,
    ) -> Result<HttpReply, ExchangeError> {
        assert_eq!(bearer, "secret");
        if url.ends_with(VISION_ENDPOINT) {
            if self.vision_calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(HttpReply {
                    status: 503,
                    body: "busy".into(),
                });
            }
            assert!(payload["pdfPage"].as_str().unwrap().starts_with("grid-"));
            let prompt = payload["prompt"].as_str().unwrap();
            let body = json!({ "result": vision_reply(prompt) }).to_string();
            Ok(HttpReply { status: 200, body })
        } else if url.ends_with(TEXT_ENDPOINT) {
            self.text_calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(payload["model"], "test-model");
            let body = json!({ "result": STRUCTURE_REPLY }).to_string();
            Ok(HttpReply { status: 200, body })
        } else {
            Err(ExchangeError::Other(format!("unexpected url {url}")))
        }
    }
}

#[tokio::test]
async fn request_counter_includes_retried_responses() {
    let http = Arc::new(ScriptedHttp {
        vision_calls: AtomicUsize::new(0),
        text_calls: AtomicUsize::new(0),
    });
    let client = TransportClient::with_exchange(http.clone(), "https://ai.test/", "secret")
        .backoff_base_secs(0.0);
    let config = ClassifierConfig::builder()
        .model("test-model")
        .concurrency(1)
        .backend(Arc::new(client))
        .build()
        .unwrap();

    let output = classify_with_renderer(&FakeRenderer, 14, &config)
        .await
        .unwrap();

    assert_eq!(output.sections, expected_sections());
    assert_eq!(output.stats.failed_batches, 0);
    assert_eq!(http.vision_calls.load(Ordering::SeqCst), 4);
    assert_eq!(http.text_calls.load(Ordering::SeqCst), 1);
    // 3 batches + 1 retried 503 + 1 structure call.
    assert_eq!(output.stats.api_requests, 5);
}

#[tokio::test]
async fn report_round_trips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("result.json");
    let report = SectionReport {
        sections: expected_sections(),
    };
    write_report(&report, &path).await.unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains(r#""startPage": 12"#));
    let back: SectionReport = serde_json::from_str(&raw).unwrap();
    assert_eq!(back, report);
}
