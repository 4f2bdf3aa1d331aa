//! Classification entry points.
//!
//! [`classify`] runs the whole pipeline on a PDF file. [`classify_with_renderer`]
//! starts from an arbitrary [`BatchRenderer`] instead of pdfium, which is how
//! the pipeline is driven without a native PDF library.
//!
//! Only setup problems are fatal (bad input, no backend, unopenable PDF).
//! Backend trouble degrades the result; the worst case is an empty section
//! list, which is still a successful run.

use crate::config::ClassifierConfig;
use crate::error::ClassifyError;
use crate::output::{ClassificationOutput, ClassificationStats, SectionReport};
use crate::pipeline::dispatch::{aggregate, extract_text, partition, Batch, BatchRenderer};
use crate::pipeline::resolve::StructureResolver;
use crate::pipeline::transport::{AiBackend, TransportClient};
use crate::pipeline::{input, render};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Backend base URL, used when the config leaves `api_url` unset.
pub const API_URL_ENV: &str = "MINUTEBOOK_API_URL";
/// Bearer token, used when the config leaves `api_key` unset.
pub const API_KEY_ENV: &str = "MINUTEBOOK_API_KEY";
/// Model selector default picked up by the CLI.
pub const MODEL_ENV: &str = "MINUTEBOOK_MODEL";

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Pick the backend: explicit instance, then configured or environment
/// endpoint and key.
pub fn resolve_backend(config: &ClassifierConfig) -> Result<Arc<dyn AiBackend>, ClassifyError> {
    if let Some(ref backend) = config.backend {
        debug!("Using pre-constructed backend");
        return Ok(Arc::clone(backend));
    }

    let url = config.api_url.clone().or_else(|| non_empty_env(API_URL_ENV));
    let key = config.api_key.clone().or_else(|| non_empty_env(API_KEY_ENV));

    match (url, key) {
        (Some(url), Some(key)) => {
            info!("Using backend at {}", url);
            let client = TransportClient::new(url, key)
                .max_retries(config.max_retries)
                .backoff_base_secs(config.backoff_base_secs)
                .timeout(Duration::from_secs(config.request_timeout_secs));
            Ok(Arc::new(client))
        }
        (url, _) => Err(ClassifyError::BackendNotConfigured {
            hint: if url.is_none() {
                format!("Set {API_URL_ENV} or pass --api-url.")
            } else {
                format!("Set {API_KEY_ENV} or pass --api-key.")
            },
        }),
    }
}

/// Classify a minute-book PDF into labelled page ranges.
///
/// # Errors
/// Only for fatal setup problems:
/// - file not found, unreadable, or not a PDF
/// - no backend configured
/// - pdfium cannot be bound or the document cannot be opened
pub async fn classify(
    pdf_path: impl AsRef<Path>,
    config: &ClassifierConfig,
) -> Result<ClassificationOutput, ClassifyError> {
    let total_start = Instant::now();
    let path = input::validate_pdf_path(pdf_path.as_ref())?;
    info!("Starting classification: {}", path.display());

    let backend = resolve_backend(config)?;

    let render_start = Instant::now();
    let (total_pages, batches) = render::render_batches(&path, config.batch_size).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!(
        "Rendered {} batches for {} pages in {}ms",
        batches.len(),
        total_pages,
        render_duration_ms
    );

    let mut output = run_pipeline(backend.as_ref(), total_pages, batches, config).await;
    output.stats.render_duration_ms = render_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(output)
}

/// Classify a document of `total_pages` pages whose batch previews come
/// from `renderer`.
pub async fn classify_with_renderer<R>(
    renderer: &R,
    total_pages: usize,
    config: &ClassifierConfig,
) -> Result<ClassificationOutput, ClassifyError>
where
    R: BatchRenderer + ?Sized,
{
    let total_start = Instant::now();
    let backend = resolve_backend(config)?;

    let render_start = Instant::now();
    let batches = partition(renderer, total_pages, config.batch_size);
    let render_duration_ms = render_start.elapsed().as_millis() as u64;

    let mut output = run_pipeline(backend.as_ref(), total_pages, batches, config).await;
    output.stats.render_duration_ms = render_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    Ok(output)
}

/// Vision extraction, aggregation and structure resolution. Infallible.
async fn run_pipeline(
    backend: &dyn AiBackend,
    total_pages: usize,
    mut batches: Vec<Batch>,
    config: &ClassifierConfig,
) -> ClassificationOutput {
    let progress = config.progress_callback.as_ref();
    if let Some(cb) = progress {
        cb.on_classification_start(total_pages, batches.len());
    }

    // ── Vision phase ─────────────────────────────────────────────────────
    let vision_start = Instant::now();
    let failed_batches = extract_text(
        backend,
        &mut batches,
        &config.model,
        config.concurrency,
        progress,
    )
    .await;
    let vision_duration_ms = vision_start.elapsed().as_millis() as u64;
    if failed_batches > 0 {
        warn!("{}/{} batches failed", failed_batches, batches.len());
    }

    // ── Structure phase ──────────────────────────────────────────────────
    let text = aggregate(&batches);
    debug!("Aggregated text: {} chars", text.len());

    let structure_start = Instant::now();
    let resolution = StructureResolver::new(
        backend,
        &config.model,
        &config.section_names,
        &config.chunk_strategies,
    )
    .reconcile_options(config.reconcile_options())
    .progress(progress)
    .resolve(&text, total_pages)
    .await;
    let structure_duration_ms = structure_start.elapsed().as_millis() as u64;

    info!(
        "Classification complete: {} sections, {} requests",
        resolution.sections.len(),
        backend.request_count()
    );
    if let Some(cb) = progress {
        cb.on_classification_complete(resolution.sections.len());
    }

    ClassificationOutput {
        sections: resolution.sections,
        stats: ClassificationStats {
            total_pages,
            batches: batches.len(),
            failed_batches,
            api_requests: backend.request_count(),
            strategy_chunks: resolution.chunk_count,
            render_duration_ms: 0,
            vision_duration_ms,
            structure_duration_ms,
            total_duration_ms: 0,
        },
    }
}

/// Write `report` as pretty JSON.
///
/// Uses atomic write (temp file + rename) so a crash never leaves a partial
/// result behind.
pub async fn write_report(report: &SectionReport, path: &Path) -> Result<(), ClassifyError> {
    let write_err = |source: std::io::Error| ClassifyError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let json = serde_json::to_string_pretty(report)
        .map_err(|e| ClassifyError::Internal(format!("Failed to serialise result: {}", e)))?;

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

/// Classify a PDF and write the `{"sections": [...]}` result to
/// `output_path`. An empty result is written like any other.
pub async fn classify_to_file(
    pdf_path: impl AsRef<Path>,
    output_path: impl AsRef<Path>,
    config: &ClassifierConfig,
) -> Result<ClassificationOutput, ClassifyError> {
    let output = classify(pdf_path, config).await?;
    write_report(&output.report(), output_path.as_ref()).await?;
    info!("Result written to {}", output_path.as_ref().display());
    Ok(output)
}

/// Synchronous wrapper around [`classify`].
///
/// Creates a temporary tokio runtime internally.
pub fn classify_sync(
    pdf_path: impl AsRef<Path>,
    config: &ClassifierConfig,
) -> Result<ClassificationOutput, ClassifyError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ClassifyError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(classify(pdf_path, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Section;

    #[test]
    fn explicit_endpoint_builds_client() {
        let config = ClassifierConfig::builder()
            .api_url("https://ai.example.com")
            .api_key("k")
            .build()
            .unwrap();
        let backend = resolve_backend(&config).unwrap();
        assert_eq!(backend.request_count(), 0);
    }

    #[test]
    fn missing_key_is_reported() {
        // The env fallback would supply the key.
        if std::env::var(API_KEY_ENV).is_ok() {
            return;
        }
        let config = ClassifierConfig::builder()
            .api_url("https://ai.example.com")
            .build()
            .unwrap();
        match resolve_backend(&config) {
            Err(ClassifyError::BackendNotConfigured { hint }) => {
                assert!(hint.contains(API_KEY_ENV))
            }
            other => panic!("expected BackendNotConfigured, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn report_written_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("result.json");
        let report = SectionReport {
            sections: vec![Section::new("By Laws", 1, 4)],
        };
        write_report(&report, &path).await.unwrap();

        let back: SectionReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, report);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn empty_report_is_still_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        write_report(&SectionReport::default(), &path).await.unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "{\n  \"sections\": []\n}");
    }

    #[tokio::test]
    async fn missing_input_fails_before_backend_lookup() {
        let config = ClassifierConfig::default();
        let err = classify("/definitely/not/here.pdf", &config).await.unwrap_err();
        assert!(matches!(err, ClassifyError::FileNotFound { .. }));
    }
}
