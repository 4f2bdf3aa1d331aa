//! Batch dispatch: page batches, one preview image each, concurrent vision
//! extraction, and order-preserving aggregation.
//!
//! Vision requests are network-bound, so up to `concurrency` of them run at
//! once via `buffer_unordered`. Completion order is arbitrary; every unit
//! carries the index of its batch and writes into that batch's slot only, so
//! no lock is involved. Slots are read after the stream has drained.

use crate::pipeline::transport::AiBackend;
use crate::progress::ProgressCallback;
use crate::prompts::batch_extraction_prompt;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::borrow::Cow;
use std::panic::AssertUnwindSafe;
use tracing::{error, info, warn};

/// Produces one composite preview image for a set of pages.
pub trait BatchRenderer {
    /// Base64-encoded image covering `page_indices` (0-indexed), or `None`
    /// when no image can be produced. A `None` batch is skipped.
    fn render_batch(&self, page_indices: &[usize]) -> Option<String>;
}

/// Text outcome of one batch's vision request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchText {
    Extracted(String),
    /// The request failed; holds the failure description.
    Failed(String),
}

impl BatchText {
    /// Text as it appears in the aggregated blob. Failures become an
    /// `ERROR: ...` marker line.
    pub fn aggregate_text(&self) -> Cow<'_, str> {
        match self {
            BatchText::Extracted(text) => Cow::Borrowed(text),
            BatchText::Failed(reason) => Cow::Owned(format!("ERROR: {reason}")),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, BatchText::Failed(_))
    }
}

/// A contiguous group of pages sent to the backend as one grid image.
#[derive(Debug, Clone)]
pub struct Batch {
    /// 1-indexed, sequential over the batches that were kept.
    pub batch_num: usize,
    /// First page, 1-indexed.
    pub start_page: usize,
    /// Last page, 1-indexed, inclusive.
    pub end_page: usize,
    /// Every page in the batch, 1-indexed and ascending.
    pub page_numbers: Vec<usize>,
    /// Base64 preview image.
    pub image_b64: String,
    /// Filled once by [`extract_text`].
    pub text: Option<BatchText>,
}

/// Split `[0, total_pages)` into batches of `batch_size` and render each.
///
/// Batches the renderer cannot produce an image for are dropped.
pub fn partition<R>(renderer: &R, total_pages: usize, batch_size: usize) -> Vec<Batch>
where
    R: BatchRenderer + ?Sized,
{
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(total_pages.div_ceil(batch_size));

    for first in (0..total_pages).step_by(batch_size) {
        let indices: Vec<usize> = (first..(first + batch_size).min(total_pages)).collect();
        let start_page = first + 1;
        let end_page = first + indices.len();

        match renderer.render_batch(&indices) {
            Some(image_b64) => batches.push(Batch {
                batch_num: batches.len() + 1,
                start_page,
                end_page,
                page_numbers: indices.iter().map(|i| i + 1).collect(),
                image_b64,
                text: None,
            }),
            None => warn!("No preview for pages {}-{}; batch skipped", start_page, end_page),
        }
    }
    batches
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

/// Run one vision request per batch and store each result in its batch.
///
/// A failing request (or a panicking backend) only marks its own batch.
/// Returns the number of failed batches.
pub async fn extract_text(
    backend: &dyn AiBackend,
    batches: &mut [Batch],
    model: &str,
    concurrency: usize,
    progress: Option<&ProgressCallback>,
) -> usize {
    let total = batches.len();

    let results: Vec<(usize, BatchText)> = stream::iter(batches.iter().enumerate().map(
        |(slot, batch)| async move {
            if let Some(cb) = progress {
                cb.on_batch_start(batch.batch_num, total);
            }
            let prompt =
                batch_extraction_prompt(batch.page_numbers.len(), batch.start_page, batch.end_page);

            let outcome = AssertUnwindSafe(backend.vision(&batch.image_b64, &prompt, model))
                .catch_unwind()
                .await;
            let text = match outcome {
                Ok(Ok(text)) => BatchText::Extracted(text),
                Ok(Err(e)) => BatchText::Failed(e.to_string()),
                Err(payload) => BatchText::Failed(panic_message(payload.as_ref())),
            };

            match &text {
                BatchText::Extracted(t) => {
                    info!("Batch {}/{} done", batch.batch_num, total);
                    if let Some(cb) = progress {
                        cb.on_batch_complete(batch.batch_num, total, t.len());
                    }
                }
                BatchText::Failed(reason) => {
                    error!("Batch {}/{} failed: {}", batch.batch_num, total, reason);
                    if let Some(cb) = progress {
                        cb.on_batch_error(batch.batch_num, total, reason);
                    }
                }
            }
            (slot, text)
        },
    ))
    .buffer_unordered(concurrency.max(1))
    .collect()
    .await;

    let mut slots: Vec<Option<BatchText>> = vec![None; total];
    for (slot, text) in results {
        slots[slot] = Some(text);
    }

    let mut failed = 0;
    for (batch, slot) in batches.iter_mut().zip(slots) {
        if slot.as_ref().is_some_and(BatchText::is_failed) {
            failed += 1;
        }
        batch.text = slot;
    }
    failed
}

/// Concatenate batch texts in batch order, each under a page-range header
/// and followed by a separator line.
pub fn aggregate(batches: &[Batch]) -> String {
    let separator = "=".repeat(50);
    let mut parts: Vec<String> = Vec::with_capacity(batches.len() * 3);
    for batch in batches {
        parts.push(format!(
            "\n[Batch {}: Pages {}-{}]",
            batch.batch_num, batch.start_page, batch.end_page
        ));
        parts.push(
            batch
                .text
                .as_ref()
                .map(|t| t.aggregate_text().into_owned())
                .unwrap_or_default(),
        );
        parts.push(separator.clone());
    }
    parts.join("\n")
}
