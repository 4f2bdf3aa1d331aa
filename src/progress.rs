//! Progress-callback trait for classification events.
//!
//! Inject an [`Arc<dyn ClassificationProgressCallback>`] via
//! [`crate::config::ClassifierConfigBuilder::progress_callback`] to receive
//! events as the pipeline renders batches, extracts their text and resolves
//! the section structure.
//!
//! Batch events may arrive concurrently and out of order: the vision phase
//! runs up to `concurrency` requests at once. Strategy events are strictly
//! sequential.
//!
//! # Example
//!
//! ```rust
//! use minutebook_sections::{ClassificationProgressCallback, ClassifierConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ClassificationProgressCallback for CountingCallback {
//!     fn on_batch_complete(&self, batch_num: usize, total_batches: usize, _text_len: usize) {
//!         let done = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("batch {batch_num} done ({done}/{total_batches})");
//!     }
//! }
//!
//! let config = ClassifierConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes a document.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
pub trait ClassificationProgressCallback: Send + Sync {
    /// Called once batches are rendered, before any backend request.
    fn on_classification_start(&self, total_pages: usize, total_batches: usize) {
        let _ = (total_pages, total_batches);
    }

    /// Called just before the vision request for a batch is sent.
    fn on_batch_start(&self, batch_num: usize, total_batches: usize) {
        let _ = (batch_num, total_batches);
    }

    /// Called when a batch's text was extracted.
    fn on_batch_complete(&self, batch_num: usize, total_batches: usize, text_len: usize) {
        let _ = (batch_num, total_batches, text_len);
    }

    /// Called when a batch's slot was filled with an error marker.
    fn on_batch_error(&self, batch_num: usize, total_batches: usize, error: &str) {
        let _ = (batch_num, total_batches, error);
    }

    /// Called when the resolver starts a chunk strategy.
    fn on_strategy_start(&self, chunk_count: usize) {
        let _ = chunk_count;
    }

    /// Called when a chunk strategy is abandoned.
    fn on_strategy_failed(&self, chunk_count: usize) {
        let _ = chunk_count;
    }

    /// Called once at the end with the number of sections found (possibly 0).
    fn on_classification_complete(&self, section_count: usize) {
        let _ = section_count;
    }
}

/// A no-op implementation, used when no callback is configured.
pub struct NoopProgressCallback;

impl ClassificationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ClassifierConfig`].
pub type ProgressCallback = Arc<dyn ClassificationProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        batch_starts: AtomicUsize,
        batch_completes: AtomicUsize,
        batch_errors: AtomicUsize,
        strategies_failed: AtomicUsize,
        sections: AtomicUsize,
    }

    impl ClassificationProgressCallback for TrackingCallback {
        fn on_batch_start(&self, _batch_num: usize, _total: usize) {
            self.batch_starts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_complete(&self, _batch_num: usize, _total: usize, _text_len: usize) {
            self.batch_completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_batch_error(&self, _batch_num: usize, _total: usize, _error: &str) {
            self.batch_errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_strategy_failed(&self, _chunk_count: usize) {
            self.strategies_failed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_classification_complete(&self, section_count: usize) {
            self.sections.store(section_count, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_classification_start(12, 2);
        cb.on_batch_start(1, 2);
        cb.on_batch_complete(1, 2, 42);
        cb.on_batch_error(2, 2, "timeout");
        cb.on_strategy_start(1);
        cb.on_strategy_failed(1);
        cb.on_classification_complete(0);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_batch_start(1, 2);
        tracker.on_batch_complete(1, 2, 100);
        tracker.on_batch_start(2, 2);
        tracker.on_batch_error(2, 2, "server error 503");
        tracker.on_strategy_failed(1);
        tracker.on_classification_complete(4);

        assert_eq!(tracker.batch_starts.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.batch_completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.batch_errors.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.strategies_failed.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.sections.load(Ordering::SeqCst), 4);
    }
}
