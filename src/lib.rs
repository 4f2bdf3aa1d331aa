//! # minutebook-sections
//!
//! Split a scanned corporate minute book into labelled page-range sections
//! (articles, by-laws, registers, …) using a vision/text AI backend.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     validate the local file (%PDF magic)
//!  ├─ 2. Render    batches of 6 pages → one labelled 2-column grid each
//!  ├─ 3. Vision    concurrent /process-pdf calls, one per batch
//!  ├─ 4. Resolve   /ask calls over the aggregated text, 1 → 3 → 5 chunks
//!  ├─ 5. Reconcile split overlaps, close small gaps
//!  └─ 6. Output    {"sections": [{name, startPage, endPage}, …]} + stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use minutebook_sections::{classify, ClassifierConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Endpoint and key from MINUTEBOOK_API_URL / MINUTEBOOK_API_KEY
//!     let config = ClassifierConfig::default();
//!     let output = classify("minute_book.pdf", &config).await?;
//!     for s in &output.sections {
//!         println!("{}: {}-{}", s.name, s.start_page, s.end_page);
//!     }
//!     eprintln!("{} API requests", output.stats.api_requests);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `minutebook` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! minutebook-sections = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod classify;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use classify::{
    classify, classify_sync, classify_to_file, classify_with_renderer, write_report,
    API_KEY_ENV, API_URL_ENV, MODEL_ENV,
};
pub use config::{ClassifierConfig, ClassifierConfigBuilder, DEFAULT_MODEL};
pub use error::{ClassifyError, TransportError};
pub use output::{ClassificationOutput, ClassificationStats, Section, SectionReport};
pub use pipeline::dispatch::BatchRenderer;
pub use pipeline::reconcile::{fix_boundaries, ReconcileOptions};
pub use pipeline::transport::{AiBackend, TransportClient};
pub use progress::{ClassificationProgressCallback, NoopProgressCallback, ProgressCallback};
