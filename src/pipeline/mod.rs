//! Pipeline stages for minute-book classification.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ dispatch ──▶ resolve ──▶ reconcile
//! (%PDF)    (grids)    (vision,     (text,      (overlaps,
//!                       parallel)    chunked)    gaps)
//! ```
//!
//! 1. [`input`]     validate the local PDF path and magic bytes
//! 2. [`render`]    batch the pages and draw one labelled grid per batch;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 3. [`encode`]    JPEG + base64 for the vision request body
//! 4. [`dispatch`]  concurrent vision calls, one per batch, then
//!    aggregation in batch order
//! 5. [`resolve`]   escalating chunk strategies over the aggregated text
//! 6. [`extract`]   tolerant JSON recovery from model replies
//! 7. [`reconcile`] turn raw sections into a valid partition
//!
//! [`transport`] is the only module with network I/O.

pub mod dispatch;
pub mod encode;
pub mod extract;
pub mod input;
pub mod reconcile;
pub mod render;
pub mod resolve;
pub mod transport;
