//! Error types for the minutebook-sections library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ClassifyError`]: **Fatal**: classification cannot start at all
//!   (missing input file, unreadable PDF, backend not configured). Returned
//!   as `Err(ClassifyError)` from the top-level `classify*` functions.
//!
//! * [`TransportError`]: **Non-fatal**: one backend request failed. It is
//!   folded into the pipeline's control flow (a batch error marker, an
//!   abandoned chunk strategy) and never aborts the run. The worst outcome
//!   of backend trouble is an empty section list.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the minutebook-sections library.
#[derive(Debug, Error)]
pub enum ClassifyError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Place libpdfium next to the executable or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Backend errors ────────────────────────────────────────────────────
    /// No backend endpoint or API key could be found.
    #[error("AI backend is not configured.\n{hint}")]
    BackendNotConfigured { hint: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the result file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal failure of a single backend request.
///
/// The `Display` text is the failure description that stands in for the
/// response payload wherever the pipeline needs text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request did not complete within the per-call timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The connection could not be established or was dropped.
    #[error("connection failed: {0}")]
    Connection(String),

    /// HTTP 500, 502, 503 or 504.
    #[error("server error {status}")]
    ServerError { status: u16 },

    /// Any other non-200 status. Never retried.
    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },

    /// A failure outside the network layer (e.g. an undecodable 200 body).
    /// Aborts the retry loop.
    #[error("unexpected error: {0}")]
    Unexpected(String),

    /// Every attempt hit a transient failure.
    #[error("request failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl TransportError {
    /// Whether the retry loop may try again after this failure.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout { .. }
                | TransportError::Connection(_)
                | TransportError::ServerError { .. }
        )
    }
}
