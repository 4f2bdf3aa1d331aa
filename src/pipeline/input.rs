//! Input validation: the document must be a readable local file whose first
//! bytes are the PDF magic `%PDF`.
//!
//! Checking up front turns a non-PDF into [`ClassifyError::NotAPdf`] instead
//! of an opaque pdfium load failure.

use crate::error::ClassifyError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate `path` and return it as an owned path.
pub fn validate_pdf_path(path: &Path) -> Result<PathBuf, ClassifyError> {
    let path = path.to_path_buf();

    if !path.is_file() {
        return Err(ClassifyError::FileNotFound { path });
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ClassifyError::PermissionDenied { path });
        }
        Err(_) => return Err(ClassifyError::FileNotFound { path }),
    };

    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
        return Err(ClassifyError::NotAPdf { path, magic });
    }

    debug!("Validated input PDF: {}", path.display());
    Ok(path)
}
