//! Input validation: reject uploads that are obviously not PDFs.
//!
//! ## Why check magic bytes up front?
//!
//! pdfium would reject a non-PDF too, but only after the upload has been
//! handed to the blocking pool, and with an opaque error. Checking the
//! filename and the `%PDF` header first gives the client a precise 400 and
//! keeps junk out of the job store.

use crate::error::ExtractError;
use tracing::debug;

/// Validate an uploaded document before any job is created.
pub fn validate_upload(bytes: &[u8], filename: &str) -> Result<(), ExtractError> {
    if !filename.to_ascii_lowercase().ends_with(".pdf") {
        return Err(ExtractError::InvalidDocument {
            detail: format!("'{filename}' is not a PDF file"),
        });
    }

    if bytes.is_empty() {
        return Err(ExtractError::InvalidDocument {
            detail: "uploaded file is empty".into(),
        });
    }

    if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
        let magic = &bytes[..bytes.len().min(4)];
        return Err(ExtractError::InvalidDocument {
            detail: format!("missing %PDF header (found {:02x?})", magic),
        });
    }

    debug!("Accepted upload {} ({} bytes)", filename, bytes.len());
    Ok(())
}
