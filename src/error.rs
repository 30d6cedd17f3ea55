//! Error types for the edgequake-extract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ExtractError`]: **Fatal** for the operation that returned it: the
//!   upload is not a PDF, the job id is unknown, the backend is required but
//!   down, the configuration is unsafe. Returned as `Err(ExtractError)`.
//!
//! * [`PageError`]: **Non-fatal**: a single page failed (render glitch,
//!   rejected inference call) but the job keeps going. Stored inside
//!   [`crate::output::PageResult`] so a job aggregates page failures rather
//!   than losing the whole document to one bad page.

use thiserror::Error;

/// All fatal errors returned by the edgequake-extract library.
///
/// Page-level failures use [`PageError`] and are stored in
/// [`crate::output::PageResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The upload is not a parseable PDF.
    #[error("Invalid document: {detail}")]
    InvalidDocument { detail: String },

    /// The extraction request (field list, options) is malformed.
    #[error("Invalid extraction request: {0}")]
    InvalidRequest(String),

    /// No job exists with this identifier (never created or cleaned up).
    #[error("Processing job not found: {job_id}")]
    NotFound { job_id: String },

    /// No preview document is stored under this id.
    #[error("PDF not found: {pdf_id}. Please upload again")]
    DocumentNotFound { pdf_id: String },

    /// Requested page number is outside `1..=total`.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: u32, total: u32 },

    /// pdfium failed to rasterise a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: u32, detail: String },

    // ── Backend errors ────────────────────────────────────────────────────
    /// Connectivity failure or timeout talking to the inference backend.
    #[error("Inference backend unavailable: {reason}")]
    BackendUnavailable { reason: String },

    /// The backend answered, but with an application-level error.
    #[error("Inference backend rejected the request (HTTP {status}): {body}")]
    BackendRejected { status: u16, body: String },

    /// The backend is down and synthetic fallback is disabled by policy.
    #[error("{0}")]
    BackendRequired(String),

    // ── State errors ──────────────────────────────────────────────────────
    /// A job status change that would move the state machine backwards.
    #[error("Invalid job transition for {job_id}: {from} → {to}")]
    InvalidTransition {
        job_id: String,
        from: &'static str,
        to: &'static str,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Unsafe or inconsistent configuration, detected at startup.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (task join failure, poisoned lock).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// `true` for failures the synthetic fallback is allowed to absorb.
    pub fn is_backend_failure(&self) -> bool {
        matches!(
            self,
            ExtractError::BackendUnavailable { .. } | ExtractError::BackendRejected { .. }
        )
    }
}

/// A non-fatal error for a single page.
///
/// Stored on [`crate::output::PageResult`] when a page fails. The job
/// continues with its remaining pages.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: u32, detail: String },

    /// PNG encoding of the rendered page failed.
    #[error("Page {page}: image encoding failed: {detail}")]
    EncodeFailed { page: u32, detail: String },

    /// The inference call failed and fallback was not allowed.
    #[error("Page {page}: inference failed: {detail}")]
    InferenceFailed { page: u32, detail: String },

    /// The backend was required but unavailable.
    #[error("Page {page}: {detail}")]
    BackendRequired { page: u32, detail: String },
}

impl PageError {
    /// Wrap a fatal error raised while processing `page` into a page error.
    pub fn from_extract(page: u32, err: &ExtractError) -> Self {
        match err {
            ExtractError::RasterisationFailed { detail, .. } => PageError::RenderFailed {
                page,
                detail: detail.clone(),
            },
            ExtractError::InvalidDocument { detail } => PageError::RenderFailed {
                page,
                detail: detail.clone(),
            },
            ExtractError::BackendRequired(detail) => PageError::BackendRequired {
                page,
                detail: detail.clone(),
            },
            other => PageError::InferenceFailed {
                page,
                detail: other.to_string(),
            },
        }
    }
}
