//! The inference backend seam.
//!
//! [`InferenceBackend`] is the narrow interface the client needs from a
//! vision-model server. It reports transport failures and HTTP statuses
//! as-is in [`BackendError`]; deciding what they *mean* (fall back, retry,
//! fail) is the client's job, not the backend's.

use crate::error::ExtractError;
use crate::output::{InferenceOptions, RemotePage, StartResult};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// One page's vision request.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub prompt: String,
    /// `data:image/png;base64,…`
    pub image_data_url: String,
    pub options: InferenceOptions,
}

/// Answer to a poll of a backend-driven page.
#[derive(Debug, Clone, PartialEq)]
pub enum PollResponse {
    Ready(RemotePage),
    /// The backend has not finished this page yet (HTTP 404).
    NotReady,
}

/// Raw failure talking to the backend.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection refused, DNS failure, reset mid-body.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend answered 2xx with a body we could not understand.
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl BackendError {
    /// Timeouts and transport failures: the backend could not be reached.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, BackendError::Timeout(_) | BackendError::Transport(_))
    }
}

impl From<BackendError> for ExtractError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Timeout(_) | BackendError::Transport(_) => {
                ExtractError::BackendUnavailable {
                    reason: err.to_string(),
                }
            }
            BackendError::Status { status, body } => ExtractError::BackendRejected { status, body },
            BackendError::Decode(detail) => ExtractError::BackendRejected {
                status: 200,
                body: detail,
            },
        }
    }
}

/// A vision-model server.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Base URL, for logs and the health endpoint.
    fn endpoint(&self) -> &str;

    /// Bounded-timeout liveness probe.
    async fn health(&self) -> Result<(), BackendError>;

    /// Run one vision chat completion and return the model's content.
    async fn chat(&self, request: &VisionRequest) -> Result<String, BackendError>;

    /// Hand a whole document to the backend's own multi-page pipeline.
    async fn start_sequential(
        &self,
        pdf: Arc<[u8]>,
        filename: &str,
    ) -> Result<StartResult, BackendError>;

    /// Ask for one page of a backend-driven run.
    async fn poll_page(
        &self,
        processing_id: &str,
        page_number: u32,
    ) -> Result<PollResponse, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_maps_to_unavailable() {
        let err: ExtractError = BackendError::Timeout("30s".into()).into();
        assert!(matches!(err, ExtractError::BackendUnavailable { .. }));
        assert!(BackendError::Transport("refused".into()).is_unreachable());
    }

    #[test]
    fn status_maps_to_rejected() {
        let err: ExtractError = BackendError::Status {
            status: 422,
            body: "bad image".into(),
        }
        .into();
        assert!(matches!(
            err,
            ExtractError::BackendRejected { status: 422, .. }
        ));
        assert!(!BackendError::Decode("x".into()).is_unreachable());
    }
}
