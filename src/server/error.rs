use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::ExtractError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Error returned by every handler; renders as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    Extract(ExtractError),
    /// The multipart body could not be read (malformed, or over the limit).
    Upload { status: StatusCode, message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::Upload {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Extract(e) => status_for(e),
            ApiError::Upload { status, .. } => *status,
        }
    }
}

/// HTTP status for a library error.
pub fn status_for(err: &ExtractError) -> StatusCode {
    match err {
        ExtractError::InvalidDocument { .. }
        | ExtractError::InvalidRequest(_)
        | ExtractError::PageOutOfRange { .. } => StatusCode::BAD_REQUEST,
        ExtractError::NotFound { .. } | ExtractError::DocumentNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        ExtractError::BackendRequired(_) | ExtractError::BackendUnavailable { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ExtractError::BackendRejected { .. } => StatusCode::BAD_GATEWAY,
        ExtractError::RasterisationFailed { .. }
        | ExtractError::InvalidTransition { .. }
        | ExtractError::Configuration(_)
        | ExtractError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ExtractError> for ApiError {
    fn from(err: ExtractError) -> Self {
        ApiError::Extract(err)
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        ApiError::Upload {
            status: err.status(),
            message: format!("Failed to read multipart: {}", err.body_text()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            ApiError::Extract(e) => e.to_string(),
            ApiError::Upload { message, .. } => message,
        };
        if status.is_server_error() {
            tracing::error!(status = %status, error = %error, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %error, "Request rejected");
        }
        (status, Json(ErrorResponse { error })).into_response()
    }
}
