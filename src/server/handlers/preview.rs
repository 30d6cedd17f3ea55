//! Page previews: upload a PDF once, then fetch rendered pages by id.

use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Serialize;

use crate::preview::{DocumentInfo, PagePreview};
use crate::server::error::ApiError;
use crate::server::handlers::upload::read_file;
use crate::server::state::AppState;

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub message: &'static str,
    pub cleaned_pdf: bool,
    pub cleaned_results: bool,
}

#[tracing::instrument(skip(state, multipart))]
pub async fn info_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<DocumentInfo>, ApiError> {
    let file = read_file(&mut multipart).await?;
    let info = state.previews.register(file.bytes, &file.filename).await?;
    Ok(Json(info))
}

#[tracing::instrument(skip(state))]
pub async fn page_handler(
    State(state): State<AppState>,
    Path((pdf_id, page_number)): Path<(String, u32)>,
) -> Result<Json<PagePreview>, ApiError> {
    Ok(Json(state.previews.render(&pdf_id, page_number).await?))
}

/// Drops the stored document and any relayed run tracked under the same id.
#[tracing::instrument(skip(state))]
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(pdf_id): Path<String>,
) -> Json<CleanupResponse> {
    let cleaned_pdf = state.previews.remove(&pdf_id);
    let cleaned_results = state.orchestrator.client().forget_run(&pdf_id);
    let message = if cleaned_pdf || cleaned_results {
        "Cleanup completed"
    } else {
        "PDF not found"
    };
    Json(CleanupResponse {
        message,
        cleaned_pdf,
        cleaned_results,
    })
}
