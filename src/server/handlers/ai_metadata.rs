//! Backend-driven extraction: the backend runs its own multi-page pipeline
//! and this service relays the start call and polls for each page.

use axum::extract::{Multipart, Path, State};
use axum::Json;

use crate::inference::RunStatus;
use crate::output::{RemotePage, StartResult};
use crate::pipeline::input::validate_upload;
use crate::server::error::ApiError;
use crate::server::handlers::upload::read_file;
use crate::server::state::AppState;

#[tracing::instrument(skip(state, multipart))]
pub async fn start_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<StartResult>, ApiError> {
    let file = read_file(&mut multipart).await?;
    validate_upload(&file.bytes, &file.filename)?;
    let start = state
        .orchestrator
        .client()
        .start_extraction(file.bytes, &file.filename)
        .await?;
    Ok(Json(start))
}

#[tracing::instrument(skip(state))]
pub async fn page_handler(
    State(state): State<AppState>,
    Path((processing_id, page_number)): Path<(String, u32)>,
) -> Result<Json<RemotePage>, ApiError> {
    if page_number == 0 {
        return Err(ApiError::bad_request("Page numbers start at 1"));
    }
    let page = state
        .orchestrator
        .client()
        .get_page_result(&processing_id, page_number)
        .await?;
    Ok(Json(page))
}

#[tracing::instrument(skip(state))]
pub async fn status_handler(
    State(state): State<AppState>,
    Path(processing_id): Path<String>,
) -> Result<Json<RunStatus>, ApiError> {
    Ok(Json(state.orchestrator.client().run_status(&processing_id)?))
}
