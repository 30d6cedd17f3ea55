use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::Serialize;

use crate::job::{JobId, JobResults, JobStatus, SyncResults};
use crate::output::PageResult;
use crate::server::error::ApiError;
use crate::server::handlers::upload::read_extraction;
use crate::server::state::AppState;

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub processing_id: String,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub processing_id: String,
    pub status: JobStatus,
    pub total_pages: u32,
    pub completed_pages: u32,
    pub progress_percentage: f64,
}

/// Results view, tagged by job status.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ResultsResponse {
    Initializing {
        processing_id: String,
        message: &'static str,
    },
    Processing {
        processing_id: String,
        completed_pages: u32,
        total_pages: u32,
        partial_results: Vec<PageResult>,
    },
    Completed {
        processing_id: String,
        total_pages: u32,
        results: Vec<PageResult>,
    },
    Failed {
        processing_id: String,
        error: String,
        partial_results: Vec<PageResult>,
    },
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[tracing::instrument(skip(state, multipart))]
pub async fn start_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<StartResponse>, ApiError> {
    let upload = read_extraction(&mut multipart, &state.config).await?;
    let job_id = state.orchestrator.create_job(upload).await?;
    state.orchestrator.spawn(job_id.clone());

    Ok(Json(StartResponse {
        processing_id: job_id.to_string(),
        status: "started",
    }))
}

#[tracing::instrument(skip(state))]
pub async fn status_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let progress = state.orchestrator.status(&JobId::from(job_id))?;
    Ok(Json(StatusResponse {
        processing_id: progress.job_id.to_string(),
        status: progress.status,
        total_pages: progress.total_pages,
        completed_pages: progress.completed_pages,
        progress_percentage: (progress.progress() * 10_000.0).round() / 100.0,
    }))
}

#[tracing::instrument(skip(state))]
pub async fn results_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<ResultsResponse>, ApiError> {
    let id = JobId::from(job_id);
    let processing_id = id.to_string();
    let response = match state.orchestrator.results(&id)? {
        JobResults::Initializing => ResultsResponse::Initializing {
            processing_id,
            message: "Processing has not started yet",
        },
        JobResults::Processing { partial } => {
            let progress = state.orchestrator.status(&id)?;
            ResultsResponse::Processing {
                processing_id,
                completed_pages: progress.completed_pages,
                total_pages: progress.total_pages,
                partial_results: partial,
            }
        }
        JobResults::Completed {
            total_pages,
            results,
        } => ResultsResponse::Completed {
            processing_id,
            total_pages,
            results,
        },
        JobResults::Failed { error, partial } => ResultsResponse::Failed {
            processing_id,
            error,
            partial_results: partial,
        },
    };
    Ok(Json(response))
}

#[tracing::instrument(skip(state))]
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Json<MessageResponse> {
    let removed = state.orchestrator.cleanup(&JobId::from(job_id.as_str()));
    let message = if removed {
        format!("Processing job {job_id} cleaned up")
    } else {
        format!("Processing job {job_id} not found; nothing to clean up")
    };
    Json(MessageResponse { message })
}

#[tracing::instrument(skip(state, multipart))]
pub async fn sync_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SyncResults>, ApiError> {
    let upload = read_extraction(&mut multipart, &state.config).await?;
    Ok(Json(state.orchestrator.extract_sync(upload).await?))
}

#[tracing::instrument(skip(state))]
pub async fn page_handler(
    State(state): State<AppState>,
    Path((job_id, page_number)): Path<(String, u32)>,
) -> Result<Json<PageResult>, ApiError> {
    let result = state
        .orchestrator
        .page(&JobId::from(job_id), page_number)
        .await?;
    Ok(Json(result))
}
