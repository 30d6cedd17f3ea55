use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::server::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub backend_status: &'static str,
    pub backend_endpoint: String,
}

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
    pub version: &'static str,
    pub backend_endpoint: String,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let client = state.orchestrator.client();
    let backend_status = if client.check_health().await {
        "ok"
    } else {
        "unavailable"
    };
    Json(HealthResponse {
        status: "ok",
        backend_status,
        backend_endpoint: client.endpoint().to_string(),
    })
}

pub async fn root_handler(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        message: "Document extraction service",
        version: env!("CARGO_PKG_VERSION"),
        backend_endpoint: state.orchestrator.client().endpoint().to_string(),
    })
}
