use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::server::handlers::{
    ai_metadata, delete_handler, health_handler, page_handler, preview, results_handler,
    root_handler, start_handler, status_handler, sync_handler,
};
use crate::server::state::AppState;

/// Multipart framing on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let body_limit = state
        .config
        .max_upload_bytes()
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/extract/start", post(start_handler))
        .route("/extract/sync", post(sync_handler))
        .route("/extract/status/{job_id}", get(status_handler))
        .route("/extract/results/{job_id}", get(results_handler))
        .route("/extract/page/{job_id}/{page}", get(page_handler))
        .route("/extract/{job_id}", delete(delete_handler))
        .route("/ai_metadata/start", post(ai_metadata::start_handler))
        .route(
            "/ai_metadata/{processing_id}/status",
            get(ai_metadata::status_handler),
        )
        .route(
            "/ai_metadata/{processing_id}/{page}",
            get(ai_metadata::page_handler),
        )
        .route("/pdf_info", post(preview::info_handler))
        .route("/pdf_page/{pdf_id}/{page}", get(preview::page_handler))
        .route("/pdf/{pdf_id}", delete(preview::delete_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(trace_layer)
        .layer(cors)
        .with_state(state)
}
