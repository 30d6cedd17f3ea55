//! HTTP surface (axum).
//!
//! Handlers parse the request, call the [`Orchestrator`], the inference
//! client or the preview store, and map [`ExtractError`]s to statuses in
//! [`error::ApiError`]. No job logic lives here.
//!
//! [`Orchestrator`]: crate::orchestrator::Orchestrator
//! [`ExtractError`]: crate::error::ExtractError

pub mod error;
pub mod handlers;
mod router;
mod state;

pub use error::{ApiError, ErrorResponse};
pub use router::create_router;
pub use state::AppState;
