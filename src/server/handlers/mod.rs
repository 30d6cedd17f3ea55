pub mod ai_metadata;
mod extract;
mod health;
pub mod preview;
mod upload;

pub use extract::{
    delete_handler, page_handler, results_handler, start_handler, status_handler, sync_handler,
    MessageResponse, ResultsResponse, StartResponse, StatusResponse,
};
pub use health::{health_handler, root_handler, HealthResponse, RootResponse};
