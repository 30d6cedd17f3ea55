//! Talking to the vision-model backend.
//!
//! ```text
//! InferenceClient ──▶ InferenceBackend (trait) ──▶ HttpBackend (reqwest)
//!   │  route / fallback / poll
//!   └──▶ synthetic (when the backend is down and policy allows)
//! ```
//!
//! - [`backend`]: the trait and its raw error type
//! - [`http`]: the reqwest implementation
//! - [`client`]: health cache, fallback policy, routing
//! - [`poll`]: deadline-bounded poll loop with an injectable clock
//! - [`runs`]: progress of backend-driven runs relayed by the client

pub mod backend;
pub mod client;
pub mod http;
pub mod poll;
pub mod runs;

pub use backend::{BackendError, InferenceBackend, PollResponse, VisionRequest};
pub use client::{InferenceClient, Route, SyntheticReason};
pub use http::HttpBackend;
pub use poll::{Clock, ManualClock, PollOutcome, PollStep, Poller, SystemClock};
pub use runs::{RunRegistry, RunStatus};
