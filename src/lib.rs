//! # edgequake-extract
//!
//! Extract structured fields from multi-page PDFs with a Vision Language
//! Model, as a job-orchestrating HTTP service.
//!
//! ## Why this crate?
//!
//! Forms, drawings and invoices carry their information in layout: a title
//! block, a stamp, a table cell. Text extraction loses that. Instead this
//! crate rasterises each page into a PNG and asks a vision model for exactly
//! the fields the client named, returning one JSON object per page.
//!
//! The hard part is not the model call but everything around it: the
//! backend is a GPU server that restarts, times out and rejects images.
//! The [`Orchestrator`] turns an upload into independently processed pages,
//! tracks partial progress, and keeps a client-visible state machine
//! consistent no matter how individual pages fail.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Validate  %PDF header, page count, field list, backend preflight
//!  ├─ 2. Job       stored as `initializing`, run in a supervised task
//!  ├─ 3. Render    rasterise each page via pdfium (spawn_blocking + semaphore)
//!  ├─ 4. Encode    PNG → base64 data URL
//!  ├─ 5. Infer     OpenAI-style chat completion, or synthetic fallback
//!  ├─ 6. Parse     model content → requested fields (null when missing)
//!  └─ 7. Record    insert-once page table; `completed` when every page is done
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use edgequake_extract::{
//!     ExtractionField, HttpBackend, InferenceClient, InferenceOptions, JobUpload,
//!     MemoryJobStore, Orchestrator, PdfiumRasterizer, ServiceConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder().backend_url("http://localhost:8000").build()?;
//!     let backend = Arc::new(HttpBackend::new(&config)?);
//!     let client = Arc::new(InferenceClient::new(
//!         backend,
//!         config.fallback_policy(),
//!         config.poll_config(),
//!     ));
//!     let orchestrator = Orchestrator::new(
//!         Arc::new(MemoryJobStore::new()),
//!         client,
//!         Arc::new(PdfiumRasterizer::new(&config)),
//!         config.schedule,
//!     );
//!
//!     let upload = JobUpload {
//!         bytes: std::fs::read("drawing.pdf")?.into(),
//!         filename: "drawing.pdf".into(),
//!         fields: vec![ExtractionField::new("drawing_number", "Sheet number in the title block")],
//!         options: InferenceOptions::default(),
//!     };
//!     let output = orchestrator.extract_sync(upload).await?;
//!     for page in output.results {
//!         println!("page {}: {:?}", page.page_number, page.extracted_data);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum HTTP surface and the `extract-server` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `server` when embedding only the orchestrator:
//! ```toml
//! edgequake-extract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod inference;
pub mod job;
pub mod orchestrator;
pub mod output;
pub mod pipeline;
pub mod preview;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;
pub mod store;
pub mod synthetic;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    Environment, FallbackPolicy, PollConfig, Schedule, ServiceConfig, ServiceConfigBuilder,
};
pub use error::{ExtractError, PageError};
pub use inference::{
    BackendError, HttpBackend, InferenceBackend, InferenceClient, PollResponse, Route,
    RunStatus, SyntheticReason, VisionRequest,
};
pub use job::{JobId, JobProgress, JobResults, JobStatus, JobUpload, SyncResults};
pub use orchestrator::Orchestrator;
pub use output::{
    ExtractionField, ExtractionRequest, InferenceOptions, PageResult, RemotePage, ResultSource,
    StartResult,
};
pub use pipeline::{PdfiumRasterizer, Rasterizer};
pub use preview::{DocumentInfo, PagePreview, PreviewStore};
pub use store::{JobStore, MemoryJobStore};
