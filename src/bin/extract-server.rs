//! HTTP server binary for `edgequake-extract`.
//!
//! A thin shim over the library crate: parse flags and environment, build
//! the orchestrator, serve the axum router until Ctrl-C.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_extract::server::{create_router, AppState};
use edgequake_extract::{
    Environment, HttpBackend, InferenceClient, MemoryJobStore, Orchestrator, PdfiumRasterizer,
    Schedule, ServiceConfig,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Development: synthetic fallback when the backend is down
  extract-server --backend-url http://gpu-box:8000

  # Production: live results only, refuse jobs without a backend
  EXTRACT_ENVIRONMENT=production extract-server --backend-url http://vlm:8000

  # Demo mode: never touch the backend
  extract-server --force-synthetic

ENDPOINTS:
  POST   /extract/start              multipart: file + extraction_request
  POST   /extract/sync               same body, blocks until every page is done
  GET    /extract/status/{job_id}
  GET    /extract/results/{job_id}
  GET    /extract/page/{job_id}/{page}
  DELETE /extract/{job_id}
  POST   /ai_metadata/start          multipart: file
  GET    /ai_metadata/{id}/{page}
  GET    /health
"#;

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ScheduleArg {
    Sequential,
    Batched,
}

/// Extract structured fields from PDFs with a Vision LLM backend.
#[derive(Parser, Debug)]
#[command(
    name = "extract-server",
    version,
    about = "Document extraction job service backed by a Vision LLM",
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "EXTRACT_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(short, long, env = "EXTRACT_PORT", default_value_t = 8080)]
    port: u16,

    /// Base URL of the inference backend.
    #[arg(long, env = "EXTRACT_BACKEND_URL", default_value = "http://localhost:8000")]
    backend_url: String,

    /// Model name sent with chat-completion requests.
    #[arg(long, env = "EXTRACT_MODEL", default_value = "vision-model")]
    model: String,

    /// Deployment environment: development, test, production.
    #[arg(long, env = "EXTRACT_ENVIRONMENT", default_value = "development")]
    environment: Environment,

    /// Allow synthetic results when the backend is unavailable.
    /// Defaults to true outside production.
    #[arg(long, env = "EXTRACT_ALLOW_SYNTHETIC")]
    allow_synthetic: Option<bool>,

    /// Never contact the backend; always return synthetic results.
    #[arg(long, env = "EXTRACT_FORCE_SYNTHETIC")]
    force_synthetic: bool,

    /// Page scheduling mode.
    #[arg(long, env = "EXTRACT_SCHEDULE", value_enum, default_value = "batched")]
    schedule: ScheduleArg,

    /// Pages processed concurrently in batched mode (1–32).
    #[arg(long, env = "EXTRACT_BATCH_SIZE", default_value_t = 5)]
    batch_size: usize,

    /// Per-request backend timeout in seconds.
    #[arg(long, env = "EXTRACT_REQUEST_TIMEOUT", default_value_t = 30)]
    request_timeout: u64,

    /// Health-probe timeout in seconds.
    #[arg(long, env = "EXTRACT_HEALTH_TIMEOUT", default_value_t = 5)]
    health_timeout: u64,

    /// Seconds between page polls.
    #[arg(long, env = "EXTRACT_POLL_INTERVAL", default_value_t = 2)]
    poll_interval: u64,

    /// Seconds before a page poll gives up.
    #[arg(long, env = "EXTRACT_POLL_DEADLINE", default_value_t = 300)]
    poll_deadline: u64,

    /// Rendering DPI (72–400).
    #[arg(long, env = "EXTRACT_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Maximum upload size in megabytes.
    #[arg(long, env = "EXTRACT_MAX_FILE_SIZE_MB", default_value_t = 50)]
    max_file_size_mb: usize,

    /// Default model temperature when the request does not set one.
    #[arg(long, env = "EXTRACT_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Default max output tokens when the request does not set one.
    #[arg(long, env = "EXTRACT_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: u32,

    /// Directory or file of an existing libpdfium. Uses the system library if unset.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib_path: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "EXTRACT_LOG_JSON")]
    log_json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EXTRACT_VERBOSE")]
    verbose: bool,
}

impl Cli {
    fn schedule(&self) -> Schedule {
        match self.schedule {
            ScheduleArg::Sequential => Schedule::Sequential,
            ScheduleArg::Batched => Schedule::Batched {
                batch_size: self.batch_size,
            },
        }
    }

    fn service_config(&self) -> Result<ServiceConfig> {
        let mut builder = ServiceConfig::builder()
            .backend_url(&self.backend_url)
            .model(&self.model)
            .environment(self.environment)
            .force_synthetic(self.force_synthetic)
            .schedule(self.schedule())
            .request_timeout(Duration::from_secs(self.request_timeout))
            .health_timeout(Duration::from_secs(self.health_timeout))
            .poll_interval(Duration::from_secs(self.poll_interval))
            .poll_deadline(Duration::from_secs(self.poll_deadline))
            .dpi(self.dpi)
            .max_file_size_mb(self.max_file_size_mb)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens);
        if let Some(allow) = self.allow_synthetic {
            builder = builder.allow_synthetic(allow);
        }
        if let Some(path) = &self.pdfium_lib_path {
            builder = builder.pdfium_lib_path(path);
        }
        builder.build().context("Invalid service configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug,tower_http=debug"
    } else {
        "info,edgequake_extract=debug,tower_http=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(io::stderr)
            .init();
    }

    let config = cli.service_config()?;
    info!(?config, "Starting extraction service");

    // ── Pdfium ───────────────────────────────────────────────────────────
    let rasterizer = PdfiumRasterizer::new(&config);
    if let Err(e) = rasterizer.probe() {
        warn!(error = %e, "pdfium could not be loaded; uploads will fail until it is installed");
    }

    // ── Backend ──────────────────────────────────────────────────────────
    let backend = HttpBackend::new(&config).context("Failed to build backend client")?;
    let client = Arc::new(InferenceClient::new(
        Arc::new(backend),
        config.fallback_policy(),
        config.poll_config(),
    ));
    if client.check_health().await {
        info!(endpoint = client.endpoint(), "Inference backend reachable");
    } else {
        warn!(
            endpoint = client.endpoint(),
            fallback = ?config.fallback_policy(),
            "Inference backend unreachable at startup"
        );
    }

    let orchestrator = Orchestrator::new(
        Arc::new(MemoryJobStore::new()),
        client,
        Arc::new(rasterizer),
        config.schedule,
    );
    let state = AppState::new(orchestrator, config);
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", cli.host, cli.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
