//! Configuration types for the extraction service.
//!
//! All service behaviour is controlled through [`ServiceConfig`], built via
//! its [`ServiceConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share the config across tasks and to log it once at startup.
//!
//! The fallback knobs deserve a note. Synthetic placeholder output is a
//! development convenience; in production it would silently hand invented
//! data to clients. [`ServiceConfig::validate`] therefore refuses to start a
//! production deployment with synthetic fallback allowed or forced.

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default number of pages processed concurrently in one batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Upper bound on the batch size, to cap simultaneous backend load.
pub const MAX_BATCH_SIZE: usize = 32;

/// Configuration for the extraction service.
///
/// # Example
/// ```rust
/// use edgequake_extract::{Environment, ServiceConfig};
///
/// let config = ServiceConfig::builder()
///     .backend_url("http://localhost:8000")
///     .environment(Environment::Development)
///     .batch_size(5)
///     .build()
///     .unwrap();
/// assert!(config.fallback_policy().allow_synthetic);
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Base URL of the OpenAI-compatible vision backend. Default: `http://localhost:8000`.
    pub backend_url: String,

    /// Model name sent in the chat-completion body. Default: `vision-model`.
    pub model: String,

    /// Per-request timeout for inference calls. Default: 30 s.
    pub request_timeout: Duration,

    /// Timeout for the `/health` probe. Default: 5 s.
    ///
    /// Kept short and separate from `request_timeout`: a probe that takes
    /// longer than a few seconds is as good as a failed probe.
    pub health_timeout: Duration,

    /// Delay between polls of a backend-driven page. Default: 2 s.
    pub poll_interval: Duration,

    /// Overall ceiling for polling one page. Default: 300 s.
    pub poll_deadline: Duration,

    /// Allow synthetic output when the backend is unavailable or fails.
    ///
    /// `None` means "derive from environment": allowed everywhere except
    /// production.
    pub allow_synthetic: Option<bool>,

    /// Always use synthetic output; never call the backend. Default: false.
    pub force_synthetic: bool,

    /// Deployment environment tag. Default: development.
    pub environment: Environment,

    /// Page scheduling strategy for background jobs. Default: batched, 5 pages.
    pub schedule: Schedule,

    /// Rendering DPI used when rasterising each page. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Maximum rendered image dimension in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Maximum concurrent rasterisations on the blocking pool. Default: CPU count.
    pub render_concurrency: usize,

    /// Maximum accepted upload size in megabytes. Default: 50.
    pub max_file_size_mb: usize,

    /// Default sampling temperature when the request omits one. Default: 0.1.
    pub temperature: f32,

    /// Default completion token budget when the request omits one. Default: 4000.
    pub max_tokens: u32,

    /// Explicit directory containing the pdfium shared library.
    /// If None, the system library search path is used.
    pub pdfium_lib_path: Option<PathBuf>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8000".to_string(),
            model: "vision-model".to_string(),
            request_timeout: Duration::from_secs(30),
            health_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(2),
            poll_deadline: Duration::from_secs(300),
            allow_synthetic: None,
            force_synthetic: false,
            environment: Environment::default(),
            schedule: Schedule::default(),
            dpi: 150,
            max_rendered_pixels: 2000,
            render_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
            max_file_size_mb: 50,
            temperature: 0.1,
            max_tokens: 4000,
            pdfium_lib_path: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("backend_url", &self.backend_url)
            .field("model", &self.model)
            .field("request_timeout", &self.request_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("poll_deadline", &self.poll_deadline)
            .field("environment", &self.environment)
            .field("fallback", &self.fallback_policy())
            .field("schedule", &self.schedule)
            .field("dpi", &self.dpi)
            .field("render_concurrency", &self.render_concurrency)
            .field("max_file_size_mb", &self.max_file_size_mb)
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Resolve the effective fallback policy.
    pub fn fallback_policy(&self) -> FallbackPolicy {
        let production = self.environment.is_production();
        FallbackPolicy {
            allow_synthetic: self.allow_synthetic.unwrap_or(!production),
            force_synthetic: self.force_synthetic,
            production,
        }
    }

    /// Poll-loop settings derived from this config.
    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: self.poll_interval,
            deadline: self.poll_deadline,
        }
    }

    /// Maximum upload size in bytes.
    pub fn max_upload_bytes(&self) -> usize {
        self.max_file_size_mb.saturating_mul(1024 * 1024)
    }

    /// Reject unsafe policy combinations. Called once at startup.
    pub fn validate(&self) -> Result<(), ExtractError> {
        let policy = self.fallback_policy();
        if policy.production && policy.allow_synthetic {
            return Err(ExtractError::Configuration(
                "synthetic fallback is allowed in production; set EXTRACT_ALLOW_SYNTHETIC=false \
                 or use a non-production environment"
                    .into(),
            ));
        }
        if policy.production && policy.force_synthetic {
            return Err(ExtractError::Configuration(
                "synthetic output is forced in production; unset EXTRACT_FORCE_SYNTHETIC".into(),
            ));
        }
        if self.backend_url.trim().is_empty() {
            return Err(ExtractError::Configuration(
                "backend URL must not be empty".into(),
            ));
        }
        if self.poll_interval.is_zero() || self.poll_deadline < self.poll_interval {
            return Err(ExtractError::Configuration(format!(
                "poll interval ({:?}) must be non-zero and not exceed the deadline ({:?})",
                self.poll_interval, self.poll_deadline
            )));
        }
        Ok(())
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn backend_url(mut self, url: impl Into<String>) -> Self {
        self.config.backend_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn health_timeout(mut self, timeout: Duration) -> Self {
        self.config.health_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn poll_deadline(mut self, deadline: Duration) -> Self {
        self.config.poll_deadline = deadline;
        self
    }

    pub fn allow_synthetic(mut self, allow: bool) -> Self {
        self.config.allow_synthetic = Some(allow);
        self
    }

    pub fn force_synthetic(mut self, force: bool) -> Self {
        self.config.force_synthetic = force;
        self
    }

    pub fn environment(mut self, env: Environment) -> Self {
        self.config.environment = env;
        self
    }

    pub fn schedule(mut self, schedule: Schedule) -> Self {
        self.config.schedule = schedule.normalised();
        self
    }

    /// Shorthand for `schedule(Schedule::Batched { batch_size })`.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.schedule = Schedule::Batched { batch_size }.normalised();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn render_concurrency(mut self, n: usize) -> Self {
        self.config.render_concurrency = n.max(1);
        self
    }

    pub fn max_file_size_mb(mut self, mb: usize) -> Self {
        self.config.max_file_size_mb = mb.max(1);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, ExtractError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Policy types ─────────────────────────────────────────────────────────

/// Effective synthetic-fallback policy, resolved from [`ServiceConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FallbackPolicy {
    /// Synthetic output may replace a failed or unavailable backend.
    pub allow_synthetic: bool,
    /// Synthetic output is always used; the backend is never contacted.
    pub force_synthetic: bool,
    /// The deployment is tagged production.
    pub production: bool,
}

impl FallbackPolicy {
    /// Development default: fallback allowed, not forced.
    pub fn permissive() -> Self {
        Self {
            allow_synthetic: true,
            force_synthetic: false,
            production: false,
        }
    }

    /// Backend required: fallback neither allowed nor forced.
    pub fn strict() -> Self {
        Self {
            allow_synthetic: false,
            force_synthetic: false,
            production: false,
        }
    }

    /// Always synthetic.
    pub fn forced() -> Self {
        Self {
            allow_synthetic: true,
            force_synthetic: true,
            production: false,
        }
    }
}

/// Poll-loop timing for backend-driven page results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between attempts.
    pub interval: Duration,
    /// Overall ceiling, measured from the first attempt.
    pub deadline: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            deadline: Duration::from_secs(300),
        }
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl std::str::FromStr for Environment {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(ExtractError::Configuration(format!(
                "invalid environment '{other}': expected development, test or production"
            ))),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a job's pages are scheduled against the backend.
///
/// Sequential mode is the simplest and gentlest on the backend; batched mode
/// processes up to `batch_size` pages at once and waits for the whole batch
/// before starting the next, so backend load never exceeds `batch_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Schedule {
    Sequential,
    Batched { batch_size: usize },
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule::Batched {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl Schedule {
    /// Clamp the batch size into `1..=MAX_BATCH_SIZE`.
    pub fn normalised(self) -> Self {
        match self {
            Schedule::Sequential => Schedule::Sequential,
            Schedule::Batched { batch_size } => Schedule::Batched {
                batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
            },
        }
    }

    /// Number of pages processed concurrently.
    pub fn width(&self) -> usize {
        match self {
            Schedule::Sequential => 1,
            Schedule::Batched { batch_size } => (*batch_size).max(1),
        }
    }

    /// Split `1..=total_pages` into the batches this schedule runs.
    pub fn batches(&self, total_pages: u32) -> Vec<Vec<u32>> {
        let pages: Vec<u32> = (1..=total_pages).collect();
        pages.chunks(self.width()).map(|c| c.to_vec()).collect()
    }
}
