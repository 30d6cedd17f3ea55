//! Inference client: the policy layer in front of the backend.
//!
//! The backend is unreliable by nature: a GPU server that restarts, times
//! out under load or rejects an image. This client owns every decision about
//! what to do then:
//!
//! - **Route**: once per request, decide between the live backend and the
//!   synthetic generator (forced mode, or backend down with fallback allowed).
//! - **Fallback**: when a live call fails, substitute synthetic output if the
//!   [`FallbackPolicy`] allows it, otherwise surface the error.
//! - **Poll**: for backend-driven runs, poll a page under a deadline, treating
//!   "not ready" and transient failures as reasons to wait, not to give up.
//!
//! The last observed health is cached in an atomic (last write wins). It is
//! informational only; [`InferenceClient::route`] always probes afresh.
//!
//! Backend-driven runs started through the client are tracked in a
//! [`RunRegistry`] so their progress can be reported.

use super::backend::{BackendError, InferenceBackend, PollResponse, VisionRequest};
use super::poll::{Clock, PollOutcome, PollStep, Poller, SystemClock};
use super::runs::{RunRegistry, RunStatus};
use crate::config::{FallbackPolicy, PollConfig};
use crate::error::ExtractError;
use crate::output::{Extraction, ExtractionField, RemotePage, ResultSource, StartResult};
use crate::pipeline::postprocess::parse_fields;
use crate::synthetic;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const HEALTH_UNKNOWN: u8 = 0;
const HEALTH_UP: u8 = 1;
const HEALTH_DOWN: u8 = 2;

/// Why a request is served synthetically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticReason {
    /// `force_synthetic` is set.
    Forced,
    /// The health probe failed and fallback is allowed.
    Unavailable,
}

/// Where a request's inference will come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Live,
    Synthetic(SyntheticReason),
}

/// Policy-aware front for an [`InferenceBackend`].
pub struct InferenceClient {
    backend: Arc<dyn InferenceBackend>,
    policy: FallbackPolicy,
    poller: Poller,
    health: AtomicU8,
    runs: RunRegistry,
}

impl std::fmt::Debug for InferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceClient")
            .field("endpoint", &self.backend.endpoint())
            .field("policy", &self.policy)
            .field("poll", &self.poller.config())
            .field("health", &self.last_known_health())
            .finish()
    }
}

impl InferenceClient {
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        policy: FallbackPolicy,
        poll: PollConfig,
    ) -> Self {
        Self::with_clock(backend, policy, poll, Arc::new(SystemClock))
    }

    pub fn with_clock(
        backend: Arc<dyn InferenceBackend>,
        policy: FallbackPolicy,
        poll: PollConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            policy,
            poller: Poller::new(poll, clock),
            health: AtomicU8::new(HEALTH_UNKNOWN),
            runs: RunRegistry::default(),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.backend.endpoint()
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    // ── Health ───────────────────────────────────────────────────────────

    /// Probe the backend. Never errors; logs availability transitions.
    pub async fn check_health(&self) -> bool {
        let healthy = match self.backend.health().await {
            Ok(()) => true,
            Err(e) => {
                debug!("health probe of {} failed: {}", self.endpoint(), e);
                false
            }
        };
        self.record_health(healthy);
        healthy
    }

    /// The most recent probe result, `None` before the first probe.
    pub fn last_known_health(&self) -> Option<bool> {
        match self.health.load(Ordering::Relaxed) {
            HEALTH_UP => Some(true),
            HEALTH_DOWN => Some(false),
            _ => None,
        }
    }

    fn record_health(&self, healthy: bool) {
        let next = if healthy { HEALTH_UP } else { HEALTH_DOWN };
        let previous = self.health.swap(next, Ordering::Relaxed);
        if previous == next {
            return;
        }
        match (previous, healthy) {
            (HEALTH_UNKNOWN, true) => info!("Inference backend available at {}", self.endpoint()),
            (_, true) => info!("Inference backend at {} recovered", self.endpoint()),
            (_, false) => warn!("Inference backend at {} is unavailable", self.endpoint()),
        }
    }

    // ── Routing ──────────────────────────────────────────────────────────

    /// Decide once for a request whether to call the backend.
    ///
    /// Fails with `BackendRequired` when the backend is down and the policy
    /// forbids synthetic output.
    pub async fn route(&self) -> Result<Route, ExtractError> {
        if self.policy.force_synthetic {
            debug!("synthetic output forced; backend not contacted");
            return Ok(Route::Synthetic(SyntheticReason::Forced));
        }
        if self.check_health().await {
            return Ok(Route::Live);
        }
        if self.policy.allow_synthetic {
            info!("Using synthetic data: inference backend unavailable");
            Ok(Route::Synthetic(SyntheticReason::Unavailable))
        } else {
            Err(self.backend_required())
        }
    }

    fn backend_required(&self) -> ExtractError {
        let msg = if self.policy.production {
            "Inference backend required in production but unavailable"
        } else {
            "Inference backend unavailable and synthetic fallback disabled"
        };
        error!("{}", msg);
        ExtractError::BackendRequired(msg.to_string())
    }

    /// Substitute synthetic output for a failed live call, if allowed.
    fn fallback_or_fail<T>(
        &self,
        err: ExtractError,
        what: &str,
        synthetic: impl FnOnce() -> T,
    ) -> Result<T, ExtractError> {
        if self.policy.allow_synthetic {
            warn!("{} failed ({}); falling back to synthetic data", what, err);
            Ok(synthetic())
        } else {
            Err(err)
        }
    }

    fn note_failure(&self, err: &BackendError) {
        if err.is_unreachable() {
            self.record_health(false);
        }
    }

    // ── Per-page inference ───────────────────────────────────────────────

    /// Run one live extraction for `page_number`.
    ///
    /// Callers route first; this method always contacts the backend and only
    /// falls back on failure.
    pub async fn infer(
        &self,
        request: &VisionRequest,
        fields: &[ExtractionField],
        page_number: u32,
    ) -> Result<Extraction, ExtractError> {
        match self.backend.chat(request).await {
            Ok(content) => Ok(Extraction {
                data: parse_fields(&content, fields),
                source: ResultSource::Live,
            }),
            Err(e) => {
                self.note_failure(&e);
                self.fallback_or_fail(
                    e.into(),
                    &format!("Inference for page {page_number}"),
                    || synthetic::extraction(fields, page_number),
                )
            }
        }
    }

    // ── Backend-driven runs ──────────────────────────────────────────────

    /// Hand a whole document to the backend's own pipeline.
    pub async fn start_extraction(
        &self,
        pdf: Arc<[u8]>,
        filename: &str,
    ) -> Result<StartResult, ExtractError> {
        let start = self.start_run(pdf, filename).await?;
        self.runs.started(&start);
        Ok(start)
    }

    async fn start_run(&self, pdf: Arc<[u8]>, filename: &str) -> Result<StartResult, ExtractError> {
        info!("Starting backend-driven extraction for {}", filename);
        if let Route::Synthetic(_) = self.route().await? {
            return Ok(synthetic::start_response(filename));
        }

        match self.backend.start_sequential(pdf, filename).await {
            Ok(start) => {
                info!("Backend extraction started: {}", start.processing_id);
                Ok(start)
            }
            Err(e) => {
                self.note_failure(&e);
                self.fallback_or_fail(e.into(), "Backend start", || {
                    synthetic::start_response(filename)
                })
            }
        }
    }

    /// Fetch one page of a backend-driven run, polling until it is ready.
    ///
    /// Synthetic processing ids never reach the backend.
    pub async fn get_page_result(
        &self,
        processing_id: &str,
        page_number: u32,
    ) -> Result<RemotePage, ExtractError> {
        let page = self.fetch_page(processing_id, page_number).await?;
        self.runs.page_served(&page);
        Ok(page)
    }

    /// Progress of a run started through [`Self::start_extraction`].
    ///
    /// # Errors
    /// `NotFound` for a run this client did not start, or one forgotten.
    pub fn run_status(&self, processing_id: &str) -> Result<RunStatus, ExtractError> {
        self.runs
            .status(processing_id)
            .ok_or_else(|| ExtractError::NotFound {
                job_id: processing_id.to_string(),
            })
    }

    /// Stop tracking a run. Returns whether it was tracked.
    pub fn forget_run(&self, processing_id: &str) -> bool {
        self.runs.forget(processing_id)
    }

    async fn fetch_page(
        &self,
        processing_id: &str,
        page_number: u32,
    ) -> Result<RemotePage, ExtractError> {
        if synthetic::is_synthetic_id(processing_id) {
            debug!("synthetic id {}; serving page {} locally", processing_id, page_number);
            return Ok(synthetic::page_response(processing_id, page_number));
        }
        if let Route::Synthetic(_) = self.route().await? {
            return Ok(synthetic::page_response(processing_id, page_number));
        }

        let outcome = self
            .poller
            .run(|attempt| {
                let backend = Arc::clone(&self.backend);
                let id = processing_id.to_string();
                async move {
                    match backend.poll_page(&id, page_number).await {
                        Ok(PollResponse::Ready(page)) => PollStep::Ready(page),
                        Ok(PollResponse::NotReady) => PollStep::NotReady,
                        Err(e) if e.is_unreachable() => {
                            warn!("Page {} poll attempt {} failed: {}", page_number, attempt, e);
                            PollStep::Transient(e.to_string())
                        }
                        Err(e) => PollStep::Rejected(e.into()),
                    }
                }
            })
            .await;

        match outcome {
            PollOutcome::Ready { mut value, attempts } => {
                info!("Page {} result received (attempt {})", page_number, attempts);
                value.attempts = attempts;
                Ok(value)
            }
            PollOutcome::Rejected { error, .. } => {
                self.fallback_or_fail(error, &format!("Polling page {page_number}"), || {
                    synthetic::page_response(processing_id, page_number)
                })
            }
            PollOutcome::DeadlineExceeded {
                attempts,
                last_error,
            } => {
                let deadline = self.poller.config().deadline;
                let reason = match last_error {
                    Some(e) => format!(
                        "page {page_number} not ready after {deadline:?} ({attempts} attempts, last error: {e})"
                    ),
                    None => format!(
                        "page {page_number} not ready after {deadline:?} ({attempts} attempts)"
                    ),
                };
                self.fallback_or_fail(
                    ExtractError::BackendUnavailable { reason },
                    &format!("Polling page {page_number}"),
                    || synthetic::page_response(processing_id, page_number),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::poll::ManualClock;
    use crate::output::InferenceOptions;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Mutex;
    use std::time::Duration;

    struct ScriptedBackend {
        healthy: AtomicBool,
        chat: Mutex<Result<String, BackendError>>,
        polls: Mutex<VecDeque<Result<PollResponse, BackendError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(healthy: bool) -> Self {
            Self {
                healthy: AtomicBool::new(healthy),
                chat: Mutex::new(Ok(r#"{"title":"Floor Plan"}"#.into())),
                polls: Mutex::new(VecDeque::new()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl InferenceBackend for ScriptedBackend {
        fn endpoint(&self) -> &str {
            "http://scripted"
        }

        async fn health(&self) -> Result<(), BackendError> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(BackendError::Transport("connection refused".into()))
            }
        }

        async fn chat(&self, _request: &VisionRequest) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.chat.lock().unwrap().clone()
        }

        async fn start_sequential(
            &self,
            _pdf: Arc<[u8]>,
            _filename: &str,
        ) -> Result<StartResult, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BackendError::Status {
                status: 500,
                body: "boom".into(),
            })
        }

        async fn poll_page(
            &self,
            processing_id: &str,
            page_number: u32,
        ) -> Result<PollResponse, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.polls.lock().unwrap().pop_front().unwrap_or_else(|| {
                Ok(PollResponse::Ready(RemotePage {
                    processing_id: processing_id.into(),
                    page_number,
                    status: "completed".into(),
                    result: serde_json::json!({"ok": true}),
                    processing_time: 1.0,
                    message: None,
                    source: ResultSource::Live,
                    attempts: 0,
                }))
            })
        }
    }

    fn client(backend: Arc<ScriptedBackend>, policy: FallbackPolicy) -> InferenceClient {
        InferenceClient::with_clock(
            backend,
            policy,
            PollConfig {
                interval: Duration::from_secs(2),
                deadline: Duration::from_secs(10),
            },
            Arc::new(ManualClock::new()),
        )
    }

    fn request() -> VisionRequest {
        VisionRequest {
            prompt: "p".into(),
            image_data_url: "data:image/png;base64,".into(),
            options: InferenceOptions::default(),
        }
    }

    fn title() -> Vec<ExtractionField> {
        vec![ExtractionField::new("title", "t")]
    }

    #[tokio::test]
    async fn forced_mode_never_probes() {
        let backend = Arc::new(ScriptedBackend::new(true));
        let c = client(backend.clone(), FallbackPolicy::forced());
        assert_eq!(
            c.route().await.unwrap(),
            Route::Synthetic(SyntheticReason::Forced)
        );
        assert_eq!(c.last_known_health(), None);
    }

    #[tokio::test]
    async fn route_follows_health_and_policy() {
        let backend = Arc::new(ScriptedBackend::new(false));
        let permissive = client(backend.clone(), FallbackPolicy::permissive());
        assert_eq!(
            permissive.route().await.unwrap(),
            Route::Synthetic(SyntheticReason::Unavailable)
        );
        assert_eq!(permissive.last_known_health(), Some(false));

        let strict = client(backend.clone(), FallbackPolicy::strict());
        assert!(matches!(
            strict.route().await,
            Err(ExtractError::BackendRequired(_))
        ));

        backend.healthy.store(true, Ordering::SeqCst);
        assert_eq!(strict.route().await.unwrap(), Route::Live);
        assert_eq!(strict.last_known_health(), Some(true));
    }

    #[tokio::test]
    async fn production_message_mentions_production() {
        let backend = Arc::new(ScriptedBackend::new(false));
        let policy = FallbackPolicy {
            production: true,
            ..FallbackPolicy::strict()
        };
        let err = client(backend, policy).route().await.unwrap_err();
        assert!(err.to_string().contains("production"), "got {err}");
    }

    #[tokio::test]
    async fn infer_parses_live_content() {
        let backend = Arc::new(ScriptedBackend::new(true));
        let c = client(backend, FallbackPolicy::strict());
        let extraction = c.infer(&request(), &title(), 1).await.unwrap();
        assert_eq!(extraction.source, ResultSource::Live);
        assert_eq!(extraction.data["title"], "Floor Plan");
    }

    #[tokio::test]
    async fn infer_failure_falls_back_only_when_allowed() {
        let backend = Arc::new(ScriptedBackend::new(true));
        *backend.chat.lock().unwrap() = Err(BackendError::Timeout("30s".into()));

        let permissive = client(backend.clone(), FallbackPolicy::permissive());
        let extraction = permissive.infer(&request(), &title(), 2).await.unwrap();
        assert_eq!(extraction.source, ResultSource::Synthetic);
        assert_eq!(permissive.last_known_health(), Some(false));

        let strict = client(backend, FallbackPolicy::strict());
        assert!(matches!(
            strict.infer(&request(), &title(), 2).await,
            Err(ExtractError::BackendUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn synthetic_ids_short_circuit() {
        let backend = Arc::new(ScriptedBackend::new(true));
        let c = client(backend.clone(), FallbackPolicy::strict());
        let page = c.get_page_result("synthetic_0badf00d", 4).await.unwrap();
        assert_eq!(page.source, ResultSource::Synthetic);
        assert_eq!(page.page_number, 4);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn poll_waits_through_not_ready() {
        let backend = Arc::new(ScriptedBackend::new(true));
        backend.polls.lock().unwrap().extend([
            Ok(PollResponse::NotReady),
            Err(BackendError::Timeout("slow".into())),
        ]);
        let c = client(backend.clone(), FallbackPolicy::strict());
        let page = c.get_page_result("abc123", 2).await.unwrap();
        assert_eq!(page.attempts, 3);
        assert_eq!(page.source, ResultSource::Live);
    }

    #[tokio::test]
    async fn poll_rejection_is_definitive() {
        let backend = Arc::new(ScriptedBackend::new(true));
        backend.polls.lock().unwrap().push_back(Err(BackendError::Status {
            status: 422,
            body: "bad page".into(),
        }));

        let strict = client(backend.clone(), FallbackPolicy::strict());
        assert!(matches!(
            strict.get_page_result("abc123", 1).await,
            Err(ExtractError::BackendRejected { status: 422, .. })
        ));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn poll_deadline_falls_back_or_fails() {
        let backend = Arc::new(ScriptedBackend::new(true));
        backend
            .polls
            .lock()
            .unwrap()
            .extend((0..20).map(|_| Ok(PollResponse::NotReady)));

        let strict = client(backend.clone(), FallbackPolicy::strict());
        let err = strict.get_page_result("abc123", 1).await.unwrap_err();
        assert!(matches!(err, ExtractError::BackendUnavailable { .. }));
        assert!(err.to_string().contains("5 attempts"), "got {err}");

        let permissive = client(backend, FallbackPolicy::permissive());
        let page = permissive.get_page_result("abc123", 1).await.unwrap();
        assert_eq!(page.source, ResultSource::Synthetic);
    }

    #[tokio::test]
    async fn start_failure_falls_back_to_synthetic_id() {
        let backend = Arc::new(ScriptedBackend::new(true));
        let c = client(backend, FallbackPolicy::permissive());
        let start = c.start_extraction(Arc::from(&b"%PDF"[..]), "a.pdf").await.unwrap();
        assert!(synthetic::is_synthetic_id(&start.processing_id));
    }

    #[tokio::test]
    async fn started_runs_report_served_pages() {
        let backend = Arc::new(ScriptedBackend::new(true));
        let c = client(backend, FallbackPolicy::forced());
        let start = c.start_extraction(Arc::from(&b"%PDF"[..]), "a.pdf").await.unwrap();
        let id = start.processing_id.as_str();

        let status = c.run_status(id).unwrap();
        assert_eq!(status.completed_pages, 0);
        assert_eq!(status.total_pages, start.estimated_pages);
        assert_eq!(status.source, ResultSource::Synthetic);

        c.get_page_result(id, 1).await.unwrap();
        assert_eq!(c.run_status(id).unwrap().completed_pages, 1);

        assert!(c.forget_run(id));
        assert!(matches!(
            c.run_status(id),
            Err(ExtractError::NotFound { .. })
        ));
    }
}
