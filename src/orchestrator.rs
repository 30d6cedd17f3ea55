//! The extraction job orchestrator.
//!
//! ## Lifecycle
//!
//! ```text
//! create_job ──▶ initializing ──spawn──▶ processing ──▶ completed
//!                     │                      │
//!                     └────────▶ failed ◀────┘
//! ```
//!
//! [`Orchestrator::create_job`] validates the upload, reads its page count
//! and runs the backend preflight *before* anything is stored, so a request
//! the service cannot serve never leaves a job behind. [`Orchestrator::spawn`] then runs the
//! job in a supervised background task: if the run errors or panics, the
//! supervisor marks the job `failed` instead of leaving it `processing`
//! forever.
//!
//! ## Single-flight per page
//!
//! Pages can be requested on demand ([`Orchestrator::page`]) while the
//! background run is also working through them. Each `(job, page)` pair
//! therefore has at most one computation in flight: concurrent callers await
//! the same shared future, and the result is recorded in the store exactly
//! once.

use crate::config::Schedule;
use crate::error::{ExtractError, PageError};
use crate::inference::InferenceClient;
use crate::job::{Job, JobId, JobProgress, JobResults, JobSource, JobStatus, JobUpload, SyncResults};
use crate::output::PageResult;
use crate::pipeline::{input, PageProcessor, Rasterizer};
use crate::store::JobStore;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type PageKey = (JobId, u32);
type PageFuture = Shared<BoxFuture<'static, PageResult>>;
type InFlight = HashMap<PageKey, PageFuture>;

/// Owns job state and drives page processing.
///
/// Cheap to clone; clones share the same store and in-flight table.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn JobStore>,
    processor: PageProcessor,
    schedule: Schedule,
    in_flight: Mutex<InFlight>,
}

impl Inner {
    fn in_flight(&self) -> MutexGuard<'_, InFlight> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a page's in-flight entry when its task ends, panics included.
struct InFlightEntry {
    inner: Arc<Inner>,
    key: PageKey,
}

impl Drop for InFlightEntry {
    fn drop(&mut self) {
        self.inner.in_flight().remove(&self.key);
    }
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        client: Arc<InferenceClient>,
        rasterizer: Arc<dyn Rasterizer>,
        schedule: Schedule,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                processor: PageProcessor::new(client, rasterizer),
                schedule: schedule.normalised(),
                in_flight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn client(&self) -> &Arc<InferenceClient> {
        self.inner.processor.client()
    }

    pub fn schedule(&self) -> Schedule {
        self.inner.schedule
    }

    fn store(&self) -> &dyn JobStore {
        self.inner.store.as_ref()
    }

    pub fn rasterizer(&self) -> &Arc<dyn Rasterizer> {
        self.inner.processor.rasterizer()
    }

    fn in_flight(&self) -> MutexGuard<'_, InFlight> {
        self.inner.in_flight()
    }

    // ── Job creation ─────────────────────────────────────────────────────

    /// Validate an upload and store it as an `initializing` job.
    ///
    /// # Errors
    /// - `InvalidDocument` for a non-PDF upload or one whose page count
    ///   cannot be read
    /// - `InvalidRequest` for an empty or malformed field list
    /// - `BackendRequired` when the backend is down and fallback is disabled
    pub async fn create_job(&self, upload: JobUpload) -> Result<JobId, ExtractError> {
        input::validate_upload(&upload.bytes, &upload.filename)?;
        if upload.fields.is_empty() {
            return Err(ExtractError::InvalidRequest(
                "at least one field is required".into(),
            ));
        }
        let total_pages = self.rasterizer().page_count(upload.bytes.clone()).await?;
        self.client().route().await?;

        let job = Job::new(upload).with_total_pages(total_pages);
        info!(
            job_id = %job.id,
            filename = %job.filename,
            pages = total_pages,
            fields = job.source.fields.len(),
            "Job created"
        );
        Ok(self.store().insert(job))
    }

    /// Run `job_id` in a supervised background task.
    ///
    /// The handle resolves to the job's final status. A run that errors or
    /// panics leaves the job `failed` with the reason recorded.
    pub fn spawn(&self, job_id: JobId) -> JoinHandle<JobStatus> {
        let runner = self.clone();
        let id = job_id.clone();
        let task = tokio::spawn(async move { runner.run_job(&id).await });

        let supervisor = self.clone();
        tokio::spawn(async move {
            match task.await {
                Ok(Ok(status)) => status,
                Ok(Err(ExtractError::NotFound { .. })) => {
                    info!(job_id = %job_id, "Job removed during processing");
                    JobStatus::Failed
                }
                Ok(Err(e)) => {
                    error!(job_id = %job_id, error = %e, "Job failed");
                    supervisor.mark_failed(&job_id, &e.to_string())
                }
                Err(join_err) => {
                    error!(job_id = %job_id, error = %join_err, "Job task panicked");
                    supervisor.mark_failed(&job_id, "Job task terminated unexpectedly")
                }
            }
        })
    }

    fn mark_failed(&self, job_id: &JobId, reason: &str) -> JobStatus {
        match self.store().fail(job_id, reason) {
            Ok(()) | Err(ExtractError::NotFound { .. }) => JobStatus::Failed,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Could not mark job failed");
                self.store()
                    .progress(job_id)
                    .map(|p| p.status)
                    .unwrap_or(JobStatus::Failed)
            }
        }
    }

    // ── Job execution ────────────────────────────────────────────────────

    /// Process every page of `job_id` and return its final status.
    ///
    /// Page failures are recorded on their pages and never abort the job.
    /// A job stored without a page count has it read here; if that fails the
    /// job ends `failed` with no results. A job removed mid-run stops with
    /// `NotFound`.
    pub async fn run_job(&self, job_id: &JobId) -> Result<JobStatus, ExtractError> {
        let start = Instant::now();
        let source = self.store().source(job_id)?;
        self.store().transition(job_id, JobStatus::Processing)?;

        let total = match self.total_pages(job_id, &source).await {
            Ok(total) => total,
            Err(e @ ExtractError::NotFound { .. }) => return Err(e),
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Could not read document");
                self.store().fail(job_id, &e.to_string())?;
                return Ok(JobStatus::Failed);
            }
        };
        info!(
            job_id = %job_id,
            pages = total,
            schedule = ?self.inner.schedule,
            "Processing job"
        );

        for batch in self.inner.schedule.batches(total) {
            if !self.store().contains(job_id) {
                return Err(ExtractError::NotFound {
                    job_id: job_id.to_string(),
                });
            }
            let results = join_all(
                batch
                    .iter()
                    .map(|&page| self.page_in_flight(job_id, page, &source)),
            )
            .await;
            for result in results {
                result?;
            }
            debug!(job_id = %job_id, pages = ?batch, "Batch finished");
        }

        self.store().transition(job_id, JobStatus::Completed)?;
        let progress = self.store().progress(job_id)?;
        info!(
            job_id = %job_id,
            pages = progress.completed_pages,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Job completed"
        );
        Ok(JobStatus::Completed)
    }

    /// The job's page count, reading the document when it is not yet known.
    async fn total_pages(&self, job_id: &JobId, source: &JobSource) -> Result<u32, ExtractError> {
        let known = self.store().progress(job_id)?.total_pages;
        if known != 0 {
            return Ok(known);
        }
        let total = self.rasterizer().page_count(source.bytes.clone()).await?;
        self.store().set_total_pages(job_id, total)?;
        Ok(total)
    }

    /// The stored result for a page, or a shared in-flight computation.
    async fn page_in_flight(
        &self,
        job_id: &JobId,
        page_number: u32,
        source: &JobSource,
    ) -> Result<PageResult, ExtractError> {
        if let Some(result) = self.store().page(job_id, page_number)? {
            return Ok(result);
        }

        let key = (job_id.clone(), page_number);
        let future = {
            let mut in_flight = self.in_flight();
            match in_flight.get(&key) {
                Some(existing) => existing.clone(),
                None => {
                    // Recorded results are stored before their entry is removed.
                    if let Some(result) = self.store().page(job_id, page_number)? {
                        return Ok(result);
                    }
                    let future = self.spawn_page(key.clone(), source.clone());
                    in_flight.insert(key, future.clone());
                    future
                }
            }
        };
        Ok(future.await)
    }

    /// Compute a page on its own task. The task records the result and
    /// clears the in-flight entry even if every caller has gone away.
    fn spawn_page(&self, key: PageKey, source: JobSource) -> PageFuture {
        let (job_id, page_number) = key.clone();
        let fields = Arc::clone(&source.fields);
        let store = Arc::clone(&self.inner.store);
        let processor = self.inner.processor.clone();
        let entry = InFlightEntry {
            inner: Arc::clone(&self.inner),
            key,
        };
        let task = tokio::spawn(async move {
            let _entry = entry;
            let result = processor.process(&source, page_number).await;
            match store.record_page(&job_id, result.clone()) {
                Ok(stored) => stored,
                Err(e) => {
                    debug!(job_id = %job_id, page = page_number, error = %e, "Result not recorded");
                    result
                }
            }
        });

        async move {
            task.await.unwrap_or_else(|e| {
                error!(page = page_number, error = %e, "Page task terminated");
                PageResult::failed(
                    page_number,
                    &fields,
                    PageError::InferenceFailed {
                        page: page_number,
                        detail: "page task terminated unexpectedly".into(),
                    },
                    0.0,
                )
            })
        }
        .boxed()
        .shared()
    }

    /// Pages with a computation currently running, across all jobs.
    pub fn pages_in_flight(&self) -> usize {
        self.in_flight().len()
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn status(&self, job_id: &JobId) -> Result<JobProgress, ExtractError> {
        self.store().progress(job_id)
    }

    /// Non-blocking results view, shaped by the job's status.
    pub fn results(&self, job_id: &JobId) -> Result<JobResults, ExtractError> {
        self.store().results(job_id)
    }

    /// One page of a job, computing it now if it has no result yet.
    ///
    /// Shares the computation with the background run and with any other
    /// caller asking for the same page.
    pub async fn page(&self, job_id: &JobId, page_number: u32) -> Result<PageResult, ExtractError> {
        let source = self.store().source(job_id)?;
        let total = self.total_pages(job_id, &source).await?;
        if page_number == 0 || page_number > total {
            return Err(ExtractError::PageOutOfRange {
                page: page_number,
                total,
            });
        }
        self.page_in_flight(job_id, page_number, &source).await
    }

    /// Remove a job and everything it holds. Idempotent.
    pub fn cleanup(&self, job_id: &JobId) -> bool {
        let removed = self.store().remove(job_id);
        self.in_flight().retain(|(id, _), _| id != job_id);
        if removed {
            info!(job_id = %job_id, "Job cleaned up");
        }
        removed
    }

    // ── Synchronous extraction ───────────────────────────────────────────

    /// Process a whole upload and return every page's result. Nothing is
    /// stored.
    pub async fn extract_sync(&self, upload: JobUpload) -> Result<SyncResults, ExtractError> {
        input::validate_upload(&upload.bytes, &upload.filename)?;
        if upload.fields.is_empty() {
            return Err(ExtractError::InvalidRequest(
                "at least one field is required".into(),
            ));
        }
        let route = self.client().route().await?;
        let total_pages = self.rasterizer().page_count(upload.bytes.clone()).await?;
        info!(filename = %upload.filename, pages = total_pages, ?route, "Synchronous extraction");

        let source = JobSource {
            bytes: upload.bytes,
            fields: upload.fields.into(),
            options: upload.options,
        };
        let processor = &self.inner.processor;
        let mut results = Vec::with_capacity(total_pages as usize);
        for batch in self.inner.schedule.batches(total_pages) {
            let batch_results = join_all(
                batch
                    .iter()
                    .map(|&page| processor.process_routed(&source, page, route)),
            )
            .await;
            results.extend(batch_results);
        }
        results.sort_by_key(|r| r.page_number);

        Ok(SyncResults {
            total_pages,
            results,
        })
    }
}
