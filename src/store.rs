//! In-process job storage.
//!
//! [`JobStore`] is the seam between the orchestrator and wherever job state
//! lives. The only implementation, [`MemoryJobStore`], keeps everything in a
//! `RwLock<HashMap>`: jobs are lost on restart, which is acceptable for an
//! extraction service whose clients re-upload on failure.
//!
//! Every method takes the lock once, so each call is atomic with respect to
//! the others. In particular [`JobStore::remove`] drops the source bytes and
//! the page table in a single map removal.

use crate::error::ExtractError;
use crate::job::{Job, JobId, JobProgress, JobResults, JobSource, JobStatus};
use crate::output::PageResult;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Storage for extraction jobs.
pub trait JobStore: Send + Sync {
    /// Store a new job and return its id.
    fn insert(&self, job: Job) -> JobId;

    fn contains(&self, id: &JobId) -> bool;

    fn progress(&self, id: &JobId) -> Result<JobProgress, ExtractError>;

    fn results(&self, id: &JobId) -> Result<JobResults, ExtractError>;

    /// The job's immutable inputs (bytes, fields, options).
    fn source(&self, id: &JobId) -> Result<JobSource, ExtractError>;

    /// Move the job to `status`, rejecting backward moves.
    fn transition(&self, id: &JobId, status: JobStatus) -> Result<(), ExtractError>;

    /// Record the document's page count. Set once; a differing count is an error.
    fn set_total_pages(&self, id: &JobId, total: u32) -> Result<(), ExtractError>;

    /// Record a page result unless one already exists.
    ///
    /// Returns the result that ends up stored: the given one on first write,
    /// the existing one otherwise. `completed_pages` only moves on first write.
    fn record_page(&self, id: &JobId, result: PageResult) -> Result<PageResult, ExtractError>;

    /// The stored result for `page`, if any.
    fn page(&self, id: &JobId, page: u32) -> Result<Option<PageResult>, ExtractError>;

    /// Mark the job failed with a reason. A no-op on an already failed job.
    fn fail(&self, id: &JobId, reason: &str) -> Result<(), ExtractError>;

    /// Remove the job. Returns `false` if it did not exist.
    fn remove(&self, id: &JobId) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// [`JobStore`] backed by a process-local map.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_job<T>(&self, id: &JobId, f: impl FnOnce(&Job) -> T) -> Result<T, ExtractError> {
        self.read().get(id).map(f).ok_or_else(|| not_found(id))
    }

    fn with_job_mut<T>(
        &self,
        id: &JobId,
        f: impl FnOnce(&mut Job) -> Result<T, ExtractError>,
    ) -> Result<T, ExtractError> {
        let mut jobs = self.write();
        let job = jobs.get_mut(id).ok_or_else(|| not_found(id))?;
        f(job)
    }
}

fn not_found(id: &JobId) -> ExtractError {
    ExtractError::NotFound {
        job_id: id.to_string(),
    }
}

impl JobStore for MemoryJobStore {
    fn insert(&self, job: Job) -> JobId {
        let id = job.id.clone();
        self.write().insert(id.clone(), job);
        debug!(job_id = %id, "job stored");
        id
    }

    fn contains(&self, id: &JobId) -> bool {
        self.read().contains_key(id)
    }

    fn progress(&self, id: &JobId) -> Result<JobProgress, ExtractError> {
        self.with_job(id, Job::progress)
    }

    fn results(&self, id: &JobId) -> Result<JobResults, ExtractError> {
        self.with_job(id, Job::results)
    }

    fn source(&self, id: &JobId) -> Result<JobSource, ExtractError> {
        self.with_job(id, |job| job.source.clone())
    }

    fn transition(&self, id: &JobId, status: JobStatus) -> Result<(), ExtractError> {
        self.with_job_mut(id, |job| job.transition(status))
    }

    fn set_total_pages(&self, id: &JobId, total: u32) -> Result<(), ExtractError> {
        self.with_job_mut(id, |job| {
            if job.total_pages != 0 && job.total_pages != total {
                return Err(ExtractError::Internal(format!(
                    "page count for job {} already set to {}",
                    job.id, job.total_pages
                )));
            }
            job.total_pages = total;
            Ok(())
        })
    }

    fn record_page(&self, id: &JobId, result: PageResult) -> Result<PageResult, ExtractError> {
        self.with_job_mut(id, |job| {
            let page = result.page_number;
            if let Some(existing) = job.page_results.get(&page) {
                return Ok(existing.clone());
            }
            job.page_results.insert(page, result.clone());
            job.completed_pages = job.page_results.len() as u32;
            job.updated_at = chrono::Utc::now();
            Ok(result)
        })
    }

    fn page(&self, id: &JobId, page: u32) -> Result<Option<PageResult>, ExtractError> {
        self.with_job(id, |job| job.page_results.get(&page).cloned())
    }

    fn fail(&self, id: &JobId, reason: &str) -> Result<(), ExtractError> {
        self.with_job_mut(id, |job| {
            if job.status == JobStatus::Failed {
                return Ok(());
            }
            job.transition(JobStatus::Failed)?;
            job.error = Some(reason.to_string());
            Ok(())
        })
    }

    fn remove(&self, id: &JobId) -> bool {
        let removed = self.write().remove(id).is_some();
        if removed {
            debug!(job_id = %id, "job removed");
        }
        removed
    }

    fn len(&self) -> usize {
        self.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobUpload;
    use crate::output::{ExtractionField, InferenceOptions, ResultSource};
    use serde_json::Map;
    use std::sync::Arc;

    fn job() -> Job {
        Job::new(JobUpload {
            bytes: Arc::from(b"%PDF-1.4".as_slice()),
            filename: "a.pdf".into(),
            fields: vec![ExtractionField::new("title", "t")],
            options: InferenceOptions::default(),
        })
    }

    fn result(page: u32) -> PageResult {
        PageResult {
            page_number: page,
            extracted_data: Map::new(),
            processing_time: 0.01,
            source: ResultSource::Synthetic,
            error: None,
        }
    }

    #[test]
    fn unknown_job_is_not_found() {
        let store = MemoryJobStore::new();
        let id = JobId::from("missing");
        assert!(matches!(
            store.progress(&id),
            Err(ExtractError::NotFound { .. })
        ));
        assert!(!store.remove(&id));
    }

    #[test]
    fn record_page_is_insert_once() {
        let store = MemoryJobStore::new();
        let id = store.insert(job());
        store.set_total_pages(&id, 2).unwrap();

        let mut first = result(1);
        first.processing_time = 1.0;
        store.record_page(&id, first).unwrap();

        let mut second = result(1);
        second.processing_time = 2.0;
        let kept = store.record_page(&id, second).unwrap();

        assert_eq!(kept.processing_time, 1.0);
        assert_eq!(store.progress(&id).unwrap().completed_pages, 1);
    }

    #[test]
    fn completed_never_exceeds_total() {
        let store = MemoryJobStore::new();
        let id = store.insert(job());
        store.set_total_pages(&id, 2).unwrap();
        for page in 1..=2 {
            store.record_page(&id, result(page)).unwrap();
        }
        let progress = store.progress(&id).unwrap();
        assert_eq!(progress.completed_pages, progress.total_pages);
    }

    #[test]
    fn fail_records_reason_and_is_idempotent() {
        let store = MemoryJobStore::new();
        let id = store.insert(job());
        store.fail(&id, "not a pdf").unwrap();
        store.fail(&id, "second reason").unwrap();
        match store.results(&id).unwrap() {
            JobResults::Failed { error, .. } => assert_eq!(error, "not a pdf"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cannot_fail_completed_job() {
        let store = MemoryJobStore::new();
        let id = store.insert(job());
        store.transition(&id, JobStatus::Processing).unwrap();
        store.transition(&id, JobStatus::Completed).unwrap();
        assert!(store.fail(&id, "late").is_err());
    }

    #[test]
    fn remove_drops_everything() {
        let store = MemoryJobStore::new();
        let id = store.insert(job());
        assert_eq!(store.len(), 1);
        assert!(store.remove(&id));
        assert!(store.is_empty());
        assert!(store.source(&id).is_err());
    }
}
