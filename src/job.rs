//! Job state: identifiers, the status state machine and query views.

use crate::error::ExtractError;
use crate::output::{ExtractionField, InferenceOptions, PageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque job identifier.
///
/// A random UUID v4: identical re-uploads create independent jobs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client-visible job status. Progresses monotonically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Initializing,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Initializing => "initializing",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether `self → next` is a legal forward move. Same-state is allowed.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Initializing, Initializing)
                | (Initializing, Processing)
                | (Initializing, Failed)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Completed, Completed)
                | (Failed, Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A PDF upload plus what to extract from it.
#[derive(Debug, Clone)]
pub struct JobUpload {
    pub bytes: Arc<[u8]>,
    pub filename: String,
    pub fields: Vec<ExtractionField>,
    pub options: InferenceOptions,
}

/// Immutable inputs of a job, shared with page tasks.
#[derive(Debug, Clone)]
pub struct JobSource {
    pub bytes: Arc<[u8]>,
    pub fields: Arc<[ExtractionField]>,
    pub options: InferenceOptions,
}

/// Full job record held by the store.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub filename: String,
    pub status: JobStatus,
    pub total_pages: u32,
    pub completed_pages: u32,
    pub page_results: BTreeMap<u32, PageResult>,
    pub source: JobSource,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// A fresh job in `initializing` with no page count yet.
    pub fn new(upload: JobUpload) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            filename: upload.filename,
            status: JobStatus::Initializing,
            total_pages: 0,
            completed_pages: 0,
            page_results: BTreeMap::new(),
            source: JobSource {
                bytes: upload.bytes,
                fields: upload.fields.into(),
                options: upload.options,
            },
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Seed the page count learned while validating the upload.
    pub fn with_total_pages(mut self, total_pages: u32) -> Self {
        self.total_pages = total_pages;
        self
    }

    /// Apply a status change, rejecting backward moves.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), ExtractError> {
        if !self.status.can_transition_to(next) {
            return Err(ExtractError::InvalidTransition {
                job_id: self.id.to_string(),
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        if self.status != next {
            self.status = next;
            self.updated_at = Utc::now();
        }
        Ok(())
    }

    pub fn progress(&self) -> JobProgress {
        JobProgress {
            job_id: self.id.clone(),
            status: self.status,
            total_pages: self.total_pages,
            completed_pages: self.completed_pages,
        }
    }

    /// Results in page order.
    pub fn ordered_results(&self) -> Vec<PageResult> {
        self.page_results.values().cloned().collect()
    }

    pub fn results(&self) -> JobResults {
        match self.status {
            JobStatus::Initializing => JobResults::Initializing,
            JobStatus::Processing => JobResults::Processing {
                partial: self.ordered_results(),
            },
            JobStatus::Completed => JobResults::Completed {
                total_pages: self.total_pages,
                results: self.ordered_results(),
            },
            JobStatus::Failed => JobResults::Failed {
                error: self
                    .error
                    .clone()
                    .unwrap_or_else(|| "Processing failed".to_string()),
                partial: self.ordered_results(),
            },
        }
    }
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobProgress {
    pub job_id: JobId,
    pub status: JobStatus,
    pub total_pages: u32,
    pub completed_pages: u32,
}

impl JobProgress {
    /// `completed / total` in `0.0..=1.0`; `0.0` while the total is unknown.
    pub fn progress(&self) -> f64 {
        if self.total_pages == 0 {
            0.0
        } else {
            f64::from(self.completed_pages) / f64::from(self.total_pages)
        }
    }
}

/// Answer to a results query, one variant per response shape.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResults {
    Initializing,
    Processing {
        partial: Vec<PageResult>,
    },
    Completed {
        total_pages: u32,
        results: Vec<PageResult>,
    },
    Failed {
        error: String,
        partial: Vec<PageResult>,
    },
}

/// Output of a synchronous extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncResults {
    pub total_pages: u32,
    pub results: Vec<PageResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload() -> JobUpload {
        JobUpload {
            bytes: Arc::from(b"%PDF-1.7".as_slice()),
            filename: "doc.pdf".into(),
            fields: vec![ExtractionField::new("title", "doc title")],
            options: InferenceOptions::default(),
        }
    }

    #[test]
    fn forward_transitions_are_allowed() {
        let mut job = Job::new(upload());
        assert_eq!(job.status, JobStatus::Initializing);
        job.transition(JobStatus::Processing).unwrap();
        job.transition(JobStatus::Processing).unwrap();
        job.transition(JobStatus::Completed).unwrap();
        assert!(job.status.is_terminal());
    }

    #[test]
    fn backward_transitions_are_rejected() {
        let mut job = Job::new(upload());
        job.transition(JobStatus::Processing).unwrap();
        job.transition(JobStatus::Failed).unwrap();
        assert!(job.transition(JobStatus::Processing).is_err());
        assert!(job.transition(JobStatus::Completed).is_err());
        assert!(job.transition(JobStatus::Initializing).is_err());
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn cannot_complete_without_processing() {
        let mut job = Job::new(upload());
        assert!(job.transition(JobStatus::Completed).is_err());
    }

    #[test]
    fn progress_is_zero_until_total_known() {
        let mut job = Job::new(upload());
        assert_eq!(job.progress().progress(), 0.0);
        job.total_pages = 4;
        job.completed_pages = 1;
        assert!((job.progress().progress() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn failed_results_carry_default_error() {
        let mut job = Job::new(upload());
        job.transition(JobStatus::Failed).unwrap();
        match job.results() {
            JobResults::Failed { error, partial } => {
                assert_eq!(error, "Processing failed");
                assert!(partial.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn job_ids_are_unique() {
        assert_ne!(JobId::new(), JobId::new());
    }
}
