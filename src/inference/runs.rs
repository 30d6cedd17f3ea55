//! Progress of backend-driven runs relayed through this service.
//!
//! The backend does not report run progress, so the client counts what it
//! has relayed: the page estimate from the start call and every page served
//! since.

use crate::output::{RemotePage, ResultSource, StartResult};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Progress of one relayed run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatus {
    pub processing_id: String,
    /// `processing` until every estimated page has been served.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
    pub completed_pages: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<f64>,
    pub source: ResultSource,
}

struct Run {
    total_pages: Option<u32>,
    pages: BTreeSet<u32>,
    source: ResultSource,
}

impl Run {
    fn status(&self, processing_id: &str) -> RunStatus {
        let completed = match self.total_pages {
            Some(total) => self.pages.range(1..=total).count(),
            None => self.pages.len(),
        } as u32;
        let done = self.total_pages.is_some_and(|total| completed >= total);
        RunStatus {
            processing_id: processing_id.to_string(),
            status: if done { "completed" } else { "processing" },
            total_pages: self.total_pages,
            completed_pages: completed,
            progress_percent: self
                .total_pages
                .filter(|&total| total > 0)
                .map(|total| (f64::from(completed) * 10_000.0 / f64::from(total)).round() / 100.0),
            source: self.source,
        }
    }
}

#[derive(Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<String, Run>>,
}

impl RunRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Run>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track a run from its start answer. Restarting an id resets it.
    pub fn started(&self, start: &StartResult) {
        self.lock().insert(
            start.processing_id.clone(),
            Run {
                total_pages: start.estimated_pages,
                pages: BTreeSet::new(),
                source: start.source,
            },
        );
    }

    /// Count a served page. Pages of untracked runs are ignored.
    pub fn page_served(&self, page: &RemotePage) {
        if let Some(run) = self.lock().get_mut(&page.processing_id) {
            run.pages.insert(page.page_number);
        }
    }

    pub fn status(&self, processing_id: &str) -> Option<RunStatus> {
        self.lock()
            .get(processing_id)
            .map(|run| run.status(processing_id))
    }

    pub fn forget(&self, processing_id: &str) -> bool {
        self.lock().remove(processing_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(id: &str, pages: Option<u32>) -> StartResult {
        StartResult {
            processing_id: id.into(),
            status: "processing".into(),
            result: None,
            estimated_pages: pages,
            message: None,
            source: ResultSource::Live,
        }
    }

    fn page(id: &str, page_number: u32) -> RemotePage {
        RemotePage {
            processing_id: id.into(),
            page_number,
            status: "completed".into(),
            result: serde_json::Value::Null,
            processing_time: 0.0,
            message: None,
            source: ResultSource::Live,
            attempts: 1,
        }
    }

    #[test]
    fn counts_distinct_pages_until_complete() {
        let runs = RunRegistry::default();
        runs.started(&start("p-1", Some(3)));

        runs.page_served(&page("p-1", 1));
        runs.page_served(&page("p-1", 1));
        let status = runs.status("p-1").unwrap();
        assert_eq!(status.status, "processing");
        assert_eq!(status.completed_pages, 1);
        assert_eq!(status.progress_percent, Some(33.33));

        runs.page_served(&page("p-1", 2));
        runs.page_served(&page("p-1", 3));
        let status = runs.status("p-1").unwrap();
        assert_eq!(status.status, "completed");
        assert_eq!(status.progress_percent, Some(100.0));
    }

    #[test]
    fn unknown_estimate_never_completes() {
        let runs = RunRegistry::default();
        runs.started(&start("p-2", None));
        runs.page_served(&page("p-2", 1));
        let status = runs.status("p-2").unwrap();
        assert_eq!(status.status, "processing");
        assert_eq!(status.completed_pages, 1);
        assert_eq!(status.progress_percent, None);
    }

    #[test]
    fn untracked_runs_are_ignored() {
        let runs = RunRegistry::default();
        runs.page_served(&page("nope", 1));
        assert!(runs.status("nope").is_none());
        assert!(!runs.forget("nope"));
    }
}
