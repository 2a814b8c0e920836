//! Crawl job records and their lifecycle state machine
//!
//! One `CrawlJob` describes a single orchestrated run from trigger to a
//! terminal status. Jobs live in orchestrator memory; terminal jobs are
//! immutable history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a crawl job.
///
/// Allowed transitions: `Pending → Running → {Completed, Failed, Cancelled}`.
/// Terminal states are final; whole jobs are never retried, only individual
/// fetches inside a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Running) => true,
            // A job whose discovery fetch never succeeds fails without
            // dispatching workers.
            (JobStatus::Pending, JobStatus::Failed | JobStatus::Cancelled) => true,
            (JobStatus::Running, s) if s.is_terminal() => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// One recorded failure, local to a page or a record on that page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    /// Page URL or `page-N` reference the failure belongs to.
    pub page_ref: String,
    pub reason: String,
}

/// Record of one orchestrated crawl run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Discovered from the first listing fetch; `None` until discovery.
    pub total_pages: Option<u32>,
    pub pages_attempted: u32,
    pub pages_succeeded: u32,
    pub records_upserted: u32,
    /// Candidates dropped by validation or parse failures.
    pub records_skipped: u32,
    /// Ordered failure log, page-level and record-level.
    pub errors: Vec<PageFailure>,
}

impl CrawlJob {
    pub fn new() -> Self {
        Self {
            job_id: Uuid::new_v4(),
            status: JobStatus::Pending,
            started_at: Utc::now(),
            finished_at: None,
            total_pages: None,
            pages_attempted: 0,
            pages_succeeded: 0,
            records_upserted: 0,
            records_skipped: 0,
            errors: Vec::new(),
        }
    }

    /// Apply a status transition. Returns `false` (leaving the job untouched)
    /// when the state machine forbids it.
    pub fn transition_to(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        true
    }

    pub fn record_failure(&mut self, page_ref: impl Into<String>, reason: impl Into<String>) {
        self.errors.push(PageFailure { page_ref: page_ref.into(), reason: reason.into() });
    }
}

impl Default for CrawlJob {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_follows_state_machine() {
        let mut job = CrawlJob::new();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.transition_to(JobStatus::Running));
        assert!(job.transition_to(JobStatus::Completed));
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut job = CrawlJob::new();
        job.transition_to(JobStatus::Running);
        job.transition_to(JobStatus::Failed);
        assert!(!job.transition_to(JobStatus::Running));
        assert!(!job.transition_to(JobStatus::Completed));
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn pending_may_fail_before_dispatch() {
        let mut job = CrawlJob::new();
        assert!(job.transition_to(JobStatus::Failed));
    }

    #[test]
    fn completed_cannot_be_reached_from_pending() {
        let mut job = CrawlJob::new();
        assert!(!job.transition_to(JobStatus::Completed));
    }
}
