//! Stale-run detection.
//!
//! A worker that dies mid-attempt leaves its job RUNNING forever. The
//! pipeline's sweeper pass calls [`stale_transition`] on every RUNNING job
//! and applies the verdict with [`DocumentJob::fail_stale`]. Detection is a
//! pure function of (job, now, threshold), so the pass is idempotent and
//! may run concurrently with workers: the store's version check decides
//! who wins.

use chrono::{DateTime, Duration, Utc};
use fiscal_core::JobId;

use crate::job::{DocumentJob, JobStatus};

/// A run that exceeded the staleness threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleRun {
    /// Job id.
    pub job_id: JobId,
    /// Worker that held the lock.
    pub locked_by: Option<String>,
    /// Start of the stuck attempt.
    pub started_at: DateTime<Utc>,
    /// How long it has been running.
    pub running_for: Duration,
    /// Threshold that was exceeded.
    pub threshold: Duration,
}

impl StaleRun {
    /// The synthetic error recorded on the job.
    pub fn error_message(&self) -> String {
        format!(
            "stale run: job held by {} since {} ({}s, threshold {}s)",
            self.locked_by.as_deref().unwrap_or("unknown worker"),
            self.started_at.to_rfc3339(),
            self.running_for.num_seconds(),
            self.threshold.num_seconds(),
        )
    }
}

/// `Some` when `job` is RUNNING and started more than `threshold` before
/// `now`.
pub fn stale_transition(
    job: &DocumentJob,
    now: DateTime<Utc>,
    threshold: Duration,
) -> Option<StaleRun> {
    if job.status != JobStatus::Running {
        return None;
    }
    let started_at = job.started_at?;
    let running_for = now.signed_duration_since(started_at);
    (running_for > threshold).then(|| StaleRun {
        job_id: job.id,
        locked_by: job.locked_by.clone(),
        started_at,
        running_for,
        threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobType, NewJob};
    use chrono::TimeZone;
    use fiscal_core::{BranchId, DocumentId, OrganizationId};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 10, 0, 0).unwrap()
    }

    fn running_job() -> DocumentJob {
        let mut job = DocumentJob::new(
            NewJob {
                organization: OrganizationId::new(),
                branch: BranchId::new(),
                document_id: DocumentId::new(),
                job_type: JobType::CteEmission,
                payload: serde_json::Value::Null,
            },
            3,
            t0(),
        )
        .unwrap();
        job.start(t0(), "worker-7").unwrap();
        job
    }

    #[test]
    fn fresh_run_is_not_stale() {
        let job = running_job();
        assert!(stale_transition(&job, t0() + Duration::minutes(14), Duration::minutes(15)).is_none());
        assert!(stale_transition(&job, t0() + Duration::minutes(15), Duration::minutes(15)).is_none());
    }

    #[test]
    fn old_run_is_failed_with_stale_error() {
        let mut job = running_job();
        let now = t0() + Duration::minutes(16);
        let stale = stale_transition(&job, now, Duration::minutes(15)).unwrap();
        assert_eq!(stale.locked_by.as_deref(), Some("worker-7"));
        job.fail_stale(now, &stale).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.last_error.as_deref().unwrap().starts_with("stale run"));
        assert!(job.locked_by.is_none());
    }

    #[test]
    fn sweep_is_idempotent() {
        let mut job = running_job();
        let now = t0() + Duration::hours(1);
        let stale = stale_transition(&job, now, Duration::minutes(15)).unwrap();
        job.fail_stale(now, &stale).unwrap();
        assert!(stale_transition(&job, now, Duration::minutes(15)).is_none());
        assert!(job.fail_stale(now, &stale).is_err());
    }

    #[test]
    fn queued_jobs_are_never_stale() {
        let job = DocumentJob::new(
            NewJob {
                organization: OrganizationId::new(),
                branch: BranchId::new(),
                document_id: DocumentId::new(),
                job_type: JobType::TaxCalculation,
                payload: serde_json::Value::Null,
            },
            3,
            t0(),
        )
        .unwrap();
        assert!(stale_transition(&job, t0() + Duration::days(3), Duration::minutes(1)).is_none());
    }
}
