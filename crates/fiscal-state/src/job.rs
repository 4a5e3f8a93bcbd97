//! # Job Lifecycle
//!
//! ```text
//!            ┌──────────── fail (attempts < max) ◀──────┐
//!            ▼                                           │
//! Queued ──start──▶ Running ──succeed──▶ Succeeded       │
//!   │                  │  └──────────────────────────────┘
//!   │                  └──fail (attempts == max) | permanent | stale──▶ Failed
//!   └──force_fail──────────────────────────────────────────────────────▶ Failed
//! ```
//!
//! `start` increments `attempts` and takes the lock (`locked_by`,
//! `locked_at`). Every exit from `Running` releases it. A re-queued job is
//! not claimable before `available_at`.

use chrono::{DateTime, Utc};
use fiscal_core::{BranchId, DocumentId, JobId, OrganizationId, StateTransitionError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetryPolicy;
use crate::sweeper::StaleRun;

// ─── Job Type & Status ───────────────────────────────────────────────

/// What the job computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Tax scenario or rule-based calculation for an invoice.
    TaxCalculation,
    /// CT-e assembly for a transport manifest.
    CteEmission,
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::TaxCalculation => "tax_calculation",
            Self::CteEmission => "cte_emission",
        })
    }
}

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting for a worker.
    Queued,
    /// Locked by a worker.
    Running,
    /// Terminal success.
    Succeeded,
    /// Terminal failure.
    Failed,
}

impl JobStatus {
    /// Whether the status is final.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors from job construction and transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// The edge is not part of the machine.
    #[error(transparent)]
    Transition(#[from] StateTransitionError),

    /// `max_attempts` must be at least 1.
    #[error("max_attempts must be at least 1, got {0}")]
    InvalidMaxAttempts(u32),

    /// A worker tried to finish a job it does not hold.
    #[error("job {job} is locked by {holder:?}, not {worker}")]
    NotLockHolder {
        /// Job id.
        job: JobId,
        /// Worker that tried.
        worker: String,
        /// Worker holding the lock, if any.
        holder: Option<String>,
    },
}

// ─── Transition Record ───────────────────────────────────────────────

/// One entry of a job's audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTransitionRecord {
    /// Status before.
    pub from: JobStatus,
    /// Status after.
    pub to: JobStatus,
    /// When.
    pub at: DateTime<Utc>,
    /// Attempt count after the transition.
    pub attempt: u32,
    /// Why.
    pub reason: String,
}

/// Result of [`DocumentJob::fail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Back in the queue, claimable from `available_at`.
    Requeued {
        /// Earliest next claim.
        available_at: DateTime<Utc>,
    },
    /// Retry budget spent; the job is FAILED.
    Exhausted,
}

// ─── Job ─────────────────────────────────────────────────────────────

/// Parameters of a new job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    /// Tenant.
    pub organization: OrganizationId,
    /// Branch.
    pub branch: BranchId,
    /// Document the job drives.
    pub document_id: DocumentId,
    /// Work to perform.
    pub job_type: JobType,
    /// Handler input.
    pub payload: serde_json::Value,
}

/// An asynchronous unit of work over one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentJob {
    /// Identifier.
    pub id: JobId,
    /// Tenant.
    pub organization: OrganizationId,
    /// Branch.
    pub branch: BranchId,
    /// Document the job drives.
    pub document_id: DocumentId,
    /// Work to perform.
    pub job_type: JobType,
    /// Handler input.
    pub payload: serde_json::Value,
    /// Current status.
    pub status: JobStatus,
    /// Attempts started so far.
    pub attempts: u32,
    /// Attempts allowed.
    pub max_attempts: u32,
    /// Error of the most recent failed attempt.
    pub last_error: Option<String>,
    /// Handler output on success.
    pub result: Option<serde_json::Value>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Not claimable before this instant.
    pub available_at: DateTime<Utc>,
    /// Start of the current (or last) attempt.
    pub started_at: Option<DateTime<Utc>>,
    /// When the lock was taken.
    pub locked_at: Option<DateTime<Utc>>,
    /// Worker holding the lock.
    pub locked_by: Option<String>,
    /// When the job reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Ordered transition log.
    pub transitions: Vec<JobTransitionRecord>,
}

impl DocumentJob {
    /// Enqueue a job. It is claimable immediately.
    pub fn new(job: NewJob, max_attempts: u32, now: DateTime<Utc>) -> Result<Self, JobError> {
        if max_attempts == 0 {
            return Err(JobError::InvalidMaxAttempts(max_attempts));
        }
        Ok(Self {
            id: JobId::new(),
            organization: job.organization,
            branch: job.branch,
            document_id: job.document_id,
            job_type: job.job_type,
            payload: job.payload,
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts,
            last_error: None,
            result: None,
            created_at: now,
            available_at: now,
            started_at: None,
            locked_at: None,
            locked_by: None,
            completed_at: None,
            transitions: Vec::new(),
        })
    }

    /// Whether a worker may claim the job at `now`.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Queued && self.available_at <= now
    }

    /// QUEUED → RUNNING. Takes the lock for `worker` and counts the attempt.
    pub fn start(&mut self, now: DateTime<Utc>, worker: &str) -> Result<(), JobError> {
        self.require_status(&[JobStatus::Queued], JobStatus::Running)?;
        self.attempts += 1;
        self.started_at = Some(now);
        self.locked_at = Some(now);
        self.locked_by = Some(worker.to_string());
        self.record(JobStatus::Running, now, format!("claimed by {worker}"));
        Ok(())
    }

    /// RUNNING → SUCCEEDED.
    pub fn succeed(
        &mut self,
        now: DateTime<Utc>,
        worker: &str,
        result: serde_json::Value,
    ) -> Result<(), JobError> {
        self.require_status(&[JobStatus::Running], JobStatus::Succeeded)?;
        self.require_lock(worker)?;
        self.result = Some(result);
        self.finish(JobStatus::Succeeded, now, "handler succeeded".to_string());
        Ok(())
    }

    /// A transient failure of the current attempt.
    ///
    /// Re-queues with backoff while `attempts < max_attempts`, otherwise
    /// fails the job. The error is kept in `last_error` either way.
    pub fn fail(
        &mut self,
        now: DateTime<Utc>,
        worker: &str,
        error: &str,
        policy: &RetryPolicy,
    ) -> Result<FailureOutcome, JobError> {
        let target = if self.attempts < self.max_attempts {
            JobStatus::Queued
        } else {
            JobStatus::Failed
        };
        self.require_status(&[JobStatus::Running], target)?;
        self.require_lock(worker)?;
        self.last_error = Some(error.to_string());

        if target == JobStatus::Queued {
            let available_at = policy.available_at(now, self.attempts);
            self.available_at = available_at;
            self.release_lock();
            self.record(
                JobStatus::Queued,
                now,
                format!("attempt {} of {} failed: {error}", self.attempts, self.max_attempts),
            );
            Ok(FailureOutcome::Requeued { available_at })
        } else {
            self.finish(
                JobStatus::Failed,
                now,
                format!("attempts exhausted ({}): {error}", self.attempts),
            );
            Ok(FailureOutcome::Exhausted)
        }
    }

    /// RUNNING → FAILED without consuming the remaining retry budget. Used
    /// for validation, configuration and compliance errors.
    pub fn fail_permanently(
        &mut self,
        now: DateTime<Utc>,
        worker: &str,
        error: &str,
    ) -> Result<(), JobError> {
        self.require_status(&[JobStatus::Running], JobStatus::Failed)?;
        self.require_lock(worker)?;
        self.last_error = Some(error.to_string());
        self.finish(JobStatus::Failed, now, format!("permanent error: {error}"));
        Ok(())
    }

    /// Operator action: QUEUED or RUNNING → FAILED regardless of the lock.
    pub fn force_fail(&mut self, now: DateTime<Utc>, reason: &str) -> Result<(), JobError> {
        self.require_status(&[JobStatus::Queued, JobStatus::Running], JobStatus::Failed)?;
        self.last_error = Some(reason.to_string());
        self.finish(JobStatus::Failed, now, format!("force-failed: {reason}"));
        Ok(())
    }

    /// Sweeper action: a run detected by
    /// [`stale_transition`](crate::sweeper::stale_transition) is failed
    /// with a synthetic stale-run error.
    pub fn fail_stale(&mut self, now: DateTime<Utc>, stale: &StaleRun) -> Result<(), JobError> {
        self.require_status(&[JobStatus::Running], JobStatus::Failed)?;
        let error = stale.error_message();
        self.last_error = Some(error.clone());
        self.finish(JobStatus::Failed, now, error);
        Ok(())
    }

    fn require_status(&self, allowed: &[JobStatus], to: JobStatus) -> Result<(), JobError> {
        if !allowed.contains(&self.status) {
            return Err(StateTransitionError::InvalidStatusTransition {
                entity: "job",
                id: self.id.to_string(),
                from: self.status.to_string(),
                to: to.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn require_lock(&self, worker: &str) -> Result<(), JobError> {
        if self.locked_by.as_deref() != Some(worker) {
            return Err(JobError::NotLockHolder {
                job: self.id,
                worker: worker.to_string(),
                holder: self.locked_by.clone(),
            });
        }
        Ok(())
    }

    fn release_lock(&mut self) {
        self.locked_by = None;
        self.locked_at = None;
    }

    fn finish(&mut self, to: JobStatus, now: DateTime<Utc>, reason: String) {
        self.completed_at = Some(now);
        self.release_lock();
        self.record(to, now, reason);
    }

    fn record(&mut self, to: JobStatus, now: DateTime<Utc>, reason: String) {
        self.transitions.push(JobTransitionRecord {
            from: self.status,
            to,
            at: now,
            attempt: self.attempts,
            reason,
        });
        self.status = to;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
