//! # Pipeline Service
//!
//! Every operation follows the same shape: read the records with their
//! versions, apply the state-machine transition in memory, commit the
//! changed rows in one [`WriteSet`] that names the versions read. A
//! version conflict means another worker or the sweeper moved first; the
//! operation changes nothing and the caller decides whether to move on.
//!
//! Document and job move together:
//!
//! | Job event | Document |
//! |---|---|
//! | enqueue | UPLOADED or FAILED → QUEUED |
//! | first claim | QUEUED → PROCESSING |
//! | retry re-queue / later claims | stays PROCESSING |
//! | success | → SUCCEEDED |
//! | exhausted, permanent, forced, stale | → FAILED |

use std::sync::Arc;

use fiscal_core::{Clock, DocumentId, JobId, StateTransitionError};
use fiscal_state::{
    stale_transition, Document, DocumentError, DocumentJob, DocumentStatus, FailureOutcome,
    JobStatus, JobType, NewDocument, NewJob, RetryPolicy,
};
use serde_json::Value;

use crate::config::{ConfigError, PipelineConfig};
use crate::error::PipelineError;
use crate::store::{PipelineStore, StoreError, Versioned, WriteSet};

/// A job claimed by a worker, with its document.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    /// The job, now RUNNING under the worker's lock.
    pub job: DocumentJob,
    /// Its document, now PROCESSING.
    pub document: Document,
}

/// Outcome of one sweeper pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Jobs failed as stale.
    pub failed: Vec<JobId>,
    /// Stale jobs another writer touched first.
    pub skipped: Vec<JobId>,
}

/// The document and job lifecycle over a [`PipelineStore`].
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn PipelineStore>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
    retry: RetryPolicy,
    stale_after: chrono::Duration,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("retry", &self.retry)
            .field("stale_after", &self.stale_after)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Service over `store`, configured by `config`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] when `config` fails
    /// [`PipelineConfig::validate`].
    pub fn new(
        store: Arc<dyn PipelineStore>,
        clock: Arc<dyn Clock>,
        config: &PipelineConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            clock,
            config: config.clone(),
            retry: config.retry_policy(),
            stale_after: config.stale_threshold(),
        })
    }

    /// The validated configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read a document.
    pub fn document(&self, id: DocumentId) -> Result<Document, PipelineError> {
        Ok(self.load_document(id)?.record)
    }

    /// Read a job.
    pub fn job(&self, id: JobId) -> Result<DocumentJob, PipelineError> {
        Ok(self.load_job(id)?.record)
    }

    // ── Ingestion ──────────────────────────────────────────────────────

    /// Register an upload. The document is UPLOADED.
    pub fn upload(&self, upload: NewDocument) -> Result<Document, PipelineError> {
        let document = Document::new(upload, self.clock.now())?;
        self.store
            .commit(WriteSet::new().insert_document(document.clone()))?;
        tracing::info!(
            document_id = %document.id,
            organization = %document.organization,
            document_type = ?document.document_type,
            "document uploaded"
        );
        Ok(document)
    }

    /// Register an upload and its first job in one commit.
    pub fn upload_and_enqueue(
        &self,
        upload: NewDocument,
        job_type: JobType,
        payload: Value,
    ) -> Result<(Document, DocumentJob), PipelineError> {
        let now = self.clock.now();
        let mut document = Document::new(upload, now)?;
        let job = self.new_job(&mut document, job_type, payload, "job enqueued on upload")?;
        self.store.commit(
            WriteSet::new()
                .insert_document(document.clone())
                .insert_job(job.clone()),
        )?;
        tracing::info!(document_id = %document.id, job_id = %job.id, %job_type, "document uploaded and enqueued");
        Ok((document, job))
    }

    /// Enqueue a job for an UPLOADED (or FAILED) document.
    pub fn enqueue(
        &self,
        document_id: DocumentId,
        job_type: JobType,
        payload: Value,
    ) -> Result<DocumentJob, PipelineError> {
        let Versioned { version, record: mut document } = self.load_document(document_id)?;
        let job = self.new_job(&mut document, job_type, payload, "job enqueued")?;
        self.store.commit(
            WriteSet::new()
                .update_document(document, version)
                .insert_job(job.clone()),
        )?;
        tracing::info!(%document_id, job_id = %job.id, %job_type, "job enqueued");
        Ok(job)
    }

    /// Manual reprocess: a FAILED document goes back to QUEUED with a new
    /// job copying the type and payload of its latest job.
    pub fn reprocess(&self, document_id: DocumentId) -> Result<DocumentJob, PipelineError> {
        let Versioned { version, record: mut document } = self.load_document(document_id)?;
        if document.status != DocumentStatus::Failed {
            return Err(DocumentError::from(StateTransitionError::InvalidStatusTransition {
                entity: "document",
                id: document.id.to_string(),
                from: document.status.to_string(),
                to: DocumentStatus::Queued.to_string(),
            })
            .into());
        }
        let previous = self
            .store
            .jobs_for_document(document_id)?
            .pop()
            .ok_or(PipelineError::NothingToReprocess(document_id))?
            .record;
        let job = self.new_job(
            &mut document,
            previous.job_type,
            previous.payload,
            "manual reprocess",
        )?;
        self.store.commit(
            WriteSet::new()
                .update_document(document, version)
                .insert_job(job.clone()),
        )?;
        tracing::info!(%document_id, job_id = %job.id, previous_job = %previous.id, "document reprocessed");
        Ok(job)
    }

    fn new_job(
        &self,
        document: &mut Document,
        job_type: JobType,
        payload: Value,
        reason: &str,
    ) -> Result<DocumentJob, PipelineError> {
        let now = self.clock.now();
        document.enqueue(now, reason)?;
        let job = DocumentJob::new(
            NewJob {
                organization: document.organization,
                branch: document.branch,
                document_id: document.id,
                job_type,
                payload,
            },
            self.retry.max_attempts,
            now,
        )?;
        Ok(job)
    }

    // ── Execution ──────────────────────────────────────────────────────

    /// Lock the oldest claimable job for `worker`.
    ///
    /// Candidates another worker wins are skipped. `None` when nothing is
    /// claimable.
    pub fn claim_next(&self, worker: &str) -> Result<Option<Claim>, PipelineError> {
        let now = self.clock.now();
        for candidate in self.store.list_jobs(JobStatus::Queued)? {
            if !candidate.record.is_claimable(now) {
                continue;
            }
            match self.try_claim(candidate, worker) {
                Ok(Some(claim)) => return Ok(Some(claim)),
                Ok(None) => {}
                Err(err) if err.is_conflict() => {
                    tracing::warn!(worker, error = %err, "claim lost to another writer");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(None)
    }

    fn try_claim(
        &self,
        candidate: Versioned<DocumentJob>,
        worker: &str,
    ) -> Result<Option<Claim>, PipelineError> {
        let now = self.clock.now();
        let Versioned { version, record: mut job } = candidate;
        let Versioned { version: doc_version, record: mut document } =
            self.load_document(job.document_id)?;

        let writes = match document.status {
            DocumentStatus::Processing => {
                job.start(now, worker)?;
                WriteSet::new().update_job(job.clone(), version)
            }
            DocumentStatus::Queued | DocumentStatus::Uploaded => {
                job.start(now, worker)?;
                document.start_processing(now)?;
                WriteSet::new()
                    .update_job(job.clone(), version)
                    .update_document(document.clone(), doc_version)
            }
            status => {
                // The document moved on without this job; it can never run.
                let reason = format!("document {} is {status}", document.id);
                job.force_fail(now, &reason)?;
                self.store.commit(WriteSet::new().update_job(job.clone(), version))?;
                tracing::error!(job_id = %job.id, document_id = %document.id, %status, "orphaned job failed");
                return Ok(None);
            }
        };
        self.store.commit(writes)?;
        tracing::info!(
            job_id = %job.id,
            document_id = %document.id,
            worker,
            attempt = job.attempts,
            max_attempts = job.max_attempts,
            "job claimed"
        );
        Ok(Some(Claim { job, document }))
    }

    /// RUNNING → SUCCEEDED with the handler's result; the document
    /// succeeds with it.
    pub fn complete(
        &self,
        job_id: JobId,
        worker: &str,
        result: Value,
    ) -> Result<DocumentJob, PipelineError> {
        let now = self.clock.now();
        let (Versioned { version, record: mut job }, Versioned { version: dv, record: mut document }) =
            self.load_pair(job_id)?;
        job.succeed(now, worker, result)?;
        document.succeed(now)?;
        self.store.commit(
            WriteSet::new()
                .update_job(job.clone(), version)
                .update_document(document, dv),
        )?;
        tracing::info!(%job_id, document_id = %job.document_id, attempt = job.attempts, "job succeeded");
        Ok(job)
    }

    /// Record a failed attempt.
    ///
    /// Retryable errors re-queue with backoff until the job's attempts are
    /// spent; anything else fails the job at once. The document fails
    /// together with the job.
    pub fn record_failure(
        &self,
        job_id: JobId,
        worker: &str,
        error: &str,
        retryable: bool,
    ) -> Result<DocumentJob, PipelineError> {
        let now = self.clock.now();
        let (Versioned { version, record: mut job }, Versioned { version: dv, record: mut document }) =
            self.load_pair(job_id)?;

        let outcome = if retryable {
            job.fail(now, worker, error, &self.retry)?
        } else {
            job.fail_permanently(now, worker, error)?;
            FailureOutcome::Exhausted
        };

        let writes = WriteSet::new().update_job(job.clone(), version);
        let writes = match outcome {
            FailureOutcome::Requeued { available_at } => {
                tracing::warn!(
                    %job_id,
                    attempt = job.attempts,
                    max_attempts = job.max_attempts,
                    %available_at,
                    error,
                    "job attempt failed, re-queued"
                );
                writes
            }
            FailureOutcome::Exhausted => {
                document.fail(now, error)?;
                tracing::error!(
                    %job_id,
                    document_id = %document.id,
                    attempt = job.attempts,
                    retryable,
                    error,
                    "job failed"
                );
                writes.update_document(document, dv)
            }
        };
        self.store.commit(writes)?;
        Ok(job)
    }

    /// Operator action: fail a QUEUED or RUNNING job and its document.
    pub fn force_fail(&self, job_id: JobId, reason: &str) -> Result<DocumentJob, PipelineError> {
        let now = self.clock.now();
        let (Versioned { version, record: mut job }, Versioned { version: dv, record: mut document }) =
            self.load_pair(job_id)?;
        job.force_fail(now, reason)?;
        let mut writes = WriteSet::new().update_job(job.clone(), version);
        if document.status.can_transition_to(DocumentStatus::Failed) {
            document.fail(now, reason)?;
            writes = writes.update_document(document, dv);
        }
        self.store.commit(writes)?;
        tracing::error!(%job_id, reason, "job force-failed");
        Ok(job)
    }

    // ── Sweeper ────────────────────────────────────────────────────────

    /// Fail every RUNNING job older than the staleness threshold.
    ///
    /// Idempotent: a job that finished or was swept concurrently is
    /// skipped.
    pub fn sweep_stale(&self) -> Result<SweepReport, PipelineError> {
        let now = self.clock.now();
        let mut report = SweepReport::default();
        for Versioned { version, record: mut job } in self.store.list_jobs(JobStatus::Running)? {
            let Some(stale) = stale_transition(&job, now, self.stale_after) else {
                continue;
            };
            let Versioned { version: dv, record: mut document } =
                self.load_document(job.document_id)?;
            job.fail_stale(now, &stale)?;
            let mut writes = WriteSet::new().update_job(job.clone(), version);
            if document.status.can_transition_to(DocumentStatus::Failed) {
                document.fail(now, &stale.error_message())?;
                writes = writes.update_document(document, dv);
            }
            match self.store.commit(writes) {
                Ok(()) => {
                    tracing::warn!(
                        job_id = %job.id,
                        locked_by = ?stale.locked_by,
                        running_secs = stale.running_for.num_seconds(),
                        "stale job failed"
                    );
                    report.failed.push(job.id);
                }
                Err(StoreError::VersionConflict { .. }) => {
                    tracing::warn!(job_id = %job.id, "stale job changed during sweep, skipped");
                    report.skipped.push(job.id);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(report)
    }

    // ── Loading ────────────────────────────────────────────────────────

    fn load_document(&self, id: DocumentId) -> Result<Versioned<Document>, PipelineError> {
        self.store
            .get_document(id)?
            .ok_or(PipelineError::DocumentNotFound(id))
    }

    fn load_job(&self, id: JobId) -> Result<Versioned<DocumentJob>, PipelineError> {
        self.store.get_job(id)?.ok_or(PipelineError::JobNotFound(id))
    }

    fn load_pair(
        &self,
        job_id: JobId,
    ) -> Result<(Versioned<DocumentJob>, Versioned<Document>), PipelineError> {
        let job = self.load_job(job_id)?;
        let document = self.load_document(job.record.document_id)?;
        Ok((job, document))
    }
}
