//! # fiscal-state — Lifecycle State Machines
//!
//! Runtime-checked state machines for the two records the pipeline moves
//! through its queue. Each machine validates the edge, mutates the record
//! and appends a transition record, in that order; a rejected transition
//! leaves the record untouched.
//!
//! ## State Machines
//!
//! - **Document** (`document.rs`):
//!   `UPLOADED → {QUEUED, PROCESSING} → {SUCCEEDED, FAILED}`, with
//!   `QUEUED → PROCESSING` and `FAILED → QUEUED` (manual reprocess).
//!
//! - **Job** (`job.rs`): `QUEUED → RUNNING → {SUCCEEDED, QUEUED, FAILED}`.
//!   A failed attempt re-queues with backoff until `max_attempts`, then
//!   fails for good. Permanent errors and operator force-fails skip the
//!   retry budget.
//!
//! - **Backoff** (`retry.rs`): exponential delay between re-queues.
//!
//! - **Stale runs** (`sweeper.rs`): pure detection of jobs stuck in
//!   RUNNING past a threshold.
//!
//! ## Time
//!
//! Every transition takes `now` explicitly. Nothing here reads the wall
//! clock; the pipeline passes its injected clock's value.

pub mod document;
pub mod job;
pub mod retry;
pub mod sweeper;

pub use document::{
    Document, DocumentError, DocumentStatus, DocumentTransitionRecord, DocumentType, NewDocument,
};
pub use job::{
    DocumentJob, FailureOutcome, JobError, JobStatus, JobTransitionRecord, JobType, NewJob,
};
pub use retry::RetryPolicy;
pub use sweeper::{stale_transition, StaleRun};
