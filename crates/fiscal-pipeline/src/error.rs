//! Pipeline service errors.

use fiscal_core::{DocumentId, FiscalError, JobId};
use fiscal_state::{DocumentError, JobError};
use thiserror::Error;

use crate::store::StoreError;

/// Errors from [`Pipeline`](crate::service::Pipeline) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// Storage failed or a concurrent writer won.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Document construction or transition rejected.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Job construction or transition rejected.
    #[error(transparent)]
    Job(#[from] JobError),

    /// No such document.
    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),

    /// No such job.
    #[error("job {0} not found")]
    JobNotFound(JobId),

    /// Reprocess needs a previous job to copy.
    #[error("document {0} has no previous job to reprocess")]
    NothingToReprocess(DocumentId),
}

impl PipelineError {
    /// Whether a concurrent writer changed the records first.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::VersionConflict { .. }))
    }
}

impl From<PipelineError> for FiscalError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Document(DocumentError::Transition(t))
            | PipelineError::Job(JobError::Transition(t)) => FiscalError::StateTransition(t),
            PipelineError::Document(DocumentError::Validation(v)) => FiscalError::Validation(v),
            other => FiscalError::Configuration(other.to_string()),
        }
    }
}
