//! # Document Lifecycle
//!
//! ```text
//! Uploaded ──▶ Queued ──▶ Processing ──▶ Succeeded | Failed
//!    │           │                              │
//!    │           └──▶ Succeeded | Failed        │
//!    └──▶ Processing                            │
//!                ▲                              │
//!                └──── Queued ◀─────────────────┘ (reprocess)
//! ```
//!
//! Documents are never deleted. `Succeeded` is terminal; `Failed` only
//! leaves through a manual reprocess back to `Queued`.

use chrono::{DateTime, Utc};
use fiscal_core::{BranchId, DocumentId, OrganizationId, StateTransitionError, ValidationError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─── Document Type & Status ──────────────────────────────────────────

/// Kind of uploaded artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Commercial invoice.
    Invoice,
    /// Bank statement.
    BankStatement,
    /// Transport manifest (feeds CT-e emission).
    TransportManifest,
}

/// Lifecycle status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    /// Stored, nothing scheduled yet.
    Uploaded,
    /// A job is waiting for a worker.
    Queued,
    /// A worker is executing the job.
    Processing,
    /// Terminal success.
    Succeeded,
    /// Processing gave up. Can be reprocessed.
    Failed,
}

impl DocumentStatus {
    /// Whether `self → to` is an edge of the machine.
    pub fn can_transition_to(&self, to: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, to),
            (Uploaded, Queued)
                | (Uploaded, Processing)
                | (Queued, Processing)
                | (Queued, Succeeded)
                | (Queued, Failed)
                | (Processing, Succeeded)
                | (Processing, Failed)
                | (Failed, Queued)
        )
    }

    /// Whether no edge leaves this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uploaded => "UPLOADED",
            Self::Queued => "QUEUED",
            Self::Processing => "PROCESSING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Errors from document construction and transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// The edge is not part of the machine.
    #[error(transparent)]
    Transition(#[from] StateTransitionError),

    /// Upload metadata is malformed.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

// ─── Transition Record ───────────────────────────────────────────────

/// One entry of a document's audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTransitionRecord {
    /// Status before.
    pub from: DocumentStatus,
    /// Status after.
    pub to: DocumentStatus,
    /// When.
    pub at: DateTime<Utc>,
    /// Why.
    pub reason: String,
}

// ─── Document ────────────────────────────────────────────────────────

/// Upload metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    /// Tenant.
    pub organization: OrganizationId,
    /// Branch.
    pub branch: BranchId,
    /// Artifact kind.
    pub document_type: DocumentType,
    /// Original file name.
    pub file_name: String,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Where the blob lives in object storage.
    pub storage_pointer: String,
}

/// An uploaded fiscal artifact and its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier.
    pub id: DocumentId,
    /// Tenant.
    pub organization: OrganizationId,
    /// Branch.
    pub branch: BranchId,
    /// Artifact kind.
    pub document_type: DocumentType,
    /// Original file name.
    pub file_name: String,
    /// MIME type.
    pub mime_type: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Object storage pointer.
    pub storage_pointer: String,
    /// Current status.
    pub status: DocumentStatus,
    /// Upload instant.
    pub created_at: DateTime<Utc>,
    /// Last transition instant.
    pub updated_at: DateTime<Utc>,
    /// Ordered transition log.
    pub transitions: Vec<DocumentTransitionRecord>,
}

impl Document {
    /// Register an upload. The document starts in `Uploaded`.
    ///
    /// # Errors
    ///
    /// [`DocumentError::Validation`] when the file name, MIME type or
    /// storage pointer is blank.
    pub fn new(upload: NewDocument, now: DateTime<Utc>) -> Result<Self, DocumentError> {
        for (field, value) in [
            ("file_name", &upload.file_name),
            ("mime_type", &upload.mime_type),
            ("storage_pointer", &upload.storage_pointer),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::MissingField(field).into());
            }
        }
        Ok(Self {
            id: DocumentId::new(),
            organization: upload.organization,
            branch: upload.branch,
            document_type: upload.document_type,
            file_name: upload.file_name,
            mime_type: upload.mime_type,
            size_bytes: upload.size_bytes,
            storage_pointer: upload.storage_pointer,
            status: DocumentStatus::Uploaded,
            created_at: now,
            updated_at: now,
            transitions: Vec::new(),
        })
    }

    /// A job was enqueued for the document (UPLOADED or FAILED → QUEUED).
    pub fn enqueue(&mut self, now: DateTime<Utc>, reason: &str) -> Result<(), DocumentError> {
        self.transition(DocumentStatus::Queued, now, reason)
    }

    /// A worker picked the document up (UPLOADED or QUEUED → PROCESSING).
    pub fn start_processing(&mut self, now: DateTime<Utc>) -> Result<(), DocumentError> {
        self.transition(DocumentStatus::Processing, now, "worker started processing")
    }

    /// Terminal success.
    pub fn succeed(&mut self, now: DateTime<Utc>) -> Result<(), DocumentError> {
        self.transition(DocumentStatus::Succeeded, now, "job succeeded")
    }

    /// Processing gave up.
    pub fn fail(&mut self, now: DateTime<Utc>, reason: &str) -> Result<(), DocumentError> {
        self.transition(DocumentStatus::Failed, now, reason)
    }

    /// Apply any permitted edge.
    ///
    /// # Errors
    ///
    /// [`StateTransitionError::InvalidStatusTransition`] when `to` is not
    /// reachable from the current status. The document is left unchanged.
    pub fn transition(
        &mut self,
        to: DocumentStatus,
        now: DateTime<Utc>,
        reason: &str,
    ) -> Result<(), DocumentError> {
        if !self.status.can_transition_to(to) {
            return Err(StateTransitionError::InvalidStatusTransition {
                entity: "document",
                id: self.id.to_string(),
                from: self.status.to_string(),
                to: to.to_string(),
            }
            .into());
        }
        self.transitions.push(DocumentTransitionRecord {
            from: self.status,
            to,
            at: now,
            reason: reason.to_string(),
        });
        self.status = to;
        self.updated_at = now;
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────
