//! # Storage Contract
//!
//! The pipeline needs three things from storage: read a record by id with
//! its version, list jobs by status, and commit several writes atomically
//! where each write names the version it expects to replace. A commit
//! whose expectations do not all hold changes nothing and fails with
//! [`StoreError::VersionConflict`]; that is how two workers racing for the
//! same job are told apart.
//!
//! [`MemoryStore`] implements the contract under a single `parking_lot`
//! lock. The lock is never held across `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use fiscal_core::{DocumentId, JobId};
use fiscal_state::{Document, DocumentJob, JobStatus};
use parking_lot::RwLock;
use thiserror::Error;

/// Optimistic-concurrency version. A freshly inserted record is at 1.
pub type Version = u64;

/// A record and the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    /// Version at read time.
    pub version: Version,
    /// The record.
    pub record: T,
}

/// Storage failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Another writer got there first, or an insert hit an existing id.
    #[error("version conflict on {kind} {id}: expected {expected:?}, found {found:?}")]
    VersionConflict {
        /// `"document"` or `"job"`.
        kind: &'static str,
        /// Record id.
        id: String,
        /// Version the writer expected (`None` for an insert).
        expected: Option<Version>,
        /// Version actually stored (`None` when absent).
        found: Option<Version>,
    },

    /// Backend unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One row of a [`WriteSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    /// Insert (`expected: None`) or replace a document.
    Document {
        /// New state.
        record: Document,
        /// Version being replaced.
        expected: Option<Version>,
    },
    /// Insert (`expected: None`) or replace a job.
    Job {
        /// New state.
        record: DocumentJob,
        /// Version being replaced.
        expected: Option<Version>,
    },
}

/// Writes committed together or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteSet {
    writes: Vec<Write>,
}

impl WriteSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new document.
    pub fn insert_document(mut self, record: Document) -> Self {
        self.writes.push(Write::Document { record, expected: None });
        self
    }

    /// Replace a document read at `expected`.
    pub fn update_document(mut self, record: Document, expected: Version) -> Self {
        self.writes.push(Write::Document {
            record,
            expected: Some(expected),
        });
        self
    }

    /// Insert a new job.
    pub fn insert_job(mut self, record: DocumentJob) -> Self {
        self.writes.push(Write::Job { record, expected: None });
        self
    }

    /// Replace a job read at `expected`.
    pub fn update_job(mut self, record: DocumentJob, expected: Version) -> Self {
        self.writes.push(Write::Job {
            record,
            expected: Some(expected),
        });
        self
    }

    /// Whether nothing would be written.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// The writes, in order.
    pub fn writes(&self) -> &[Write] {
        &self.writes
    }
}

/// What the pipeline requires from persistent storage.
pub trait PipelineStore: Send + Sync {
    /// Read a document.
    fn get_document(&self, id: DocumentId) -> Result<Option<Versioned<Document>>, StoreError>;

    /// Read a job.
    fn get_job(&self, id: JobId) -> Result<Option<Versioned<DocumentJob>>, StoreError>;

    /// Jobs in `status`, oldest `available_at` first.
    fn list_jobs(&self, status: JobStatus) -> Result<Vec<Versioned<DocumentJob>>, StoreError>;

    /// Every job of a document, oldest first.
    fn jobs_for_document(&self, id: DocumentId) -> Result<Vec<Versioned<DocumentJob>>, StoreError>;

    /// Apply `writes` atomically.
    fn commit(&self, writes: WriteSet) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct Tables {
    documents: HashMap<DocumentId, Versioned<Document>>,
    jobs: HashMap<JobId, Versioned<DocumentJob>>,
}

/// Thread-safe, cloneable in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub fn job_count(&self) -> usize {
        self.tables.read().jobs.len()
    }
}

fn check(
    kind: &'static str,
    id: String,
    expected: Option<Version>,
    found: Option<Version>,
) -> Result<(), StoreError> {
    if expected == found {
        Ok(())
    } else {
        Err(StoreError::VersionConflict {
            kind,
            id,
            expected,
            found,
        })
    }
}

impl PipelineStore for MemoryStore {
    fn get_document(&self, id: DocumentId) -> Result<Option<Versioned<Document>>, StoreError> {
        Ok(self.tables.read().documents.get(&id).cloned())
    }

    fn get_job(&self, id: JobId) -> Result<Option<Versioned<DocumentJob>>, StoreError> {
        Ok(self.tables.read().jobs.get(&id).cloned())
    }

    fn list_jobs(&self, status: JobStatus) -> Result<Vec<Versioned<DocumentJob>>, StoreError> {
        let mut jobs: Vec<_> = self
            .tables
            .read()
            .jobs
            .values()
            .filter(|j| j.record.status == status)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| (j.record.available_at, j.record.created_at, j.record.id));
        Ok(jobs)
    }

    fn jobs_for_document(&self, id: DocumentId) -> Result<Vec<Versioned<DocumentJob>>, StoreError> {
        let mut jobs: Vec<_> = self
            .tables
            .read()
            .jobs
            .values()
            .filter(|j| j.record.document_id == id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| (j.record.created_at, j.record.id));
        Ok(jobs)
    }

    fn commit(&self, writes: WriteSet) -> Result<(), StoreError> {
        let mut tables = self.tables.write();

        for write in &writes.writes {
            match write {
                Write::Document { record, expected } => check(
                    "document",
                    record.id.to_string(),
                    *expected,
                    tables.documents.get(&record.id).map(|v| v.version),
                )?,
                Write::Job { record, expected } => check(
                    "job",
                    record.id.to_string(),
                    *expected,
                    tables.jobs.get(&record.id).map(|v| v.version),
                )?,
            }
        }

        for write in writes.writes {
            match write {
                Write::Document { record, expected } => {
                    let version = expected.map_or(1, |v| v + 1);
                    tables.documents.insert(record.id, Versioned { version, record });
                }
                Write::Job { record, expected } => {
                    let version = expected.map_or(1, |v| v + 1);
                    tables.jobs.insert(record.id, Versioned { version, record });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fiscal_core::{BranchId, OrganizationId};
    use fiscal_state::{DocumentType, JobType, NewDocument, NewJob};
    use serde_json::json;

    fn doc() -> Document {
        Document::new(
            NewDocument {
                organization: OrganizationId::new(),
                branch: BranchId::new(),
                document_type: DocumentType::Invoice,
                file_name: "nf-001.xml".into(),
                mime_type: "application/xml".into(),
                size_bytes: 2048,
                storage_pointer: "s3://fiscal/nf-001.xml".into(),
            },
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn job_for(d: &Document) -> DocumentJob {
        DocumentJob::new(
            NewJob {
                organization: d.organization,
                branch: d.branch,
                document_id: d.id,
                job_type: JobType::TaxCalculation,
                payload: json!({}),
            },
            3,
            d.created_at,
        )
        .unwrap()
    }

    #[test]
    fn insert_starts_at_version_one() {
        let store = MemoryStore::new();
        let d = doc();
        store.commit(WriteSet::new().insert_document(d.clone())).unwrap();
        let read = store.get_document(d.id).unwrap().unwrap();
        assert_eq!(read.version, 1);
        assert_eq!(read.record, d);
    }

    #[test]
    fn stale_version_conflicts() {
        let store = MemoryStore::new();
        let d = doc();
        store.commit(WriteSet::new().insert_document(d.clone())).unwrap();
        store.commit(WriteSet::new().update_document(d.clone(), 1)).unwrap();
        let err = store.commit(WriteSet::new().update_document(d.clone(), 1)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict {
                kind: "document",
                expected: Some(1),
                found: Some(2),
                ..
            }
        ));
    }

    #[test]
    fn duplicate_insert_conflicts() {
        let store = MemoryStore::new();
        let d = doc();
        store.commit(WriteSet::new().insert_document(d.clone())).unwrap();
        assert!(store.commit(WriteSet::new().insert_document(d)).is_err());
    }

    #[test]
    fn failed_commit_writes_nothing() {
        let store = MemoryStore::new();
        let d = doc();
        let j = job_for(&d);
        store.commit(WriteSet::new().insert_document(d.clone())).unwrap();

        // The job insert is valid but the document expectation is not.
        let err = store.commit(WriteSet::new().insert_job(j.clone()).update_document(d, 7));
        assert!(err.is_err());
        assert!(store.get_job(j.id).unwrap().is_none());
        assert_eq!(store.job_count(), 0);
    }

    #[test]
    fn list_by_status_in_availability_order() {
        let store = MemoryStore::new();
        let d = doc();
        let mut late = job_for(&d);
        late.available_at = late.available_at + chrono::Duration::minutes(5);
        let early = job_for(&d);
        store
            .commit(
                WriteSet::new()
                    .insert_document(d.clone())
                    .insert_job(late.clone())
                    .insert_job(early.clone()),
            )
            .unwrap();
        let ids: Vec<_> = store
            .list_jobs(JobStatus::Queued)
            .unwrap()
            .into_iter()
            .map(|j| j.record.id)
            .collect();
        assert_eq!(ids, vec![early.id, late.id]);
        assert!(store.list_jobs(JobStatus::Running).unwrap().is_empty());
        assert_eq!(store.jobs_for_document(d.id).unwrap().len(), 2);
    }
}
