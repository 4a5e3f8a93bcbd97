//! Per-branch document numbering.
//!
//! Numbers are allocated from an atomic counter keyed by (branch, series),
//! never by reading the last emitted document. A number is consumed only
//! when a build reaches the allocation step; a build that fails afterwards
//! leaves a gap, which is acceptable.

use std::collections::HashMap;

use fiscal_core::BranchId;
use parking_lot::Mutex;
use thiserror::Error;

/// Highest number a CT-e may carry.
pub const MAX_DOCUMENT_NUMBER: u32 = 999_999_999;

/// Sequence allocation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    /// Every number of the series has been used.
    #[error("document numbers exhausted for branch {branch}, series {series}")]
    Exhausted {
        /// Branch.
        branch: BranchId,
        /// Series.
        series: u16,
    },

    /// The backing counter could not be reached.
    #[error("sequence counter unavailable: {0}")]
    Unavailable(String),
}

/// Monotonic counter contract.
///
/// `next` must be atomic: two concurrent callers never receive the same
/// number for the same (branch, series).
pub trait SequenceCounter: Send + Sync {
    /// Allocate the next number, starting at 1.
    fn next(&self, branch: BranchId, series: u16) -> Result<u32, SequenceError>;

    /// Last number allocated, 0 if none.
    fn current(&self, branch: BranchId, series: u16) -> Result<u32, SequenceError>;
}

/// In-process counter under a single lock.
#[derive(Debug, Default)]
pub struct MemorySequenceCounter {
    counters: Mutex<HashMap<(BranchId, u16), u32>>,
}

impl MemorySequenceCounter {
    /// Counter with every series at 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume a series after `last` (e.g. after migrating from another
    /// system).
    pub fn with_last(self, branch: BranchId, series: u16, last: u32) -> Self {
        self.counters.lock().insert((branch, series), last);
        self
    }
}

impl SequenceCounter for MemorySequenceCounter {
    fn next(&self, branch: BranchId, series: u16) -> Result<u32, SequenceError> {
        let mut counters = self.counters.lock();
        let slot = counters.entry((branch, series)).or_insert(0);
        if *slot >= MAX_DOCUMENT_NUMBER {
            return Err(SequenceError::Exhausted { branch, series });
        }
        *slot += 1;
        Ok(*slot)
    }

    fn current(&self, branch: BranchId, series: u16) -> Result<u32, SequenceError> {
        Ok(self
            .counters
            .lock()
            .get(&(branch, series))
            .copied()
            .unwrap_or(0))
    }
}
