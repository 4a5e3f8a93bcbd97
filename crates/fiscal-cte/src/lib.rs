//! # fiscal-cte — CT-e Emission
//!
//! Builds transport documents (CT-e, model 57):
//!
//! - [`access_key`]: the 44-digit key and its mod-11 check digit.
//! - [`sequence`]: per-branch, per-series atomic numbering.
//! - [`document`]: the immutable document model.
//! - [`builder`]: the insurance gate, tax blocks, numbering and key
//!   assembly, plus void-and-reissue.

pub mod access_key;
pub mod builder;
pub mod document;
pub mod sequence;

pub use access_key::{
    generate_access_key, mod11_check_digit, AccessKey, AccessKeyComponents, AccessKeyError,
    AccessKeyParams, ACCESS_KEY_LEN,
};
pub use builder::{BuildError, BuilderSettings, DocumentBuilder, Reissue, ShipmentOrder};
pub use document::{
    Cargo, Counterparty, CounterpartyRole, DocumentHeader, FiscalDocument, IcmsBlock, Insurance,
    InsuranceInfo, Party, ServiceComponent, ServiceValue, VoidNotice, CTE_MODEL,
};
pub use sequence::{MemorySequenceCounter, SequenceCounter, SequenceError, MAX_DOCUMENT_NUMBER};
