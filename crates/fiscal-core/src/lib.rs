#![deny(missing_docs)]

//! # fiscal-core — Foundational Types for the Fiscal Document Pipeline
//!
//! Every other crate in the workspace depends on this one. It has no
//! internal crate dependencies.
//!
//! ## Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** Identifiers are distinct
//!    types. You cannot pass a [`BranchId`] where an [`OrganizationId`] is
//!    expected, and a [`Cnpj`] is always 14 digits.
//!
//! 2. **Decimal money only.** Amounts and rates are [`rust_decimal::Decimal`].
//!    All monetary outputs go through [`round_money`], which rounds to two
//!    places with midpoint-away-from-zero semantics.
//!
//! 3. **Injectable time and randomness.** Anything time- or
//!    entropy-dependent takes a [`Clock`] or [`RandomSource`] so tests can
//!    freeze both.
//!
//! 4. **[`FiscalError`] hierarchy.** Structured errors with `thiserror`, no
//!    `.unwrap()` outside tests.

pub mod error;
pub mod identity;
pub mod jurisdiction;
pub mod money;
pub mod random;
pub mod temporal;

pub use error::{FiscalError, StateTransitionError, ValidationError};
pub use identity::{BranchId, ClassificationCode, Cnpj, DocumentId, JobId, OrganizationId};
pub use jurisdiction::{JurisdictionCode, Region};
pub use money::{
    check_percentage, percent_of, round_money, Currency, Money, CONSISTENCY_TOLERANCE,
    MONEY_SCALE,
};
pub use random::{OsRandom, RandomSource, SeededRandom};
pub use temporal::{Clock, FixedClock, SystemClock};
