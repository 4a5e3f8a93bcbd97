//! # fiscal-tax — Tax Engine
//!
//! Everything that turns an operation into tax numbers:
//!
//! - **Tax matrix** ([`rule`], [`source`], [`resolver`]): time-versioned
//!   rules keyed by (organization, origin, destination, regime), resolved
//!   to exactly one active rule per instant.
//! - **Rule calculator** ([`calculator`]): applies a resolved rule to a
//!   gross value (base reduction, principal, additional and secondary
//!   values, effective rate).
//! - **Scenario calculator** ([`scenario`]): the operation-type aware
//!   ICMS/PIS/COFINS/ISS estimate with the special-regime and IBS/CBS
//!   preview branches.
//! - **IBS/CBS group** ([`ibs_cbs`]): the dual-VAT value object and its
//!   arithmetic consistency checks.
//!
//! ## Determinism
//!
//! No function in this crate reads the wall clock or performs I/O except
//! through the injected [`fiscal_core::Clock`] and [`TaxRuleSource`].
//! Identical inputs always produce identical outputs.

pub mod calculator;
pub mod error;
pub mod ibs_cbs;
pub mod resolver;
pub mod rule;
pub mod scenario;
pub mod source;

pub use calculator::{compute_tax, TaxComputation};
pub use error::TaxError;
pub use ibs_cbs::{
    Deferral, GovernmentEntity, GovernmentPurchase, IbsCbsError, IbsCbsGroup, IbsCbsParams,
    PresumedCredit, RateReduction, Refund, TaxPair,
};
pub use resolver::{TaxCalculationResult, TaxMatrixResolver};
pub use rule::{RuleKey, TaxRegime, TaxRule, TaxRuleSet};
pub use scenario::{
    DualVatPreview, OperationType, ScenarioCalculator, ScenarioRates, ScenarioRequest,
    ScenarioResult, TaxLine,
};
pub use source::{RuleQuery, TaxRuleSource};
