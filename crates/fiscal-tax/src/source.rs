//! Read-only access to the tax matrix.
//!
//! The resolver never touches storage directly; it asks a
//! [`TaxRuleSource`] for the rules active on a date. The in-memory
//! [`TaxRuleSet`] is one implementation; a database-backed one lives with
//! the hosting application.

use chrono::NaiveDate;
use fiscal_core::{JurisdictionCode, OrganizationId};

use crate::error::TaxError;
use crate::rule::{RuleKey, TaxRegime, TaxRule, TaxRuleSet};

/// Filter for [`TaxRuleSource::active_rules`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleQuery {
    /// Tenant.
    pub organization: OrganizationId,
    /// Origin UF.
    pub origin: JurisdictionCode,
    /// Destination UF.
    pub destination: JurisdictionCode,
    /// Regime.
    pub regime: TaxRegime,
    /// Date the rule must be active on.
    pub as_of: NaiveDate,
}

impl RuleQuery {
    /// The rule key this query targets.
    pub fn key(&self) -> RuleKey {
        RuleKey {
            organization: self.organization,
            origin: self.origin,
            destination: self.destination,
            regime: self.regime,
        }
    }
}

/// Source of tax rules.
///
/// Implementations return every rule matching the query; uniqueness is
/// checked by the resolver so that a misconfigured source surfaces as
/// [`TaxError::AmbiguousTaxRule`] instead of an arbitrary pick.
pub trait TaxRuleSource: Send + Sync {
    /// Rules for `query.key()` active on `query.as_of`.
    fn active_rules(&self, query: &RuleQuery) -> Result<Vec<TaxRule>, TaxError>;
}

impl TaxRuleSource for TaxRuleSet {
    fn active_rules(&self, query: &RuleQuery) -> Result<Vec<TaxRule>, TaxError> {
        Ok(self
            .active(&query.key(), query.as_of)
            .into_iter()
            .cloned()
            .collect())
    }
}
