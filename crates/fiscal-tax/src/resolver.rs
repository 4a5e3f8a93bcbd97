//! # Tax Matrix Resolver
//!
//! Resolves exactly one active [`TaxRule`] for a route and derives the
//! immutable [`TaxCalculationResult`] consumed by the calculator and the
//! document builder.
//!
//! Intrastate (origin == destination) selects the rule's internal CFOP,
//! anything else the interstate one. Zero matches is a configuration error
//! ([`TaxError::NoTaxRuleConfigured`]); the resolver never falls back to a
//! default rate.

use std::sync::Arc;

use chrono::NaiveDate;
use fiscal_core::{Clock, JurisdictionCode, OrganizationId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::TaxError;
use crate::rule::{TaxRegime, TaxRule};
use crate::source::{RuleQuery, TaxRuleSource};

/// Rates and codes derived from one rule for one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxCalculationResult {
    /// Rule this result was derived from.
    pub rule_id: String,
    /// Principal rate, percent.
    pub rate: Decimal,
    /// Secondary rate, percent.
    pub secondary_rate: Option<Decimal>,
    /// Base reduction, percent.
    pub reduction: Decimal,
    /// Additional rate, percent.
    pub additional_rate: Decimal,
    /// CFOP selected by the intra/interstate branch.
    pub operation_code: String,
    /// Tax status code.
    pub cst: String,
    /// Whether origin and destination differ.
    pub interstate: bool,
    /// Rule window start.
    pub valid_from: NaiveDate,
    /// Rule window end (exclusive).
    pub valid_to: Option<NaiveDate>,
    /// Date the rule was resolved for.
    pub as_of: NaiveDate,
}

impl TaxCalculationResult {
    /// Derive a result from a rule.
    pub fn from_rule(rule: &TaxRule, as_of: NaiveDate) -> Self {
        let interstate = rule.origin != rule.destination;
        let operation_code = if interstate {
            rule.operation_code_interstate.clone()
        } else {
            rule.operation_code_internal.clone()
        };
        Self {
            rule_id: rule.rule_id.clone(),
            rate: rule.rate,
            secondary_rate: rule.secondary_rate,
            reduction: rule.reduction,
            additional_rate: rule.additional_rate,
            operation_code,
            cst: rule.cst.clone(),
            interstate,
            valid_from: rule.valid_from,
            valid_to: rule.valid_to,
            as_of,
        }
    }
}

/// Looks up rules through a [`TaxRuleSource`].
#[derive(Clone)]
pub struct TaxMatrixResolver {
    source: Arc<dyn TaxRuleSource>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TaxMatrixResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaxMatrixResolver").finish_non_exhaustive()
    }
}

impl TaxMatrixResolver {
    /// Create a resolver over `source`, taking "today" from `clock`.
    pub fn new(source: Arc<dyn TaxRuleSource>, clock: Arc<dyn Clock>) -> Self {
        Self { source, clock }
    }

    /// Resolve the rule for a route.
    ///
    /// `as_of` defaults to the clock's current UTC date.
    ///
    /// # Errors
    ///
    /// - [`TaxError::NoTaxRuleConfigured`] when no rule is active.
    /// - [`TaxError::AmbiguousTaxRule`] when the source returns several.
    /// - Whatever the source itself fails with.
    pub fn resolve(
        &self,
        organization: OrganizationId,
        origin: JurisdictionCode,
        destination: JurisdictionCode,
        regime: TaxRegime,
        as_of: Option<NaiveDate>,
    ) -> Result<TaxCalculationResult, TaxError> {
        let as_of = as_of.unwrap_or_else(|| self.clock.now().date_naive());
        let query = RuleQuery {
            organization,
            origin,
            destination,
            regime,
            as_of,
        };
        let mut rules = self.source.active_rules(&query)?;

        match rules.len() {
            0 => Err(TaxError::NoTaxRuleConfigured {
                organization,
                origin,
                destination,
                regime,
                as_of,
            }),
            1 => {
                let rule = rules.remove(0);
                let result = TaxCalculationResult::from_rule(&rule, as_of);
                tracing::debug!(
                    %organization,
                    origin = origin.as_str(),
                    destination = destination.as_str(),
                    %regime,
                    %as_of,
                    rule_id = %result.rule_id,
                    operation_code = %result.operation_code,
                    "resolved tax rule"
                );
                Ok(result)
            }
            _ => Err(TaxError::AmbiguousTaxRule {
                origin,
                destination,
                rule_ids: rules.into_iter().map(|r| r.rule_id).collect(),
            }),
        }
    }
}
