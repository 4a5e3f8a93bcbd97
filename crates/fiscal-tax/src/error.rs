//! Tax engine errors.

use chrono::NaiveDate;
use fiscal_core::{FiscalError, JurisdictionCode, OrganizationId, ValidationError};
use thiserror::Error;

use crate::rule::TaxRegime;

/// Errors raised by rule management, resolution and calculation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaxError {
    /// Malformed input. Permanent.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No rule is active for the route. The request was well-formed; the
    /// organization's tax matrix is incomplete.
    #[error(
        "tax matrix not configured: rule missing for route {origin}->{destination} \
         (regime {regime}, organization {organization}, as of {as_of})"
    )]
    NoTaxRuleConfigured {
        /// Tenant whose matrix was searched.
        organization: OrganizationId,
        /// Origin UF.
        origin: JurisdictionCode,
        /// Destination UF.
        destination: JurisdictionCode,
        /// Regime searched.
        regime: TaxRegime,
        /// Reference date.
        as_of: NaiveDate,
    },

    /// The source returned more than one active rule for one instant.
    #[error("ambiguous tax matrix for route {origin}->{destination}: rules {rule_ids:?} are all active")]
    AmbiguousTaxRule {
        /// Origin UF.
        origin: JurisdictionCode,
        /// Destination UF.
        destination: JurisdictionCode,
        /// Ids of every matching rule.
        rule_ids: Vec<String>,
    },

    /// Inserting the rule would make two rules active at once.
    #[error("rule {candidate} overlaps the validity window of rule {existing}")]
    OverlappingRule {
        /// Rule already in the set.
        existing: String,
        /// Rule being inserted.
        candidate: String,
    },

    /// A rule whose window ends before it starts, or with malformed codes.
    #[error("invalid tax rule {rule_id}: {reason}")]
    InvalidRule {
        /// Offending rule.
        rule_id: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The gross value cannot carry a rate computation (zero or negative).
    #[error("invalid operation value: {0} (effective rate is undefined)")]
    InvalidOperationValue(String),

    /// The rule source could not be read.
    #[error("tax rule source unavailable: {0}")]
    SourceUnavailable(String),
}

impl TaxError {
    /// Whether retrying the same request could succeed.
    ///
    /// Only an unreachable rule source is transient; everything else is a
    /// permanent rejection of the request or of the configuration.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SourceUnavailable(_))
    }
}

impl From<TaxError> for FiscalError {
    fn from(err: TaxError) -> Self {
        match err {
            TaxError::Validation(v) => FiscalError::Validation(v),
            other => FiscalError::Configuration(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_rule_message_names_route() {
        let err = TaxError::NoTaxRuleConfigured {
            organization: OrganizationId::new(),
            origin: JurisdictionCode::SP,
            destination: JurisdictionCode::RJ,
            regime: TaxRegime::Normal,
            as_of: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
        };
        let msg = err.to_string();
        assert!(msg.contains("rule missing for route SP->RJ"));
        assert!(msg.contains("2026-01-10"));
        assert!(!err.is_transient());
    }

    #[test]
    fn validation_converts_into_fiscal_validation() {
        let err: FiscalError =
            TaxError::Validation(ValidationError::InvalidValue("0".into())).into();
        assert!(matches!(err, FiscalError::Validation(_)));
    }

    #[test]
    fn configuration_errors_convert_into_fiscal_configuration() {
        let err: FiscalError = TaxError::AmbiguousTaxRule {
            origin: JurisdictionCode::SP,
            destination: JurisdictionCode::SP,
            rule_ids: vec!["a".into(), "b".into()],
        }
        .into();
        assert!(matches!(err, FiscalError::Configuration(_)));
    }

    #[test]
    fn source_unavailable_is_transient() {
        assert!(TaxError::SourceUnavailable("timeout".into()).is_transient());
    }
}
