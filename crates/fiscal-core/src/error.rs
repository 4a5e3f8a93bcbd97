//! # Error Hierarchy
//!
//! Structured error types shared by the whole pipeline, built with
//! `thiserror`. Subsystem crates define their own enums and convert into
//! [`FiscalError`] where a caller needs one type.
//!
//! The taxonomy matters operationally: validation, configuration and
//! compliance errors are permanent and never retried; only transient
//! execution errors inside a job are.

use thiserror::Error;

/// Top-level error type for the fiscal pipeline.
#[derive(Error, Debug)]
pub enum FiscalError {
    /// Bad input shape or range. Permanent.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A lifecycle transition that the state machine does not permit.
    #[error("state transition error: {0}")]
    StateTransition(#[from] StateTransitionError),

    /// The request was well-formed but the system lacks data to serve it.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A regulatory gate blocked document construction.
    #[error("compliance gate failed: {0}")]
    Compliance(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors during lifecycle transitions of documents and jobs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateTransitionError {
    /// The attempted transition is not an edge of the state machine.
    #[error("invalid {entity} status transition for {id}: {from} -> {to}")]
    InvalidStatusTransition {
        /// Which machine rejected it ("document" or "job").
        entity: &'static str,
        /// Record identifier.
        id: String,
        /// Current status.
        from: String,
        /// Attempted target status.
        to: String,
    },
}

/// Validation errors for inputs and domain primitives.
///
/// Each variant carries the rejected input so operators can diagnose bad
/// requests without guesswork.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Operation type is not one of venda, compra, transferencia, devolucao.
    #[error("invalid operation type: \"{0}\" (expected venda, compra, transferencia or devolucao)")]
    InvalidOperationType(String),

    /// Jurisdiction is not a known 2-letter UF code.
    #[error("invalid jurisdiction code: \"{0}\" (expected a 2-letter UF such as SP)")]
    InvalidJurisdiction(String),

    /// Operation value must be strictly positive.
    #[error("invalid value: {0} (must be greater than zero)")]
    InvalidValue(String),

    /// NCM classification code must be exactly 8 digits.
    #[error("invalid classification code: \"{0}\" (expected exactly 8 digits)")]
    InvalidClassificationCode(String),

    /// CNPJ must have 14 digits once punctuation is removed.
    #[error("invalid tax id: \"{0}\" (expected 14-digit CNPJ)")]
    InvalidTaxId(String),

    /// Currency must be a 3-letter uppercase ISO 4217 code.
    #[error("invalid currency code: \"{0}\" (expected 3 uppercase letters)")]
    InvalidCurrency(String),

    /// Tax regime is not one of the supported categories.
    #[error("invalid tax regime: \"{0}\" (expected normal, simplified or presumed_profit)")]
    InvalidRegime(String),

    /// An amount computation does not fit in a 96-bit decimal.
    #[error("amount out of range: {0}")]
    AmountOutOfRange(String),

    /// A mandatory text field is blank.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// A percentage field is outside [0, 100].
    #[error("percentage {field} out of range: {value} (expected 0 to 100)")]
    PercentageOutOfRange {
        /// Field name.
        field: &'static str,
        /// Rejected value.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fiscal_error_validation_display() {
        let err = FiscalError::Validation(ValidationError::InvalidJurisdiction("XX".into()));
        let msg = format!("{err}");
        assert!(msg.contains("validation error"));
        assert!(msg.contains("XX"));
    }

    #[test]
    fn fiscal_error_state_transition_display() {
        let err = FiscalError::StateTransition(StateTransitionError::InvalidStatusTransition {
            entity: "document",
            id: "doc-1".into(),
            from: "SUCCEEDED".into(),
            to: "QUEUED".into(),
        });
        let msg = format!("{err}");
        assert!(msg.contains("SUCCEEDED"));
        assert!(msg.contains("QUEUED"));
        assert!(msg.contains("doc-1"));
    }

    #[test]
    fn configuration_and_compliance_display() {
        let cfg = FiscalError::Configuration("rule missing for route SP->RJ".into());
        assert!(format!("{cfg}").contains("SP->RJ"));
        let gate = FiscalError::Compliance("insurance averbation missing".into());
        assert!(format!("{gate}").contains("averbation"));
    }

    #[test]
    fn percentage_error_names_field() {
        let err = ValidationError::PercentageOutOfRange {
            field: "reduction",
            value: "120".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("reduction"));
        assert!(msg.contains("120"));
    }

    #[test]
    fn classification_error_mentions_digits() {
        let err = ValidationError::InvalidClassificationCode("1234".into());
        assert!(format!("{err}").contains("8 digits"));
    }
}
