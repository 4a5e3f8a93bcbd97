//! # Tax Rules
//!
//! A [`TaxRule`] prices one route (origin UF to destination UF) for one
//! organization and regime over a half-open validity window
//! `[valid_from, valid_to)`. A missing `valid_to` means open-ended.
//!
//! [`TaxRuleSet`] is the in-memory rule table. It enforces the matrix
//! invariant at insert time: for a given [`RuleKey`] no two windows may
//! overlap, so at most one rule is active at any instant.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use fiscal_core::{check_percentage, JurisdictionCode, OrganizationId, ValidationError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::TaxError;

// ---------------------------------------------------------------------------
// Regime
// ---------------------------------------------------------------------------

/// Tax treatment category of the emitting organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxRegime {
    /// Regular (non-simplified) taxation.
    Normal,
    /// Simples Nacional.
    Simplified,
    /// Lucro presumido.
    PresumedProfit,
}

impl TaxRegime {
    /// Stable string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Simplified => "simplified",
            Self::PresumedProfit => "presumed_profit",
        }
    }
}

impl fmt::Display for TaxRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaxRegime {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "simplified" | "simples" | "simples_nacional" => Ok(Self::Simplified),
            "presumed_profit" | "lucro_presumido" => Ok(Self::PresumedProfit),
            _ => Err(ValidationError::InvalidRegime(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// Key triple (plus tenant) under which validity windows must not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleKey {
    /// Owning tenant.
    pub organization: OrganizationId,
    /// Origin UF.
    pub origin: JurisdictionCode,
    /// Destination UF.
    pub destination: JurisdictionCode,
    /// Regime.
    pub regime: TaxRegime,
}

/// One row of the tax matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRule {
    /// Stable identifier, carried into results for audit.
    pub rule_id: String,
    /// Owning tenant.
    pub organization: OrganizationId,
    /// Origin UF.
    pub origin: JurisdictionCode,
    /// Destination UF.
    pub destination: JurisdictionCode,
    /// Regime the rule applies to.
    pub regime: TaxRegime,
    /// Principal rate, percent.
    pub rate: Decimal,
    /// Optional secondary rate (e.g. ICMS-ST), percent.
    #[serde(default)]
    pub secondary_rate: Option<Decimal>,
    /// Base reduction, percent.
    #[serde(default)]
    pub reduction: Decimal,
    /// Additional rate (e.g. poverty fund), percent.
    #[serde(default)]
    pub additional_rate: Decimal,
    /// CFOP used when origin == destination.
    pub operation_code_internal: String,
    /// CFOP used when origin != destination.
    pub operation_code_interstate: String,
    /// Tax status code (CST).
    pub cst: String,
    /// First day the rule is active (inclusive).
    pub valid_from: NaiveDate,
    /// First day the rule is no longer active (exclusive). `None` is open-ended.
    #[serde(default)]
    pub valid_to: Option<NaiveDate>,
}

impl TaxRule {
    /// The key under which this rule must not overlap others.
    pub fn key(&self) -> RuleKey {
        RuleKey {
            organization: self.organization,
            origin: self.origin,
            destination: self.destination,
            regime: self.regime,
        }
    }

    /// Whether `date` falls inside `[valid_from, valid_to)`.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        date >= self.valid_from && self.valid_to.map_or(true, |end| date < end)
    }

    /// Whether the two windows share at least one day.
    pub fn overlaps(&self, other: &TaxRule) -> bool {
        let self_starts_before_other_ends = other.valid_to.map_or(true, |end| self.valid_from < end);
        let other_starts_before_self_ends = self.valid_to.map_or(true, |end| other.valid_from < end);
        self_starts_before_other_ends && other_starts_before_self_ends
    }

    /// Check the rule in isolation: window, percentages and codes.
    ///
    /// # Errors
    ///
    /// [`TaxError::InvalidRule`] for a malformed window or code,
    /// [`TaxError::Validation`] for an out-of-range percentage.
    pub fn validate(&self) -> Result<(), TaxError> {
        if self.rule_id.trim().is_empty() {
            return Err(self.invalid("rule id is empty"));
        }
        if let Some(end) = self.valid_to {
            if end <= self.valid_from {
                return Err(self.invalid(format!(
                    "validity window ends ({end}) on or before it starts ({})",
                    self.valid_from
                )));
            }
        }
        check_percentage("rate", self.rate)?;
        check_percentage("reduction", self.reduction)?;
        check_percentage("additional_rate", self.additional_rate)?;
        if let Some(secondary) = self.secondary_rate {
            check_percentage("secondary_rate", secondary)?;
        }
        for (name, code) in [
            ("operation_code_internal", &self.operation_code_internal),
            ("operation_code_interstate", &self.operation_code_interstate),
        ] {
            if !is_operation_code(code) {
                return Err(self.invalid(format!("{name} must be 4 digits, got {code:?}")));
            }
        }
        if self.cst.trim().is_empty() {
            return Err(self.invalid("cst is empty"));
        }
        Ok(())
    }

    fn invalid(&self, reason: impl Into<String>) -> TaxError {
        TaxError::InvalidRule {
            rule_id: self.rule_id.clone(),
            reason: reason.into(),
        }
    }
}

fn is_operation_code(code: &str) -> bool {
    code.len() == 4 && code.bytes().all(|b| b.is_ascii_digit())
}

// ---------------------------------------------------------------------------
// Rule set
// ---------------------------------------------------------------------------

/// In-memory tax matrix with the non-overlap invariant.
#[derive(Debug, Clone, Default)]
pub struct TaxRuleSet {
    rules: BTreeMap<RuleKey, Vec<TaxRule>>,
}

impl TaxRuleSet {
    /// An empty matrix.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a matrix from rules, rejecting the first invalid or
    /// overlapping one.
    pub fn from_rules(rules: impl IntoIterator<Item = TaxRule>) -> Result<Self, TaxError> {
        let mut set = Self::new();
        for rule in rules {
            set.insert(rule)?;
        }
        Ok(set)
    }

    /// Add a rule.
    ///
    /// # Errors
    ///
    /// Fails if the rule is invalid or overlaps a rule already present for
    /// the same key.
    pub fn insert(&mut self, rule: TaxRule) -> Result<(), TaxError> {
        rule.validate()?;
        let bucket = self.rules.entry(rule.key()).or_default();
        if let Some(existing) = bucket.iter().find(|r| r.overlaps(&rule)) {
            return Err(TaxError::OverlappingRule {
                existing: existing.rule_id.clone(),
                candidate: rule.rule_id,
            });
        }
        bucket.push(rule);
        bucket.sort_by_key(|r| r.valid_from);
        Ok(())
    }

    /// Every rule for `key` active on `date`. At most one by construction.
    pub fn active(&self, key: &RuleKey, date: NaiveDate) -> Vec<&TaxRule> {
        self.rules
            .get(key)
            .map(|bucket| bucket.iter().filter(|r| r.is_active_on(date)).collect())
            .unwrap_or_default()
    }

    /// Total number of rules.
    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    /// Whether the matrix is empty.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
