//! # IBS/CBS Group
//!
//! Value object for the dual-VAT block of a fiscal document: IBS split
//! into a sub-national (UF) and a municipal part, plus the federal CBS.
//!
//! The only way to obtain an [`IbsCbsGroup`] is [`IbsCbsGroup::new`], which
//! validates the declared values against their bases and rates. Once built
//! the group is immutable; equality is structural.
//!
//! ## Checks, in order
//!
//! 1. Every monetary field is in the base currency.
//! 2. The base is not negative.
//! 3. For each pair (sub-national, municipal, federal): the rate is a
//!    percentage and `|declared − base × rate / 100| ≤ 0.01`.
//! 4. Each optional relief block: percentages in `[0, 100]`, amounts not
//!    negative, presumed-credit code present.
//! 5. Tax status and classification codes present.
//!
//! The five relief blocks are independent: any combination may be present.

use std::fmt;

use fiscal_core::{percent_of, round_money, Currency, Money, CONSISTENCY_TOLERANCE};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which tax pair a consistency check refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxPair {
    /// IBS, state part.
    SubNational,
    /// IBS, municipal part.
    Municipal,
    /// CBS.
    Federal,
}

impl fmt::Display for TaxPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SubNational => "sub-national",
            Self::Municipal => "municipal",
            Self::Federal => "federal",
        })
    }
}

/// Construction failures of [`IbsCbsGroup`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IbsCbsError {
    /// A monetary field is not in the base currency.
    #[error("currency mismatch on {field}: expected {expected}, found {found}")]
    CurrencyMismatch {
        /// Field name.
        field: &'static str,
        /// Base currency.
        expected: Currency,
        /// Field currency.
        found: Currency,
    },

    /// The base value is below zero.
    #[error("base value must not be negative, got {0}")]
    NegativeBase(Decimal),

    /// Declared value differs from `base × rate / 100` by more than 0.01.
    #[error("{pair} value inconsistent: expected {expected}, declared {declared}")]
    InconsistentValue {
        /// Offending pair.
        pair: TaxPair,
        /// Recomputed value, rounded for display.
        expected: Decimal,
        /// Declared value.
        declared: Decimal,
    },

    /// A percentage is outside `[0, 100]`.
    #[error("percentage {field} out of range: {value} (expected 0 to 100)")]
    PercentageOutOfRange {
        /// Field name.
        field: &'static str,
        /// Rejected value.
        value: Decimal,
    },

    /// A relief amount is below zero.
    #[error("{field} must not be negative, got {value}")]
    NegativeAmount {
        /// Field name.
        field: &'static str,
        /// Rejected value.
        value: Decimal,
    },

    /// Recomputing a value or total overflows the decimal range.
    #[error("{field} out of range")]
    AmountOutOfRange {
        /// Field whose computation overflowed.
        field: &'static str,
    },

    /// Presumed credit without a credit code.
    #[error("presumed credit requires a credit code")]
    MissingPresumedCreditCode,

    /// A mandatory code is empty.
    #[error("{field} must not be empty")]
    MissingCode {
        /// Field name.
        field: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Relief blocks
// ---------------------------------------------------------------------------

/// Deferred portion of the tax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deferral {
    /// Deferral rate, percent.
    pub rate: Decimal,
    /// Deferred IBS (UF).
    pub sub_national_deferred: Money,
    /// Deferred CBS.
    pub federal_deferred: Money,
}

/// Refunded amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    /// Refunded IBS (UF).
    pub sub_national_refund: Money,
    /// Refunded CBS.
    pub federal_refund: Money,
}

/// Rate reductions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateReduction {
    /// IBS reduction, percent.
    pub sub_national_reduction_rate: Decimal,
    /// CBS reduction, percent.
    pub federal_reduction_rate: Decimal,
}

/// Presumed credit granted on the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresumedCredit {
    /// Credit code.
    pub code: String,
    /// Credit rate, percent.
    pub rate: Decimal,
    /// IBS credit.
    pub sub_national_credit: Money,
    /// CBS credit.
    pub federal_credit: Money,
}

/// Buyer sphere for government purchases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GovernmentEntity {
    /// Union.
    Federal,
    /// State or Federal District.
    State,
    /// Municipality.
    Municipal,
}

/// Government-purchase reduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernmentPurchase {
    /// Purchasing sphere.
    pub entity: GovernmentEntity,
    /// Reduction rate, percent.
    pub reduction_rate: Decimal,
}

// ---------------------------------------------------------------------------
// Group
// ---------------------------------------------------------------------------

/// Unvalidated field set of an [`IbsCbsGroup`]. Also its wire form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IbsCbsParams {
    /// Tax status code.
    pub cst: String,
    /// Tax classification code (cClassTrib).
    pub classification_code: String,
    /// Taxable base.
    pub base: Money,
    /// IBS (UF) rate, percent.
    pub sub_national_rate: Decimal,
    /// IBS (UF) value.
    pub sub_national_value: Money,
    /// IBS (municipal) rate, percent.
    pub municipal_rate: Decimal,
    /// IBS (municipal) value.
    pub municipal_value: Money,
    /// CBS rate, percent.
    pub federal_rate: Decimal,
    /// CBS value.
    pub federal_value: Money,
    /// Deferral block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deferral: Option<Deferral>,
    /// Refund block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refund: Option<Refund>,
    /// Rate-reduction block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_reduction: Option<RateReduction>,
    /// Presumed-credit block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presumed_credit: Option<PresumedCredit>,
    /// Government-purchase block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub government_purchase: Option<GovernmentPurchase>,
}

/// Validated dual-VAT group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IbsCbsParams", into = "IbsCbsParams")]
pub struct IbsCbsGroup {
    inner: IbsCbsParams,
}

impl IbsCbsGroup {
    /// Validate `params` and build the group.
    ///
    /// # Errors
    ///
    /// The first failed check, in the order given in the module docs.
    pub fn new(params: IbsCbsParams) -> Result<Self, IbsCbsError> {
        check_currencies(&params)?;

        let base = params.base.amount();
        if base < Decimal::ZERO {
            return Err(IbsCbsError::NegativeBase(base));
        }

        for (pair, field, rate, declared) in [
            (TaxPair::SubNational, "sub_national_rate", params.sub_national_rate, &params.sub_national_value),
            (TaxPair::Municipal, "municipal_rate", params.municipal_rate, &params.municipal_value),
            (TaxPair::Federal, "federal_rate", params.federal_rate, &params.federal_value),
        ] {
            percentage(field, rate)?;
            let expected = percent_of(base, rate).map_err(|_| IbsCbsError::AmountOutOfRange { field })?;
            let within = declared
                .amount()
                .checked_sub(expected)
                .is_some_and(|diff| diff.abs() <= CONSISTENCY_TOLERANCE);
            if !within {
                return Err(IbsCbsError::InconsistentValue {
                    pair,
                    expected: round_money(expected),
                    declared: declared.amount(),
                });
            }
        }

        params
            .sub_national_value
            .checked_add(&params.municipal_value)
            .and_then(|ibs| ibs.checked_add(&params.federal_value))
            .ok_or(IbsCbsError::AmountOutOfRange { field: "grand_total" })?;

        if let Some(deferral) = &params.deferral {
            percentage("deferral.rate", deferral.rate)?;
            non_negative("deferral.sub_national_deferred", &deferral.sub_national_deferred)?;
            non_negative("deferral.federal_deferred", &deferral.federal_deferred)?;
        }
        if let Some(refund) = &params.refund {
            non_negative("refund.sub_national_refund", &refund.sub_national_refund)?;
            non_negative("refund.federal_refund", &refund.federal_refund)?;
        }
        if let Some(reduction) = &params.rate_reduction {
            percentage("rate_reduction.sub_national_reduction_rate", reduction.sub_national_reduction_rate)?;
            percentage("rate_reduction.federal_reduction_rate", reduction.federal_reduction_rate)?;
        }
        if let Some(credit) = &params.presumed_credit {
            if credit.code.trim().is_empty() {
                return Err(IbsCbsError::MissingPresumedCreditCode);
            }
            percentage("presumed_credit.rate", credit.rate)?;
            non_negative("presumed_credit.sub_national_credit", &credit.sub_national_credit)?;
            non_negative("presumed_credit.federal_credit", &credit.federal_credit)?;
        }
        if let Some(purchase) = &params.government_purchase {
            percentage("government_purchase.reduction_rate", purchase.reduction_rate)?;
        }

        if params.cst.trim().is_empty() {
            return Err(IbsCbsError::MissingCode { field: "cst" });
        }
        if params.classification_code.trim().is_empty() {
            return Err(IbsCbsError::MissingCode {
                field: "classification_code",
            });
        }

        Ok(Self { inner: params })
    }

    /// Tax status code.
    pub fn cst(&self) -> &str {
        &self.inner.cst
    }

    /// Tax classification code.
    pub fn classification_code(&self) -> &str {
        &self.inner.classification_code
    }

    /// Taxable base.
    pub fn base(&self) -> &Money {
        &self.inner.base
    }

    /// IBS (UF) rate.
    pub fn sub_national_rate(&self) -> Decimal {
        self.inner.sub_national_rate
    }

    /// IBS (UF) value.
    pub fn sub_national_value(&self) -> &Money {
        &self.inner.sub_national_value
    }

    /// IBS (municipal) rate.
    pub fn municipal_rate(&self) -> Decimal {
        self.inner.municipal_rate
    }

    /// IBS (municipal) value.
    pub fn municipal_value(&self) -> &Money {
        &self.inner.municipal_value
    }

    /// CBS rate.
    pub fn federal_rate(&self) -> Decimal {
        self.inner.federal_rate
    }

    /// CBS value.
    pub fn federal_value(&self) -> &Money {
        &self.inner.federal_value
    }

    /// Deferral block.
    pub fn deferral(&self) -> Option<&Deferral> {
        self.inner.deferral.as_ref()
    }

    /// Refund block.
    pub fn refund(&self) -> Option<&Refund> {
        self.inner.refund.as_ref()
    }

    /// Rate-reduction block.
    pub fn rate_reduction(&self) -> Option<&RateReduction> {
        self.inner.rate_reduction.as_ref()
    }

    /// Presumed-credit block.
    pub fn presumed_credit(&self) -> Option<&PresumedCredit> {
        self.inner.presumed_credit.as_ref()
    }

    /// Government-purchase block.
    pub fn government_purchase(&self) -> Option<&GovernmentPurchase> {
        self.inner.government_purchase.as_ref()
    }

    /// Total IBS: sub-national plus municipal.
    pub fn total_sub_national(&self) -> Money {
        // Fits: checked in `new`.
        Money::new(
            self.inner
                .sub_national_value
                .amount()
                .saturating_add(self.inner.municipal_value.amount()),
            self.inner.base.currency().clone(),
        )
    }

    /// Total IBS plus CBS.
    pub fn grand_total(&self) -> Money {
        Money::new(
            self.total_sub_national()
                .amount()
                .saturating_add(self.inner.federal_value.amount()),
            self.inner.base.currency().clone(),
        )
    }

    /// The validated fields.
    pub fn params(&self) -> &IbsCbsParams {
        &self.inner
    }
}

impl TryFrom<IbsCbsParams> for IbsCbsGroup {
    type Error = IbsCbsError;

    fn try_from(params: IbsCbsParams) -> Result<Self, Self::Error> {
        Self::new(params)
    }
}

impl From<IbsCbsGroup> for IbsCbsParams {
    fn from(group: IbsCbsGroup) -> Self {
        group.inner
    }
}

fn check_currencies(params: &IbsCbsParams) -> Result<(), IbsCbsError> {
    let expected = params.base.currency();
    let mut fields: Vec<(&'static str, &Money)> = vec![
        ("sub_national_value", &params.sub_national_value),
        ("municipal_value", &params.municipal_value),
        ("federal_value", &params.federal_value),
    ];
    if let Some(d) = &params.deferral {
        fields.push(("deferral.sub_national_deferred", &d.sub_national_deferred));
        fields.push(("deferral.federal_deferred", &d.federal_deferred));
    }
    if let Some(r) = &params.refund {
        fields.push(("refund.sub_national_refund", &r.sub_national_refund));
        fields.push(("refund.federal_refund", &r.federal_refund));
    }
    if let Some(c) = &params.presumed_credit {
        fields.push(("presumed_credit.sub_national_credit", &c.sub_national_credit));
        fields.push(("presumed_credit.federal_credit", &c.federal_credit));
    }
    match fields.into_iter().find(|(_, m)| m.currency() != expected) {
        Some((field, m)) => Err(IbsCbsError::CurrencyMismatch {
            field,
            expected: expected.clone(),
            found: m.currency().clone(),
        }),
        None => Ok(()),
    }
}

fn percentage(field: &'static str, value: Decimal) -> Result<(), IbsCbsError> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(IbsCbsError::PercentageOutOfRange { field, value });
    }
    Ok(())
}

fn non_negative(field: &'static str, money: &Money) -> Result<(), IbsCbsError> {
    if money.is_negative() {
        return Err(IbsCbsError::NegativeAmount {
            field,
            value: money.amount(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn brl(s: &str) -> Money {
        Money::brl(d(s))
    }

    /// Base 1000: IBS-UF 0.1% = 1.00, IBS-mun 0% = 0, CBS 0.9% = 9.00.
    fn params() -> IbsCbsParams {
        IbsCbsParams {
            cst: "000".into(),
            classification_code: "000001".into(),
            base: brl("1000"),
            sub_national_rate: d("0.1"),
            sub_national_value: brl("1.00"),
            municipal_rate: d("0"),
            municipal_value: brl("0"),
            federal_rate: d("0.9"),
            federal_value: brl("9.00"),
            deferral: None,
            refund: None,
            rate_reduction: None,
            presumed_credit: None,
            government_purchase: None,
        }
    }

    #[test]
    fn consistent_group_builds_with_totals() {
        let group = IbsCbsGroup::new(params()).unwrap();
        assert_eq!(group.total_sub_national().amount(), d("1.00"));
        assert_eq!(group.grand_total().amount(), d("10.00"));
        assert_eq!(group.federal_rate(), d("0.9"));
    }

    #[test]
    fn inconsistent_federal_value_names_pair() {
        let mut p = params();
        p.federal_value = brl("9.50");
        let err = IbsCbsGroup::new(p).unwrap_err();
        assert_eq!(
            err,
            IbsCbsError::InconsistentValue {
                pair: TaxPair::Federal,
                expected: d("9.00"),
                declared: d("9.50"),
            }
        );
        assert_eq!(err.to_string(), "federal value inconsistent: expected 9.00, declared 9.50");
    }

    #[test]
    fn overflowing_base_is_rejected_not_panicking() {
        let mut p = params();
        p.base = Money::brl(Decimal::MAX);
        p.sub_national_rate = d("100");
        assert_eq!(
            IbsCbsGroup::new(p).unwrap_err(),
            IbsCbsError::AmountOutOfRange {
                field: "sub_national_rate"
            }
        );
    }

    #[test]
    fn extreme_declared_value_is_inconsistent() {
        let mut p = params();
        p.sub_national_value = Money::brl(Decimal::MIN);
        assert!(matches!(
            IbsCbsGroup::new(p),
            Err(IbsCbsError::InconsistentValue { pair: TaxPair::SubNational, .. })
        ));
    }

    #[test]
    fn one_cent_off_is_tolerated() {
        let mut p = params();
        p.sub_national_value = brl("1.01");
        assert!(IbsCbsGroup::new(p).is_ok());
    }

    #[test]
    fn currency_is_checked_first() {
        let mut p = params();
        p.federal_value = Money::new(d("9.50"), Currency::new("USD").unwrap());
        p.base = Money::brl(d("-1"));
        assert!(matches!(
            IbsCbsGroup::new(p),
            Err(IbsCbsError::CurrencyMismatch { field: "federal_value", .. })
        ));
    }

    #[test]
    fn relief_block_currency_is_checked() {
        let mut p = params();
        p.refund = Some(Refund {
            sub_national_refund: brl("1"),
            federal_refund: Money::new(d("1"), Currency::new("EUR").unwrap()),
        });
        assert!(matches!(
            IbsCbsGroup::new(p),
            Err(IbsCbsError::CurrencyMismatch { field: "refund.federal_refund", .. })
        ));
    }

    #[test]
    fn negative_base_rejected() {
        let mut p = params();
        p.base = brl("-10");
        assert_eq!(IbsCbsGroup::new(p), Err(IbsCbsError::NegativeBase(d("-10"))));
    }

    #[test]
    fn rate_range_checked_before_pair() {
        let mut p = params();
        p.municipal_rate = d("101");
        assert!(matches!(
            IbsCbsGroup::new(p),
            Err(IbsCbsError::PercentageOutOfRange { field: "municipal_rate", .. })
        ));
    }

    #[test]
    fn presumed_credit_requires_code() {
        let mut p = params();
        p.presumed_credit = Some(PresumedCredit {
            code: "  ".into(),
            rate: d("1"),
            sub_national_credit: brl("0"),
            federal_credit: brl("0"),
        });
        assert_eq!(IbsCbsGroup::new(p), Err(IbsCbsError::MissingPresumedCreditCode));
    }

    #[test]
    fn negative_deferral_amount_rejected() {
        let mut p = params();
        p.deferral = Some(Deferral {
            rate: d("10"),
            sub_national_deferred: brl("-0.01"),
            federal_deferred: brl("0.90"),
        });
        assert!(matches!(
            IbsCbsGroup::new(p),
            Err(IbsCbsError::NegativeAmount { field: "deferral.sub_national_deferred", .. })
        ));
    }

    #[test]
    fn all_relief_blocks_together() {
        let mut p = params();
        p.deferral = Some(Deferral {
            rate: d("10"),
            sub_national_deferred: brl("0.10"),
            federal_deferred: brl("0.90"),
        });
        p.refund = Some(Refund {
            sub_national_refund: brl("0"),
            federal_refund: brl("0"),
        });
        p.rate_reduction = Some(RateReduction {
            sub_national_reduction_rate: d("60"),
            federal_reduction_rate: d("60"),
        });
        p.presumed_credit = Some(PresumedCredit {
            code: "01".into(),
            rate: d("1"),
            sub_national_credit: brl("0.01"),
            federal_credit: brl("0.09"),
        });
        p.government_purchase = Some(GovernmentPurchase {
            entity: GovernmentEntity::Municipal,
            reduction_rate: d("100"),
        });
        let group = IbsCbsGroup::new(p).unwrap();
        assert!(group.deferral().is_some());
        assert_eq!(group.government_purchase().unwrap().entity, GovernmentEntity::Municipal);
    }

    #[test]
    fn government_reduction_range() {
        let mut p = params();
        p.government_purchase = Some(GovernmentPurchase {
            entity: GovernmentEntity::Federal,
            reduction_rate: d("-1"),
        });
        assert!(IbsCbsGroup::new(p).is_err());
    }

    #[test]
    fn missing_classification_code() {
        let mut p = params();
        p.classification_code = String::new();
        assert_eq!(
            IbsCbsGroup::new(p),
            Err(IbsCbsError::MissingCode {
                field: "classification_code"
            })
        );
    }

    #[test]
    fn deserialization_validates() {
        let group = IbsCbsGroup::new(params()).unwrap();
        let json = serde_json::to_string(&group).unwrap();
        let back: IbsCbsGroup = serde_json::from_str(&json).unwrap();
        assert_eq!(back, group);

        let mut bad = serde_json::to_value(&group).unwrap();
        bad["federal_value"]["amount"] = serde_json::json!("12.00");
        assert!(serde_json::from_value::<IbsCbsGroup>(bad).is_err());
    }

    proptest! {
        #[test]
        fn accepts_iff_within_one_cent(
            base_cents in 0i64..100_000_000,
            rate_bp in 0i64..=10_000,
            delta_mills in -30i64..=30,
        ) {
            let base = Decimal::new(base_cents, 2);
            let rate = Decimal::new(rate_bp, 2);
            let delta = Decimal::new(delta_mills, 3);
            let mut p = params();
            p.base = Money::brl(base);
            p.sub_national_rate = Decimal::ZERO;
            p.sub_national_value = Money::brl(Decimal::ZERO);
            p.federal_rate = rate;
            p.federal_value = Money::brl(percent_of(base, rate).unwrap() + delta);

            let accepted = IbsCbsGroup::new(p).is_ok();
            prop_assert_eq!(accepted, delta.abs() <= CONSISTENCY_TOLERANCE);
        }
    }
}
