//! Applies a resolved rule to a gross operation value.

use fiscal_core::{percent_of, round_money, ValidationError};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::TaxError;
use crate::resolver::TaxCalculationResult;

/// Monetary breakdown of one rule applied to one value.
///
/// Every monetary field is rounded to two places; the effective rate to
/// four.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxComputation {
    /// Gross operation value.
    pub gross_value: Decimal,
    /// Base after reduction.
    pub base: Decimal,
    /// Principal tax rate, percent.
    pub rate: Decimal,
    /// Principal tax value.
    pub tax_value: Decimal,
    /// Additional (fund) value.
    pub additional_value: Decimal,
    /// Secondary value, when the rule has a secondary rate.
    pub secondary_value: Option<Decimal>,
    /// `tax_value / gross_value × 100`.
    pub effective_rate: Decimal,
}

/// Compute the tax breakdown for `value` under `rule`.
///
/// # Errors
///
/// [`TaxError::InvalidOperationValue`] when `value <= 0`; the effective rate
/// is undefined for a zero value and a negative one is not an operation.
/// [`ValidationError::AmountOutOfRange`] when a product overflows.
pub fn compute_tax(rule: &TaxCalculationResult, value: Decimal) -> Result<TaxComputation, TaxError> {
    if value <= Decimal::ZERO {
        return Err(TaxError::InvalidOperationValue(value.to_string()));
    }

    let factor = Decimal::ONE - rule.reduction / Decimal::ONE_HUNDRED;
    let base = round_money(
        value
            .checked_mul(factor)
            .ok_or_else(|| ValidationError::AmountOutOfRange(format!("{value} x {factor}")))?,
    );
    let tax_value = round_money(percent_of(base, rule.rate)?);
    let additional_value = round_money(percent_of(base, rule.additional_rate)?);
    let secondary_value = rule
        .secondary_rate
        .map(|secondary| percent_of(base, secondary).map(round_money))
        .transpose()?;
    let effective_rate = tax_value
        .checked_div(value)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .ok_or_else(|| ValidationError::AmountOutOfRange(format!("{tax_value} / {value}")))?
        .round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero);

    Ok(TaxComputation {
        gross_value: value,
        base,
        rate: rule.rate,
        tax_value,
        additional_value,
        secondary_value,
        effective_rate,
    })
}
