//! # Money Primitives
//!
//! Decimal amounts tagged with a currency, plus the rounding and
//! percentage helpers every tax computation goes through.
//!
//! ## Rounding
//!
//! Monetary outputs are rounded to [`MONEY_SCALE`] (2) places using
//! midpoint-away-from-zero, so `0.005` becomes `0.01` and `-0.005`
//! becomes `-0.01`. Intermediate products are never rounded.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Number of decimal places on every monetary output.
pub const MONEY_SCALE: u32 = 2;

/// Absolute tolerance when comparing a declared value against a recomputed
/// one (0.01).
pub const CONSISTENCY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Round to two places, midpoint away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `base × rate / 100`, unrounded.
///
/// # Errors
///
/// [`ValidationError::AmountOutOfRange`] when the product overflows.
pub fn percent_of(base: Decimal, rate: Decimal) -> Result<Decimal, ValidationError> {
    base.checked_mul(rate)
        .and_then(|product| product.checked_div(Decimal::ONE_HUNDRED))
        .ok_or_else(|| ValidationError::AmountOutOfRange(format!("{base} x {rate}%")))
}

/// Check that a percentage lies in `[0, 100]`.
///
/// # Errors
///
/// Returns [`ValidationError::PercentageOutOfRange`] naming `field`.
pub fn check_percentage(field: &'static str, value: Decimal) -> Result<Decimal, ValidationError> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(ValidationError::PercentageOutOfRange {
            field,
            value: value.to_string(),
        });
    }
    Ok(value)
}

/// ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Validate a currency code.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidCurrency`] unless the input is
    /// three uppercase ASCII letters.
    pub fn new(code: impl Into<String>) -> Result<Self, ValidationError> {
        let code = code.into();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ValidationError::InvalidCurrency(code));
        }
        Ok(Self(code))
    }

    /// Brazilian real.
    pub fn brl() -> Self {
        Self("BRL".to_string())
    }

    /// The 3-letter code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::brl()
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

/// A decimal amount in a currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    amount: Decimal,
    currency: Currency,
}

impl Money {
    /// Pair an amount with a currency. No rounding is applied.
    pub fn new(amount: Decimal, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// An amount in BRL.
    pub fn brl(amount: Decimal) -> Self {
        Self::new(amount, Currency::brl())
    }

    /// Zero in the given currency.
    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    /// The amount.
    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// The currency.
    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    /// Whether the amount is below zero.
    pub fn is_negative(&self) -> bool {
        self.amount < Decimal::ZERO
    }

    /// The same amount rounded with [`round_money`].
    pub fn rounded(&self) -> Self {
        Self::new(round_money(self.amount), self.currency.clone())
    }

    /// Add two amounts of the same currency. Returns `None` on currency
    /// mismatch or overflow.
    pub fn checked_add(&self, other: &Money) -> Option<Money> {
        if self.currency != other.currency {
            return None;
        }
        let amount = self.amount.checked_add(other.amount)?;
        Some(Self::new(amount, self.currency.clone()))
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.currency, round_money(self.amount))
    }
}
