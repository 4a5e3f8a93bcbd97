//! # Access Keys
//!
//! The 44-digit key that identifies a fiscal document nationally:
//!
//! | digits | field |
//! |---|---|
//! | 2 | UF (IBGE code) |
//! | 4 | issue year and month, `YYMM` |
//! | 14 | emitter CNPJ |
//! | 2 | model (57 for CT-e) |
//! | 3 | series |
//! | 9 | document number |
//! | 1 | emission type |
//! | 8 | numeric code (random, or contingency) |
//! | 1 | check digit |
//!
//! The check digit is mod-11 over the first 43 digits: weights 2 to 9 from
//! the right, cycling; a remainder of 0 or 1 gives 0, otherwise
//! `11 − remainder`.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use fiscal_core::{Cnpj, JurisdictionCode, RandomSource};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of a complete key.
pub const ACCESS_KEY_LEN: usize = 44;

pub(crate) const MAX_SERIES: u16 = 999;
const MAX_NUMBER: u32 = 999_999_999;
const MAX_MODEL: u8 = 99;
pub(crate) const MAX_NUMERIC_CODE: u32 = 99_999_999;

/// Access-key construction and parsing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessKeyError {
    /// Series above 999.
    #[error("series out of range: {0} (expected 0 to 999)")]
    SeriesOutOfRange(u16),

    /// Number outside 1..=999,999,999.
    #[error("document number out of range: {0} (expected 1 to 999999999)")]
    NumberOutOfRange(u32),

    /// Emission type outside 1..=9.
    #[error("emission type out of range: {0} (expected 1 to 9)")]
    EmissionTypeOutOfRange(u8),

    /// Model above 99.
    #[error("model out of range: {0} (expected 0 to 99)")]
    ModelOutOfRange(u8),

    /// Numeric code above 99,999,999.
    #[error("numeric code out of range: {0} (expected 0 to 99999999)")]
    NumericCodeOutOfRange(u32),

    /// A supplied numeric code equal to the document number.
    #[error("numeric code must differ from the document number {0}")]
    NumericCodeEqualsNumber(u32),

    /// Key is not 44 characters long.
    #[error("access key must have 44 digits, got {0}")]
    InvalidLength(usize),

    /// Key contains something other than ASCII digits.
    #[error("access key must contain only digits")]
    NonDigit,

    /// Check digit does not match.
    #[error("access key check digit mismatch: expected {expected}, found {found}")]
    CheckDigitMismatch {
        /// Computed digit.
        expected: u8,
        /// Digit in the key.
        found: u8,
    },

    /// The first two digits are not an IBGE UF code.
    #[error("unknown jurisdiction code {0} in access key")]
    UnknownJurisdiction(u8),

    /// The month digits are not 01 to 12.
    #[error("invalid issue month {0} in access key")]
    InvalidMonth(u8),
}

/// mod-11 check digit over a string of ASCII digits.
///
/// Returns `None` if `digits` contains anything else.
pub fn mod11_check_digit(digits: &str) -> Option<u8> {
    let mut sum: u32 = 0;
    let mut weight: u32 = 2;
    for b in digits.bytes().rev() {
        if !b.is_ascii_digit() {
            return None;
        }
        sum += u32::from(b - b'0') * weight;
        weight = if weight == 9 { 2 } else { weight + 1 };
    }
    match sum % 11 {
        0 | 1 => Some(0),
        r => Some((11 - r) as u8),
    }
}

/// Inputs of [`generate_access_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessKeyParams {
    /// Emitter UF.
    pub jurisdiction: JurisdictionCode,
    /// Issue date; only year and month enter the key.
    pub issued_on: NaiveDate,
    /// Emitter CNPJ.
    pub tax_id: Cnpj,
    /// Document model.
    pub model: u8,
    /// Series.
    pub series: u16,
    /// Document number.
    pub number: u32,
    /// Emission type (1 = normal).
    pub emission_type: u8,
    /// Fixed numeric code (contingency). `None` draws one at random.
    pub numeric_code: Option<u32>,
}

/// Decoded fields of an [`AccessKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessKeyComponents {
    /// UF.
    pub jurisdiction: JurisdictionCode,
    /// Two-digit year.
    pub year: u8,
    /// Month, 1 to 12.
    pub month: u8,
    /// CNPJ.
    pub tax_id: Cnpj,
    /// Model.
    pub model: u8,
    /// Series.
    pub series: u16,
    /// Number.
    pub number: u32,
    /// Emission type.
    pub emission_type: u8,
    /// Numeric code.
    pub numeric_code: u32,
    /// Check digit.
    pub check_digit: u8,
}

/// A validated 44-digit access key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessKey {
    digits: String,
    components: AccessKeyComponents,
}

impl AccessKey {
    /// Validate a key: length, digits, check digit, UF and month.
    pub fn parse(value: &str) -> Result<Self, AccessKeyError> {
        let value = value.trim();
        if value.len() != ACCESS_KEY_LEN {
            return Err(AccessKeyError::InvalidLength(value.len()));
        }
        if !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AccessKeyError::NonDigit);
        }
        let expected = mod11_check_digit(&value[..43]).ok_or(AccessKeyError::NonDigit)?;
        let found = value.as_bytes()[43] - b'0';
        if expected != found {
            return Err(AccessKeyError::CheckDigitMismatch { expected, found });
        }
        Ok(Self {
            components: decode(value)?,
            digits: value.to_string(),
        })
    }

    /// The 44 digits.
    pub fn as_str(&self) -> &str {
        &self.digits
    }

    /// The trailing check digit.
    pub fn check_digit(&self) -> u8 {
        self.components.check_digit
    }

    /// Every decoded field.
    pub fn components(&self) -> &AccessKeyComponents {
        &self.components
    }
}

fn decode(s: &str) -> Result<AccessKeyComponents, AccessKeyError> {
    let num = |range: std::ops::Range<usize>| -> u32 {
        s[range]
            .bytes()
            .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'))
    };
    let uf = num(0..2) as u8;
    let jurisdiction =
        JurisdictionCode::from_ibge_code(uf).ok_or(AccessKeyError::UnknownJurisdiction(uf))?;
    let month = num(4..6) as u8;
    if !(1..=12).contains(&month) {
        return Err(AccessKeyError::InvalidMonth(month));
    }
    let tax_id = Cnpj::new(&s[6..20]).map_err(|_| AccessKeyError::NonDigit)?;
    Ok(AccessKeyComponents {
        jurisdiction,
        year: num(2..4) as u8,
        month,
        tax_id,
        model: num(20..22) as u8,
        series: num(22..25) as u16,
        number: num(25..34),
        emission_type: num(34..35) as u8,
        numeric_code: num(35..43),
        check_digit: num(43..44) as u8,
    })
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digits)
    }
}

impl TryFrom<String> for AccessKey {
    type Error = AccessKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AccessKey> for String {
    fn from(value: AccessKey) -> Self {
        value.digits
    }
}

/// Build a key from its fields.
///
/// The numeric code is drawn from `random` unless supplied, and redrawn
/// while it equals the document number.
///
/// # Errors
///
/// Any field outside its range, or a supplied numeric code equal to the
/// document number.
pub fn generate_access_key(
    params: &AccessKeyParams,
    random: &dyn RandomSource,
) -> Result<AccessKey, AccessKeyError> {
    if params.series > MAX_SERIES {
        return Err(AccessKeyError::SeriesOutOfRange(params.series));
    }
    if params.number == 0 || params.number > MAX_NUMBER {
        return Err(AccessKeyError::NumberOutOfRange(params.number));
    }
    if !(1..=9).contains(&params.emission_type) {
        return Err(AccessKeyError::EmissionTypeOutOfRange(params.emission_type));
    }
    if params.model > MAX_MODEL {
        return Err(AccessKeyError::ModelOutOfRange(params.model));
    }

    let numeric_code = match params.numeric_code {
        Some(code) if code > MAX_NUMERIC_CODE => {
            return Err(AccessKeyError::NumericCodeOutOfRange(code))
        }
        Some(code) if code == params.number => {
            return Err(AccessKeyError::NumericCodeEqualsNumber(code))
        }
        Some(code) => code,
        None => loop {
            let code = random.below(MAX_NUMERIC_CODE + 1);
            if code != params.number {
                break code;
            }
        },
    };

    let base = format!(
        "{:02}{:02}{:02}{}{:02}{:03}{:09}{}{:08}",
        params.jurisdiction.ibge_code(),
        params.issued_on.year().rem_euclid(100),
        params.issued_on.month(),
        params.tax_id.as_str(),
        params.model,
        params.series,
        params.number,
        params.emission_type,
        numeric_code,
    );
    let check = mod11_check_digit(&base).ok_or(AccessKeyError::NonDigit)?;
    AccessKey::parse(&format!("{base}{check}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fiscal_core::SeededRandom;
    use proptest::prelude::*;

    fn params() -> AccessKeyParams {
        AccessKeyParams {
            jurisdiction: JurisdictionCode::SP,
            issued_on: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            tax_id: Cnpj::new("12.345.678/0001-95").unwrap(),
            model: 57,
            series: 1,
            number: 1,
            emission_type: 1,
            numeric_code: Some(12_345_678),
        }
    }

    struct Fixed(Vec<u32>, parking_lot::Mutex<usize>);

    impl RandomSource for Fixed {
        fn below(&self, _upper: u32) -> u32 {
            let mut i = self.1.lock();
            let v = self.0[*i % self.0.len()];
            *i += 1;
            v
        }
    }

    #[test]
    fn check_digit_matches_published_example() {
        assert_eq!(mod11_check_digit("5206043300991100250655012000000780026730161"), Some(5));
    }

    #[test]
    fn remainder_zero_and_one_give_zero() {
        // remainder 1
        assert_eq!(mod11_check_digit("3526011234567800019557001000000001112345678"), Some(0));
        // remainder 0
        assert_eq!(mod11_check_digit("3526011234567800019557001000000001112345607"), Some(0));
        // remainder 3
        assert_eq!(mod11_check_digit("3526011234567800019557001000000001112345679"), Some(8));
    }

    #[test]
    fn non_digits_have_no_check_digit() {
        assert_eq!(mod11_check_digit("12a4"), None);
    }

    #[test]
    fn layout_is_exact() {
        let key = generate_access_key(&params(), &SeededRandom::new(1)).unwrap();
        assert_eq!(key.as_str(), "35260112345678000195570010000000011123456780");
        let c = key.components();
        assert_eq!(c.jurisdiction, JurisdictionCode::SP);
        assert_eq!((c.year, c.month), (26, 1));
        assert_eq!(c.tax_id.as_str(), "12345678000195");
        assert_eq!(c.model, 57);
        assert_eq!(c.series, 1);
        assert_eq!(c.number, 1);
        assert_eq!(c.emission_type, 1);
        assert_eq!(c.numeric_code, 12_345_678);
        assert_eq!(c.check_digit, 0);
    }

    #[test]
    fn seeded_generation_is_deterministic() {
        let mut p = params();
        p.numeric_code = None;
        let a = generate_access_key(&p, &SeededRandom::new(99)).unwrap();
        let b = generate_access_key(&p, &SeededRandom::new(99)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), ACCESS_KEY_LEN);
    }

    #[test]
    fn numeric_code_equal_to_number_is_redrawn() {
        let mut p = params();
        p.number = 4242;
        p.numeric_code = None;
        let random = Fixed(vec![4242, 4242, 77], parking_lot::Mutex::new(0));
        let key = generate_access_key(&p, &random).unwrap();
        assert_eq!(key.components().numeric_code, 77);
    }

    #[test]
    fn supplied_numeric_code_equal_to_number_rejected() {
        let mut p = params();
        p.numeric_code = Some(1);
        assert_eq!(
            generate_access_key(&p, &SeededRandom::new(0)),
            Err(AccessKeyError::NumericCodeEqualsNumber(1))
        );
    }

    #[test]
    fn range_checks() {
        let r = SeededRandom::new(0);
        let mut p = params();
        p.series = 1000;
        assert_eq!(generate_access_key(&p, &r), Err(AccessKeyError::SeriesOutOfRange(1000)));
        let mut p = params();
        p.number = 0;
        assert_eq!(generate_access_key(&p, &r), Err(AccessKeyError::NumberOutOfRange(0)));
        let mut p = params();
        p.number = 1_000_000_000;
        assert!(generate_access_key(&p, &r).is_err());
        let mut p = params();
        p.emission_type = 0;
        assert_eq!(generate_access_key(&p, &r), Err(AccessKeyError::EmissionTypeOutOfRange(0)));
        let mut p = params();
        p.model = 100;
        assert_eq!(generate_access_key(&p, &r), Err(AccessKeyError::ModelOutOfRange(100)));
        let mut p = params();
        p.numeric_code = Some(100_000_000);
        assert_eq!(
            generate_access_key(&p, &r),
            Err(AccessKeyError::NumericCodeOutOfRange(100_000_000))
        );
    }

    #[test]
    fn parse_rejects_bad_keys() {
        assert_eq!(AccessKey::parse("123"), Err(AccessKeyError::InvalidLength(3)));
        assert_eq!(
            AccessKey::parse("3526011234567800019557001000000001112345678X"),
            Err(AccessKeyError::NonDigit)
        );
        assert_eq!(
            AccessKey::parse("35260112345678000195570010000000011123456781"),
            Err(AccessKeyError::CheckDigitMismatch { expected: 0, found: 1 })
        );
        assert!(AccessKey::parse("52060433009911002506550120000007800267301615").is_ok());
    }

    #[test]
    fn serde_validates() {
        let key: AccessKey =
            serde_json::from_str("\"35260112345678000195570010000000011123456780\"").unwrap();
        assert_eq!(key.check_digit(), 0);
        assert!(serde_json::from_str::<AccessKey>("\"35260112345678000195570010000000011123456781\"").is_err());
    }

    proptest! {
        #[test]
        fn generated_keys_satisfy_mod11(
            seed in any::<u64>(),
            series in 0u16..=999,
            number in 1u32..=999_999_999,
            uf in 0usize..27,
        ) {
            let mut p = params();
            p.jurisdiction = JurisdictionCode::all()[uf];
            p.series = series;
            p.number = number;
            p.numeric_code = None;
            let key = generate_access_key(&p, &SeededRandom::new(seed)).unwrap();
            prop_assert_eq!(key.as_str().len(), ACCESS_KEY_LEN);
            prop_assert_eq!(Some(key.check_digit()), mod11_check_digit(&key.as_str()[..43]));
            prop_assert!(AccessKey::parse(key.as_str()).is_ok());
            let c = key.components();
            prop_assert_eq!(c.series, series);
            prop_assert_eq!(c.number, number);
            prop_assert_ne!(c.numeric_code, number);
        }
    }
}
