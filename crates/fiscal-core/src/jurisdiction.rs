//! # Jurisdiction Codes
//!
//! The 27 Brazilian federative units (UFs). A jurisdiction code selects
//! intra- versus inter-state tax treatment and supplies the 2-digit IBGE
//! code embedded in access keys.
//!
//! ## Validation
//!
//! Parsing trims and uppercases the input, so `" sp"` resolves to
//! [`JurisdictionCode::SP`]. Anything that is not one of the 27 codes is
//! rejected with [`ValidationError::InvalidJurisdiction`].

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Geographic region of a UF. Interstate ICMS rates depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    /// Norte.
    North,
    /// Nordeste.
    Northeast,
    /// Centro-Oeste.
    CenterWest,
    /// Sudeste.
    Southeast,
    /// Sul.
    South,
}

/// A Brazilian federative unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[allow(missing_docs)]
pub enum JurisdictionCode {
    AC,
    AL,
    AM,
    AP,
    BA,
    CE,
    DF,
    ES,
    GO,
    MA,
    MG,
    MS,
    MT,
    PA,
    PB,
    PE,
    PI,
    PR,
    RJ,
    RN,
    RO,
    RR,
    RS,
    SC,
    SE,
    SP,
    TO,
}

impl JurisdictionCode {
    /// Parse a jurisdiction code, normalizing case and whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidJurisdiction`] for anything other
    /// than the 27 UF codes.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        let normalized = value.trim().to_ascii_uppercase();
        Self::all()
            .iter()
            .copied()
            .find(|uf| uf.as_str() == normalized)
            .ok_or_else(|| ValidationError::InvalidJurisdiction(value.to_string()))
    }

    /// The 2-letter code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AC => "AC",
            Self::AL => "AL",
            Self::AM => "AM",
            Self::AP => "AP",
            Self::BA => "BA",
            Self::CE => "CE",
            Self::DF => "DF",
            Self::ES => "ES",
            Self::GO => "GO",
            Self::MA => "MA",
            Self::MG => "MG",
            Self::MS => "MS",
            Self::MT => "MT",
            Self::PA => "PA",
            Self::PB => "PB",
            Self::PE => "PE",
            Self::PI => "PI",
            Self::PR => "PR",
            Self::RJ => "RJ",
            Self::RN => "RN",
            Self::RO => "RO",
            Self::RR => "RR",
            Self::RS => "RS",
            Self::SC => "SC",
            Self::SE => "SE",
            Self::SP => "SP",
            Self::TO => "TO",
        }
    }

    /// The IBGE numeric code (cUF) used in access keys.
    pub fn ibge_code(&self) -> u8 {
        match self {
            Self::RO => 11,
            Self::AC => 12,
            Self::AM => 13,
            Self::RR => 14,
            Self::PA => 15,
            Self::AP => 16,
            Self::TO => 17,
            Self::MA => 21,
            Self::PI => 22,
            Self::CE => 23,
            Self::RN => 24,
            Self::PB => 25,
            Self::PE => 26,
            Self::AL => 27,
            Self::SE => 28,
            Self::BA => 29,
            Self::MG => 31,
            Self::ES => 32,
            Self::RJ => 33,
            Self::SP => 35,
            Self::PR => 41,
            Self::SC => 42,
            Self::RS => 43,
            Self::MS => 50,
            Self::MT => 51,
            Self::GO => 52,
            Self::DF => 53,
        }
    }

    /// Resolve a UF from its IBGE numeric code.
    pub fn from_ibge_code(code: u8) -> Option<Self> {
        Self::all().iter().copied().find(|uf| uf.ibge_code() == code)
    }

    /// Geographic region.
    pub fn region(&self) -> Region {
        match self {
            Self::AC | Self::AM | Self::AP | Self::PA | Self::RO | Self::RR | Self::TO => {
                Region::North
            }
            Self::AL
            | Self::BA
            | Self::CE
            | Self::MA
            | Self::PB
            | Self::PE
            | Self::PI
            | Self::RN
            | Self::SE => Region::Northeast,
            Self::DF | Self::GO | Self::MS | Self::MT => Region::CenterWest,
            Self::ES | Self::MG | Self::RJ | Self::SP => Region::Southeast,
            Self::PR | Self::RS | Self::SC => Region::South,
        }
    }

    /// Return all 27 codes.
    pub fn all() -> &'static [JurisdictionCode] {
        &[
            Self::AC,
            Self::AL,
            Self::AM,
            Self::AP,
            Self::BA,
            Self::CE,
            Self::DF,
            Self::ES,
            Self::GO,
            Self::MA,
            Self::MG,
            Self::MS,
            Self::MT,
            Self::PA,
            Self::PB,
            Self::PE,
            Self::PI,
            Self::PR,
            Self::RJ,
            Self::RN,
            Self::RO,
            Self::RR,
            Self::RS,
            Self::SC,
            Self::SE,
            Self::SP,
            Self::TO,
        ]
    }
}

impl std::fmt::Display for JurisdictionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JurisdictionCode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for JurisdictionCode {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JurisdictionCode> for String {
    fn from(value: JurisdictionCode) -> Self {
        value.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        assert_eq!(JurisdictionCode::parse("sp").unwrap(), JurisdictionCode::SP);
        assert_eq!(JurisdictionCode::parse(" Rj ").unwrap(), JurisdictionCode::RJ);
    }

    #[test]
    fn parse_rejects_unknown_codes() {
        assert!(JurisdictionCode::parse("XX").is_err());
        assert!(JurisdictionCode::parse("S").is_err());
        assert!(JurisdictionCode::parse("SPX").is_err());
        assert!(JurisdictionCode::parse("").is_err());
    }

    #[test]
    fn ibge_codes_are_unique_and_invertible() {
        let mut seen = std::collections::HashSet::new();
        for uf in JurisdictionCode::all() {
            assert!(seen.insert(uf.ibge_code()), "duplicate IBGE code for {uf}");
            assert_eq!(JurisdictionCode::from_ibge_code(uf.ibge_code()), Some(*uf));
        }
        assert_eq!(seen.len(), 27);
    }

    #[test]
    fn known_ibge_codes() {
        assert_eq!(JurisdictionCode::SP.ibge_code(), 35);
        assert_eq!(JurisdictionCode::RJ.ibge_code(), 33);
        assert_eq!(JurisdictionCode::BA.ibge_code(), 29);
    }

    #[test]
    fn regions() {
        assert_eq!(JurisdictionCode::SP.region(), Region::Southeast);
        assert_eq!(JurisdictionCode::BA.region(), Region::Northeast);
        assert_eq!(JurisdictionCode::RS.region(), Region::South);
        assert_eq!(JurisdictionCode::DF.region(), Region::CenterWest);
        assert_eq!(JurisdictionCode::AM.region(), Region::North);
    }

    #[test]
    fn serde_roundtrip_as_string() {
        let json = serde_json::to_string(&JurisdictionCode::MG).unwrap();
        assert_eq!(json, "\"MG\"");
        let back: JurisdictionCode = serde_json::from_str("\"mg\"").unwrap();
        assert_eq!(back, JurisdictionCode::MG);
        assert!(serde_json::from_str::<JurisdictionCode>("\"ZZ\"").is_err());
    }
}
