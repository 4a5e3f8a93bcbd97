//! # Scenario Calculator
//!
//! Operation-type aware estimate of ICMS, PIS, COFINS and ISS for a single
//! value, with two branches on top of the legacy lines:
//!
//! - **Special regime** (Simples Nacional): every line is zeroed and a note
//!   points at the DAS slip, where the taxes are actually collected.
//! - **Future-regime preview**: parallel CBS/IBS estimates are attached
//!   without replacing any legacy line.
//!
//! The CFOP comes from a fixed table per operation type and does not go
//! through the tax matrix. Rates come from [`ScenarioRates`].
//!
//! ## Validation order
//!
//! 1. operation type
//! 2. origin and destination UF
//! 3. value > 0
//! 4. classification code (NCM), when given
//!
//! The first failure is returned.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use fiscal_core::{
    percent_of, round_money, ClassificationCode, JurisdictionCode, Region, ValidationError,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::TaxError;

/// Note attached when the special regime zeroes the lines.
pub const SPECIAL_REGIME_NOTE: &str =
    "Simples Nacional: ICMS, PIS, COFINS and ISS are collected through the DAS slip";

/// Observation attached to every IBS/CBS preview.
pub const TRANSITION_OBSERVATION: &str =
    "IBS/CBS transition window: preview values are informational and do not replace current taxes";

// ---------------------------------------------------------------------------
// Operation type
// ---------------------------------------------------------------------------

/// Kind of commercial operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// Sale (venda).
    Sale,
    /// Purchase (compra).
    Purchase,
    /// Transfer between establishments (transferencia).
    Transfer,
    /// Return of goods (devolucao).
    Return,
}

impl OperationType {
    /// CFOP for the operation, by intra/interstate.
    pub fn operation_code(&self, interstate: bool) -> &'static str {
        match (self, interstate) {
            (Self::Sale, false) => "5102",
            (Self::Sale, true) => "6102",
            (Self::Purchase, false) => "1102",
            (Self::Purchase, true) => "2102",
            (Self::Transfer, false) => "5152",
            (Self::Transfer, true) => "6152",
            (Self::Return, false) => "5202",
            (Self::Return, true) => "6202",
        }
    }

    /// Portuguese name, as accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sale => "venda",
            Self::Purchase => "compra",
            Self::Transfer => "transferencia",
            Self::Return => "devolucao",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "venda" => Ok(Self::Sale),
            "compra" => Ok(Self::Purchase),
            "transferencia" => Ok(Self::Transfer),
            "devolucao" => Ok(Self::Return),
            _ => Err(ValidationError::InvalidOperationType(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Rates
// ---------------------------------------------------------------------------

/// Rate table for the scenario calculator. All values are percentages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioRates {
    /// Intrastate ICMS when the UF has no override.
    pub internal_icms: Decimal,
    /// Intrastate ICMS per UF.
    pub internal_icms_overrides: BTreeMap<JurisdictionCode, Decimal>,
    /// Interstate ICMS from South/Southeast (except ES) into N/NE/CO or ES.
    pub interstate_icms_reduced: Decimal,
    /// Every other interstate route.
    pub interstate_icms_standard: Decimal,
    /// PIS.
    pub pis: Decimal,
    /// COFINS.
    pub cofins: Decimal,
    /// ISS on services.
    pub iss: Decimal,
    /// CBS preview.
    pub cbs_preview: Decimal,
    /// IBS preview.
    pub ibs_preview: Decimal,
}

impl Default for ScenarioRates {
    fn default() -> Self {
        Self {
            internal_icms: Decimal::new(18, 0),
            internal_icms_overrides: BTreeMap::new(),
            interstate_icms_reduced: Decimal::new(7, 0),
            interstate_icms_standard: Decimal::new(12, 0),
            pis: Decimal::new(165, 2),
            cofins: Decimal::new(76, 1),
            iss: Decimal::new(5, 0),
            cbs_preview: Decimal::new(9, 1),
            ibs_preview: Decimal::new(1, 1),
        }
    }
}

impl ScenarioRates {
    /// ICMS rate for a route.
    pub fn icms_rate(&self, origin: JurisdictionCode, destination: JurisdictionCode) -> Decimal {
        if origin == destination {
            return self
                .internal_icms_overrides
                .get(&origin)
                .copied()
                .unwrap_or(self.internal_icms);
        }
        let from_developed = matches!(origin.region(), Region::South | Region::Southeast)
            && origin != JurisdictionCode::ES;
        let to_less_developed = matches!(
            destination.region(),
            Region::North | Region::Northeast | Region::CenterWest
        ) || destination == JurisdictionCode::ES;
        if from_developed && to_less_developed {
            self.interstate_icms_reduced
        } else {
            self.interstate_icms_standard
        }
    }
}

// ---------------------------------------------------------------------------
// Request / result
// ---------------------------------------------------------------------------

/// Raw scenario input. Strings are validated by the calculator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioRequest {
    /// `venda`, `compra`, `transferencia` or `devolucao`.
    pub operation_type: String,
    /// Origin UF, any case.
    pub origin: String,
    /// Destination UF, any case.
    pub destination: String,
    /// Gross value.
    pub value: Decimal,
    /// Optional NCM.
    #[serde(default)]
    pub classification_code: Option<String>,
    /// Service operation (ISS instead of ICMS).
    #[serde(default)]
    pub is_service: bool,
    /// Simples Nacional.
    #[serde(default)]
    pub is_special_regime: bool,
    /// Attach the IBS/CBS preview.
    #[serde(default)]
    pub future_regime_preview: bool,
}

/// One tax line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxLine {
    /// Base.
    pub base: Decimal,
    /// Rate, percent.
    pub rate: Decimal,
    /// Value.
    pub value: Decimal,
}

impl TaxLine {
    fn compute(base: Decimal, rate: Decimal) -> Result<Self, ValidationError> {
        Ok(Self {
            base: round_money(base),
            rate,
            value: round_money(percent_of(base, rate)?),
        })
    }

    fn zero(base: Decimal) -> Self {
        Self {
            base: round_money(base),
            rate: Decimal::ZERO,
            value: Decimal::ZERO,
        }
    }
}

/// Parallel IBS/CBS estimate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualVatPreview {
    /// Base.
    pub base: Decimal,
    /// CBS rate.
    pub cbs_rate: Decimal,
    /// CBS value.
    pub cbs_value: Decimal,
    /// IBS rate.
    pub ibs_rate: Decimal,
    /// IBS value.
    pub ibs_value: Decimal,
    /// Transition-window observation.
    pub observation: String,
}

/// Scenario output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Parsed operation type.
    pub operation_type: OperationType,
    /// CFOP.
    pub operation_code: String,
    /// Origin UF.
    pub origin: JurisdictionCode,
    /// Destination UF.
    pub destination: JurisdictionCode,
    /// Whether origin and destination differ.
    pub interstate: bool,
    /// Validated NCM.
    pub classification_code: Option<ClassificationCode>,
    /// Gross value.
    pub value: Decimal,
    /// ICMS line.
    pub icms: TaxLine,
    /// PIS line.
    pub pis: TaxLine,
    /// COFINS line.
    pub cofins: TaxLine,
    /// ISS line.
    pub iss: TaxLine,
    /// Sum of the four lines above.
    pub total_taxes: Decimal,
    /// IBS/CBS preview, when requested.
    pub dual_vat_preview: Option<DualVatPreview>,
    /// Informational notes.
    pub notes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Stateless scenario calculator over a rate table.
#[derive(Debug, Clone, Default)]
pub struct ScenarioCalculator {
    rates: ScenarioRates,
}

impl ScenarioCalculator {
    /// Calculator with the given rates.
    pub fn new(rates: ScenarioRates) -> Self {
        Self { rates }
    }

    /// The rate table in use.
    pub fn rates(&self) -> &ScenarioRates {
        &self.rates
    }

    /// Validate the request and compute every line.
    ///
    /// # Errors
    ///
    /// [`TaxError::Validation`] wrapping the first failed check, in the
    /// order listed in the module documentation, or
    /// [`ValidationError::AmountOutOfRange`] when a line overflows.
    pub fn calculate(&self, request: &ScenarioRequest) -> Result<ScenarioResult, TaxError> {
        let operation_type: OperationType = request.operation_type.parse()?;
        let origin = JurisdictionCode::parse(&request.origin)?;
        let destination = JurisdictionCode::parse(&request.destination)?;
        if request.value <= Decimal::ZERO {
            return Err(ValidationError::InvalidValue(request.value.to_string()).into());
        }
        let classification_code = request
            .classification_code
            .as_deref()
            .map(ClassificationCode::new)
            .transpose()?;

        let value = request.value;
        let interstate = origin != destination;
        let mut notes = Vec::new();

        let (icms, pis, cofins, iss) = if request.is_special_regime {
            notes.push(SPECIAL_REGIME_NOTE.to_string());
            (
                TaxLine::zero(value),
                TaxLine::zero(value),
                TaxLine::zero(value),
                TaxLine::zero(value),
            )
        } else {
            let (icms, iss) = if request.is_service {
                (TaxLine::zero(value), TaxLine::compute(value, self.rates.iss)?)
            } else {
                (
                    TaxLine::compute(value, self.rates.icms_rate(origin, destination))?,
                    TaxLine::zero(value),
                )
            };
            (
                icms,
                TaxLine::compute(value, self.rates.pis)?,
                TaxLine::compute(value, self.rates.cofins)?,
                iss,
            )
        };

        let total_taxes = [pis.value, cofins.value, iss.value]
            .into_iter()
            .try_fold(icms.value, |sum, line| sum.checked_add(line))
            .ok_or_else(|| ValidationError::AmountOutOfRange(format!("total taxes on {value}")))?;

        let dual_vat_preview = if request.future_regime_preview {
            Some(DualVatPreview {
                base: round_money(value),
                cbs_rate: self.rates.cbs_preview,
                cbs_value: round_money(percent_of(value, self.rates.cbs_preview)?),
                ibs_rate: self.rates.ibs_preview,
                ibs_value: round_money(percent_of(value, self.rates.ibs_preview)?),
                observation: TRANSITION_OBSERVATION.to_string(),
            })
        } else {
            None
        };

        Ok(ScenarioResult {
            operation_type,
            operation_code: operation_type.operation_code(interstate).to_string(),
            origin,
            destination,
            interstate,
            classification_code,
            value,
            icms,
            pis,
            cofins,
            iss,
            total_taxes,
            dual_vat_preview,
            notes,
        })
    }
}
