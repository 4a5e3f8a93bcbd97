//! # Document Builder
//!
//! Turns a [`ShipmentOrder`] into an immutable [`FiscalDocument`].
//!
//! ## Pipeline
//!
//! 1. Insurance gate: policy and averbation must both be present. Nothing
//!    else runs when they are not.
//! 2. Order validation (components, currencies, series).
//! 3. Tax: resolve the route's rule and compute ICMS over the service
//!    total; validate the optional IBS/CBS group.
//! 4. Allocate the branch's next number.
//! 5. Generate the access key and assemble.
//!
//! Allocation comes after every step that can reject the order, so a
//! rejected order never consumes a number. The one exception is a
//! supplied contingency code that turns out to equal the allocated
//! number.

use std::sync::Arc;

use chrono::NaiveDate;
use fiscal_core::{
    BranchId, Clock, FiscalError, JurisdictionCode, Money, OrganizationId, RandomSource,
    ValidationError,
};
use fiscal_tax::{
    compute_tax, IbsCbsError, IbsCbsGroup, IbsCbsParams, TaxError, TaxMatrixResolver, TaxRegime,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::access_key::{
    generate_access_key, AccessKeyError, AccessKeyParams, MAX_NUMERIC_CODE, MAX_SERIES,
};
use crate::document::{
    Cargo, Counterparty, DocumentHeader, FiscalDocument, IcmsBlock, Insurance, InsuranceInfo,
    Party, ServiceComponent, ServiceValue, VoidNotice, CTE_MODEL,
};
use crate::sequence::{SequenceCounter, SequenceError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Document build failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Compliance gate: insurance policy or averbation absent.
    #[error("insurance {missing} missing: a CT-e cannot be emitted without policy and averbation")]
    MissingInsuranceAverbation {
        /// Which field.
        missing: &'static str,
    },

    /// Malformed order.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Tax resolution or computation failed.
    #[error(transparent)]
    Tax(#[from] TaxError),

    /// The IBS/CBS group is inconsistent.
    #[error("IBS/CBS group rejected: {0}")]
    IbsCbs(#[from] IbsCbsError),

    /// Numbering failed.
    #[error(transparent)]
    Sequence(#[from] SequenceError),

    /// Key generation failed.
    #[error(transparent)]
    AccessKey(#[from] AccessKeyError),

    /// Voiding requires a justification.
    #[error("a void reason is required")]
    MissingVoidReason,
}

impl BuildError {
    /// Whether the same order could succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Tax(err) => err.is_transient(),
            Self::Sequence(SequenceError::Unavailable(_)) => true,
            _ => false,
        }
    }
}

impl From<BuildError> for FiscalError {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::MissingInsuranceAverbation { .. } => FiscalError::Compliance(err.to_string()),
            BuildError::Validation(v) => FiscalError::Validation(v),
            BuildError::Tax(t) => t.into(),
            other => FiscalError::Configuration(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Emission settings shared by every document of a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderSettings {
    /// Model code.
    pub model: u8,
    /// Emission type (1 = normal).
    pub emission_type: u8,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            model: CTE_MODEL,
            emission_type: 1,
        }
    }
}

/// A request to emit one CT-e.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentOrder {
    /// Tenant.
    pub organization: OrganizationId,
    /// Emitting branch; owns the numbering.
    pub branch: BranchId,
    /// Series.
    #[serde(default = "default_series")]
    pub series: u16,
    /// Emitter's tax regime.
    pub regime: TaxRegime,
    /// Emitter.
    pub emitter: Party,
    /// Sender, recipient, service taker, ...
    #[serde(default)]
    pub counterparties: Vec<Counterparty>,
    /// Start of the service.
    pub origin: JurisdictionCode,
    /// End of the service.
    pub destination: JurisdictionCode,
    /// Cargo.
    pub cargo: Cargo,
    /// Insurance; both policy and averbation are mandatory.
    #[serde(default)]
    pub insurance: Option<InsuranceInfo>,
    /// Service price components.
    pub service_components: Vec<ServiceComponent>,
    /// Receivable amount; defaults to the total.
    #[serde(default)]
    pub receivable: Option<Money>,
    /// Dual-VAT group.
    #[serde(default)]
    pub ibs_cbs: Option<IbsCbsParams>,
    /// Tax reference date; defaults to today.
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
    /// Contingency numeric code for the key.
    #[serde(default)]
    pub contingency_code: Option<u32>,
}

fn default_series() -> u16 {
    1
}

/// Output of [`DocumentBuilder::reissue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reissue {
    /// Voids the previous key.
    pub void: VoidNotice,
    /// The new document.
    pub replacement: FiscalDocument,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles CT-e documents.
#[derive(Clone)]
pub struct DocumentBuilder {
    resolver: TaxMatrixResolver,
    sequences: Arc<dyn SequenceCounter>,
    random: Arc<dyn RandomSource>,
    clock: Arc<dyn Clock>,
    settings: BuilderSettings,
}

impl std::fmt::Debug for DocumentBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentBuilder")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl DocumentBuilder {
    /// Create a builder.
    ///
    /// # Errors
    ///
    /// [`BuildError::AccessKey`] when the settings' model or emission type
    /// can never produce a valid key.
    pub fn new(
        resolver: TaxMatrixResolver,
        sequences: Arc<dyn SequenceCounter>,
        random: Arc<dyn RandomSource>,
        clock: Arc<dyn Clock>,
        settings: BuilderSettings,
    ) -> Result<Self, BuildError> {
        if settings.model > 99 {
            return Err(AccessKeyError::ModelOutOfRange(settings.model).into());
        }
        if !(1..=9).contains(&settings.emission_type) {
            return Err(AccessKeyError::EmissionTypeOutOfRange(settings.emission_type).into());
        }
        Ok(Self {
            resolver,
            sequences,
            random,
            clock,
            settings,
        })
    }

    /// Build and number a document.
    pub fn build(&self, order: ShipmentOrder) -> Result<FiscalDocument, BuildError> {
        let insurance = insurance_gate(order.insurance.as_ref())?;
        let service_value = service_value(&order)?;
        if order.cargo.description.trim().is_empty() {
            return Err(ValidationError::MissingField("cargo.description").into());
        }
        if order.series > MAX_SERIES {
            return Err(AccessKeyError::SeriesOutOfRange(order.series).into());
        }
        if let Some(code) = order.contingency_code.filter(|c| *c > MAX_NUMERIC_CODE) {
            return Err(AccessKeyError::NumericCodeOutOfRange(code).into());
        }

        let resolved = self.resolver.resolve(
            order.organization,
            order.origin,
            order.destination,
            order.regime,
            order.as_of,
        )?;
        let computation = compute_tax(&resolved, service_value.total.amount())?;
        let currency = service_value.total.currency().clone();
        let icms = IcmsBlock {
            cst: resolved.cst.clone(),
            base: Money::new(computation.base, currency.clone()),
            rate: computation.rate,
            value: Money::new(computation.tax_value, currency),
            base_reduction: resolved.reduction,
        };
        let ibs_cbs = order.ibs_cbs.map(IbsCbsGroup::new).transpose()?;
        if let Some(group) = &ibs_cbs {
            if group.base().currency() != service_value.total.currency() {
                return Err(ValidationError::InvalidCurrency(group.base().currency().to_string()).into());
            }
        }

        let number = self.sequences.next(order.branch, order.series)?;
        let issued_at = self.clock.now();
        let access_key = generate_access_key(
            &AccessKeyParams {
                jurisdiction: order.emitter.jurisdiction,
                issued_on: issued_at.date_naive(),
                tax_id: order.emitter.tax_id.clone(),
                model: self.settings.model,
                series: order.series,
                number,
                emission_type: self.settings.emission_type,
                numeric_code: order.contingency_code,
            },
            self.random.as_ref(),
        )?;

        tracing::info!(
            organization = %order.organization,
            branch = %order.branch,
            series = order.series,
            number,
            access_key = %access_key,
            rule_id = %resolved.rule_id,
            "emitted CT-e"
        );

        Ok(FiscalDocument {
            header: DocumentHeader {
                numeric_code: access_key.components().numeric_code,
                access_key,
                model: self.settings.model,
                series: order.series,
                number,
                emission_type: self.settings.emission_type,
                issued_at,
                origin: order.origin,
                destination: order.destination,
                operation_code: resolved.operation_code,
                tax_rule_id: resolved.rule_id,
            },
            emitter: order.emitter,
            counterparties: order.counterparties,
            cargo: order.cargo,
            insurance,
            icms: vec![icms],
            ibs_cbs,
            service_value,
        })
    }

    /// Void `document` without a replacement.
    pub fn void(&self, document: &FiscalDocument, reason: &str) -> Result<VoidNotice, BuildError> {
        if reason.trim().is_empty() {
            return Err(BuildError::MissingVoidReason);
        }
        tracing::warn!(access_key = %document.access_key(), reason, "voided CT-e");
        Ok(VoidNotice {
            voided_access_key: document.access_key().clone(),
            replaced_by: None,
            reason: reason.to_string(),
            voided_at: self.clock.now(),
        })
    }

    /// Void `previous` and emit a replacement for `order` with a fresh
    /// number and key. If the replacement cannot be built, nothing is
    /// voided.
    pub fn reissue(
        &self,
        previous: &FiscalDocument,
        order: ShipmentOrder,
        reason: &str,
    ) -> Result<Reissue, BuildError> {
        if reason.trim().is_empty() {
            return Err(BuildError::MissingVoidReason);
        }
        let replacement = self.build(order)?;
        let mut void = self.void(previous, reason)?;
        void.replaced_by = Some(replacement.access_key().clone());
        Ok(Reissue { void, replacement })
    }
}

fn insurance_gate(info: Option<&InsuranceInfo>) -> Result<Insurance, BuildError> {
    let present = |v: Option<&String>| v.filter(|s| !s.trim().is_empty()).cloned();
    let info = info.ok_or(BuildError::MissingInsuranceAverbation { missing: "policy" })?;
    let policy_number = present(info.policy_number.as_ref())
        .ok_or(BuildError::MissingInsuranceAverbation { missing: "policy" })?;
    let averbation_number = present(info.averbation_number.as_ref())
        .ok_or(BuildError::MissingInsuranceAverbation { missing: "averbation" })?;
    Ok(Insurance {
        insurer: info.insurer.clone(),
        policy_number,
        averbation_number,
    })
}

fn service_value(order: &ShipmentOrder) -> Result<ServiceValue, BuildError> {
    let first = order
        .service_components
        .first()
        .ok_or(ValidationError::MissingField("service_components"))?;
    let currency = first.value.currency().clone();

    let mut total = Decimal::ZERO;
    for component in &order.service_components {
        if component.name.trim().is_empty() {
            return Err(ValidationError::MissingField("service_components.name").into());
        }
        if component.value.currency() != &currency {
            return Err(ValidationError::InvalidCurrency(component.value.currency().to_string()).into());
        }
        if component.value.is_negative() {
            return Err(ValidationError::InvalidValue(component.value.amount().to_string()).into());
        }
        total = total
            .checked_add(component.value.amount())
            .ok_or_else(|| ValidationError::AmountOutOfRange("service_components total".into()))?;
    }
    if total <= Decimal::ZERO {
        return Err(ValidationError::InvalidValue(total.to_string()).into());
    }

    let total = Money::new(total, currency.clone());
    let receivable = match &order.receivable {
        None => total.clone(),
        Some(r) if r.currency() != &currency => {
            return Err(ValidationError::InvalidCurrency(r.currency().to_string()).into())
        }
        Some(r) if r.is_negative() || r.amount() > total.amount() => {
            return Err(ValidationError::InvalidValue(r.amount().to_string()).into())
        }
        Some(r) => r.clone(),
    };

    Ok(ServiceValue {
        total: total.rounded(),
        receivable: receivable.rounded(),
        components: order.service_components.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_key::AccessKey;
    use crate::document::CounterpartyRole;
    use crate::sequence::MemorySequenceCounter;
    use chrono::{TimeZone, Utc};
    use fiscal_core::{Cnpj, FixedClock, SeededRandom};
    use fiscal_tax::{TaxRule, TaxRuleSet};

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn brl(s: &str) -> Money {
        Money::brl(d(s))
    }

    struct Fixture {
        builder: DocumentBuilder,
        sequences: Arc<MemorySequenceCounter>,
        org: OrganizationId,
        branch: BranchId,
    }

    fn fixture(seed: u64) -> Fixture {
        let org = OrganizationId::new();
        let rules = TaxRuleSet::from_rules([TaxRule {
            rule_id: "sp-ba-2026".into(),
            organization: org,
            origin: JurisdictionCode::SP,
            destination: JurisdictionCode::BA,
            regime: TaxRegime::Normal,
            rate: d("7"),
            secondary_rate: None,
            reduction: Decimal::ZERO,
            additional_rate: Decimal::ZERO,
            operation_code_internal: "5353".into(),
            operation_code_interstate: "6353".into(),
            cst: "00".into(),
            valid_from: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            valid_to: None,
        }])
        .unwrap();
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 5, 20, 14, 30, 0).unwrap()));
        let sequences = Arc::new(MemorySequenceCounter::new());
        let builder = DocumentBuilder::new(
            TaxMatrixResolver::new(Arc::new(rules), clock.clone()),
            sequences.clone(),
            Arc::new(SeededRandom::new(seed)),
            clock,
            BuilderSettings::default(),
        )
        .unwrap();
        Fixture {
            builder,
            sequences,
            org,
            branch: BranchId::new(),
        }
    }

    fn party(name: &str, cnpj: &str, uf: JurisdictionCode) -> Party {
        Party {
            name: name.into(),
            tax_id: Cnpj::new(cnpj).unwrap(),
            state_registration: None,
            jurisdiction: uf,
        }
    }

    fn order(f: &Fixture) -> ShipmentOrder {
        ShipmentOrder {
            organization: f.org,
            branch: f.branch,
            series: 1,
            regime: TaxRegime::Normal,
            emitter: party("Transportes Rapido Ltda", "12.345.678/0001-95", JurisdictionCode::SP),
            counterparties: vec![
                Counterparty {
                    role: CounterpartyRole::Sender,
                    party: party("Industria Paulista SA", "11.222.333/0001-81", JurisdictionCode::SP),
                },
                Counterparty {
                    role: CounterpartyRole::Recipient,
                    party: party("Comercio Baiano Ltda", "44.555.666/0001-72", JurisdictionCode::BA),
                },
            ],
            origin: JurisdictionCode::SP,
            destination: JurisdictionCode::BA,
            cargo: Cargo {
                description: "Pecas automotivas".into(),
                declared_value: brl("25000"),
                weight_kg: Some(d("1200")),
            },
            insurance: Some(InsuranceInfo {
                insurer: Some("Seguradora Exemplo".into()),
                policy_number: Some("APOL-2026-0001".into()),
                averbation_number: Some("AVB-778899".into()),
            }),
            service_components: vec![
                ServiceComponent {
                    name: "frete".into(),
                    value: brl("900"),
                },
                ServiceComponent {
                    name: "pedagio".into(),
                    value: brl("100"),
                },
            ],
            receivable: None,
            ibs_cbs: None,
            as_of: None,
            contingency_code: None,
        }
    }

    #[test]
    fn builds_numbered_document() {
        let f = fixture(7);
        let doc = f.builder.build(order(&f)).unwrap();

        let h = doc.header();
        assert_eq!(h.number, 1);
        assert_eq!(h.model, 57);
        assert_eq!(h.operation_code, "6353");
        assert_eq!(h.tax_rule_id, "sp-ba-2026");
        assert_eq!(doc.service_value().total.amount(), d("1000"));
        assert_eq!(doc.service_value().receivable.amount(), d("1000"));
        assert_eq!(doc.icms()[0].value.amount(), d("70.00"));
        assert_eq!(doc.icms()[0].cst, "00");
        assert_eq!(
            doc.counterparty(CounterpartyRole::Recipient).unwrap().jurisdiction,
            JurisdictionCode::BA
        );

        let c = doc.access_key().components();
        assert_eq!(c.jurisdiction, JurisdictionCode::SP);
        assert_eq!((c.year, c.month), (26, 5));
        assert_eq!(c.model, 57);
        assert_eq!(c.number, 1);
        assert_eq!(c.numeric_code, h.numeric_code);
        assert!(AccessKey::parse(doc.access_key().as_str()).is_ok());
    }

    #[test]
    fn emitted_document_serializes_for_the_sink() {
        let f = fixture(7);
        let doc = f.builder.build(order(&f)).unwrap();
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["header"]["access_key"], doc.access_key().as_str());
        assert_eq!(json["insurance"]["averbation_number"], "AVB-778899");
    }

    #[test]
    fn numbers_are_consecutive_per_branch() {
        let f = fixture(7);
        let a = f.builder.build(order(&f)).unwrap();
        let b = f.builder.build(order(&f)).unwrap();
        assert_eq!((a.header().number, b.header().number), (1, 2));
        assert_ne!(a.access_key(), b.access_key());
    }

    #[test]
    fn same_seed_same_key() {
        let (f1, f2) = (fixture(42), fixture(42));
        let k1 = f1.builder.build(order(&f1)).unwrap().access_key().clone();
        let k2 = f2.builder.build(order(&f2)).unwrap().access_key().clone();
        assert_eq!(k1, k2);
    }

    #[test]
    fn missing_averbation_blocks_before_anything_else() {
        let f = fixture(1);
        let mut o = order(&f);
        o.insurance = Some(InsuranceInfo {
            insurer: None,
            policy_number: Some("APOL-1".into()),
            averbation_number: Some("  ".into()),
        });
        o.service_components.clear();
        assert_eq!(
            f.builder.build(o),
            Err(BuildError::MissingInsuranceAverbation { missing: "averbation" })
        );
        assert_eq!(f.sequences.current(f.branch, 1).unwrap(), 0);
    }

    #[test]
    fn missing_insurance_block() {
        let f = fixture(1);
        let mut o = order(&f);
        o.insurance = None;
        let err = f.builder.build(o).unwrap_err();
        assert!(matches!(err, BuildError::MissingInsuranceAverbation { missing: "policy" }));
        assert!(matches!(FiscalError::from(err), FiscalError::Compliance(_)));
    }

    #[test]
    fn missing_rule_consumes_no_number() {
        let f = fixture(1);
        let mut o = order(&f);
        o.destination = JurisdictionCode::RJ;
        assert!(matches!(
            f.builder.build(o),
            Err(BuildError::Tax(TaxError::NoTaxRuleConfigured { .. }))
        ));
        assert_eq!(f.sequences.current(f.branch, 1).unwrap(), 0);
    }

    #[test]
    fn inconsistent_ibs_cbs_consumes_no_number() {
        let f = fixture(1);
        let mut o = order(&f);
        o.ibs_cbs = Some(IbsCbsParams {
            cst: "000".into(),
            classification_code: "000001".into(),
            base: brl("1000"),
            sub_national_rate: d("0.1"),
            sub_national_value: brl("1.00"),
            municipal_rate: Decimal::ZERO,
            municipal_value: brl("0"),
            federal_rate: d("0.9"),
            federal_value: brl("9.50"),
            deferral: None,
            refund: None,
            rate_reduction: None,
            presumed_credit: None,
            government_purchase: None,
        });
        assert!(matches!(f.builder.build(o), Err(BuildError::IbsCbs(_))));
        assert_eq!(f.sequences.current(f.branch, 1).unwrap(), 0);
    }

    #[test]
    fn consistent_ibs_cbs_is_attached() {
        let f = fixture(1);
        let mut o = order(&f);
        o.ibs_cbs = Some(IbsCbsParams {
            cst: "000".into(),
            classification_code: "000001".into(),
            base: brl("1000"),
            sub_national_rate: d("0.1"),
            sub_national_value: brl("1.00"),
            municipal_rate: Decimal::ZERO,
            municipal_value: brl("0"),
            federal_rate: d("0.9"),
            federal_value: brl("9.00"),
            deferral: None,
            refund: None,
            rate_reduction: None,
            presumed_credit: None,
            government_purchase: None,
        });
        let doc = f.builder.build(o).unwrap();
        assert_eq!(doc.ibs_cbs().unwrap().grand_total().amount(), d("10.00"));
    }

    #[test]
    fn out_of_range_contingency_code_consumes_no_number() {
        let f = fixture(1);
        let mut o = order(&f);
        o.contingency_code = Some(100_000_000);
        assert_eq!(
            f.builder.build(o),
            Err(BuildError::AccessKey(AccessKeyError::NumericCodeOutOfRange(100_000_000)))
        );
        assert_eq!(f.sequences.current(f.branch, 1).unwrap(), 0);
    }

    #[test]
    fn ibs_cbs_currency_must_match_service_value() {
        let f = fixture(1);
        let usd = |s: &str| Money::new(d(s), fiscal_core::Currency::new("USD").unwrap());
        let mut o = order(&f);
        o.ibs_cbs = Some(IbsCbsParams {
            cst: "000".into(),
            classification_code: "000001".into(),
            base: usd("1000"),
            sub_national_rate: d("0.1"),
            sub_national_value: usd("1.00"),
            municipal_rate: Decimal::ZERO,
            municipal_value: usd("0"),
            federal_rate: d("0.9"),
            federal_value: usd("9.00"),
            deferral: None,
            refund: None,
            rate_reduction: None,
            presumed_credit: None,
            government_purchase: None,
        });
        assert_eq!(
            f.builder.build(o),
            Err(BuildError::Validation(ValidationError::InvalidCurrency("USD".into())))
        );
        assert_eq!(f.sequences.current(f.branch, 1).unwrap(), 0);
    }

    #[test]
    fn overflowing_service_total_is_rejected() {
        let f = fixture(1);
        let mut o = order(&f);
        o.service_components[0].value = Money::brl(Decimal::MAX);
        assert!(matches!(
            f.builder.build(o),
            Err(BuildError::Validation(ValidationError::AmountOutOfRange(_)))
        ));
        assert_eq!(f.sequences.current(f.branch, 1).unwrap(), 0);
    }

    #[test]
    fn receivable_cannot_exceed_total() {
        let f = fixture(1);
        let mut o = order(&f);
        o.receivable = Some(brl("1000.01"));
        assert!(matches!(f.builder.build(o), Err(BuildError::Validation(_))));
    }

    #[test]
    fn mixed_currencies_rejected() {
        let f = fixture(1);
        let mut o = order(&f);
        o.service_components[1].value = Money::new(d("100"), fiscal_core::Currency::new("USD").unwrap());
        assert!(matches!(
            f.builder.build(o),
            Err(BuildError::Validation(ValidationError::InvalidCurrency(_)))
        ));
    }

    #[test]
    fn reissue_voids_previous_and_renumbers() {
        let f = fixture(3);
        let first = f.builder.build(order(&f)).unwrap();
        let Reissue { void, replacement } = f
            .builder
            .reissue(&first, order(&f), "valor do frete incorreto")
            .unwrap();
        assert_eq!(&void.voided_access_key, first.access_key());
        assert_eq!(void.replaced_by.as_ref(), Some(replacement.access_key()));
        assert_eq!(replacement.header().number, 2);
        assert_ne!(replacement.access_key(), first.access_key());
    }

    #[test]
    fn reissue_requires_reason() {
        let f = fixture(3);
        let first = f.builder.build(order(&f)).unwrap();
        assert_eq!(
            f.builder.reissue(&first, order(&f), " "),
            Err(BuildError::MissingVoidReason)
        );
        assert_eq!(f.sequences.current(f.branch, 1).unwrap(), 1);
    }

    #[test]
    fn invalid_settings_rejected() {
        let f = fixture(0);
        let err = DocumentBuilder::new(
            f.builder.resolver.clone(),
            f.sequences.clone(),
            Arc::new(SeededRandom::new(0)),
            Arc::new(FixedClock::new(Utc::now())),
            BuilderSettings {
                model: 57,
                emission_type: 0,
            },
        )
        .unwrap_err();
        assert_eq!(err, BuildError::AccessKey(AccessKeyError::EmissionTypeOutOfRange(0)));
    }

    #[test]
    fn order_deserializes_with_defaults() {
        let f = fixture(0);
        let json = serde_json::to_value(order(&f)).unwrap();
        let mut trimmed = json.clone();
        let obj = trimmed.as_object_mut().unwrap();
        obj.remove("series");
        obj.remove("receivable");
        obj.remove("ibs_cbs");
        let back: ShipmentOrder = serde_json::from_value(trimmed).unwrap();
        assert_eq!(back.series, 1);
        assert_eq!(back.receivable, None);
    }
}
