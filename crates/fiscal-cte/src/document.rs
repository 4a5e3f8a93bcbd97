//! # CT-e Document Model
//!
//! The assembled transport document. Inputs ([`Party`], [`Cargo`],
//! [`ServiceComponent`], ...) are plain serde structs; the
//! [`FiscalDocument`] itself only comes out of the builder and exposes
//! read-only accessors, so nothing can change it after the key is
//! assigned.

use chrono::{DateTime, Utc};
use fiscal_core::{Cnpj, JurisdictionCode, Money};
use fiscal_tax::IbsCbsGroup;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::access_key::AccessKey;

/// Model code of a CT-e.
pub const CTE_MODEL: u8 = 57;

// ---------------------------------------------------------------------------
// Parties
// ---------------------------------------------------------------------------

/// A legal entity on the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    /// Legal name.
    pub name: String,
    /// CNPJ.
    pub tax_id: Cnpj,
    /// State registration (IE), when the party has one.
    #[serde(default)]
    pub state_registration: Option<String>,
    /// UF of the address.
    pub jurisdiction: JurisdictionCode,
}

/// Role of a counterparty on a transport operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterpartyRole {
    /// Remetente.
    Sender,
    /// Destinatario.
    Recipient,
    /// Expedidor.
    Dispatcher,
    /// Recebedor.
    Receiver,
    /// Tomador (who pays for the service).
    ServiceTaker,
}

/// A party in a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    /// Role.
    pub role: CounterpartyRole,
    /// Party.
    pub party: Party,
}

// ---------------------------------------------------------------------------
// Cargo & insurance
// ---------------------------------------------------------------------------

/// What is being transported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cargo {
    /// Predominant product.
    pub description: String,
    /// Declared value of the goods.
    pub declared_value: Money,
    /// Gross weight.
    #[serde(default)]
    pub weight_kg: Option<Decimal>,
}

/// Insurance as requested on the shipment order; either field may be
/// missing and the builder refuses to emit until both are there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsuranceInfo {
    /// Insurer name.
    #[serde(default)]
    pub insurer: Option<String>,
    /// Policy number.
    #[serde(default)]
    pub policy_number: Option<String>,
    /// Averbation (certificate) number.
    #[serde(default)]
    pub averbation_number: Option<String>,
}

/// Insurance as recorded on an emitted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insurance {
    /// Insurer name.
    pub insurer: Option<String>,
    /// Policy number.
    pub policy_number: String,
    /// Averbation number.
    pub averbation_number: String,
}

// ---------------------------------------------------------------------------
// Tax and value blocks
// ---------------------------------------------------------------------------

/// Legacy ICMS block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcmsBlock {
    /// Tax status code.
    pub cst: String,
    /// Base after reduction.
    pub base: Money,
    /// Rate, percent.
    pub rate: Decimal,
    /// Tax value.
    pub value: Money,
    /// Base reduction, percent.
    pub base_reduction: Decimal,
}

/// Named part of the service price (freight, toll, handling, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceComponent {
    /// Component name.
    pub name: String,
    /// Value.
    pub value: Money,
}

/// The `vPrest` block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceValue {
    /// Total service value: sum of the components.
    pub total: Money,
    /// Amount receivable from the service taker.
    pub receivable: Money,
    /// Components.
    pub components: Vec<ServiceComponent>,
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Identification block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHeader {
    /// 44-digit access key.
    pub access_key: AccessKey,
    /// Model code.
    pub model: u8,
    /// Series.
    pub series: u16,
    /// Number.
    pub number: u32,
    /// Emission type.
    pub emission_type: u8,
    /// Numeric code embedded in the key.
    pub numeric_code: u32,
    /// Issue instant.
    pub issued_at: DateTime<Utc>,
    /// Start of the service.
    pub origin: JurisdictionCode,
    /// End of the service.
    pub destination: JurisdictionCode,
    /// CFOP.
    pub operation_code: String,
    /// Tax rule that priced the document.
    pub tax_rule_id: String,
}

/// An emitted CT-e.
///
/// Serialize-only: a document is never rebuilt from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FiscalDocument {
    pub(crate) header: DocumentHeader,
    pub(crate) emitter: Party,
    pub(crate) counterparties: Vec<Counterparty>,
    pub(crate) cargo: Cargo,
    pub(crate) insurance: Insurance,
    pub(crate) icms: Vec<IcmsBlock>,
    pub(crate) ibs_cbs: Option<IbsCbsGroup>,
    pub(crate) service_value: ServiceValue,
}

impl FiscalDocument {
    /// Identification block.
    pub fn header(&self) -> &DocumentHeader {
        &self.header
    }

    /// Shorthand for the header's key.
    pub fn access_key(&self) -> &AccessKey {
        &self.header.access_key
    }

    /// Emitter.
    pub fn emitter(&self) -> &Party {
        &self.emitter
    }

    /// Counterparties in order.
    pub fn counterparties(&self) -> &[Counterparty] {
        &self.counterparties
    }

    /// First counterparty in `role`.
    pub fn counterparty(&self, role: CounterpartyRole) -> Option<&Party> {
        self.counterparties
            .iter()
            .find(|c| c.role == role)
            .map(|c| &c.party)
    }

    /// Cargo.
    pub fn cargo(&self) -> &Cargo {
        &self.cargo
    }

    /// Insurance.
    pub fn insurance(&self) -> &Insurance {
        &self.insurance
    }

    /// Legacy ICMS blocks.
    pub fn icms(&self) -> &[IcmsBlock] {
        &self.icms
    }

    /// Dual-VAT group.
    pub fn ibs_cbs(&self) -> Option<&IbsCbsGroup> {
        self.ibs_cbs.as_ref()
    }

    /// `vPrest` block.
    pub fn service_value(&self) -> &ServiceValue {
        &self.service_value
    }
}

/// Record that a document's key is no longer valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoidNotice {
    /// Key of the voided document.
    pub voided_access_key: AccessKey,
    /// Key of the replacement, when one was emitted.
    pub replaced_by: Option<AccessKey>,
    /// Justification.
    pub reason: String,
    /// When.
    pub voided_at: DateTime<Utc>,
}
