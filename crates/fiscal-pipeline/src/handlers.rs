//! # Job Handlers
//!
//! The state machine does not care what a job computes. Each
//! [`JobType`] maps to one [`JobHandler`] that turns the job payload into a
//! JSON result, and each failure is classified by
//! [`HandlerError::is_retryable`] so the service knows whether to re-queue
//! or fail for good.
//!
//! | Job type | Handler | Payload |
//! |---|---|---|
//! | `tax_calculation` | [`TaxCalculationHandler`] | [`TaxPayload`] |
//! | `cte_emission` | [`CteEmissionHandler`] | [`ShipmentOrder`] |

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use fiscal_core::JurisdictionCode;
use fiscal_cte::{BuildError, DocumentBuilder, FiscalDocument, ShipmentOrder};
use fiscal_state::{Document, DocumentJob, DocumentType, JobType};
use fiscal_tax::{
    compute_tax, ScenarioCalculator, ScenarioRequest, TaxError, TaxMatrixResolver, TaxRegime,
};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a handler gave up on an attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The payload does not describe a valid request.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The job does not fit the document it points at.
    #[error("job type {job_type} cannot process a {document_type:?} document")]
    WrongDocumentType {
        /// Job type.
        job_type: JobType,
        /// Document type found.
        document_type: DocumentType,
    },

    /// Nothing registered for the job type.
    #[error("no handler registered for job type {0}")]
    Unsupported(JobType),

    /// Tax engine failure.
    #[error(transparent)]
    Tax(#[from] TaxError),

    /// CT-e build failure.
    #[error(transparent)]
    Build(#[from] BuildError),

    /// The output sink did not accept the document.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl HandlerError {
    /// Transient errors are retried up to the job's attempt budget.
    /// Validation, configuration and compliance errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Tax(err) => err.is_transient(),
            Self::Build(err) => err.is_transient(),
            Self::Sink(_) => true,
            Self::InvalidPayload(_) | Self::WrongDocumentType { .. } | Self::Unsupported(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Handler contract & registry
// ---------------------------------------------------------------------------

/// Payload logic for one job type. Runs synchronously; handlers are CPU
/// bound.
pub trait JobHandler: Send + Sync {
    /// Job type served.
    fn job_type(&self) -> JobType;

    /// Process one attempt.
    fn handle(&self, job: &DocumentJob, document: &Document) -> Result<Value, HandlerError>;
}

/// Job type → handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("job_types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler`, replacing any previous one for its job type.
    pub fn register(mut self, handler: impl JobHandler + 'static) -> Self {
        self.handlers.insert(handler.job_type(), Arc::new(handler));
        self
    }

    /// Handler for `job_type`.
    pub fn find(&self, job_type: JobType) -> Option<&dyn JobHandler> {
        self.handlers.get(&job_type).map(|h| h.as_ref())
    }

    /// Run the handler registered for the job.
    pub fn dispatch(&self, job: &DocumentJob, document: &Document) -> Result<Value, HandlerError> {
        self.find(job.job_type)
            .ok_or(HandlerError::Unsupported(job.job_type))?
            .handle(job, document)
    }
}

fn parse_payload<T: for<'de> Deserialize<'de>>(job: &DocumentJob) -> Result<T, HandlerError> {
    serde_json::from_value(job.payload.clone()).map_err(|e| HandlerError::InvalidPayload(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tax calculation
// ---------------------------------------------------------------------------

/// A route priced by the tax matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleRequest {
    /// Origin UF.
    pub origin: JurisdictionCode,
    /// Destination UF.
    pub destination: JurisdictionCode,
    /// Tax regime.
    pub regime: TaxRegime,
    /// Gross value.
    pub value: Decimal,
    /// Reference date; today when absent.
    #[serde(default)]
    pub as_of: Option<NaiveDate>,
}

/// Input of a tax calculation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TaxPayload {
    /// Operation-type estimate.
    Scenario(ScenarioRequest),
    /// Exact rule from the organization's tax matrix.
    Rule(RuleRequest),
}

/// Computes taxes for invoices.
#[derive(Clone)]
pub struct TaxCalculationHandler {
    scenarios: ScenarioCalculator,
    resolver: TaxMatrixResolver,
}

impl TaxCalculationHandler {
    /// Handler over a scenario calculator and a rule resolver.
    pub fn new(scenarios: ScenarioCalculator, resolver: TaxMatrixResolver) -> Self {
        Self { scenarios, resolver }
    }
}

impl JobHandler for TaxCalculationHandler {
    fn job_type(&self) -> JobType {
        JobType::TaxCalculation
    }

    fn handle(&self, job: &DocumentJob, document: &Document) -> Result<Value, HandlerError> {
        if document.document_type != DocumentType::Invoice {
            return Err(HandlerError::WrongDocumentType {
                job_type: job.job_type,
                document_type: document.document_type,
            });
        }
        match parse_payload::<TaxPayload>(job)? {
            TaxPayload::Scenario(request) => {
                let result = self.scenarios.calculate(&request)?;
                Ok(json!({ "mode": "scenario", "scenario": result }))
            }
            TaxPayload::Rule(request) => {
                let resolution = self.resolver.resolve(
                    job.organization,
                    request.origin,
                    request.destination,
                    request.regime,
                    request.as_of,
                )?;
                let computation = compute_tax(&resolution, request.value)?;
                Ok(json!({
                    "mode": "rule",
                    "resolution": resolution,
                    "computation": computation,
                }))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// CT-e emission
// ---------------------------------------------------------------------------

/// Delivery failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("output sink failed: {0}")]
pub struct SinkError(pub String);

/// Destination of emitted documents (signing and transmission live behind
/// it).
pub trait OutputSink: Send + Sync {
    /// Accept one document.
    fn deliver(&self, document: &FiscalDocument) -> Result<(), SinkError>;
}

/// Collects documents in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<FiscalDocument>>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents received so far.
    pub fn delivered(&self) -> Vec<FiscalDocument> {
        self.delivered.lock().clone()
    }
}

impl OutputSink for MemorySink {
    fn deliver(&self, document: &FiscalDocument) -> Result<(), SinkError> {
        self.delivered.lock().push(document.clone());
        Ok(())
    }
}

/// Emits CT-e documents for transport manifests.
#[derive(Clone)]
pub struct CteEmissionHandler {
    builder: DocumentBuilder,
    sink: Arc<dyn OutputSink>,
}

impl CteEmissionHandler {
    /// Handler over a builder and a sink.
    pub fn new(builder: DocumentBuilder, sink: Arc<dyn OutputSink>) -> Self {
        Self { builder, sink }
    }
}

impl JobHandler for CteEmissionHandler {
    fn job_type(&self) -> JobType {
        JobType::CteEmission
    }

    fn handle(&self, job: &DocumentJob, document: &Document) -> Result<Value, HandlerError> {
        if document.document_type != DocumentType::TransportManifest {
            return Err(HandlerError::WrongDocumentType {
                job_type: job.job_type,
                document_type: document.document_type,
            });
        }
        let order: ShipmentOrder = parse_payload(job)?;
        if order.organization != job.organization || order.branch != job.branch {
            return Err(HandlerError::InvalidPayload(
                "shipment order belongs to another organization or branch".into(),
            ));
        }

        let cte = self.builder.build(order)?;
        self.sink.deliver(&cte)?;

        let header = cte.header();
        Ok(json!({
            "access_key": cte.access_key(),
            "series": header.series,
            "number": header.number,
            "operation_code": header.operation_code,
            "service_total": cte.service_value().total,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fiscal_core::{BranchId, Clock, FixedClock, OrganizationId};
    use fiscal_state::{NewDocument, NewJob};
    use fiscal_tax::{ScenarioRates, TaxRuleSet};

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 4, 2, 12, 0, 0).unwrap()))
    }

    fn document(kind: DocumentType) -> Document {
        Document::new(
            NewDocument {
                organization: OrganizationId::new(),
                branch: BranchId::new(),
                document_type: kind,
                file_name: "input.xml".into(),
                mime_type: "application/xml".into(),
                size_bytes: 10,
                storage_pointer: "mem://input.xml".into(),
            },
            clock().now(),
        )
        .unwrap()
    }

    fn job(doc: &Document, job_type: JobType, payload: Value) -> DocumentJob {
        DocumentJob::new(
            NewJob {
                organization: doc.organization,
                branch: doc.branch,
                document_id: doc.id,
                job_type,
                payload,
            },
            3,
            doc.created_at,
        )
        .unwrap()
    }

    fn tax_handler() -> TaxCalculationHandler {
        TaxCalculationHandler::new(
            ScenarioCalculator::new(ScenarioRates::default()),
            TaxMatrixResolver::new(Arc::new(TaxRuleSet::new()), clock()),
        )
    }

    #[test]
    fn scenario_payload() {
        let doc = document(DocumentType::Invoice);
        let j = job(
            &doc,
            JobType::TaxCalculation,
            json!({
                "mode": "scenario",
                "operation_type": "venda",
                "origin": "SP",
                "destination": "BA",
                "value": "1000",
            }),
        );
        let out = tax_handler().handle(&j, &doc).unwrap();
        assert_eq!(out["mode"], "scenario");
        assert_eq!(out["scenario"]["operation_code"], "6102");
    }

    #[test]
    fn missing_rule_is_permanent() {
        let doc = document(DocumentType::Invoice);
        let j = job(
            &doc,
            JobType::TaxCalculation,
            json!({
                "mode": "rule",
                "origin": "SP",
                "destination": "RJ",
                "regime": "normal",
                "value": "100",
            }),
        );
        let err = tax_handler().handle(&j, &doc).unwrap_err();
        assert!(matches!(err, HandlerError::Tax(TaxError::NoTaxRuleConfigured { .. })));
        assert!(!err.is_retryable());
    }

    #[test]
    fn malformed_payload_is_permanent() {
        let doc = document(DocumentType::Invoice);
        let j = job(&doc, JobType::TaxCalculation, json!({ "mode": "guess" }));
        let err = tax_handler().handle(&j, &doc).unwrap_err();
        assert!(matches!(err, HandlerError::InvalidPayload(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn wrong_document_type() {
        let doc = document(DocumentType::BankStatement);
        let j = job(&doc, JobType::TaxCalculation, json!({}));
        assert!(matches!(
            tax_handler().handle(&j, &doc),
            Err(HandlerError::WrongDocumentType { .. })
        ));
    }

    #[test]
    fn registry_dispatch() {
        let registry = HandlerRegistry::new().register(tax_handler());
        let doc = document(DocumentType::TransportManifest);
        let j = job(&doc, JobType::CteEmission, json!({}));
        assert_eq!(
            registry.dispatch(&j, &doc),
            Err(HandlerError::Unsupported(JobType::CteEmission))
        );
        assert!(registry.find(JobType::TaxCalculation).is_some());
    }

    #[test]
    fn retry_classification() {
        assert!(HandlerError::Sink(SinkError("timeout".into())).is_retryable());
        assert!(HandlerError::Tax(TaxError::SourceUnavailable("db down".into())).is_retryable());
        assert!(!HandlerError::Build(BuildError::MissingInsuranceAverbation { missing: "policy" })
            .is_retryable());
    }
}
