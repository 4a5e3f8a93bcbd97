//! # fiscal-pipeline — Job Engine
//!
//! Drives uploaded fiscal artifacts through their jobs:
//!
//! - [`store`]: the storage contract (versioned reads, atomic
//!   compare-and-set commits) and an in-memory implementation.
//! - [`service`]: the [`Pipeline`] operations (upload, enqueue, claim,
//!   complete, record failure, force-fail, reprocess, sweep).
//! - [`handlers`]: payload logic per job type and the output sink.
//! - [`worker`]: tokio worker and sweeper loops with watch-channel
//!   shutdown.
//! - [`config`] and [`telemetry`]: settings and tracing setup.
//!
//! ## Wiring
//!
//! ```ignore
//! let config = PipelineConfig::from_env()?;
//! try_init_tracing(LogFormat::from_env())?;
//! let pipeline = Pipeline::new(store, clock, &config)?;
//! let handlers = Arc::new(
//!     HandlerRegistry::new()
//!         .register(TaxCalculationHandler::new(scenarios, resolver))
//!         .register(CteEmissionHandler::new(builder, sink)),
//! );
//! let (tx, rx) = shutdown_channel();
//! let tasks = worker::spawn(pipeline, handlers, &rx);
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod service;
pub mod store;
pub mod telemetry;
pub mod worker;

pub use config::{ConfigError, PipelineConfig};
pub use error::PipelineError;
pub use handlers::{
    CteEmissionHandler, HandlerError, HandlerRegistry, JobHandler, MemorySink, OutputSink,
    RuleRequest, SinkError, TaxCalculationHandler, TaxPayload,
};
pub use service::{Claim, Pipeline, SweepReport};
pub use store::{MemoryStore, PipelineStore, StoreError, Version, Versioned, Write, WriteSet};
pub use telemetry::{try_init_tracing, LogFormat, TelemetryError};
pub use worker::{run_sweeper, shutdown_channel, ShutdownReceiver, ShutdownSender, Tick, Worker};
