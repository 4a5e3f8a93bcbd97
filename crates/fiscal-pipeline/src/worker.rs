//! # Workers & Sweeper
//!
//! Each worker is a tokio task looping claim → dispatch → complete or
//! record failure. An idle worker sleeps for the poll interval. The
//! sweeper is one more task running [`Pipeline::sweep_stale`] on a fixed
//! period. All of them stop when the shared `watch` channel flips to
//! `true` (or its sender is dropped).
//!
//! Store locks are synchronous and released before any `.await`. A
//! handler that panics fails its job permanently; the worker keeps
//! running.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::PipelineError;
use crate::handlers::HandlerRegistry;
use crate::service::{Claim, Pipeline};

/// Sender half of the shutdown signal.
pub type ShutdownSender = watch::Sender<bool>;

/// Receiver half of the shutdown signal.
pub type ShutdownReceiver = watch::Receiver<bool>;

/// A new shutdown channel, initially running.
pub fn shutdown_channel() -> (ShutdownSender, ShutdownReceiver) {
    watch::channel(false)
}

/// What one [`Worker::run_once`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Nothing was claimable.
    Idle,
    /// A job was run to success.
    Succeeded,
    /// A job attempt failed and was recorded.
    Failed,
}

/// A single job runner.
#[derive(Debug, Clone)]
pub struct Worker {
    id: String,
    pipeline: Pipeline,
    handlers: Arc<HandlerRegistry>,
    poll_interval: Duration,
}

impl Worker {
    /// Worker `id` over `pipeline`.
    pub fn new(
        id: impl Into<String>,
        pipeline: Pipeline,
        handlers: Arc<HandlerRegistry>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            pipeline,
            handlers,
            poll_interval,
        }
    }

    /// Lock id of this worker.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Claim and run at most one job.
    pub fn run_once(&self) -> Result<Tick, PipelineError> {
        let Some(Claim { job, document }) = self.pipeline.claim_next(&self.id)? else {
            return Ok(Tick::Idle);
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| self.handlers.dispatch(&job, &document)));
        match outcome {
            Ok(Ok(result)) => {
                self.pipeline.complete(job.id, &self.id, result)?;
                Ok(Tick::Succeeded)
            }
            Ok(Err(err)) => {
                self.pipeline
                    .record_failure(job.id, &self.id, &err.to_string(), err.is_retryable())?;
                Ok(Tick::Failed)
            }
            Err(panic) => {
                let message = format!("handler panicked: {}", panic_message(panic.as_ref()));
                tracing::error!(worker = %self.id, job_id = %job.id, error = %message, "job handler panicked");
                self.pipeline.record_failure(job.id, &self.id, &message, false)?;
                Ok(Tick::Failed)
            }
        }
    }

    /// Loop until shutdown.
    pub async fn run(self, mut shutdown: ShutdownReceiver) {
        tracing::info!(worker = %self.id, "worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let tick = match self.run_once() {
                Ok(tick) => tick,
                Err(err) if err.is_conflict() => {
                    tracing::warn!(worker = %self.id, error = %err, "job changed under the worker");
                    Tick::Failed
                }
                Err(err) => {
                    tracing::error!(worker = %self.id, error = %err, "worker iteration failed");
                    Tick::Idle
                }
            };
            if tick != Tick::Idle {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        tracing::info!(worker = %self.id, "worker stopped");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Run [`Pipeline::sweep_stale`] every `interval` until shutdown.
pub async fn run_sweeper(pipeline: Pipeline, interval: Duration, mut shutdown: ShutdownReceiver) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                match pipeline.sweep_stale() {
                    Ok(report) if !report.failed.is_empty() => {
                        tracing::info!(failed = report.failed.len(), skipped = report.skipped.len(), "sweep finished");
                    }
                    Ok(_) => {}
                    Err(err) => tracing::error!(error = %err, "sweep failed"),
                }
            }
        }
    }
    tracing::info!("sweeper stopped");
}

/// Spawn the pipeline's configured `worker_count` workers and the
/// sweeper.
pub fn spawn(
    pipeline: Pipeline,
    handlers: Arc<HandlerRegistry>,
    shutdown: &ShutdownReceiver,
) -> Vec<JoinHandle<()>> {
    let config = pipeline.config().clone();
    tracing::info!(worker_count = config.worker_count, "starting worker pool");
    let mut tasks: Vec<JoinHandle<()>> = (0..config.worker_count)
        .map(|i| {
            let worker = Worker::new(
                format!("worker-{i}"),
                pipeline.clone(),
                Arc::clone(&handlers),
                config.poll_interval(),
            );
            tokio::spawn(worker.run(shutdown.clone()))
        })
        .collect();
    tasks.push(tokio::spawn(run_sweeper(
        pipeline,
        config.sweep_interval(),
        shutdown.clone(),
    )));
    tasks
}
