//! Worker variants supervised by the SAAI orchestrator.
//!
//! Every worker here implements [`saai_core::Worker`] with small, deterministic
//! in-process logic:
//!
//! - [`PerceptionWorker`] — turns `observe` stimuli into bus observations.
//! - [`MemoryWorker`] — consolidates observations into short/long-term memory.
//! - [`ActionWorker`] — executes queued actions, announcing each completion.
//! - [`EthicsWorker`] — evaluates actions against policy and audits completions.
//!
//! Workers are built from a [`WorkerConfig`] through [`build_worker`] (or the
//! [`worker_factory`] handle the orchestrator consumes).

/// Action execution worker.
pub mod action;
/// Policy evaluation worker.
pub mod ethics;
/// Worker kinds and default worker set.
pub mod kind;
/// Observation consolidation worker.
pub mod memory;
/// Stimulus intake worker.
pub mod perception;

pub use action::{ActionSettings, ActionWorker};
pub use ethics::{EthicsSettings, EthicsWorker};
pub use kind::{default_workers, WorkerKind};
pub use memory::{MemorySettings, MemoryWorker};
pub use perception::{PerceptionSettings, PerceptionWorker};

use saai_core::{BusMessage, SaaiError, SaaiResult, Worker, WorkerConfig, WorkerContext, WorkerFactory};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::warn;

/// Topic perception publishes observations on.
pub const OBSERVATION_TOPIC: &str = "perception.observation";

/// Topic action publishes completed actions on.
pub const ACTION_COMPLETED_TOPIC: &str = "action.completed";

/// Build the worker described by `config`.
pub fn build_worker(config: &WorkerConfig, ctx: &WorkerContext) -> SaaiResult<Arc<dyn Worker>> {
    let kind: WorkerKind = config.kind.parse()?;
    let worker: Arc<dyn Worker> = match kind {
        WorkerKind::Perception => Arc::new(PerceptionWorker::new(
            &config.name,
            parse_settings(config)?,
            ctx.clone(),
        )),
        WorkerKind::Memory => Arc::new(MemoryWorker::new(
            &config.name,
            parse_settings(config)?,
            ctx.clone(),
        )),
        WorkerKind::Action => Arc::new(ActionWorker::new(
            &config.name,
            parse_settings(config)?,
            ctx.clone(),
        )),
        WorkerKind::Ethics => Arc::new(EthicsWorker::new(
            &config.name,
            parse_settings(config)?,
            ctx.clone(),
        )),
    };
    Ok(worker)
}

/// [`build_worker`] as a shareable factory handle.
pub fn worker_factory() -> WorkerFactory {
    Arc::new(build_worker)
}

fn parse_settings<T: DeserializeOwned>(config: &WorkerConfig) -> SaaiResult<T> {
    serde_json::from_value(config.settings.clone()).map_err(|e| {
        SaaiError::Config(format!("invalid settings for worker '{}': {e}", config.name))
    })
}

fn command_name(command: &serde_json::Value) -> SaaiResult<&str> {
    command
        .get("command")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| SaaiError::Worker("missing 'command' field".to_string()))
}

fn unknown_command(worker: &str, command: &str) -> SaaiError {
    SaaiError::Worker(format!("{worker}: unknown command '{command}'"))
}

/// Everything currently buffered on `rx`, without waiting.
///
/// Lagged receivers skip ahead and log the gap. A closed channel is reported
/// after the buffered messages are returned.
fn drain(
    worker: &str,
    rx: &mut broadcast::Receiver<BusMessage>,
) -> (Vec<BusMessage>, bool) {
    let mut messages = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(msg) => messages.push(msg),
            Err(TryRecvError::Empty) => return (messages, false),
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(worker, skipped, "Subscription lagged, messages lost");
            }
            Err(TryRecvError::Closed) => return (messages, true),
        }
    }
}
