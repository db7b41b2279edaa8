//! The contract every supervised worker implements.

use crate::config::WorkerConfig;
use crate::health::ComponentHealth;
use crate::service::{MessageBus, MetricsSink};
use crate::SaaiResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Lifecycle state of a supervised worker.
///
/// ```text
/// Uninitialized → Initializing → Running ⇄ Degraded → ShuttingDown → Stopped
///                              ↘ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Registered but not yet initialized.
    Uninitialized,
    /// `initialize` is in progress.
    Initializing,
    /// Cycling normally.
    Running,
    /// The last cycle failed; the supervisor keeps retrying.
    Degraded,
    /// `initialize` failed. Terminal; no supervisor loop is ever started.
    Failed,
    /// `shutdown` is in progress.
    ShuttingDown,
    /// Shut down.
    Stopped,
}

impl WorkerState {
    /// Numeric code exported as the `saai_worker_state` gauge.
    pub fn code(self) -> i64 {
        match self {
            WorkerState::Uninitialized => 0,
            WorkerState::Initializing => 1,
            WorkerState::Running => 2,
            WorkerState::Degraded => 3,
            WorkerState::Failed => 4,
            WorkerState::ShuttingDown => 5,
            WorkerState::Stopped => 6,
        }
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Uninitialized => "uninitialized",
            WorkerState::Initializing => "initializing",
            WorkerState::Running => "running",
            WorkerState::Degraded => "degraded",
            WorkerState::Failed => "failed",
            WorkerState::ShuttingDown => "shutting_down",
            WorkerState::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// A supervised long-running unit.
///
/// All methods take `&self`: the supervisor may call [`Worker::run_cycle`]
/// while the command router concurrently calls [`Worker::handle_command`],
/// so implementations serialize access to their own state internally.
#[async_trait]
pub trait Worker: Send + Sync {
    /// One-time setup. An error aborts orchestrator startup.
    async fn initialize(&self) -> SaaiResult<()>;

    /// One invocation of the periodic processing step.
    async fn run_cycle(&self) -> SaaiResult<()>;

    /// Handle an opaque command payload and return its result.
    async fn handle_command(&self, command: serde_json::Value) -> SaaiResult<serde_json::Value>;

    /// Release resources. Called once during orchestrator shutdown.
    async fn shutdown(&self) -> SaaiResult<()>;

    /// Health snapshot for the system status document.
    async fn health(&self) -> SaaiResult<ComponentHealth>;
}

/// Shared collaborators handed to every worker at construction time.
#[derive(Clone)]
pub struct WorkerContext {
    /// Shared message bus.
    pub bus: Arc<dyn MessageBus>,
    /// Shared metrics sink.
    pub metrics: Arc<dyn MetricsSink>,
}

/// Builds a worker from its configuration block once the shared services are up.
pub type WorkerFactory =
    Arc<dyn Fn(&WorkerConfig, &WorkerContext) -> SaaiResult<Arc<dyn Worker>> + Send + Sync>;
