//! Contracts for the shared collaborators every worker is constructed with.
//!
//! Implementations live in `saai-services`; the orchestrator and workers only
//! see these traits, so tests can substitute spies.

use crate::health::ComponentHealth;
use crate::worker::WorkerState;
use crate::SaaiResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// A long-lived shared service started before, and stopped after, all workers.
///
/// Implementations must be safe for concurrent use by every supervisor loop
/// and the orchestrator at once.
#[async_trait]
pub trait Service: Send + Sync {
    /// Component name used in logs and in the system status document.
    fn name(&self) -> &str;

    /// Bring the service up. Failure aborts orchestrator startup.
    async fn start(&self) -> SaaiResult<()>;

    /// Tear the service down. Failures are logged by the caller and never
    /// prevent later teardown steps.
    async fn shutdown(&self) -> SaaiResult<()>;

    /// Current health snapshot.
    async fn health(&self) -> SaaiResult<ComponentHealth>;
}

/// A message published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusMessage {
    /// Unique message id.
    pub id: Uuid,
    /// Topic the message was published on.
    pub topic: String,
    /// Name of the publishing component.
    pub source: String,
    /// Opaque message body.
    pub payload: serde_json::Value,
    /// Publish time.
    pub timestamp: DateTime<Utc>,
}

impl BusMessage {
    /// Creates a message with a fresh id, stamped with the current time.
    pub fn new(
        topic: impl Into<String>,
        source: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            source: source.into(),
            payload,
            timestamp: Utc::now(),
        }
    }
}

/// Topic-based publish/subscribe client shared by all workers.
#[async_trait]
pub trait MessageBus: Service {
    /// Publish a message to its topic. Returns the number of receivers.
    async fn publish(&self, message: BusMessage) -> SaaiResult<usize>;

    /// Subscribe to a topic.
    fn subscribe(&self, topic: &str) -> SaaiResult<broadcast::Receiver<BusMessage>>;
}

/// Sink for supervisor and router metrics.
///
/// Recording is synchronous and infallible so it can be called from any
/// supervisor loop without adding failure paths.
pub trait MetricsSink: Service {
    /// A cycle of `worker` completed successfully.
    fn record_cycle(&self, worker: &str);

    /// A cycle of `worker` failed with `error`.
    fn record_cycle_error(&self, worker: &str, error: &str);

    /// A command routed to `worker` finished; `ok` is false on failure.
    fn record_command(&self, worker: &str, ok: bool);

    /// `worker` moved to `state`.
    fn record_state(&self, worker: &str, state: WorkerState);
}
