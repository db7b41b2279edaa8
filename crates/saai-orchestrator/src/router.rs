use crate::registry::WorkerRegistry;
use crate::supervisor::panic_message;
use futures_util::FutureExt;
use saai_core::{MetricsSink, SaaiError, SaaiResult};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Forwards opaque command payloads to registered workers.
///
/// The router does not interpret payloads and never retries. A failing
/// command does not affect the target worker's lifecycle state.
pub struct CommandRouter {
    registry: Arc<WorkerRegistry>,
    metrics: Arc<dyn MetricsSink>,
}

impl CommandRouter {
    /// Create a router over `registry`, recording outcomes in `metrics`.
    pub fn new(registry: Arc<WorkerRegistry>, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { registry, metrics }
    }

    /// Send `payload` to `worker` and return its result unchanged.
    ///
    /// Unknown workers yield [`SaaiError::CommandNotFound`] without touching
    /// any worker; handler errors (and panics) yield
    /// [`SaaiError::CommandFailed`].
    pub async fn route(
        &self,
        worker: &str,
        payload: serde_json::Value,
    ) -> SaaiResult<serde_json::Value> {
        let Some(target) = self.registry.get(worker) else {
            warn!(worker, "Command for unknown worker");
            return Err(SaaiError::CommandNotFound(worker.to_string()));
        };

        let outcome = AssertUnwindSafe(target.handle_command(payload))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(SaaiError::Worker(format!(
                    "command handler panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });

        match outcome {
            Ok(result) => {
                self.metrics.record_command(worker, true);
                debug!(worker, "Command handled");
                Ok(result)
            }
            Err(e) => {
                self.metrics.record_command(worker, false);
                error!(worker, error = %e, "Command failed");
                Err(SaaiError::CommandFailed {
                    worker: worker.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    }
}
