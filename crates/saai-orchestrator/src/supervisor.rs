//! Per-worker supervisor loop.
//!
//! Each loop repeatedly runs one worker cycle, records the outcome, then waits
//! the cycle interval (after success) or the backoff (after failure). Cycle
//! failures never leave the loop: errors, panics and timeouts all count as a
//! failed cycle. The loop exits when the shared running signal goes low, and
//! every wait is interruptible by it.

use crate::monitor::WorkerMonitor;
use futures_util::FutureExt;
use saai_core::{MetricsSink, SaaiError, SaaiResult, SupervisorConfig, Worker, WorkerState};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Drives the cycles of one worker.
pub struct Supervisor {
    name: String,
    worker: Arc<dyn Worker>,
    monitor: WorkerMonitor,
    metrics: Arc<dyn MetricsSink>,
    cycle_interval: Duration,
    backoff: Duration,
    cycle_timeout: Option<Duration>,
}

impl Supervisor {
    /// Create a supervisor for one worker with the configured timing.
    pub fn new(
        name: impl Into<String>,
        worker: Arc<dyn Worker>,
        monitor: WorkerMonitor,
        metrics: Arc<dyn MetricsSink>,
        config: &SupervisorConfig,
    ) -> Self {
        Self {
            name: name.into(),
            worker,
            monitor,
            metrics,
            cycle_interval: config.cycle_interval(),
            backoff: config.backoff(),
            cycle_timeout: config.cycle_timeout(),
        }
    }

    /// Run the loop on its own task.
    pub fn spawn(self, running: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(running))
    }

    /// Run until `running` is false (or its sender is gone).
    pub async fn run(self, mut running: watch::Receiver<bool>) {
        info!(worker = %self.name, "Supervisor loop started");

        loop {
            if !*running.borrow() {
                break;
            }

            let wait = match self.run_guarded().await {
                Ok(()) => {
                    self.on_success().await;
                    self.cycle_interval
                }
                Err(e) => {
                    self.on_failure(&e).await;
                    self.backoff
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = running.wait_for(|r| !*r) => break,
            }
        }

        info!(worker = %self.name, "Supervisor loop stopped");
    }

    /// One cycle with panics and the optional timeout mapped to cycle errors.
    async fn run_guarded(&self) -> SaaiResult<()> {
        let cycle = AssertUnwindSafe(self.worker.run_cycle()).catch_unwind();
        let outcome = match self.cycle_timeout {
            Some(limit) => match tokio::time::timeout(limit, cycle).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(SaaiError::Cycle(format!(
                        "cycle timed out after {}ms",
                        limit.as_millis()
                    )))
                }
            },
            None => cycle.await,
        };
        outcome.unwrap_or_else(|panic| {
            Err(SaaiError::Cycle(format!(
                "cycle panicked: {}",
                panic_message(panic.as_ref())
            )))
        })
    }

    async fn on_success(&self) {
        self.metrics.record_cycle(&self.name);
        if self.monitor.record_success(&self.name).await == Some(WorkerState::Degraded) {
            self.metrics.record_state(&self.name, WorkerState::Running);
            info!(worker = %self.name, "Worker recovered");
        } else {
            debug!(worker = %self.name, "Cycle completed");
        }
    }

    async fn on_failure(&self, e: &SaaiError) {
        let reason = e.to_string();
        self.metrics.record_cycle_error(&self.name, &reason);
        let consecutive = match self.monitor.record_failure(&self.name, &reason).await {
            Some((previous, consecutive)) => {
                if previous == WorkerState::Running {
                    self.metrics.record_state(&self.name, WorkerState::Degraded);
                }
                consecutive
            }
            None => 0,
        };
        error!(
            worker = %self.name,
            error = %e,
            consecutive_failures = consecutive,
            backoff_ms = self.backoff.as_millis() as u64,
            "Worker cycle failed"
        );
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
