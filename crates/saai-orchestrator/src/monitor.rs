use chrono::{DateTime, Utc};
use saai_core::WorkerState;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Lifecycle state and counters for one worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerSnapshot {
    /// Worker name.
    pub name: String,
    /// Current lifecycle state.
    pub state: WorkerState,
    /// Successful cycles.
    pub cycles: u64,
    /// Failed cycles, all time.
    pub errors: u64,
    /// Failed cycles since the last success.
    pub consecutive_failures: u32,
    /// Text of the most recent cycle error.
    pub last_error: Option<String>,
    /// When the last cycle (either outcome) finished.
    pub last_cycle: Option<DateTime<Utc>>,
}

impl WorkerSnapshot {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: WorkerState::Uninitialized,
            cycles: 0,
            errors: 0,
            consecutive_failures: 0,
            last_error: None,
            last_cycle: None,
        }
    }
}

#[derive(Default)]
struct Inner {
    order: Vec<String>,
    workers: HashMap<String, WorkerSnapshot>,
}

/// Tracks state and counters for every registered worker.
///
/// Written by the lifecycle manager and the supervisor loops, read by the
/// health aggregator.
#[derive(Clone, Default)]
pub struct WorkerMonitor {
    inner: Arc<RwLock<Inner>>,
}

impl WorkerMonitor {
    /// An empty monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `name` in `Uninitialized`. Re-registering is a no-op.
    pub async fn register(&self, name: &str) {
        let mut inner = self.inner.write().await;
        if !inner.workers.contains_key(name) {
            inner.order.push(name.to_string());
            inner
                .workers
                .insert(name.to_string(), WorkerSnapshot::new(name));
        }
    }

    /// Move `name` to `state`, returning the previous state.
    pub async fn set_state(&self, name: &str, state: WorkerState) -> Option<WorkerState> {
        let mut inner = self.inner.write().await;
        inner
            .workers
            .get_mut(name)
            .map(|w| std::mem::replace(&mut w.state, state))
    }

    /// Record a successful cycle. A `Degraded` worker returns to `Running`.
    ///
    /// Returns the state before the update.
    pub async fn record_success(&self, name: &str) -> Option<WorkerState> {
        let mut inner = self.inner.write().await;
        let w = inner.workers.get_mut(name)?;
        let previous = w.state;
        w.cycles += 1;
        w.consecutive_failures = 0;
        w.last_cycle = Some(Utc::now());
        if previous == WorkerState::Degraded {
            w.state = WorkerState::Running;
        }
        Some(previous)
    }

    /// Record a failed cycle. A `Running` worker becomes `Degraded`.
    ///
    /// Returns the state before the update and the consecutive failure count.
    pub async fn record_failure(&self, name: &str, error: &str) -> Option<(WorkerState, u32)> {
        let mut inner = self.inner.write().await;
        let w = inner.workers.get_mut(name)?;
        let previous = w.state;
        w.errors += 1;
        w.consecutive_failures = w.consecutive_failures.saturating_add(1);
        w.last_error = Some(error.to_string());
        w.last_cycle = Some(Utc::now());
        if previous == WorkerState::Running {
            w.state = WorkerState::Degraded;
        }
        Some((previous, w.consecutive_failures))
    }

    /// Current state of `name`.
    pub async fn state(&self, name: &str) -> Option<WorkerState> {
        self.inner.read().await.workers.get(name).map(|w| w.state)
    }

    /// Snapshot of one worker.
    pub async fn get(&self, name: &str) -> Option<WorkerSnapshot> {
        self.inner.read().await.workers.get(name).cloned()
    }

    /// Snapshots of every worker in registration order.
    pub async fn snapshot(&self) -> Vec<WorkerSnapshot> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|name| inner.workers.get(name).cloned())
            .collect()
    }

    /// All snapshots as JSON, keyed by worker name.
    pub async fn to_json(&self) -> serde_json::Value {
        let workers: serde_json::Map<String, serde_json::Value> = self
            .snapshot()
            .await
            .into_iter()
            .map(|w| {
                let name = w.name.clone();
                (name, serde_json::to_value(w).unwrap_or_default())
            })
            .collect();
        serde_json::Value::Object(workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_keeps_order_and_is_idempotent() {
        let monitor = WorkerMonitor::new();
        monitor.register("b").await;
        monitor.register("a").await;
        monitor.register("b").await;
        let names: Vec<String> = monitor.snapshot().await.into_iter().map(|w| w.name).collect();
        assert_eq!(names, ["b", "a"]);
        assert_eq!(monitor.state("a").await, Some(WorkerState::Uninitialized));
    }

    #[tokio::test]
    async fn test_failure_degrades_and_success_recovers() {
        let monitor = WorkerMonitor::new();
        monitor.register("w").await;
        monitor.set_state("w", WorkerState::Running).await;

        let (prev, consecutive) = monitor.record_failure("w", "boom").await.unwrap();
        assert_eq!(prev, WorkerState::Running);
        assert_eq!(consecutive, 1);
        let (prev, consecutive) = monitor.record_failure("w", "boom again").await.unwrap();
        assert_eq!(prev, WorkerState::Degraded);
        assert_eq!(consecutive, 2);

        let snap = monitor.get("w").await.unwrap();
        assert_eq!(snap.state, WorkerState::Degraded);
        assert_eq!(snap.errors, 2);
        assert_eq!(snap.last_error.as_deref(), Some("boom again"));

        assert_eq!(
            monitor.record_success("w").await,
            Some(WorkerState::Degraded)
        );
        let snap = monitor.get("w").await.unwrap();
        assert_eq!(snap.state, WorkerState::Running);
        assert_eq!(snap.cycles, 1);
        assert_eq!(snap.consecutive_failures, 0);
        assert!(snap.last_cycle.is_some());
    }

    #[tokio::test]
    async fn test_cycle_outcome_does_not_override_shutdown_states() {
        let monitor = WorkerMonitor::new();
        monitor.register("w").await;
        monitor.set_state("w", WorkerState::ShuttingDown).await;
        monitor.record_failure("w", "late").await;
        monitor.record_success("w").await;
        assert_eq!(monitor.state("w").await, Some(WorkerState::ShuttingDown));
    }

    #[tokio::test]
    async fn test_unknown_worker_and_json() {
        let monitor = WorkerMonitor::new();
        assert!(monitor.record_success("ghost").await.is_none());
        assert!(monitor.set_state("ghost", WorkerState::Running).await.is_none());

        monitor.register("w").await;
        let json = monitor.to_json().await;
        assert_eq!(json["w"]["state"], "uninitialized");
        assert_eq!(json["w"]["cycles"], 0);
    }
}
