//! System status aggregation.
//!
//! Every shared service and worker is queried concurrently, each query bounded
//! by the configured timeout. A query that errors or times out is reported as
//! `unknown` for that component; aggregation itself never fails.

use crate::lifecycle::Services;
use crate::monitor::{WorkerMonitor, WorkerSnapshot};
use crate::registry::WorkerRegistry;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use saai_core::{ComponentHealth, HealthLevel, SaaiResult, Service, WorkerState};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Overall system status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    /// Every component reports healthy.
    Operational,
    /// At least one component is not healthy.
    Degraded,
    /// Startup has not completed.
    Initializing,
    /// Shutdown has started or finished.
    Stopped,
}

/// Whether a status entry describes a shared service or a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    /// A shared service (bus, metrics, health monitor).
    Service,
    /// A supervised worker.
    Worker,
}

/// Health of one component.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentStatus {
    /// Service or worker.
    pub kind: ComponentKind,
    /// Resolved health; `unknown` when the query failed.
    pub health: HealthLevel,
    /// What the component reported about itself.
    pub details: serde_json::Value,
    /// Query error or timeout, when the component could not be queried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Monitor data for workers: state, cycles, errors, last error.
    #[serde(flatten)]
    pub worker: Option<WorkerSnapshot>,
}

/// The system status document.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    /// Overall status.
    pub status: OverallStatus,
    /// Per-component entries keyed by name.
    pub components: BTreeMap<String, ComponentStatus>,
    /// When the document was assembled.
    pub timestamp: DateTime<Utc>,
}

impl SystemStatus {
    /// Status before startup completes. No component is queried.
    pub fn initializing() -> Self {
        Self {
            status: OverallStatus::Initializing,
            components: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Status after shutdown, carrying the last known worker states.
    pub fn stopped(workers: Vec<WorkerSnapshot>) -> Self {
        let components = workers
            .into_iter()
            .map(|w| {
                (
                    w.name.clone(),
                    ComponentStatus {
                        kind: ComponentKind::Worker,
                        health: HealthLevel::Unknown,
                        details: serde_json::Value::Null,
                        error: None,
                        worker: Some(w),
                    },
                )
            })
            .collect();
        Self {
            status: OverallStatus::Stopped,
            components,
            timestamp: Utc::now(),
        }
    }
}

/// Collects health from shared services and workers into a [`SystemStatus`].
pub struct HealthAggregator {
    services: Services,
    registry: Arc<WorkerRegistry>,
    monitor: WorkerMonitor,
    query_timeout: Duration,
}

impl HealthAggregator {
    /// Create an aggregator; each query is bounded by `query_timeout`.
    pub fn new(
        services: Services,
        registry: Arc<WorkerRegistry>,
        monitor: WorkerMonitor,
        query_timeout: Duration,
    ) -> Self {
        Self {
            services,
            registry,
            monitor,
            query_timeout,
        }
    }

    /// Query everything and merge the results.
    pub async fn collect(&self) -> SystemStatus {
        let t = self.query_timeout;
        let worker_queries = self.registry.entries().into_iter().map(|(name, worker)| async move {
            let health = query(t, worker.health()).await;
            (name, health)
        });

        let (bus, metrics, health_monitor, workers) = tokio::join!(
            query_service(t, self.services.bus.as_ref()),
            query_service(t, self.services.metrics.as_ref()),
            query_service(t, self.services.health_monitor.as_ref()),
            join_all(worker_queries),
        );

        let mut components = BTreeMap::new();
        for (name, outcome) in [bus, metrics, health_monitor] {
            components.insert(name, service_status(outcome));
        }
        for (name, outcome) in workers {
            let snapshot = self.monitor.get(&name).await;
            components.insert(name, worker_status(outcome, snapshot));
        }

        let status = if components.values().all(|c| c.health.is_healthy()) {
            OverallStatus::Operational
        } else {
            OverallStatus::Degraded
        };
        SystemStatus {
            status,
            components,
            timestamp: Utc::now(),
        }
    }
}

type QueryOutcome = Result<ComponentHealth, String>;

async fn query<F>(limit: Duration, health: F) -> QueryOutcome
where
    F: Future<Output = SaaiResult<ComponentHealth>>,
{
    match tokio::time::timeout(limit, health).await {
        Ok(Ok(health)) => Ok(health),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!(
            "health query timed out after {}ms",
            limit.as_millis()
        )),
    }
}

async fn query_service<S: Service + ?Sized>(limit: Duration, service: &S) -> (String, QueryOutcome) {
    let outcome = query(limit, service.health()).await;
    if let Err(e) = &outcome {
        warn!(component = service.name(), error = %e, "Health query failed");
    }
    (service.name().to_string(), outcome)
}

fn service_status(outcome: QueryOutcome) -> ComponentStatus {
    match outcome {
        Ok(health) => ComponentStatus {
            kind: ComponentKind::Service,
            health: health.level,
            details: health.details,
            error: None,
            worker: None,
        },
        Err(e) => ComponentStatus {
            kind: ComponentKind::Service,
            health: HealthLevel::Unknown,
            details: serde_json::Value::Null,
            error: Some(e),
            worker: None,
        },
    }
}

fn worker_status(outcome: QueryOutcome, snapshot: Option<WorkerSnapshot>) -> ComponentStatus {
    let (reported, details, error) = match outcome {
        Ok(health) => (health.level, health.details, None),
        Err(e) => (HealthLevel::Unknown, serde_json::Value::Null, Some(e)),
    };
    let from_state = match snapshot.as_ref().map(|s| s.state) {
        Some(WorkerState::Running) | None => HealthLevel::Healthy,
        Some(WorkerState::Degraded) => HealthLevel::Degraded,
        Some(_) => HealthLevel::Unhealthy,
    };
    ComponentStatus {
        kind: ComponentKind::Worker,
        health: worst(reported, from_state),
        details,
        error,
        worker: snapshot,
    }
}

fn severity(level: HealthLevel) -> u8 {
    match level {
        HealthLevel::Healthy => 0,
        HealthLevel::Degraded => 1,
        HealthLevel::Unknown => 2,
        HealthLevel::Unhealthy => 3,
    }
}

fn worst(a: HealthLevel, b: HealthLevel) -> HealthLevel {
    if severity(a) >= severity(b) {
        a
    } else {
        b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(state: WorkerState) -> WorkerSnapshot {
        WorkerSnapshot {
            name: "w".into(),
            state,
            cycles: 3,
            errors: 1,
            consecutive_failures: 1,
            last_error: Some("Cycle error: x".into()),
            last_cycle: None,
        }
    }

    #[test]
    fn test_degraded_state_overrides_healthy_report() {
        let ok = ComponentHealth::healthy(serde_json::json!({"queued": 0}));
        let status = worker_status(Ok(ok), Some(snapshot(WorkerState::Degraded)));
        assert_eq!(status.health, HealthLevel::Degraded);

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["kind"], "worker");
        assert_eq!(json["state"], "degraded");
        assert_eq!(json["consecutive_failures"], 1);
        assert_eq!(json["details"]["queued"], 0);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_failed_health_query_is_unknown() {
        let status = worker_status(
            Err("timed out".into()),
            Some(snapshot(WorkerState::Running)),
        );
        assert_eq!(status.health, HealthLevel::Unknown);
        assert_eq!(status.error.as_deref(), Some("timed out"));

        let service = service_status(Err("boom".into()));
        assert_eq!(service.health, HealthLevel::Unknown);
    }

    #[test]
    fn test_worst() {
        assert_eq!(worst(HealthLevel::Healthy, HealthLevel::Degraded), HealthLevel::Degraded);
        assert_eq!(worst(HealthLevel::Unhealthy, HealthLevel::Degraded), HealthLevel::Unhealthy);
    }

    #[test]
    fn test_initializing_and_stopped_documents() {
        let json = serde_json::to_value(SystemStatus::initializing()).unwrap();
        assert_eq!(json["status"], "initializing");
        assert!(json["components"].as_object().unwrap().is_empty());

        let stopped = SystemStatus::stopped(vec![snapshot(WorkerState::Stopped)]);
        let json = serde_json::to_value(&stopped).unwrap();
        assert_eq!(json["status"], "stopped");
        assert_eq!(json["components"]["w"]["state"], "stopped");
    }
}
