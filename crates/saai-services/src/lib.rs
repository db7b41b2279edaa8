//! Shared collaborators for SAAI Agents.
//!
//! Every worker is constructed with handles to these services, so the
//! lifecycle manager starts them strictly before any worker and tears them
//! down after all workers, in reverse dependency order.
//!
//! # Main types
//!
//! - [`InMemoryBus`] — Topic-keyed broadcast message bus (`memory://` endpoints).
//! - [`MetricsCollector`] — Prometheus registry plus `GET /metrics` exporter.
//! - [`HealthMonitor`] — Periodic probe of the bus and metrics sink with heartbeats.

/// In-process message bus.
pub mod bus;
/// Periodic health probing.
pub mod health_monitor;
/// Prometheus metrics sink.
pub mod metrics;

pub use bus::InMemoryBus;
pub use health_monitor::{HealthMonitor, HEARTBEAT_TOPIC};
pub use metrics::MetricsCollector;
