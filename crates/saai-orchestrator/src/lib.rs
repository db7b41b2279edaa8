//! Worker supervision for SAAI Agents.
//!
//! Runs a fixed set of workers, each driven by its own supervisor loop, over a
//! set of shared services (message bus, metrics sink, health monitor).
//!
//! # Main types
//!
//! - [`Orchestrator`] — Composes everything below; the boundary layer's only entry point.
//! - [`LifecycleManager`] — Ordered startup, reverse-ordered best-effort shutdown.
//! - [`Supervisor`] — Per-worker cycle loop with failure isolation and backoff.
//! - [`CommandRouter`] — Forwards opaque commands to named workers.
//! - [`HealthAggregator`] — Merges service and worker health into a [`SystemStatus`].
//! - [`WorkerMonitor`] — Per-worker lifecycle state and counters.

/// Orchestrator composition root.
pub mod engine;
/// System status aggregation.
pub mod health;
/// Startup and shutdown sequencing.
pub mod lifecycle;
/// Worker state and counter tracking.
pub mod monitor;
/// Ordered worker registry.
pub mod registry;
/// Command routing.
pub mod router;
/// Per-worker supervisor loop.
pub mod supervisor;

pub use engine::{Orchestrator, Phase};
pub use health::{ComponentKind, ComponentStatus, HealthAggregator, OverallStatus, SystemStatus};
pub use lifecycle::{LifecycleManager, Services, ShutdownFailure, ShutdownReport};
pub use monitor::{WorkerMonitor, WorkerSnapshot};
pub use registry::WorkerRegistry;
pub use router::CommandRouter;
pub use supervisor::Supervisor;
