//! Core types and contracts for SAAI Agents.
//!
//! This crate provides the foundational types shared across all SAAI crates:
//! the error taxonomy, worker lifecycle states, the worker and shared-service
//! contracts, and the configuration consumed by the orchestrator.
//!
//! # Main types
//!
//! - [`SaaiError`] — Unified error enum for all subsystems.
//! - [`SaaiResult`] — Convenience alias for `Result<T, SaaiError>`.
//! - [`Worker`] — Contract every supervised worker implements.
//! - [`WorkerState`] — Worker lifecycle state.
//! - [`Service`], [`MessageBus`], [`MetricsSink`] — Shared collaborator contracts.
//! - [`OrchestratorConfig`] — Bus, metrics, health, supervisor, and worker settings.

/// Orchestrator configuration.
pub mod config;
/// Error taxonomy.
pub mod error;
/// Health snapshot types.
pub mod health;
/// Shared collaborator contracts.
pub mod service;
/// Worker contract and lifecycle states.
pub mod worker;

pub use config::{
    BusConfig, HealthConfig, MetricsConfig, OrchestratorConfig, SupervisorConfig, WorkerConfig,
    ENV_BUS_ENDPOINT, ENV_METRICS_PORT, RESERVED_COMPONENT_NAMES,
};
pub use error::{SaaiError, SaaiResult};
pub use health::{ComponentHealth, HealthLevel};
pub use service::{BusMessage, MessageBus, MetricsSink, Service};
pub use worker::{Worker, WorkerContext, WorkerFactory, WorkerState};

/// Version of the SAAI workspace.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
