//! Configuration consumed by the lifecycle manager.
//!
//! Every section carries serde defaults so a partial (or empty) TOML file is
//! accepted. The binary flattens [`OrchestratorConfig`] into its own top-level
//! config next to the server settings.

use crate::{SaaiError, SaaiResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Environment variable overriding [`BusConfig::endpoint`].
pub const ENV_BUS_ENDPOINT: &str = "SAAI_BUS_ENDPOINT";
/// Environment variable overriding [`MetricsConfig::port`].
pub const ENV_METRICS_PORT: &str = "SAAI_METRICS_PORT";

/// Component names taken by the shared services in the status document.
pub const RESERVED_COMPONENT_NAMES: [&str; 3] = ["message_bus", "metrics", "health_monitor"];

/// Everything the orchestrator needs to bring the system up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Message bus section.
    #[serde(default)]
    pub bus: BusConfig,
    /// Metrics exporter section.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Health monitor and probe section.
    #[serde(default)]
    pub health: HealthConfig,
    /// Supervisor loop timing.
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    /// Worker blocks in startup order.
    #[serde(default)]
    pub workers: Vec<WorkerConfig>,
}

/// Message bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Bus endpoint; only `memory://` is supported in-process.
    #[serde(default = "default_bus_endpoint")]
    pub endpoint: String,
    /// Per-topic broadcast buffer size.
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            endpoint: default_bus_endpoint(),
            capacity: default_bus_capacity(),
        }
    }
}

/// Metrics exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Listen address for `GET /metrics`.
    #[serde(default = "default_metrics_host")]
    pub host: String,
    /// Listen port for `GET /metrics`. `0` picks an ephemeral port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            host: default_metrics_host(),
            port: default_metrics_port(),
        }
    }
}

/// Health monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Heartbeat / probe period of the health monitor.
    #[serde(default = "default_health_interval_ms")]
    pub interval_ms: u64,
    /// Upper bound on a single component health query during aggregation.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_health_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl HealthConfig {
    /// Heartbeat probe interval.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Per-component health probe limit.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

/// Supervisor loop cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Wait after a successful cycle.
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,
    /// Wait after a failed cycle.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    /// Optional upper bound on a single cycle; exceeding it counts as a failure.
    #[serde(default)]
    pub cycle_timeout_ms: Option<u64>,
    /// How long shutdown waits for loops to exit before aborting them.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: default_cycle_interval_ms(),
            backoff_ms: default_backoff_ms(),
            cycle_timeout_ms: None,
            stop_grace_ms: default_stop_grace_ms(),
        }
    }
}

impl SupervisorConfig {
    /// Wait after a successful cycle.
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    /// Wait after a failed cycle.
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Per-cycle limit, if configured.
    pub fn cycle_timeout(&self) -> Option<Duration> {
        self.cycle_timeout_ms.map(Duration::from_millis)
    }

    /// How long shutdown waits for loops before aborting them.
    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}

/// One worker block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Registry key, unique across all workers.
    pub name: String,
    /// Worker variant (`perception`, `memory`, `action`, `ethics`).
    pub kind: String,
    /// Variant-specific settings, passed through untouched.
    #[serde(default = "empty_settings")]
    pub settings: serde_json::Value,
}

impl WorkerConfig {
    /// A worker block with empty settings.
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            settings: empty_settings(),
        }
    }

    /// Replace the settings table.
    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }
}

impl OrchestratorConfig {
    /// Reject configurations the lifecycle manager cannot run.
    pub fn validate(&self) -> SaaiResult<()> {
        let mut seen = HashSet::new();
        for worker in &self.workers {
            if worker.name.trim().is_empty() {
                return Err(SaaiError::Config("worker name must not be empty".into()));
            }
            if RESERVED_COMPONENT_NAMES.contains(&worker.name.as_str()) {
                return Err(SaaiError::Config(format!(
                    "worker name '{}' is reserved for a shared service",
                    worker.name
                )));
            }
            if !seen.insert(worker.name.as_str()) {
                return Err(SaaiError::Config(format!(
                    "duplicate worker name '{}'",
                    worker.name
                )));
            }
        }

        let sup = &self.supervisor;
        if sup.cycle_interval_ms == 0 || sup.backoff_ms == 0 {
            return Err(SaaiError::Config(
                "supervisor intervals must be greater than zero".into(),
            ));
        }
        if sup.backoff_ms < sup.cycle_interval_ms {
            return Err(SaaiError::Config(format!(
                "supervisor backoff ({}ms) must not be shorter than cycle interval ({}ms)",
                sup.backoff_ms, sup.cycle_interval_ms
            )));
        }
        if sup.cycle_timeout_ms == Some(0) {
            return Err(SaaiError::Config("cycle_timeout_ms must be greater than zero".into()));
        }
        if self.bus.capacity == 0 {
            return Err(SaaiError::Config("bus capacity must be greater than zero".into()));
        }
        if self.health.interval_ms == 0 || self.health.probe_timeout_ms == 0 {
            return Err(SaaiError::Config(
                "health intervals must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Apply `SAAI_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> SaaiResult<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> SaaiResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(endpoint) = lookup(ENV_BUS_ENDPOINT) {
            self.bus.endpoint = endpoint;
        }
        if let Some(port) = lookup(ENV_METRICS_PORT) {
            self.metrics.port = port.parse().map_err(|_| {
                SaaiError::Config(format!("{ENV_METRICS_PORT} is not a valid port: {port}"))
            })?;
        }
        Ok(())
    }
}

fn empty_settings() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
fn default_bus_endpoint() -> String {
    "memory://local".to_string()
}
fn default_bus_capacity() -> usize {
    1024
}
fn default_metrics_host() -> String {
    "127.0.0.1".to_string()
}
fn default_metrics_port() -> u16 {
    9090
}
fn default_health_interval_ms() -> u64 {
    5_000
}
fn default_probe_timeout_ms() -> u64 {
    2_000
}
fn default_cycle_interval_ms() -> u64 {
    100
}
fn default_backoff_ms() -> u64 {
    1_000
}
fn default_stop_grace_ms() -> u64 {
    5_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: OrchestratorConfig = toml::from_str("").unwrap();
        assert_eq!(config.bus.endpoint, "memory://local");
        assert_eq!(config.metrics.port, 9090);
        assert_eq!(config.supervisor.cycle_interval(), Duration::from_millis(100));
        assert_eq!(config.supervisor.backoff(), Duration::from_millis(1000));
        assert!(config.supervisor.cycle_timeout().is_none());
        assert!(config.workers.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn test_workers_keep_declared_order() {
        let config: OrchestratorConfig = toml::from_str(
            r#"
            [[workers]]
            name = "eyes"
            kind = "perception"

            [[workers]]
            name = "recall"
            kind = "memory"
            [workers.settings]
            short_term_capacity = 8
            "#,
        )
        .unwrap();
        let names: Vec<&str> = config.workers.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, ["eyes", "recall"]);
        assert_eq!(config.workers[1].settings["short_term_capacity"], 8);
        assert!(config.workers[0].settings.is_object());
    }

    #[test]
    fn test_duplicate_worker_rejected() {
        let config = OrchestratorConfig {
            workers: vec![
                WorkerConfig::new("a", "memory"),
                WorkerConfig::new("a", "action"),
            ],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate worker name 'a'"));
    }

    #[test]
    fn test_reserved_worker_name_rejected() {
        let config = OrchestratorConfig {
            workers: vec![WorkerConfig::new("metrics", "memory")],
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().to_string().contains("reserved"));
    }

    #[test]
    fn test_backoff_shorter_than_interval_rejected() {
        let mut config = OrchestratorConfig::default();
        config.supervisor.cycle_interval_ms = 500;
        config.supervisor.backoff_ms = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = OrchestratorConfig::default();
        config
            .apply_overrides(|key| match key {
                ENV_BUS_ENDPOINT => Some("memory://other".to_string()),
                ENV_METRICS_PORT => Some("9191".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.bus.endpoint, "memory://other");
        assert_eq!(config.metrics.port, 9191);
    }

    #[test]
    fn test_invalid_port_override() {
        let mut config = OrchestratorConfig::default();
        let result = config.apply_overrides(|key| {
            (key == ENV_METRICS_PORT).then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(SaaiError::Config(_))));
    }
}
