use saai_core::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "saai.toml";

pub const ENV_HOST: &str = "SAAI_HOST";
pub const ENV_PORT: &str = "SAAI_PORT";
pub const ENV_LOG_LEVEL: &str = "SAAI_LOG_LEVEL";

/// Top-level `saai.toml`.
///
/// The orchestrator sections (`[bus]`, `[metrics]`, `[health]`,
/// `[supervisor]`, `[[workers]]`) sit at the top level next to `[server]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaaiConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Upper bound on the whole stop sequence after a signal.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    #[serde(flatten)]
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_shutdown_timeout_ms() -> u64 {
    30_000
}

impl SaaiConfig {
    /// Read and parse the config file, then apply environment overrides.
    ///
    /// With no explicit path a missing `saai.toml` means defaults. An empty
    /// `[[workers]]` list is replaced by the four default workers.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let mut config = if !explicit && !path.exists() {
            Self::parse("")?
        } else {
            let text = std::fs::read_to_string(&path).map_err(|e| {
                anyhow::anyhow!("Failed to read config file '{}': {e}", path.display())
            })?;
            Self::parse(&text)
                .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {e}", path.display()))?
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse TOML text and fill in default workers.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut config: SaaiConfig = toml::from_str(text)?;
        if config.orchestrator.workers.is_empty() {
            config.orchestrator.workers = saai_agents::default_workers();
        }
        Ok(config)
    }

    /// Apply `SAAI_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            self.server.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = port
                .parse()
                .map_err(|_| anyhow::anyhow!("{ENV_PORT} is not a valid port: {port}"))?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        self.orchestrator.apply_overrides(&lookup)?;
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
