use serde::{Deserialize, Serialize};

/// Coarse health classification reported by a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    /// Fully operational.
    Healthy,
    /// Operational with reduced capability (e.g. a worker retrying after errors).
    Degraded,
    /// Not operational.
    Unhealthy,
    /// Health could not be determined (query failed or timed out).
    Unknown,
}

impl HealthLevel {
    /// Returns true for [`HealthLevel::Healthy`].
    pub fn is_healthy(self) -> bool {
        self == HealthLevel::Healthy
    }
}

impl std::fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthLevel::Healthy => write!(f, "healthy"),
            HealthLevel::Degraded => write!(f, "degraded"),
            HealthLevel::Unhealthy => write!(f, "unhealthy"),
            HealthLevel::Unknown => write!(f, "unknown"),
        }
    }
}

/// Health snapshot returned by a worker or shared service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    /// Coarse health level.
    pub level: HealthLevel,
    /// Free-form, component-specific details.
    #[serde(default)]
    pub details: serde_json::Value,
}

impl ComponentHealth {
    /// A healthy snapshot with the given details.
    pub fn healthy(details: serde_json::Value) -> Self {
        Self {
            level: HealthLevel::Healthy,
            details,
        }
    }

    /// An unhealthy snapshot with the given details.
    pub fn unhealthy(details: serde_json::Value) -> Self {
        Self {
            level: HealthLevel::Unhealthy,
            details,
        }
    }
}
