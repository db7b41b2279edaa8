use saai_core::{SaaiError, WorkerConfig};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The closed set of worker variants the orchestrator can supervise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    /// Turns external stimuli into observations on the bus.
    Perception,
    /// Consolidates observations into short- and long-term memory.
    Memory,
    /// Executes queued actions.
    Action,
    /// Evaluates and audits actions against policy.
    Ethics,
}

impl WorkerKind {
    /// All variants in default startup order.
    pub const ALL: [WorkerKind; 4] = [
        WorkerKind::Perception,
        WorkerKind::Memory,
        WorkerKind::Action,
        WorkerKind::Ethics,
    ];

    /// Lowercase name as used in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerKind::Perception => "perception",
            WorkerKind::Memory => "memory",
            WorkerKind::Action => "action",
            WorkerKind::Ethics => "ethics",
        }
    }
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WorkerKind {
    type Err = SaaiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "perception" => Ok(WorkerKind::Perception),
            "memory" => Ok(WorkerKind::Memory),
            "action" => Ok(WorkerKind::Action),
            "ethics" => Ok(WorkerKind::Ethics),
            other => Err(SaaiError::Config(format!(
                "unknown worker kind '{other}' (expected perception, memory, action or ethics)"
            ))),
        }
    }
}

/// Default worker blocks, one per kind, named after the kind.
///
/// Memory is declared after perception so its bus subscription exists before
/// perception's first cycle; ethics comes last and audits action output.
pub fn default_workers() -> Vec<WorkerConfig> {
    WorkerKind::ALL
        .into_iter()
        .map(|kind| WorkerConfig::new(kind.as_str(), kind.as_str()))
        .collect()
}
