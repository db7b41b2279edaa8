use thiserror::Error;

/// A convenience `Result` alias using [`SaaiError`].
pub type SaaiResult<T> = Result<T, SaaiError>;

/// Top-level error type for SAAI Agents.
///
/// Only [`SaaiError::Initialization`] is allowed to cross the orchestrator
/// boundary as a hard failure. Every other variant is absorbed into worker
/// state, metrics, logs, or a structured boundary response.
#[derive(Error, Debug)]
pub enum SaaiError {
    /// A shared service or worker failed during startup.
    #[error("Initialization of {component} failed: {reason}")]
    Initialization {
        /// Name of the component that failed.
        component: String,
        /// Human-readable failure description.
        reason: String,
    },

    /// A worker's periodic processing step failed.
    #[error("Cycle error: {0}")]
    Cycle(String),

    /// A teardown step failed.
    #[error("Shutdown of {component} failed: {reason}")]
    Shutdown {
        /// Name of the component that failed.
        component: String,
        /// Human-readable failure description.
        reason: String,
    },

    /// A command targeted a worker that is not registered.
    #[error("Worker '{0}' not found")]
    CommandNotFound(String),

    /// A worker's command handler returned an error.
    #[error("Command for worker '{worker}' failed: {reason}")]
    CommandFailed {
        /// Target worker name.
        worker: String,
        /// Error reported by the worker.
        reason: String,
    },

    /// The system has not completed initialization.
    #[error("System not initialized")]
    Unavailable,

    /// Business-logic error raised inside a worker.
    #[error("Worker error: {0}")]
    Worker(String),

    /// Message bus error.
    #[error("Bus error: {0}")]
    Bus(String),

    /// Metrics sink error.
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Configuration parsing or validation error.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SaaiError {
    /// Builds an [`SaaiError::Initialization`] for `component`.
    pub fn initialization(component: impl Into<String>, reason: impl ToString) -> Self {
        Self::Initialization {
            component: component.into(),
            reason: reason.to_string(),
        }
    }

    /// Builds an [`SaaiError::Shutdown`] for `component`.
    pub fn shutdown(component: impl Into<String>, reason: impl ToString) -> Self {
        Self::Shutdown {
            component: component.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialization_display() {
        let err = SaaiError::initialization("message_bus", "connection refused");
        assert_eq!(
            err.to_string(),
            "Initialization of message_bus failed: connection refused"
        );
    }

    #[test]
    fn test_command_failed_display() {
        let err = SaaiError::CommandFailed {
            worker: "memory".to_string(),
            reason: "boom".to_string(),
        };
        assert!(err.to_string().contains("memory"));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: SaaiError = parse.unwrap_err().into();
        assert!(matches!(err, SaaiError::Json(_)));
    }
}
