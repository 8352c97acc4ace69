//! Error taxonomy for the orchestration core.
//!
//! # Propagation
//! ```text
//! load() batch:
//!     CircuitOpen / Timeout / BackendError → absent map entry (+ breaker failure)
//!
//! cascade execute():
//!     any mode error → demotion to next mode
//!     last mode error → AllModesExhausted (only error the caller sees)
//! ```

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors raised by the orchestration core.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// No usable descriptor, factory, or override for the requested mode/backend.
    #[error("configuration unavailable: {0}")]
    ConfigurationUnavailable(String),

    /// Operation exceeded its allotted duration.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// Pre-flight rejection by a circuit breaker; no network attempt was made.
    #[error("circuit open for backend '{0}'")]
    CircuitOpen(String),

    /// The backend's own operation failed.
    #[error("backend '{backend}' failed: {message}")]
    BackendError {
        /// Backend or mode name.
        backend: String,
        /// Failure description.
        message: String,
    },

    /// Every mode in the cascade failed.
    #[error("{summary} (request_id={request_id})")]
    AllModesExhausted {
        /// Request whose telemetry trail holds the full history.
        request_id: String,
        /// Human-readable one-line summary.
        summary: String,
        /// Per-mode failures in attempt order.
        failures: Vec<ModeFailure>,
    },

    /// The connection pool has been shut down.
    #[error("connection pool is closed")]
    PoolClosed,

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl OrchestratorError {
    /// Shorthand for a [`OrchestratorError::BackendError`].
    pub fn backend(backend: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::BackendError {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    /// Stable tag used in telemetry payloads and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigurationUnavailable(_) => "configuration_unavailable",
            Self::Timeout(_) => "timeout",
            Self::CircuitOpen(_) => "circuit_open",
            Self::BackendError { .. } => "backend_error",
            Self::AllModesExhausted { .. } => "all_modes_exhausted",
            Self::PoolClosed => "pool_closed",
            Self::Http(_) => "backend_error",
        }
    }
}

/// One failed cascade attempt.
#[derive(Debug, Clone)]
pub struct ModeFailure {
    /// Mode that was attempted.
    pub mode: String,
    /// Rendered error of that attempt.
    pub error: String,
}

impl fmt::Display for ModeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.mode, self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_message_carries_request_id() {
        let err = OrchestratorError::AllModesExhausted {
            request_id: "req-1".into(),
            summary: "all 2 modes failed".into(),
            failures: vec![
                ModeFailure { mode: "primary".into(), error: "boom".into() },
                ModeFailure { mode: "offline".into(), error: "bang".into() },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("req-1"));
        assert!(msg.contains("all 2 modes failed"));
        assert_eq!(err.kind(), "all_modes_exhausted");
    }

    #[test]
    fn timeout_kind() {
        let err = OrchestratorError::Timeout(Duration::from_secs(2));
        assert_eq!(err.kind(), "timeout");
        assert!(err.to_string().contains("2s"));
    }
}
