//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds and timeouts > 0)
//! - Check referential integrity (forced modes exist in the mode list)
//! - Detect duplicate backend names and malformed endpoints
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: OrchestratorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use thiserror::Error;

use crate::config::schema::OrchestratorConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: String },

    #[error("cascade.modes must not be empty")]
    NoModes,

    #[error("cascade mode '{0}' is listed more than once")]
    DuplicateMode(String),

    #[error("{field} references unknown mode '{mode}'")]
    UnknownMode { field: String, mode: String },

    #[error("backend name '{0}' is defined more than once")]
    DuplicateBackend(String),

    #[error("backend '{name}' has invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        name: String,
        endpoint: String,
        reason: String,
    },

    #[error("backend '{0}' requires an endpoint for category 'http'")]
    MissingEndpoint(String),
}

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::NotPositive { field: field.to_string() });
    }
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &OrchestratorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    positive(&mut errors, "circuit_breaker.failure_threshold", config.circuit_breaker.failure_threshold as u64);
    positive(&mut errors, "circuit_breaker.timeout_secs", config.circuit_breaker.timeout_secs);
    positive(&mut errors, "pool.max_connections", config.pool.max_connections as u64);
    positive(&mut errors, "pool.per_host_limit", config.pool.per_host_limit as u64);
    positive(&mut errors, "pool.timeout_secs", config.pool.timeout_secs);
    positive(&mut errors, "cache.ttl_secs", config.cache.ttl_secs);
    positive(&mut errors, "health_check.timeout_secs", config.health_check.timeout_secs);
    if config.health_check.enabled {
        positive(&mut errors, "health_check.interval_secs", config.health_check.interval_secs);
    }
    positive(&mut errors, "cascade.mode_timeout_secs", config.cascade.mode_timeout_secs);

    let cascade = &config.cascade;
    if cascade.modes.is_empty() {
        errors.push(ValidationError::NoModes);
    }
    let mut seen_modes = HashSet::new();
    for mode in &cascade.modes {
        if !seen_modes.insert(mode.as_str()) {
            errors.push(ValidationError::DuplicateMode(mode.clone()));
        }
    }
    for (field, mode) in [
        ("cascade.offline_mode", &cascade.offline_mode),
        ("cascade.sandbox_mode", &cascade.sandbox_mode),
    ] {
        if let Some(mode) = mode {
            if !seen_modes.contains(mode.as_str()) {
                errors.push(ValidationError::UnknownMode {
                    field: field.to_string(),
                    mode: mode.clone(),
                });
            }
        }
    }

    let mut seen_backends = HashSet::new();
    for backend in &config.backends {
        if !seen_backends.insert(backend.name.as_str()) {
            errors.push(ValidationError::DuplicateBackend(backend.name.clone()));
        }
        positive(
            &mut errors,
            &format!("backends.{}.load_timeout_ms", backend.name),
            backend.load_timeout_ms,
        );
        match &backend.endpoint {
            Some(endpoint) => {
                if let Err(e) = url::Url::parse(endpoint) {
                    errors.push(ValidationError::InvalidEndpoint {
                        name: backend.name.clone(),
                        endpoint: endpoint.clone(),
                        reason: e.to_string(),
                    });
                }
            }
            None if backend.category == "http" => {
                errors.push(ValidationError::MissingEndpoint(backend.name.clone()));
            }
            None => {}
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
