//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the orchestrator.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::backend::BackendDescriptor;

/// Root configuration for the orchestration core.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Connection pool limits.
    pub pool: PoolConfig,

    /// Backend instance cache.
    pub cache: CacheConfig,

    /// Health check settings.
    pub health_check: HealthCheckConfig,

    /// Fallback cascade policy.
    pub cascade: CascadeConfig,

    /// Telemetry trail settings.
    pub telemetry: TelemetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin diagnostics endpoint.
    pub admin: AdminConfig,

    /// Backends warmed up at startup.
    pub backends: Vec<BackendConfig>,
}

impl OrchestratorConfig {
    /// Descriptors for every configured backend.
    pub fn descriptors(&self) -> Vec<BackendDescriptor> {
        self.backends.iter().map(BackendConfig::to_descriptor).collect()
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures that open the circuit.
    pub failure_threshold: u32,

    /// Seconds an open circuit waits before admitting probes.
    pub timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            timeout_secs: 60,
        }
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Global cap on in-flight backend operations.
    pub max_connections: usize,

    /// Idle connections kept per host by each backend session.
    pub per_host_limit: usize,

    /// Request timeout applied by backend sessions, in seconds.
    pub timeout_secs: u64,

    /// TCP keep-alive / idle pool timeout, in seconds.
    pub keepalive_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 100,
            per_host_limit: 10,
            timeout_secs: 30,
            keepalive_secs: 60,
        }
    }
}

/// Backend cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a cached backend instance, in seconds.
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable the periodic health monitor.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,

    /// Per-probe timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_secs: 5,
        }
    }
}

/// Fallback cascade configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Processing modes, highest priority first.
    pub modes: Vec<String>,

    /// Deadline for a single mode execution, in seconds.
    pub mode_timeout_secs: u64,

    /// Mode selected by a caller's force-offline flag.
    pub offline_mode: Option<String>,

    /// Mode selected by a caller's force-sandbox flag.
    pub sandbox_mode: Option<String>,

    /// Environment variable holding a process-wide forced mode name.
    pub env_override: String,

    /// JSON availability record written by the provisioning component.
    pub availability_path: Option<String>,

    /// How long a read availability record is reused, in milliseconds.
    pub availability_refresh_ms: u64,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            modes: vec![
                "primary".to_string(),
                "degraded-local".to_string(),
                "deterministic-offline".to_string(),
            ],
            mode_timeout_secs: 120,
            offline_mode: Some("deterministic-offline".to_string()),
            sandbox_mode: Some("degraded-local".to_string()),
            env_override: "ORCHESTRATOR_FORCE_MODE".to_string(),
            availability_path: None,
            availability_refresh_ms: 1000,
        }
    }
}

/// Telemetry trail configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Append-only JSON-lines log. Disabled when unset.
    pub log_path: Option<String>,

    /// Mirror every event to the structured logger.
    pub mirror_to_tracing: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            mirror_to_tracing: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin diagnostics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin endpoint.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin endpoint bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Backend definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Unique backend identifier.
    pub name: String,

    /// Lower is tried first.
    #[serde(default)]
    pub priority: i32,

    /// Adapter category (selects the factory).
    pub category: String,

    /// Load deadline in milliseconds.
    #[serde(default = "default_load_timeout_ms")]
    pub load_timeout_ms: u64,

    /// Opaque capability tags.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,

    /// Optional classification used by callers.
    #[serde(default)]
    pub domain: Option<String>,

    /// Remote endpoint, for adapters that need one.
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_load_timeout_ms() -> u64 {
    5_000
}

impl BackendConfig {
    pub fn to_descriptor(&self) -> BackendDescriptor {
        BackendDescriptor {
            name: self.name.clone(),
            priority: self.priority,
            load_timeout: Duration::from_millis(self.load_timeout_ms),
            category: self.category.clone(),
            capabilities: self.capabilities.clone(),
            domain: self.domain.clone(),
            endpoint: self.endpoint.clone(),
        }
    }
}
