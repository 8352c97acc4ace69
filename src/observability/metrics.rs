//! Metrics collection and exposition.
//!
//! # Metrics
//! - `orchestrator_backend_loads_total` (counter): load outcomes by backend, outcome
//! - `orchestrator_backend_load_duration_seconds` (histogram): load latency by backend
//! - `orchestrator_cache_lookups_total` (counter): cache hits / misses
//! - `orchestrator_circuit_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `orchestrator_backend_health` (gauge): 1=healthy, 0=unhealthy
//! - `orchestrator_pool_available_slots` (gauge): free limiter slots
//! - `orchestrator_cascade_attempts_total` (counter): attempts by mode, outcome
//!
//! Without an installed recorder every call is a no-op.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;

use crate::resilience::CircuitState;

/// Install the Prometheus exporter with an HTTP scrape listener on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_backend_load(backend: &str, outcome: &'static str, elapsed: Duration) {
    counter!("orchestrator_backend_loads_total", "backend" => backend.to_string(), "outcome" => outcome)
        .increment(1);
    histogram!("orchestrator_backend_load_duration_seconds", "backend" => backend.to_string())
        .record(elapsed.as_secs_f64());
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("orchestrator_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_circuit_state(backend: &str, state: CircuitState) {
    gauge!("orchestrator_circuit_state", "backend" => backend.to_string()).set(state.as_gauge());
}

pub fn record_backend_health(backend: &str, healthy: bool) {
    gauge!("orchestrator_backend_health", "backend" => backend.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_pool_slots(available: usize) {
    gauge!("orchestrator_pool_available_slots").set(available as f64);
}

pub fn record_cascade_attempt(mode: &str, outcome: &'static str) {
    counter!("orchestrator_cascade_attempts_total", "mode" => mode.to_string(), "outcome" => outcome)
        .increment(1);
}
