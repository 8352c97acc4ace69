//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: testing if backend recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold
//! Open → Half-Open: first can_execute() after the recovery timeout
//! Half-Open → Closed: a probe succeeds (failure_count reset)
//! Half-Open → Open: a probe fails while failure_count >= threshold
//! ```
//!
//! # Design Decisions
//! - Per-backend circuit breaker (not global), one mutex per breaker
//! - Breakers are created only through [`CircuitBreakerRegistry`], one per name per process
//! - Fail fast in Open state (no waiting for timeout)
//! - Half-Open admits every caller; there is no single-probe gate
//! - No periodic reset: leaving Open happens only inside `can_execute`

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::observability::metrics;

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    /// Numeric encoding used for the state gauge.
    pub fn as_gauge(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

/// Point-in-time view of one breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitMetrics {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    /// Successful / total, 1.0 before any request was recorded.
    pub success_rate: f64,
    pub last_failure_time: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    last_failure_at: Option<DateTime<Utc>>,
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
}

impl Default for BreakerInner {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure: None,
            last_failure_at: None,
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
        }
    }
}

/// Failure-isolation state machine for one named backend.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker. Prefer [`CircuitBreakerRegistry::get_or_create`] outside tests.
    pub fn new(name: impl Into<String>, failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold: failure_threshold.max(1),
            timeout,
            inner: Mutex::new(BreakerInner::default()),
        }
    }

    /// Backend name this breaker protects.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a request may be sent now. May move Open → Half-Open.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| Instant::now().saturating_duration_since(at) >= self.timeout)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!(backend = %self.name, "Circuit breaker half-open, admitting probes");
                    metrics::record_circuit_state(&self.name, CircuitState::HalfOpen);
                    true
                } else {
                    tracing::debug!(backend = %self.name, "Circuit breaker open, rejecting request");
                    false
                }
            }
        }
    }

    /// Record a successful request.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.total_requests += 1;
        inner.successful_requests += 1;

        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            inner.failure_count = 0;
            tracing::info!(backend = %self.name, "Circuit breaker closed after successful probe");
            metrics::record_circuit_state(&self.name, CircuitState::Closed);
        }
    }

    /// Record a failed request. Opens the circuit once the threshold is met, from any state.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        inner.total_requests += 1;
        inner.failed_requests += 1;
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());
        inner.last_failure_at = Some(Utc::now());

        if inner.failure_count >= self.failure_threshold {
            if inner.state != CircuitState::Open {
                tracing::warn!(
                    backend = %self.name,
                    failures = inner.failure_count,
                    threshold = self.failure_threshold,
                    "Circuit breaker opened"
                );
                metrics::record_circuit_state(&self.name, CircuitState::Open);
            }
            inner.state = CircuitState::Open;
        }
    }

    /// Current state without side effects.
    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("circuit breaker mutex poisoned").state
    }

    /// Consistent snapshot of counters and state.
    pub fn metrics(&self) -> CircuitMetrics {
        let inner = self.inner.lock().expect("circuit breaker mutex poisoned");
        let success_rate = if inner.total_requests == 0 {
            1.0
        } else {
            inner.successful_requests as f64 / inner.total_requests as f64
        };
        CircuitMetrics {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            total_requests: inner.total_requests,
            successful_requests: inner.successful_requests,
            failed_requests: inner.failed_requests,
            success_rate,
            last_failure_time: inner.last_failure_at,
        }
    }
}

/// Process-wide owner of breakers, keyed by backend name.
///
/// Every orchestrator that should share failure isolation must be handed the same registry.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Return the breaker for `name`, creating it on first reference.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(name) {
            return existing.value().clone();
        }
        self.breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::debug!(backend = %name, "Creating circuit breaker");
                Arc::new(CircuitBreaker::new(
                    name,
                    self.config.failure_threshold,
                    Duration::from_secs(self.config.timeout_secs),
                ))
            })
            .value()
            .clone()
    }

    /// Breaker for `name` if one exists.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(name).map(|r| r.value().clone())
    }

    /// Metrics for every known breaker, sorted by name.
    pub fn snapshot(&self) -> Vec<CircuitMetrics> {
        let mut all: Vec<CircuitMetrics> = self.breakers.iter().map(|r| r.value().metrics()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_failures() {
        let breaker = CircuitBreaker::new("b", 3, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[tokio::test(start_paused = true)]
    async fn opens_then_half_opens_after_timeout() {
        let breaker = CircuitBreaker::new("api", 5, Duration::from_secs(60));
        for _ in 0..5 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_admits_every_caller() {
        let breaker = CircuitBreaker::new("api", 1, Duration::from_secs(1));
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(1)).await;

        for _ in 0..10 {
            assert!(breaker.can_execute());
        }
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_success_closes_and_resets() {
        let breaker = CircuitBreaker::new("api", 2, Duration::from_secs(10));
        breaker.record_failure();
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(breaker.can_execute());

        breaker.record_success();
        let m = breaker.metrics();
        assert_eq!(m.state, CircuitState::Closed);
        assert_eq!(m.failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_failure_reopens() {
        let breaker = CircuitBreaker::new("api", 2, Duration::from_secs(10));
        breaker.record_failure();
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn success_in_closed_keeps_failure_count() {
        let breaker = CircuitBreaker::new("api", 3, Duration::from_secs(10));
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.metrics().failure_count, 2);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn metrics_snapshot() {
        let breaker = CircuitBreaker::new("api", 5, Duration::from_secs(10));
        assert_eq!(breaker.metrics().success_rate, 1.0);

        breaker.record_success();
        breaker.record_success();
        breaker.record_success();
        breaker.record_failure();

        let m = breaker.metrics();
        assert_eq!(m.name, "api");
        assert_eq!(m.total_requests, 4);
        assert_eq!(m.successful_requests, 3);
        assert_eq!(m.failed_requests, 1);
        assert!((m.success_rate - 0.75).abs() < f64::EPSILON);
        assert!(m.last_failure_time.is_some());
    }

    #[test]
    fn registry_returns_singleton_per_name() {
        let registry = CircuitBreakerRegistry::default();
        let a = registry.get_or_create("tools");
        let b = registry.get_or_create("tools");
        assert!(Arc::ptr_eq(&a, &b));

        a.record_failure();
        assert_eq!(registry.get("tools").unwrap().metrics().failed_requests, 1);

        registry.get_or_create("models");
        let names: Vec<_> = registry.snapshot().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["models", "tools"]);
    }
}
