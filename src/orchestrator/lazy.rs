//! Lazy-loading backend orchestrator.
//!
//! # Responsibilities
//! - Turn a batch of descriptors into the map of backends that became ready
//! - Skip backends whose circuit is open, reuse cached instances
//! - Load the rest concurrently, each under its own timeout and a pool slot
//! - Queue concurrent loads of one reusable backend so the factory runs once
//! - Health-check cached backends and evict the ones that fail
//!
//! A backend missing from a returned map is the failure signal; no per-backend
//! error is ever raised to the batch caller.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::backend::{Backend, BackendDescriptor, BackendFactory, BackendRegistry};
use crate::config::{CacheConfig, HealthCheckConfig};
use crate::error::OrchestratorError;
use crate::health::HealthStatus;
use crate::observability::metrics;
use crate::orchestrator::cache::{BackendCache, CacheEntry, HealthCheck};
use crate::pool::{ConnectionPool, PoolStats};
use crate::resilience::{with_timeout, CircuitBreaker, CircuitBreakerRegistry, CircuitMetrics};
use crate::telemetry::{new_request_id, TelemetryEvent, TelemetrySink};

/// Backends that became ready in one batch, keyed by name.
pub type LoadedBackends = HashMap<String, Arc<dyn Backend>>;

/// Point-in-time diagnostics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorMetrics {
    pub generated_at: DateTime<Utc>,
    pub loaded_backends: usize,
    pub circuit_breakers: Vec<CircuitMetrics>,
    pub health: BTreeMap<String, HealthStatus>,
    pub pool: PoolStats,
    pub cache_hit_ratio: f64,
}

/// Loads, caches, and health-checks backends.
pub struct LazyOrchestrator {
    registry: BackendRegistry,
    breakers: Arc<CircuitBreakerRegistry>,
    pool: Arc<ConnectionPool>,
    cache: BackendCache,
    load_locks: DashMap<String, Arc<Mutex<()>>>,
    health_timeout: Duration,
    telemetry: Option<Arc<dyn TelemetrySink>>,
}

impl LazyOrchestrator {
    /// Build an orchestrator over shared breaker and pool services.
    pub fn new(
        registry: BackendRegistry,
        breakers: Arc<CircuitBreakerRegistry>,
        pool: Arc<ConnectionPool>,
        cache: &CacheConfig,
        health: &HealthCheckConfig,
    ) -> Self {
        Self {
            registry,
            breakers,
            pool,
            cache: BackendCache::new(cache.ttl()),
            load_locks: DashMap::new(),
            health_timeout: Duration::from_secs(health.timeout_secs),
            telemetry: None,
        }
    }

    /// Emit load outcomes to `sink`.
    pub fn with_telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        self
    }

    pub fn breakers(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.breakers
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn cache(&self) -> &BackendCache {
        &self.cache
    }

    /// Load a batch under a fresh request id.
    pub async fn load(&self, descriptors: &[BackendDescriptor]) -> LoadedBackends {
        let request_id = new_request_id();
        self.load_batch(&request_id, descriptors).await
    }

    /// Load a batch, tagging telemetry with `request_id`.
    pub async fn load_batch(&self, request_id: &str, descriptors: &[BackendDescriptor]) -> LoadedBackends {
        let mut ordered: Vec<&BackendDescriptor> = descriptors.iter().collect();
        ordered.sort_by_key(|d| d.priority);

        let mut seen = HashSet::new();
        let mut loaded = LoadedBackends::new();
        let mut pending = Vec::new();

        for descriptor in ordered {
            let name = descriptor.name.as_str();
            if !seen.insert(name) {
                tracing::debug!(backend = %name, "Duplicate descriptor in batch ignored");
                continue;
            }

            let breaker = self.breakers.get_or_create(name);
            if !breaker.can_execute() {
                let err = OrchestratorError::CircuitOpen(name.to_string());
                tracing::debug!(backend = %name, error = %err, "Skipping backend");
                self.emit(
                    TelemetryEvent::new(request_id, "backend_skipped")
                        .with_backend(name)
                        .with_field("reason", err.kind())
                        .with_field("error", err.to_string()),
                );
                continue;
            }

            if let Some(instance) = self.cache.lookup(name) {
                tracing::trace!(backend = %name, "Backend served from cache");
                loaded.insert(name.to_string(), instance);
                continue;
            }

            let Some(registered) = self.registry.resolve(&descriptor.category) else {
                let err = OrchestratorError::ConfigurationUnavailable(format!(
                    "no factory registered for category '{}'",
                    descriptor.category
                ));
                tracing::warn!(backend = %name, error = %err, "Skipping backend");
                self.emit(
                    TelemetryEvent::new(request_id, "backend_skipped")
                        .with_backend(name)
                        .with_field("reason", err.kind())
                        .with_field("error", err.to_string()),
                );
                continue;
            };

            pending.push(self.dispatch(
                request_id,
                descriptor,
                breaker,
                registered.factory.clone(),
                registered.capabilities.reusable,
                registered.capabilities.health_probe,
            ));
        }

        for (name, instance) in join_all(pending).await.into_iter().flatten() {
            loaded.insert(name, instance);
        }

        tracing::debug!(
            request_id = %request_id,
            requested = descriptors.len(),
            loaded = loaded.len(),
            "Backend batch settled"
        );
        loaded
    }

    async fn dispatch(
        &self,
        request_id: &str,
        descriptor: &BackendDescriptor,
        breaker: Arc<CircuitBreaker>,
        factory: Arc<dyn BackendFactory>,
        reusable: bool,
        health_probe: bool,
    ) -> Option<(String, Arc<dyn Backend>)> {
        let name = descriptor.name.as_str();
        let lock = reusable.then(|| self.load_lock(name));
        let started = Instant::now();
        let outcome = with_timeout(descriptor.load_timeout, async {
            let _guard = match &lock {
                Some(lock) => Some(lock.lock().await),
                None => None,
            };
            if lock.is_some() {
                if let Some(instance) = self.cache.peek(name) {
                    return Ok((instance, false));
                }
            }
            let instance = self
                .pool
                .execute_with_connection(name, |connection| factory.create(descriptor, connection))
                .await?;
            if reusable {
                self.cache.insert(name, instance.clone(), health_probe);
            }
            Ok::<_, OrchestratorError>((instance, true))
        })
        .await;
        let elapsed = started.elapsed();

        match outcome {
            Ok((instance, false)) => {
                tracing::debug!(backend = %name, "Backend loaded by a concurrent request");
                Some((name.to_string(), instance))
            }
            Ok((instance, true)) => {
                breaker.record_success();
                metrics::record_backend_load(name, "loaded", elapsed);
                tracing::info!(backend = %name, elapsed_ms = elapsed.as_millis() as u64, "Backend loaded");
                self.emit(
                    TelemetryEvent::new(request_id, "backend_loaded")
                        .with_backend(name)
                        .with_field("cached", reusable)
                        .with_duration(elapsed),
                );
                Some((name.to_string(), instance))
            }
            Err(err) => {
                breaker.record_failure();
                metrics::record_backend_load(name, err.kind(), elapsed);
                tracing::warn!(backend = %name, error = %err, "Backend load failed");
                self.emit(
                    TelemetryEvent::new(request_id, "backend_failed")
                        .with_backend(name)
                        .with_field("reason", err.kind())
                        .with_field("error", err.to_string())
                        .with_duration(elapsed),
                );
                None
            }
        }
    }

    fn load_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.load_locks.entry(name.to_string()).or_default().clone()
    }

    /// Probe every cached backend, evicting the ones that fail.
    pub async fn health_check_all(&self) -> HashMap<String, HealthStatus> {
        let entries = self.cache.entries();
        let checks = entries.iter().map(|(name, entry)| async move {
            HealthCheck {
                name: name.clone(),
                instance: entry.instance.clone(),
                status: self.check_one(name, entry).await,
            }
        });
        let results = join_all(checks).await;

        for check in &results {
            metrics::record_backend_health(&check.name, check.status.healthy);
        }
        self.cache.apply_health(&results);
        results.into_iter().map(|check| (check.name, check.status)).collect()
    }

    async fn check_one(&self, name: &str, entry: &CacheEntry) -> HealthStatus {
        if !entry.health_probe {
            return HealthStatus::healthy(None);
        }
        let started = Instant::now();
        let instance = entry.instance.clone();
        let outcome = with_timeout(
            self.health_timeout,
            self.pool
                .execute_with_connection(name, |connection| async move { instance.probe(connection).await }),
        )
        .await;

        match outcome {
            Ok(()) => HealthStatus::healthy(Some(started.elapsed())),
            Err(err) => {
                tracing::warn!(backend = %name, error = %err, "Health check failed");
                HealthStatus::unhealthy(err.to_string())
            }
        }
    }

    /// Drop expired cache entries.
    pub fn evict_expired(&self) -> usize {
        let removed = self.cache.evict_expired();
        if removed > 0 {
            tracing::debug!(removed, "Evicted expired backends");
        }
        removed
    }

    /// Drop the cached instance of one backend.
    pub fn invalidate(&self, name: &str) -> bool {
        self.cache.invalidate(name)
    }

    pub fn metrics(&self) -> OrchestratorMetrics {
        OrchestratorMetrics {
            generated_at: Utc::now(),
            loaded_backends: self.cache.len(),
            circuit_breakers: self.breakers.snapshot(),
            health: self.cache.health(),
            pool: self.pool.stats(),
            cache_hit_ratio: self.cache.hit_ratio(),
        }
    }

    fn emit(&self, event: TelemetryEvent) {
        if let Some(sink) = &self.telemetry {
            sink.emit(&event);
        }
    }
}

impl std::fmt::Debug for LazyOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyOrchestrator")
            .field("categories", &self.registry.categories())
            .field("cached", &self.cache.len())
            .field("health_timeout", &self.health_timeout)
            .finish()
    }
}
