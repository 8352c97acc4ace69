//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the shared services in dependency order
//! - Warm the backend cache with the configured descriptors
//! - Apply reloaded configuration to the parts that can change live
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Pool, breaker, and cache settings are fixed for the process lifetime;
//!   the fallback policy and backend list are hot-swappable

use arc_swap::ArcSwap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::backend::{BackendDescriptor, BackendRegistry, HttpBackendFactory, HTTP_CATEGORY};
use crate::cascade::{
    AvailabilityProbe, AvailabilityRecord, FallbackCascade, FallbackPolicy, FileAvailabilityProbe,
    ProcessOverride, StaticProbe,
};
use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::orchestrator::{LazyOrchestrator, LoadedBackends};
use crate::pool::ConnectionPool;
use crate::resilience::CircuitBreakerRegistry;
use crate::telemetry::{build_sink, TelemetrySink};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open telemetry log: {0}")]
    Telemetry(#[from] io::Error),

    #[error("invalid fallback policy: {0}")]
    Policy(#[from] OrchestratorError),
}

/// Registry with every built-in adapter.
pub fn default_registry() -> BackendRegistry {
    BackendRegistry::new().with(HTTP_CATEGORY, Arc::new(HttpBackendFactory::new()))
}

/// Process-wide services shared by the orchestrator, cascade, monitor, and admin API.
pub struct Services {
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub pool: Arc<ConnectionPool>,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub orchestrator: Arc<LazyOrchestrator>,
    pub policy: Arc<ArcSwap<FallbackPolicy>>,
    pub probe: Arc<dyn AvailabilityProbe>,
    pub process_override: ProcessOverride,
    descriptors: ArcSwap<Vec<BackendDescriptor>>,
}

impl Services {
    /// Build services with the built-in adapters.
    pub fn build(config: &OrchestratorConfig, process_override: ProcessOverride) -> Result<Self, StartupError> {
        Self::build_with_registry(config, default_registry(), process_override)
    }

    pub fn build_with_registry(
        config: &OrchestratorConfig,
        registry: BackendRegistry,
        process_override: ProcessOverride,
    ) -> Result<Self, StartupError> {
        let policy = FallbackPolicy::from_config(&config.cascade)?;
        let telemetry = build_sink(&config.telemetry)?;
        let breakers = Arc::new(CircuitBreakerRegistry::new(config.circuit_breaker));
        let pool = Arc::new(ConnectionPool::new(config.pool.clone()));

        let orchestrator = LazyOrchestrator::new(
            registry,
            breakers.clone(),
            pool.clone(),
            &config.cache,
            &config.health_check,
        )
        .with_telemetry(telemetry.clone());

        let probe: Arc<dyn AvailabilityProbe> = match &config.cascade.availability_path {
            Some(path) => Arc::new(
                FileAvailabilityProbe::new(PathBuf::from(path))
                    .with_refresh(Duration::from_millis(config.cascade.availability_refresh_ms)),
            ),
            None => Arc::new(StaticProbe(AvailabilityRecord::supported())),
        };

        tracing::info!(
            backends = config.backends.len(),
            modes = ?policy.modes(),
            max_connections = config.pool.max_connections,
            "Services initialized"
        );

        Ok(Self {
            breakers,
            pool,
            telemetry,
            orchestrator: Arc::new(orchestrator),
            policy: Arc::new(ArcSwap::from_pointee(policy)),
            probe,
            process_override,
            descriptors: ArcSwap::from_pointee(config.descriptors()),
        })
    }

    /// Current backend descriptors.
    pub fn descriptors(&self) -> Arc<Vec<BackendDescriptor>> {
        self.descriptors.load_full()
    }

    /// Load every configured backend once.
    pub async fn warm_up(&self) -> LoadedBackends {
        let descriptors = self.descriptors();
        let loaded = self.orchestrator.load(&descriptors).await;
        tracing::info!(requested = descriptors.len(), loaded = loaded.len(), "Warm-up load complete");
        loaded
    }

    /// A cascade sharing this process's policy, probe, and telemetry.
    pub fn cascade<I, O>(&self) -> FallbackCascade<I, O>
    where
        I: Send + Sync + 'static,
        O: Send + 'static,
    {
        FallbackCascade::new(self.policy.clone(), self.probe.clone(), self.telemetry.clone())
            .with_process_override(self.process_override.clone())
    }

    /// Apply a reloaded config. Only the policy and backend list change live.
    pub fn apply_config(&self, config: &OrchestratorConfig) -> Result<(), StartupError> {
        let policy = FallbackPolicy::from_config(&config.cascade)?;
        tracing::info!(modes = ?policy.modes(), backends = config.backends.len(), "Applying reloaded configuration");
        self.policy.store(Arc::new(policy));

        let removed: Vec<String> = {
            let current = self.descriptors.load();
            current
                .iter()
                .filter(|d| !config.backends.iter().any(|b| b.name == d.name))
                .map(|d| d.name.clone())
                .collect()
        };
        for name in &removed {
            self.orchestrator.invalidate(name);
        }
        self.descriptors.store(Arc::new(config.descriptors()));
        Ok(())
    }

    /// Close pooled connections. Loads issued afterwards fail with `PoolClosed`.
    pub fn close(&self) {
        self.pool.close_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, CascadeConfig};
    use crate::error::OrchestratorError;

    fn config() -> OrchestratorConfig {
        let mut config = OrchestratorConfig::default();
        config.telemetry.mirror_to_tracing = false;
        config.backends.push(BackendConfig {
            name: "search".into(),
            priority: 1,
            category: "mock".into(),
            load_timeout_ms: 100,
            capabilities: Default::default(),
            domain: None,
            endpoint: None,
        });
        config
    }

    #[test]
    fn builds_from_defaults() {
        let services = Services::build(&config(), ProcessOverride::none()).unwrap();
        assert_eq!(services.descriptors().len(), 1);
        assert_eq!(services.policy.load().primary(), "primary");
        assert!(services.probe.availability().supported);
    }

    #[test]
    fn reload_swaps_policy_and_backends() {
        let services = Services::build(&config(), ProcessOverride::none()).unwrap();

        let mut next = config();
        next.backends.clear();
        next.cascade = CascadeConfig {
            modes: vec!["local".into(), "offline".into()],
            offline_mode: Some("offline".into()),
            sandbox_mode: None,
            ..CascadeConfig::default()
        };
        services.apply_config(&next).unwrap();

        assert!(services.descriptors().is_empty());
        assert_eq!(services.policy.load().modes(), ["local", "offline"]);
        let cascade = services.cascade::<(), ()>();
        assert_eq!(cascade.policy().primary(), "local");
    }

    #[test]
    fn reload_with_empty_modes_keeps_old_policy() {
        let services = Services::build(&config(), ProcessOverride::none()).unwrap();
        let mut next = config();
        next.cascade.modes.clear();
        let err = services.apply_config(&next).unwrap_err();
        assert!(matches!(err, StartupError::Policy(OrchestratorError::ConfigurationUnavailable(_))));
        assert_eq!(services.policy.load().modes().len(), 3);
    }

    #[tokio::test]
    async fn close_shuts_the_pool() {
        let services = Services::build(&config(), ProcessOverride::none()).unwrap();
        services.close();
        assert!(services.pool.is_closed());
    }
}
