//! Periodic health checking.
//!
//! # Responsibilities
//! - Periodically probe every cached backend
//! - Evict expired cache entries
//! - Stop on the shutdown broadcast

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::orchestrator::LazyOrchestrator;

pub struct HealthMonitor {
    orchestrator: Arc<LazyOrchestrator>,
    config: HealthCheckConfig,
}

impl HealthMonitor {
    pub fn new(orchestrator: Arc<LazyOrchestrator>, config: HealthCheckConfig) -> Self {
        Self { orchestrator, config }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Health monitor disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.interval_secs,
            timeout_secs = self.config.timeout_secs,
            "Health monitor starting"
        );

        let mut ticker = time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One round: evict expired entries, then probe what remains.
    pub async fn tick(&self) {
        self.orchestrator.evict_expired();
        let results = self.orchestrator.health_check_all().await;
        let unhealthy = results.values().filter(|s| !s.healthy).count();
        tracing::debug!(checked = results.len(), unhealthy, "Health round complete");
    }
}
