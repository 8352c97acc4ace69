use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::health::HealthStatus;
use crate::orchestrator::OrchestratorMetrics;
use crate::resilience::CircuitState;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub modes: Vec<String>,
    pub process_override: Option<String>,
    pub primary_ready: bool,
    pub cached_backends: usize,
}

#[derive(Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub category: String,
    pub priority: i32,
    pub endpoint: Option<String>,
    pub circuit: CircuitState,
    pub cached: bool,
    pub health: Option<HealthStatus>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let services = &state.services;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: if services.pool.is_closed() { "stopping" } else { "operational" },
        uptime_secs: state.started_at.elapsed().as_secs(),
        modes: services.policy.load().modes().to_vec(),
        process_override: services.process_override.mode().map(str::to_string),
        primary_ready: services.probe.availability().supported,
        cached_backends: services.orchestrator.cache().len(),
    })
}

pub async fn get_metrics(State(state): State<AdminState>) -> Json<OrchestratorMetrics> {
    Json(state.services.orchestrator.metrics())
}

pub async fn get_backends(State(state): State<AdminState>) -> Json<Vec<BackendStatus>> {
    let services = &state.services;
    let cached: Vec<String> = services
        .orchestrator
        .cache()
        .entries()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    let health = services.orchestrator.cache().health();

    let statuses = services
        .descriptors()
        .iter()
        .map(|d| BackendStatus {
            name: d.name.clone(),
            category: d.category.clone(),
            priority: d.priority,
            endpoint: d.endpoint.clone(),
            circuit: services
                .breakers
                .get(&d.name)
                .map(|b| b.state())
                .unwrap_or(CircuitState::Closed),
            cached: cached.contains(&d.name),
            health: health.get(&d.name).cloned(),
        })
        .collect();

    Json(statuses)
}
