//! Backend orchestrator service.
//!
//! # Architecture Overview
//!
//! ```text
//!   config.toml ──▶ Services ──┬──▶ LazyOrchestrator ──▶ ConnectionPool ──▶ backends
//!        │                     │          │
//!        │ (--watch)           │          └──▶ CircuitBreakerRegistry
//!        ▼                     │
//!   ConfigWatcher ──apply──▶   ├──▶ FallbackPolicy (ArcSwap) ──▶ FallbackCascade
//!                              │
//!                              ├──▶ TelemetrySink (JSON lines / tracing)
//!                              │
//!   HealthMonitor ◀────────────┤
//!   Admin API     ◀────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use backend_orchestrator::admin::{self, AdminState};
use backend_orchestrator::cascade::ProcessOverride;
use backend_orchestrator::config::{load_config, watcher::ConfigWatcher, OrchestratorConfig};
use backend_orchestrator::health::HealthMonitor;
use backend_orchestrator::lifecycle::{wait_for_shutdown_signal, Services, Shutdown};
use backend_orchestrator::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "backend-orchestrator")]
#[command(about = "Resilient backend orchestration service", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the fallback policy and backend list when the file changes
    #[arg(short, long, requires = "config")]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => OrchestratorConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "backend-orchestrator starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let process_override = ProcessOverride::from_env(&config.cascade.env_override);
    let services = Arc::new(Services::build(&config, process_override)?);
    services.warm_up().await;

    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    if config.health_check.enabled {
        let monitor = HealthMonitor::new(services.orchestrator.clone(), config.health_check.clone());
        tasks.push(tokio::spawn(monitor.run(shutdown.subscribe())));
    }

    if config.admin.enabled {
        if config.admin.api_key == "CHANGE_ME_IN_PRODUCTION" {
            tracing::warn!("Admin API is using the default key");
        }
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState::new(services.clone(), &config.admin.api_key);
        let rx = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = admin::serve(listener, state, rx).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        }));
    }

    // Held until exit; dropping it stops file notifications.
    let mut _watcher = None;
    if let (true, Some(path)) = (cli.watch, &cli.config) {
        let (watcher, mut updates) = ConfigWatcher::new(path);
        _watcher = Some(watcher.run()?);
        let services = services.clone();
        let mut rx = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(next) = updates.recv() => {
                        if let Err(e) = services.apply_config(&next) {
                            tracing::error!(error = %e, "Failed to apply reloaded configuration");
                        }
                    }
                    _ = rx.recv() => break,
                }
            }
        }));
    }

    wait_for_shutdown_signal().await;
    shutdown.trigger();
    for task in tasks {
        if let Err(e) = task.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
    }
    services.close();

    tracing::info!("Shutdown complete");
    Ok(())
}
