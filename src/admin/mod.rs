//! Authenticated admin API.
//!
//! # Routes
//! ```text
//! GET /admin/status    process status, policy, override, probe readiness
//! GET /admin/metrics   orchestrator diagnostics snapshot
//! GET /admin/backends  configured backends with circuit, cache, and health state
//! ```

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::lifecycle::Services;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub services: Arc<Services>,
    pub api_key: Arc<str>,
    pub started_at: Instant,
}

impl AdminState {
    pub fn new(services: Arc<Services>, api_key: &str) -> Self {
        Self {
            services,
            api_key: Arc::from(api_key),
            started_at: Instant::now(),
        }
    }
}

#[allow(deprecated)]
pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/metrics", get(get_metrics))
        .route("/admin/backends", get(get_backends))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .layer(TraceLayer::new_for_http())
}

/// Serve the admin API on `listener` until the shutdown broadcast fires.
pub async fn serve(
    listener: TcpListener,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
