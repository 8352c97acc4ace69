//! Per-backend reusable connection.
//!
//! # Responsibilities
//! - Own one pooled HTTP session per backend (keep-alive, per-host idle cap)
//! - Enforce the per-host concurrency limit
//! - Track in-flight operations through an RAII guard

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::config::PoolConfig;
use crate::error::{OrchestratorError, Result};

/// Session object shared by every operation against one backend.
#[derive(Debug)]
pub struct BackendConnection {
    name: String,
    client: reqwest::Client,
    host_limit: Arc<Semaphore>,
    created_at: Instant,
    /// Number of operations currently running on this connection.
    active_operations: AtomicUsize,
    /// Operations ever started on this connection.
    total_operations: AtomicU64,
}

impl BackendConnection {
    /// Build the session for `name` using pool settings.
    pub fn new(name: &str, config: &PoolConfig) -> Result<Self> {
        let keepalive = Duration::from_secs(config.keepalive_secs);
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.per_host_limit)
            .pool_idle_timeout(keepalive)
            .tcp_keepalive(keepalive)
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("backend-orchestrator/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            name: name.to_string(),
            client,
            host_limit: Arc::new(Semaphore::new(config.per_host_limit.max(1))),
            created_at: Instant::now(),
            active_operations: AtomicUsize::new(0),
            total_operations: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pooled HTTP client for this backend.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    pub fn active_operations(&self) -> usize {
        self.active_operations.load(Ordering::Relaxed)
    }

    pub fn total_operations(&self) -> u64 {
        self.total_operations.load(Ordering::Relaxed)
    }

    /// Wait for a per-host slot and register an operation.
    pub(crate) async fn begin(self: &Arc<Self>) -> Result<OperationGuard> {
        let permit = self
            .host_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| OrchestratorError::PoolClosed)?;
        self.active_operations.fetch_add(1, Ordering::Relaxed);
        self.total_operations.fetch_add(1, Ordering::Relaxed);
        Ok(OperationGuard {
            connection: self.clone(),
            _permit: permit,
        })
    }

    pub(crate) fn close(&self) {
        self.host_limit.close();
    }
}

/// A RAII guard for one in-flight operation. Releases the per-host slot on drop.
#[derive(Debug)]
pub struct OperationGuard {
    connection: Arc<BackendConnection>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for OperationGuard {
    type Target = BackendConnection;
    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.connection.active_operations.fetch_sub(1, Ordering::Relaxed);
    }
}
