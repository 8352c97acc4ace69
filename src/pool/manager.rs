//! Bounded connection pool.
//!
//! # Responsibilities
//! - Cap in-flight backend operations process-wide (counting semaphore)
//! - Lazily create and reuse one [`BackendConnection`] per backend name
//! - Release every slot on every exit path (success, error, cancellation)

use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::config::PoolConfig;
use crate::error::{OrchestratorError, Result};
use crate::observability::metrics;
use crate::pool::connection::BackendConnection;

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub active_backends: usize,
    pub max_connections: usize,
    pub timeout_secs: u64,
    pub available_slots: usize,
}

/// Manages the global limiter and per-backend connections.
#[derive(Debug)]
pub struct ConnectionPool {
    config: PoolConfig,
    limiter: Arc<Semaphore>,
    connections: DashMap<String, Arc<BackendConnection>>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        let slots = config.max_connections.max(1);
        Self {
            config,
            limiter: Arc::new(Semaphore::new(slots)),
            connections: DashMap::new(),
        }
    }

    /// Run `operation` with the backend's connection while holding a pool slot.
    ///
    /// Suspends while the backend's per-host limit or the global limit is exhausted.
    /// Callers bound the wait with their own deadline.
    pub async fn execute_with_connection<T, F, Fut>(&self, backend: &str, operation: F) -> Result<T>
    where
        F: FnOnce(Arc<BackendConnection>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let connection = self.connection(backend)?;
        // Per-host slot before the global slot.
        let _operation = connection.begin().await?;
        let _slot = self
            .limiter
            .acquire()
            .await
            .map_err(|_| OrchestratorError::PoolClosed)?;
        metrics::record_pool_slots(self.limiter.available_permits());

        let result = operation(connection).await;

        tracing::trace!(backend = %backend, ok = result.is_ok(), "Pool operation finished");
        result
    }

    /// Resolve or create the connection for `backend`.
    pub fn connection(&self, backend: &str) -> Result<Arc<BackendConnection>> {
        if self.limiter.is_closed() {
            return Err(OrchestratorError::PoolClosed);
        }
        if let Some(existing) = self.connections.get(backend) {
            return Ok(existing.value().clone());
        }

        let created = Arc::new(BackendConnection::new(backend, &self.config)?);
        let connection = self
            .connections
            .entry(backend.to_string())
            .or_insert_with(|| {
                tracing::debug!(backend = %backend, "Created backend connection");
                created
            })
            .value()
            .clone();
        Ok(connection)
    }

    /// Close every backend connection and refuse further work.
    pub fn close_all(&self) {
        self.limiter.close();
        let closed = self.connections.len();
        for entry in self.connections.iter() {
            entry.value().close();
        }
        self.connections.clear();
        tracing::info!(connections = closed, "Connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.limiter.is_closed()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            active_backends: self.connections.len(),
            max_connections: self.config.max_connections,
            timeout_secs: self.config.timeout_secs,
            available_slots: self.limiter.available_permits(),
        }
    }
}
