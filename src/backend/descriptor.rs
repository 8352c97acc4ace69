//! Backend descriptors and adapter contracts.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::pool::BackendConnection;

/// Static, caller-supplied description of a callable backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendDescriptor {
    /// Unique key.
    pub name: String,
    /// Lower is tried first.
    pub priority: i32,
    /// Deadline for making the backend ready.
    pub load_timeout: Duration,
    /// Selects the factory in the [`BackendRegistry`](crate::backend::BackendRegistry).
    pub category: String,
    /// Opaque to the core.
    pub capabilities: BTreeSet<String>,
    /// Opaque to the core.
    pub domain: Option<String>,
    /// Remote address for adapters that need one.
    pub endpoint: Option<String>,
}

impl BackendDescriptor {
    pub fn new(name: impl Into<String>, category: impl Into<String>, load_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            priority: 0,
            load_timeout,
            category: category.into(),
            capabilities: BTreeSet::new(),
            domain: None,
            endpoint: None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }
}

/// What an adapter supports, declared once at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdapterCapabilities {
    /// `Backend::probe` performs a real liveness check.
    pub health_probe: bool,
    /// Instances may be cached and shared between callers.
    pub reusable: bool,
}

impl Default for AdapterCapabilities {
    fn default() -> Self {
        Self {
            health_probe: true,
            reusable: true,
        }
    }
}

/// A ready backend instance, shared by reference with callers.
#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    /// Name of the descriptor this instance was created from.
    fn name(&self) -> &str;

    /// Lightweight liveness check.
    async fn probe(&self, connection: Arc<BackendConnection>) -> Result<()>;
}

/// Constructor for one backend category.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Capability descriptor recorded when the factory is registered.
    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities::default()
    }

    /// Make the backend ready. Runs under the descriptor's load timeout.
    async fn create(
        &self,
        descriptor: &BackendDescriptor,
        connection: Arc<BackendConnection>,
    ) -> Result<Arc<dyn Backend>>;
}
