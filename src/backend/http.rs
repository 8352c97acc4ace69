//! HTTP tool-server adapter.
//!
//! # Responsibilities
//! - Handshake with the backend endpoint on creation
//! - Probe `<endpoint>/health` for liveness
//!
//! Both requests go through the backend's pooled client.

use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

use crate::backend::descriptor::{Backend, BackendDescriptor, BackendFactory};
use crate::error::{OrchestratorError, Result};
use crate::pool::BackendConnection;

/// Category name the entry point registers this adapter under.
pub const HTTP_CATEGORY: &str = "http";

/// A ready HTTP backend.
#[derive(Debug)]
pub struct HttpBackend {
    name: String,
    endpoint: Url,
    health_url: Url,
}

impl HttpBackend {
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn get_ok(&self, connection: &BackendConnection, url: &Url) -> Result<()> {
        let response = connection
            .client()
            .get(url.clone())
            .header("user-agent", "backend-orchestrator-health-check")
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(OrchestratorError::backend(&self.name, format!("{url} returned {status}")))
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self, connection: Arc<BackendConnection>) -> Result<()> {
        self.get_ok(&connection, &self.health_url).await
    }
}

/// Factory for [`HttpBackend`].
#[derive(Debug, Default)]
pub struct HttpBackendFactory {
    health_path: Option<String>,
}

impl HttpBackendFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the probe path (default `health`).
    pub fn with_health_path(mut self, path: impl Into<String>) -> Self {
        self.health_path = Some(path.into());
        self
    }
}

#[async_trait]
impl BackendFactory for HttpBackendFactory {
    async fn create(
        &self,
        descriptor: &BackendDescriptor,
        connection: Arc<BackendConnection>,
    ) -> Result<Arc<dyn Backend>> {
        let raw = descriptor.endpoint.as_deref().ok_or_else(|| {
            OrchestratorError::ConfigurationUnavailable(format!(
                "backend '{}' has no endpoint",
                descriptor.name
            ))
        })?;
        let mut endpoint = Url::parse(raw).map_err(|e| {
            OrchestratorError::ConfigurationUnavailable(format!(
                "backend '{}' endpoint '{raw}': {e}",
                descriptor.name
            ))
        })?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        let health_url = endpoint
            .join(self.health_path.as_deref().unwrap_or("health"))
            .map_err(|e| OrchestratorError::ConfigurationUnavailable(e.to_string()))?;

        let backend = HttpBackend {
            name: descriptor.name.clone(),
            endpoint,
            health_url,
        };
        backend.get_ok(&connection, &backend.endpoint).await?;

        tracing::debug!(backend = %backend.name, endpoint = %backend.endpoint, "HTTP backend ready");
        Ok(Arc::new(backend))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use std::time::Duration;

    #[tokio::test]
    async fn missing_endpoint_is_configuration_error() {
        let conn = Arc::new(BackendConnection::new("b", &PoolConfig::default()).unwrap());
        let descriptor = BackendDescriptor::new("b", HTTP_CATEGORY, Duration::from_secs(1));
        let err = HttpBackendFactory::new().create(&descriptor, conn).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ConfigurationUnavailable(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails() {
        let conn = Arc::new(BackendConnection::new("b", &PoolConfig::default()).unwrap());
        // Port 9 (discard) on loopback is almost never listening.
        let descriptor = BackendDescriptor::new("b", HTTP_CATEGORY, Duration::from_secs(1))
            .with_endpoint("http://127.0.0.1:9");
        let result = HttpBackendFactory::new().create(&descriptor, conn).await;
        assert!(result.is_err());
    }
}
