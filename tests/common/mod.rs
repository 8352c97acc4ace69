//! Shared utilities for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use backend_orchestrator::backend::{AdapterCapabilities, Backend, BackendDescriptor, BackendFactory};
use backend_orchestrator::error::{OrchestratorError, Result};
use backend_orchestrator::pool::BackendConnection;

/// Backend produced by [`MockFactory`].
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    healthy: Arc<AtomicBool>,
    probe_delay: Duration,
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    /// Reads the health switch before sleeping for the probe delay.
    async fn probe(&self, _connection: Arc<BackendConnection>) -> Result<()> {
        let healthy = self.healthy.load(Ordering::SeqCst);
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
        }
        if healthy {
            Ok(())
        } else {
            Err(OrchestratorError::backend(&self.name, "probe refused"))
        }
    }
}

/// Factory with a call counter, optional delays, and failure and health switches.
#[derive(Debug, Clone)]
pub struct MockFactory {
    pub creates: Arc<AtomicUsize>,
    pub delay: Duration,
    pub probe_delay: Duration,
    pub fail: Arc<AtomicBool>,
    pub healthy: Arc<AtomicBool>,
    pub capabilities: AdapterCapabilities,
}

impl MockFactory {
    pub fn new() -> Self {
        Self {
            creates: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
            probe_delay: Duration::ZERO,
            fail: Arc::new(AtomicBool::new(false)),
            healthy: Arc::new(AtomicBool::new(true)),
            capabilities: AdapterCapabilities::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    pub fn with_capabilities(mut self, capabilities: AdapterCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }
}

#[async_trait]
impl BackendFactory for MockFactory {
    fn capabilities(&self) -> AdapterCapabilities {
        self.capabilities
    }

    async fn create(
        &self,
        descriptor: &BackendDescriptor,
        _connection: Arc<BackendConnection>,
    ) -> Result<Arc<dyn Backend>> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(OrchestratorError::backend(&descriptor.name, "spawn failed"));
        }
        Ok(Arc::new(MockBackend {
            name: descriptor.name.clone(),
            healthy: self.healthy.clone(),
            probe_delay: self.probe_delay,
        }))
    }
}

/// Descriptor for a mock backend with the given load timeout.
pub fn mock_descriptor(name: &str, priority: i32, timeout: Duration) -> BackendDescriptor {
    BackendDescriptor::new(name, "mock", timeout).with_priority(priority)
}

/// Start a programmable HTTP backend on an ephemeral port.
///
/// `f` receives the request path and returns the status code and body.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 4096];
                        let n = socket.read(&mut buf).await.unwrap_or(0);
                        let request = String::from_utf8_lossy(&buf[..n]);
                        let path = request
                            .lines()
                            .next()
                            .and_then(|line| line.split_whitespace().nth(1))
                            .unwrap_or("/")
                            .to_string();

                        let (status, body) = f(path).await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };

                        let response_str = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response_str.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// HTTP backend whose `/health` answers 200 while `healthy` is set and 503 otherwise.
pub async fn start_switchable_backend(healthy: Arc<AtomicBool>) -> SocketAddr {
    start_programmable_backend(move |path| {
        let healthy = healthy.clone();
        async move {
            if path.ends_with("/health") && !healthy.load(Ordering::SeqCst) {
                (503, "down".into())
            } else {
                (200, "ok".into())
            }
        }
    })
    .await
}
