//! Admin API tests over a real listener.

use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use backend_orchestrator::admin::{self, AdminState};
use backend_orchestrator::backend::BackendRegistry;
use backend_orchestrator::cascade::ProcessOverride;
use backend_orchestrator::config::{BackendConfig, OrchestratorConfig};
use backend_orchestrator::lifecycle::{Services, Shutdown};
use serde_json::Value;

mod common;
use common::MockFactory;

fn config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.telemetry.mirror_to_tracing = false;
    config.backends.push(BackendConfig {
        name: "search".into(),
        priority: 0,
        category: "mock".into(),
        load_timeout_ms: 1000,
        capabilities: Default::default(),
        domain: None,
        endpoint: None,
    });
    config
}

async fn start(services: Arc<Services>, shutdown: &Shutdown) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AdminState::new(services, "test-key");
    tokio::spawn(admin::serve(listener, state, shutdown.subscribe()));
    format!("http://{addr}")
}

#[tokio::test]
async fn admin_routes_require_bearer_key() {
    let registry = BackendRegistry::new().with("mock", Arc::new(MockFactory::new()));
    let services = Arc::new(
        Services::build_with_registry(&config(), registry, ProcessOverride::forced("deterministic-offline"))
            .unwrap(),
    );
    services.warm_up().await;

    let shutdown = Shutdown::new();
    let base = start(services.clone(), &shutdown).await;
    let client = reqwest::Client::builder().no_proxy().build().unwrap();

    let res = client.get(format!("{base}/admin/status")).send().await.unwrap();
    assert_eq!(res.status(), 401);

    let res = client
        .get(format!("{base}/admin/status"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 401);

    let status: Value = client
        .get(format!("{base}/admin/status"))
        .bearer_auth("test-key")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "operational");
    assert_eq!(status["modes"][0], "primary");
    assert_eq!(status["process_override"], "deterministic-offline");
    assert_eq!(status["cached_backends"], 1);

    let backends: Value = client
        .get(format!("{base}/admin/backends"))
        .bearer_auth("test-key")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(backends[0]["name"], "search");
    assert_eq!(backends[0]["circuit"], "CLOSED");
    assert_eq!(backends[0]["cached"], true);

    let metrics: Value = client
        .get(format!("{base}/admin/metrics"))
        .bearer_auth("test-key")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(metrics["loaded_backends"], 1);
    assert_eq!(metrics["circuit_breakers"][0]["name"], "search");

    shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(50)).await;
}
