#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use saai_core::{OrchestratorConfig, SupervisorConfig};
use saai_gateway::GatewayServer;
use saai_orchestrator::Orchestrator;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceExt;

fn orchestrator() -> Arc<Orchestrator> {
    let mut config = OrchestratorConfig::default();
    config.metrics.port = 0;
    config.supervisor = SupervisorConfig {
        cycle_interval_ms: 10,
        backoff_ms: 50,
        cycle_timeout_ms: Some(1_000),
        stop_grace_ms: 1_000,
    };
    config.workers = saai_agents::default_workers();
    Arc::new(Orchestrator::new(config, saai_agents::worker_factory()).unwrap())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_root_banner_needs_no_orchestrator() {
    let app = GatewayServer::build(orchestrator());
    let (status, body) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "SAAI Agents");
    assert_eq!(body["status"], "operational");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_unavailable_before_initialize() {
    let app = GatewayServer::build(orchestrator());

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "System not initialized");

    let (status, _) = send(&app, get("/agents")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send(
        &app,
        post_json("/agents/memory/command", json!({"command": "stats"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_routes_after_initialize() {
    let orch = orchestrator();
    orch.initialize().await.unwrap();
    let app = GatewayServer::build(orch.clone());

    let (status, body) = send(&app, get("/agents")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 4);
    assert_eq!(
        body["agents"],
        json!(["perception", "memory", "action", "ethics"])
    );

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["components"]["message_bus"].is_object());
    assert!(body["components"]["ethics"].is_object());
    assert!(body["timestamp"].is_string());

    let (status, body) = send(
        &app,
        post_json(
            "/agents/ethics/command",
            json!({"command": "evaluate", "action": "harm_human"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["approved"], false);

    let (status, body) = send(
        &app,
        post_json("/agents/ghost/command", json!({"command": "stats"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Worker 'ghost' not found");

    let (status, body) = send(
        &app,
        post_json("/agents/perception/command", json!({"command": "bogus"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("Command for worker 'perception' failed"));

    orch.shutdown().await;
    let (status, _) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_real_server_with_graceful_shutdown() {
    let orch = orchestrator();
    orch.initialize().await.unwrap();
    let app = GatewayServer::build(orch.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(GatewayServer::serve(listener, app, async {
        let _ = stop_rx.await;
    }));

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{addr}/agents/action/command"))
        .json(&json!({"command": "pending"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"]["count"], 0);

    let resp = client
        .get(format!("http://{addr}/health"))
        .header("origin", "http://example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
    assert!(orch.shutdown().await.is_clean());
}
