#![allow(clippy::unwrap_used, clippy::expect_used)]

use saai_core::{BusConfig, HealthLevel, MessageBus, MetricsConfig, MetricsSink, Service};
use saai_services::{HealthMonitor, InMemoryBus, MetricsCollector, HEARTBEAT_TOPIC};
use std::sync::Arc;
use std::time::Duration;

fn ephemeral_metrics() -> Arc<MetricsCollector> {
    Arc::new(
        MetricsCollector::new(&MetricsConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        })
        .unwrap(),
    )
}

// ---------------------------------------------------------------------------
// 1. Metrics exporter serves the text format over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn metrics_endpoint_serves_recorded_values() {
    let metrics = ephemeral_metrics();
    metrics.start().await.unwrap();
    metrics.record_cycle("perception");
    metrics.record_cycle_error("memory", "store unavailable");

    let addr = metrics.local_addr().unwrap();
    let resp = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("saai_worker_cycles_total{worker=\"perception\"} 1"));
    assert!(body.contains("saai_worker_cycle_errors_total{worker=\"memory\"} 1"));

    metrics.shutdown().await.unwrap();
    assert!(reqwest::get(format!("http://{addr}/metrics")).await.is_err());
}

// ---------------------------------------------------------------------------
// 2. Health monitor publishes heartbeats on the bus
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_monitor_publishes_heartbeats() {
    let bus = Arc::new(InMemoryBus::new(&BusConfig::default()));
    let metrics = ephemeral_metrics();
    bus.start().await.unwrap();
    metrics.start().await.unwrap();

    let mut heartbeats = bus.subscribe(HEARTBEAT_TOPIC).unwrap();
    let monitor = HealthMonitor::new(bus.clone(), metrics.clone(), Duration::from_millis(20));
    monitor.start().await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(2), heartbeats.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.source, "health_monitor");
    assert_eq!(first.payload["message_bus"], "healthy");
    assert_eq!(first.payload["metrics"], "healthy");

    let second = tokio::time::timeout(Duration::from_secs(2), heartbeats.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(second.payload["sequence"].as_u64().unwrap() > first.payload["sequence"].as_u64().unwrap());

    let health = monitor.health().await.unwrap();
    assert_eq!(health.level, HealthLevel::Healthy);
    assert!(monitor.heartbeats() >= 2);

    monitor.shutdown().await.unwrap();
    let health = monitor.health().await.unwrap();
    assert_eq!(health.level, HealthLevel::Unhealthy);

    metrics.shutdown().await.unwrap();
    bus.shutdown().await.unwrap();
}

// ---------------------------------------------------------------------------
// 3. Monitor reports degraded when a probed service is down
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_monitor_degrades_when_metrics_down() {
    let bus = Arc::new(InMemoryBus::new(&BusConfig::default()));
    bus.start().await.unwrap();
    // Metrics exporter never started: its health is unhealthy.
    let metrics = ephemeral_metrics();

    let mut heartbeats = bus.subscribe(HEARTBEAT_TOPIC).unwrap();
    let monitor = HealthMonitor::new(bus.clone(), metrics, Duration::from_millis(20));
    monitor.start().await.unwrap();

    let beat = tokio::time::timeout(Duration::from_secs(2), heartbeats.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(beat.payload["metrics"], "unhealthy");
    assert_eq!(monitor.health().await.unwrap().level, HealthLevel::Degraded);

    monitor.shutdown().await.unwrap();
    bus.shutdown().await.unwrap();
}
