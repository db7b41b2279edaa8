#![allow(clippy::unwrap_used, clippy::expect_used)]

use saai_agents::*;
use saai_core::*;
use saai_services::{InMemoryBus, MetricsCollector};
use serde_json::json;
use std::sync::Arc;

async fn context() -> (Arc<InMemoryBus>, WorkerContext) {
    let bus = Arc::new(InMemoryBus::new(&BusConfig::default()));
    bus.start().await.unwrap();
    let metrics = Arc::new(MetricsCollector::new(&MetricsConfig::default()).unwrap());
    (bus.clone(), WorkerContext { bus, metrics })
}

// ---------------------------------------------------------------------------
// 1. Factory builds every default worker
// ---------------------------------------------------------------------------

#[tokio::test]
async fn factory_builds_default_workers() {
    let (_bus, ctx) = context().await;
    let factory = worker_factory();
    for config in default_workers() {
        let worker = factory(&config, &ctx).unwrap();
        worker.initialize().await.unwrap();
        let health = worker.health().await.unwrap();
        assert!(health.level.is_healthy(), "{} not healthy", config.name);
        worker.shutdown().await.unwrap();
    }
}

#[tokio::test]
async fn factory_rejects_unknown_kind_and_bad_settings() {
    let (_bus, ctx) = context().await;

    let unknown = WorkerConfig::new("oracle", "prophecy");
    assert!(matches!(build_worker(&unknown, &ctx), Err(SaaiError::Config(_))));

    let bad = WorkerConfig::new("action", "action")
        .with_settings(json!({"queue_capacity": "lots"}));
    let err = build_worker(&bad, &ctx).err().unwrap();
    assert!(err.to_string().contains("invalid settings for worker 'action'"));
}

// ---------------------------------------------------------------------------
// 2. Perception feeds memory through the bus
// ---------------------------------------------------------------------------

#[tokio::test]
async fn perception_observations_reach_memory() {
    let (_bus, ctx) = context().await;
    let perception = build_worker(&WorkerConfig::new("eyes", "perception"), &ctx).unwrap();
    let memory = build_worker(&WorkerConfig::new("hippocampus", "memory"), &ctx).unwrap();
    memory.initialize().await.unwrap();
    perception.initialize().await.unwrap();

    for value in [1, 2, 3] {
        perception
            .handle_command(json!({"command": "observe", "signal": "sound", "value": value}))
            .await
            .unwrap();
    }
    perception.run_cycle().await.unwrap();
    memory.run_cycle().await.unwrap();

    let recent = memory
        .handle_command(json!({"command": "recent", "limit": 5}))
        .await
        .unwrap();
    let entries = recent["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["key"], "observation:3");
    assert_eq!(entries[0]["source"], "eyes");
    assert_eq!(entries[0]["value"]["value"], 3);
}

// ---------------------------------------------------------------------------
// 3. Ethics audits what action executes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ethics_audits_completed_actions() {
    let (_bus, ctx) = context().await;
    let action = build_worker(&WorkerConfig::new("hands", "action"), &ctx).unwrap();
    let ethics = build_worker(
        &WorkerConfig::new("conscience", "ethics")
            .with_settings(json!({"blocked_actions": ["shred_documents"], "max_risk": 0.5})),
        &ctx,
    )
    .unwrap();
    action.initialize().await.unwrap();
    ethics.initialize().await.unwrap();

    action
        .handle_command(json!({"command": "enqueue", "name": "water_plants"}))
        .await
        .unwrap();
    action
        .handle_command(json!({"command": "enqueue", "name": "move_arm", "params": {"risk": 0.8}}))
        .await
        .unwrap();
    action.run_cycle().await.unwrap();
    ethics.run_cycle().await.unwrap();

    let stats = ethics.handle_command(json!({"command": "stats"})).await.unwrap();
    assert_eq!(stats["audited"], 2);
    assert_eq!(stats["violations"], 1);
    assert_eq!(ethics.health().await.unwrap().level, HealthLevel::Degraded);

    let verdict = ethics
        .handle_command(json!({"command": "evaluate", "action": "shred_documents"}))
        .await
        .unwrap();
    assert_eq!(verdict["approved"], false);
}
