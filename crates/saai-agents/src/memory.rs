use crate::{command_name, drain, unknown_command, OBSERVATION_TOPIC};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use saai_core::{
    BusMessage, ComponentHealth, HealthLevel, SaaiError, SaaiResult, Worker, WorkerContext,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Settings read from the worker's `settings` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Entries kept in short-term memory before the oldest is promoted.
    pub short_term_capacity: usize,
    /// Entries kept in long-term memory before the oldest is evicted.
    pub long_term_capacity: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            short_term_capacity: 64,
            long_term_capacity: 1024,
        }
    }
}

/// One remembered item.
#[derive(Debug, Clone, Serialize)]
struct MemoryEntry {
    key: String,
    value: serde_json::Value,
    source: String,
    stored_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    short_term: VecDeque<MemoryEntry>,
    long_term: HashMap<String, MemoryEntry>,
    /// Long-term insertion order, oldest first.
    long_term_order: VecDeque<String>,
    observations: u64,
    promoted: u64,
    evicted: u64,
}

impl MemoryState {
    fn remember(&mut self, entry: MemoryEntry, settings: &MemorySettings) {
        self.short_term.push_back(entry);
        while self.short_term.len() > settings.short_term_capacity {
            if let Some(oldest) = self.short_term.pop_front() {
                self.promote(oldest, settings);
            }
        }
    }

    fn promote(&mut self, entry: MemoryEntry, settings: &MemorySettings) {
        if self.long_term.contains_key(&entry.key) {
            self.long_term_order.retain(|k| k != &entry.key);
        }
        self.long_term_order.push_back(entry.key.clone());
        self.long_term.insert(entry.key.clone(), entry);
        self.promoted += 1;

        while self.long_term.len() > settings.long_term_capacity {
            match self.long_term_order.pop_front() {
                Some(key) => {
                    self.long_term.remove(&key);
                    self.evicted += 1;
                }
                None => break,
            }
        }
    }

    fn recall(&self, key: &str) -> Option<&MemoryEntry> {
        self.short_term
            .iter()
            .rev()
            .find(|e| e.key == key)
            .or_else(|| self.long_term.get(key))
    }
}

/// Consolidates perception observations into short- and long-term memory.
///
/// Short-term memory is a bounded FIFO; entries pushed out of it are promoted
/// to a bounded long-term store keyed by entry key, evicting oldest first.
pub struct MemoryWorker {
    name: String,
    settings: MemorySettings,
    ctx: WorkerContext,
    state: Mutex<MemoryState>,
    subscription: Mutex<Option<broadcast::Receiver<BusMessage>>>,
}

impl MemoryWorker {
    /// Create a memory worker; it subscribes to observations on `initialize`.
    pub fn new(name: impl Into<String>, settings: MemorySettings, ctx: WorkerContext) -> Self {
        Self {
            name: name.into(),
            settings,
            ctx,
            state: Mutex::new(MemoryState::default()),
            subscription: Mutex::new(None),
        }
    }

    fn store(&self, command: &serde_json::Value) -> SaaiResult<serde_json::Value> {
        let key = required_str(command, "key")?;
        let value = command.get("value").cloned().unwrap_or(serde_json::Value::Null);
        let mut state = self.state.lock();
        state.remember(
            MemoryEntry {
                key: key.to_string(),
                value,
                source: "command".to_string(),
                stored_at: Utc::now(),
            },
            &self.settings,
        );
        Ok(serde_json::json!({ "stored": key }))
    }

    fn recall(&self, command: &serde_json::Value) -> SaaiResult<serde_json::Value> {
        let key = required_str(command, "key")?;
        let state = self.state.lock();
        Ok(match state.recall(key) {
            Some(entry) => serde_json::json!({ "found": true, "entry": entry }),
            None => serde_json::json!({ "found": false }),
        })
    }

    fn recent(&self, command: &serde_json::Value) -> serde_json::Value {
        let limit = command
            .get("limit")
            .and_then(serde_json::Value::as_u64)
            .map_or(10, |l| l as usize);
        let state = self.state.lock();
        let entries: Vec<&MemoryEntry> = state.short_term.iter().rev().take(limit).collect();
        serde_json::json!({ "entries": entries })
    }

    fn clear(&self) -> serde_json::Value {
        let mut state = self.state.lock();
        let cleared = state.short_term.len() + state.long_term.len();
        state.short_term.clear();
        state.long_term.clear();
        state.long_term_order.clear();
        serde_json::json!({ "cleared": cleared })
    }

    fn stats(&self) -> serde_json::Value {
        let state = self.state.lock();
        serde_json::json!({
            "short_term": state.short_term.len(),
            "long_term": state.long_term.len(),
            "observations": state.observations,
            "promoted": state.promoted,
            "evicted": state.evicted,
            "subscribed": self.subscription.lock().is_some(),
        })
    }
}

fn required_str<'a>(command: &'a serde_json::Value, field: &str) -> SaaiResult<&'a str> {
    command
        .get(field)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| SaaiError::Worker(format!("'{field}' must be a string")))
}

#[async_trait]
impl Worker for MemoryWorker {
    async fn initialize(&self) -> SaaiResult<()> {
        if self.settings.short_term_capacity == 0 {
            return Err(SaaiError::initialization(
                &self.name,
                "short_term_capacity must be non-zero",
            ));
        }
        let rx = self
            .ctx
            .bus
            .subscribe(OBSERVATION_TOPIC)
            .map_err(|e| SaaiError::initialization(&self.name, e))?;
        *self.subscription.lock() = Some(rx);
        info!(worker = %self.name, topic = OBSERVATION_TOPIC, "Memory worker subscribed");
        Ok(())
    }

    async fn run_cycle(&self) -> SaaiResult<()> {
        let (messages, closed) = {
            let mut subscription = self.subscription.lock();
            match subscription.as_mut() {
                Some(rx) => drain(&self.name, rx),
                None => return Ok(()),
            }
        };

        if !messages.is_empty() {
            let mut state = self.state.lock();
            for message in &messages {
                let key = match message.payload.get("sequence") {
                    Some(seq) => format!("observation:{seq}"),
                    None => format!("observation:{}", message.timestamp.timestamp_millis()),
                };
                state.observations += 1;
                state.remember(
                    MemoryEntry {
                        key,
                        value: message.payload.clone(),
                        source: message.source.clone(),
                        stored_at: message.timestamp,
                    },
                    &self.settings,
                );
            }
            debug!(worker = %self.name, count = messages.len(), "Observations consolidated");
        }

        if closed {
            *self.subscription.lock() = None;
            return Err(SaaiError::Cycle(format!(
                "{}: observation subscription closed",
                self.name
            )));
        }
        Ok(())
    }

    async fn handle_command(&self, command: serde_json::Value) -> SaaiResult<serde_json::Value> {
        match command_name(&command)? {
            "store" => self.store(&command),
            "recall" => self.recall(&command),
            "recent" => Ok(self.recent(&command)),
            "stats" => Ok(self.stats()),
            "clear" => Ok(self.clear()),
            other => Err(unknown_command(&self.name, other)),
        }
    }

    async fn shutdown(&self) -> SaaiResult<()> {
        self.subscription.lock().take();
        info!(worker = %self.name, "Memory worker stopped");
        Ok(())
    }

    async fn health(&self) -> SaaiResult<ComponentHealth> {
        let stats = self.stats();
        Ok(if stats["subscribed"] == true {
            ComponentHealth::healthy(stats)
        } else {
            ComponentHealth {
                level: HealthLevel::Degraded,
                details: stats,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saai_core::{BusConfig, MessageBus, MetricsConfig, Service};
    use saai_services::{InMemoryBus, MetricsCollector};
    use std::sync::Arc;

    async fn context() -> (Arc<InMemoryBus>, WorkerContext) {
        let bus = Arc::new(InMemoryBus::new(&BusConfig::default()));
        bus.start().await.unwrap();
        let metrics = Arc::new(MetricsCollector::new(&MetricsConfig::default()).unwrap());
        (bus.clone(), WorkerContext { bus, metrics })
    }

    #[tokio::test]
    async fn test_consolidates_observations() {
        let (bus, ctx) = context().await;
        let worker = MemoryWorker::new("memory", MemorySettings::default(), ctx);
        worker.initialize().await.unwrap();
        assert_eq!(bus.subscriber_count(OBSERVATION_TOPIC), 1);

        for seq in 1..=3 {
            bus.publish(BusMessage::new(
                OBSERVATION_TOPIC,
                "perception",
                serde_json::json!({"sequence": seq, "signal": "temp"}),
            ))
            .await
            .unwrap();
        }
        worker.run_cycle().await.unwrap();

        let stats = worker.stats();
        assert_eq!(stats["observations"], 3);
        assert_eq!(stats["short_term"], 3);

        let recalled = worker
            .handle_command(serde_json::json!({"command": "recall", "key": "observation:2"}))
            .await
            .unwrap();
        assert_eq!(recalled["found"], true);
        assert_eq!(recalled["entry"]["source"], "perception");
    }

    #[tokio::test]
    async fn test_overflow_promotes_and_evicts() {
        let (_bus, ctx) = context().await;
        let settings = MemorySettings {
            short_term_capacity: 2,
            long_term_capacity: 2,
        };
        let worker = MemoryWorker::new("memory", settings, ctx);
        for i in 0..6 {
            worker
                .handle_command(serde_json::json!({"command": "store", "key": format!("k{i}"), "value": i}))
                .await
                .unwrap();
        }
        let stats = worker.stats();
        assert_eq!(stats["short_term"], 2);
        assert_eq!(stats["long_term"], 2);
        assert_eq!(stats["promoted"], 4);
        assert_eq!(stats["evicted"], 2);

        // k0 and k1 were evicted, k2 survives in long-term memory.
        let gone = worker
            .handle_command(serde_json::json!({"command": "recall", "key": "k0"}))
            .await
            .unwrap();
        assert_eq!(gone["found"], false);
        let kept = worker
            .handle_command(serde_json::json!({"command": "recall", "key": "k2"}))
            .await
            .unwrap();
        assert_eq!(kept["entry"]["value"], 2);
    }

    #[tokio::test]
    async fn test_recent_newest_first_and_clear() {
        let (_bus, ctx) = context().await;
        let worker = MemoryWorker::new("memory", MemorySettings::default(), ctx);
        for i in 0..3 {
            worker
                .handle_command(serde_json::json!({"command": "store", "key": format!("k{i}"), "value": i}))
                .await
                .unwrap();
        }
        let recent = worker
            .handle_command(serde_json::json!({"command": "recent", "limit": 2}))
            .await
            .unwrap();
        let entries = recent["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["key"], "k2");

        let cleared = worker
            .handle_command(serde_json::json!({"command": "clear"}))
            .await
            .unwrap();
        assert_eq!(cleared["cleared"], 3);
        assert_eq!(worker.stats()["short_term"], 0);
    }

    #[tokio::test]
    async fn test_closed_subscription_fails_cycle_and_degrades() {
        let (bus, ctx) = context().await;
        let worker = MemoryWorker::new("memory", MemorySettings::default(), ctx);
        worker.initialize().await.unwrap();
        bus.shutdown().await.unwrap();

        assert!(matches!(worker.run_cycle().await, Err(SaaiError::Cycle(_))));
        let health = worker.health().await.unwrap();
        assert_eq!(health.level, HealthLevel::Degraded);
        // Without a subscription later cycles are idle.
        worker.run_cycle().await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_fails_when_bus_down() {
        let bus = Arc::new(InMemoryBus::new(&BusConfig::default()));
        let metrics = Arc::new(MetricsCollector::new(&MetricsConfig::default()).unwrap());
        let worker = MemoryWorker::new(
            "memory",
            MemorySettings::default(),
            WorkerContext { bus, metrics },
        );
        assert!(matches!(
            worker.initialize().await,
            Err(SaaiError::Initialization { .. })
        ));
    }
}
