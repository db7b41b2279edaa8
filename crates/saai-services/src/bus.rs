//! In-process message bus.
//!
//! One `tokio::sync::broadcast` channel per topic, created lazily on the first
//! subscription. Suitable for single-process operation; a networked transport
//! would implement [`MessageBus`] separately.

use async_trait::async_trait;
use parking_lot::RwLock;
use saai_core::{
    BusConfig, BusMessage, ComponentHealth, MessageBus, SaaiError, SaaiResult, Service,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Endpoint scheme accepted by [`InMemoryBus`].
pub const MEMORY_SCHEME: &str = "memory://";

const COMPONENT: &str = "message_bus";

/// Topic-keyed broadcast bus living inside the process.
pub struct InMemoryBus {
    endpoint: String,
    capacity: usize,
    topics: RwLock<HashMap<String, broadcast::Sender<BusMessage>>>,
    connected: AtomicBool,
    published: AtomicU64,
}

impl InMemoryBus {
    /// Create a disconnected bus; `start` validates the endpoint.
    pub fn new(config: &BusConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            capacity: config.capacity,
            topics: RwLock::new(HashMap::new()),
            connected: AtomicBool::new(false),
            published: AtomicU64::new(0),
        }
    }

    /// Total messages accepted by [`MessageBus::publish`].
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Whether [`Service::start`] succeeded and shutdown has not run yet.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Number of live receivers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn ensure_connected(&self) -> SaaiResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(SaaiError::Bus(format!("not connected to {}", self.endpoint)))
        }
    }
}

#[async_trait]
impl Service for InMemoryBus {
    fn name(&self) -> &str {
        COMPONENT
    }

    async fn start(&self) -> SaaiResult<()> {
        if !self.endpoint.starts_with(MEMORY_SCHEME) {
            return Err(SaaiError::initialization(
                COMPONENT,
                format!(
                    "unsupported endpoint '{}' (expected {MEMORY_SCHEME}...)",
                    self.endpoint
                ),
            ));
        }
        self.connected.store(true, Ordering::Release);
        info!(endpoint = %self.endpoint, "Message bus connected");
        Ok(())
    }

    async fn shutdown(&self) -> SaaiResult<()> {
        self.connected.store(false, Ordering::Release);
        // Dropping the senders closes every receiver.
        let dropped = {
            let mut topics = self.topics.write();
            let n = topics.len();
            topics.clear();
            n
        };
        info!(endpoint = %self.endpoint, topics = dropped, "Message bus disconnected");
        Ok(())
    }

    async fn health(&self) -> SaaiResult<ComponentHealth> {
        let (topics, subscribers) = {
            let topics = self.topics.read();
            let subscribers: usize = topics.values().map(broadcast::Sender::receiver_count).sum();
            (topics.len(), subscribers)
        };
        let details = serde_json::json!({
            "endpoint": self.endpoint,
            "connected": self.is_connected(),
            "topics": topics,
            "subscribers": subscribers,
            "published": self.published_count(),
        });
        Ok(if self.is_connected() {
            ComponentHealth::healthy(details)
        } else {
            ComponentHealth::unhealthy(details)
        })
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, message: BusMessage) -> SaaiResult<usize> {
        self.ensure_connected()?;
        self.published.fetch_add(1, Ordering::Relaxed);

        let sender = self.topics.read().get(&message.topic).cloned();
        let Some(sender) = sender else {
            debug!(topic = %message.topic, "Message dropped (no subscribers)");
            return Ok(0);
        };

        let topic = message.topic.clone();
        match sender.send(message) {
            Ok(receivers) => {
                debug!(topic = %topic, receivers, "Message published");
                Ok(receivers)
            }
            Err(_) => {
                debug!(topic = %topic, "Message dropped (all receivers gone)");
                Ok(0)
            }
        }
    }

    fn subscribe(&self, topic: &str) -> SaaiResult<broadcast::Receiver<BusMessage>> {
        self.ensure_connected()?;
        let mut topics = self.topics.write();
        let sender = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        debug!(topic, "New subscription created");
        Ok(sender.subscribe())
    }
}
