//! Periodic health probing and heartbeat publishing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use saai_core::{
    BusMessage, ComponentHealth, HealthLevel, MessageBus, MetricsSink, SaaiError, SaaiResult,
    Service,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Topic the monitor publishes heartbeats on.
pub const HEARTBEAT_TOPIC: &str = "system.heartbeat";

const COMPONENT: &str = "health_monitor";

#[derive(Debug, Default, Clone)]
struct ProbeRecord {
    heartbeats: u64,
    last_probe: Option<DateTime<Utc>>,
    bus: Option<HealthLevel>,
    metrics: Option<HealthLevel>,
}

struct ProbeTask {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Probes the bus and metrics sink on an interval and publishes a heartbeat.
pub struct HealthMonitor {
    bus: Arc<dyn MessageBus>,
    metrics: Arc<dyn MetricsSink>,
    interval: Duration,
    record: Arc<Mutex<ProbeRecord>>,
    probe: Mutex<Option<ProbeTask>>,
}

impl HealthMonitor {
    /// Create a monitor probing `bus` and `metrics` every `interval`.
    pub fn new(bus: Arc<dyn MessageBus>, metrics: Arc<dyn MetricsSink>, interval: Duration) -> Self {
        Self {
            bus,
            metrics,
            interval,
            record: Arc::new(Mutex::new(ProbeRecord::default())),
            probe: Mutex::new(None),
        }
    }

    /// Number of heartbeats published so far.
    pub fn heartbeats(&self) -> u64 {
        self.record.lock().heartbeats
    }
}

async fn probe_level<S: Service + ?Sized>(service: &S) -> HealthLevel {
    match service.health().await {
        Ok(health) => health.level,
        Err(e) => {
            warn!(component = service.name(), error = %e, "Health probe failed");
            HealthLevel::Unknown
        }
    }
}

async fn probe_once(
    bus: &Arc<dyn MessageBus>,
    metrics: &Arc<dyn MetricsSink>,
    record: &Mutex<ProbeRecord>,
) {
    let bus_level = probe_level(bus.as_ref()).await;
    let metrics_level = probe_level(metrics.as_ref()).await;

    let sequence = {
        let mut rec = record.lock();
        rec.heartbeats += 1;
        rec.last_probe = Some(Utc::now());
        rec.bus = Some(bus_level);
        rec.metrics = Some(metrics_level);
        rec.heartbeats
    };

    let heartbeat = BusMessage::new(
        HEARTBEAT_TOPIC,
        COMPONENT,
        serde_json::json!({
            "sequence": sequence,
            "message_bus": bus_level,
            "metrics": metrics_level,
        }),
    );
    match bus.publish(heartbeat).await {
        Ok(receivers) => debug!(sequence, receivers, "Heartbeat published"),
        Err(e) => warn!(error = %e, "Failed to publish heartbeat"),
    }
}

#[async_trait]
impl Service for HealthMonitor {
    fn name(&self) -> &str {
        COMPONENT
    }

    async fn start(&self) -> SaaiResult<()> {
        if self.interval.is_zero() {
            return Err(SaaiError::initialization(COMPONENT, "interval must be non-zero"));
        }
        if self.probe.lock().is_some() {
            return Ok(());
        }

        let (stop, mut stopped) = oneshot::channel::<()>();
        let bus = self.bus.clone();
        let metrics = self.metrics.clone();
        let record = self.record.clone();
        let period = self.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => probe_once(&bus, &metrics, &record).await,
                }
            }
        });

        *self.probe.lock() = Some(ProbeTask { stop, task });
        info!(interval_ms = period.as_millis() as u64, "Health monitor started");
        Ok(())
    }

    async fn shutdown(&self) -> SaaiResult<()> {
        let probe = self.probe.lock().take();
        let Some(probe) = probe else {
            return Ok(());
        };
        let _ = probe.stop.send(());
        probe
            .task
            .await
            .map_err(|e| SaaiError::shutdown(COMPONENT, e))?;
        info!("Health monitor stopped");
        Ok(())
    }

    async fn health(&self) -> SaaiResult<ComponentHealth> {
        let running = self.probe.lock().is_some();
        let rec = self.record.lock().clone();
        let details = serde_json::json!({
            "running": running,
            "heartbeats": rec.heartbeats,
            "last_probe": rec.last_probe,
            "message_bus": rec.bus,
            "metrics": rec.metrics,
        });

        let level = if !running {
            HealthLevel::Unhealthy
        } else if [rec.bus, rec.metrics]
            .into_iter()
            .flatten()
            .all(HealthLevel::is_healthy)
        {
            HealthLevel::Healthy
        } else {
            HealthLevel::Degraded
        };
        Ok(ComponentHealth { level, details })
    }
}
