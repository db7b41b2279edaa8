use crate::{command_name, drain, unknown_command, ACTION_COMPLETED_TOPIC};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use saai_core::{
    BusMessage, ComponentHealth, HealthLevel, SaaiError, SaaiResult, Worker, WorkerContext,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Settings read from the worker's `settings` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EthicsSettings {
    /// Actions that are never approved.
    pub blocked_actions: Vec<String>,
    /// Highest acceptable risk score, in `[0, 1]`.
    pub max_risk: f64,
    /// How long an unacknowledged audit violation keeps the worker degraded.
    pub violation_window_secs: u64,
}

impl Default for EthicsSettings {
    fn default() -> Self {
        Self {
            blocked_actions: vec![
                "harm_human".to_string(),
                "deceive_user".to_string(),
                "disable_oversight".to_string(),
                "self_replicate".to_string(),
            ],
            max_risk: 0.7,
            violation_window_secs: 300,
        }
    }
}

/// Outcome of evaluating one action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    /// Whether the action may proceed.
    pub approved: bool,
    /// Human-readable explanation.
    pub reason: String,
}

#[derive(Debug, Default)]
struct EthicsState {
    evaluations: u64,
    denials: u64,
    audited: u64,
    violations: u64,
    unacknowledged: u64,
    last_violation: Option<String>,
    last_violation_at: Option<DateTime<Utc>>,
}

/// Evaluates actions against a deny list and a risk threshold, and audits
/// completed actions seen on the bus.
pub struct EthicsWorker {
    name: String,
    settings: EthicsSettings,
    ctx: WorkerContext,
    state: Mutex<EthicsState>,
    subscription: Mutex<Option<broadcast::Receiver<BusMessage>>>,
}

impl EthicsWorker {
    /// Create an ethics worker; it subscribes to completed actions on `initialize`.
    pub fn new(name: impl Into<String>, settings: EthicsSettings, ctx: WorkerContext) -> Self {
        Self {
            name: name.into(),
            settings,
            ctx,
            state: Mutex::new(EthicsState::default()),
            subscription: Mutex::new(None),
        }
    }

    /// Judge `action` at the given `risk`. A missing risk counts as zero.
    pub fn judge(&self, action: &str, risk: Option<f64>) -> Verdict {
        if self
            .settings
            .blocked_actions
            .iter()
            .any(|b| b.eq_ignore_ascii_case(action))
        {
            return Verdict {
                approved: false,
                reason: format!("action '{action}' is on the deny list"),
            };
        }
        let risk = risk.unwrap_or(0.0);
        if risk > self.settings.max_risk {
            return Verdict {
                approved: false,
                reason: format!(
                    "risk {risk:.2} exceeds threshold {:.2}",
                    self.settings.max_risk
                ),
            };
        }
        Verdict {
            approved: true,
            reason: "within policy".to_string(),
        }
    }

    fn evaluate(&self, command: &serde_json::Value) -> SaaiResult<serde_json::Value> {
        let action = command
            .get("action")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| SaaiError::Worker("evaluate requires an 'action' string".into()))?;
        let risk = command.get("risk").and_then(serde_json::Value::as_f64);
        let verdict = self.judge(action, risk);

        let mut state = self.state.lock();
        state.evaluations += 1;
        if !verdict.approved {
            state.denials += 1;
        }
        Ok(serde_json::to_value(verdict)?)
    }

    /// Clear the unacknowledged violation count. Totals are kept.
    fn acknowledge(&self) -> serde_json::Value {
        let mut state = self.state.lock();
        let acknowledged = std::mem::take(&mut state.unacknowledged);
        state.last_violation_at = None;
        info!(worker = %self.name, acknowledged, "Violations acknowledged");
        serde_json::json!({ "acknowledged": acknowledged })
    }

    /// An unacknowledged violation younger than the configured window.
    fn has_recent_violation(&self, state: &EthicsState) -> bool {
        let Some(at) = state.last_violation_at else {
            return false;
        };
        let window = Duration::from_secs(self.settings.violation_window_secs);
        match (Utc::now() - at).to_std() {
            Ok(age) => age < window,
            // clock moved backwards
            Err(_) => true,
        }
    }

    fn stats(&self) -> serde_json::Value {
        let state = self.state.lock();
        serde_json::json!({
            "evaluations": state.evaluations,
            "denials": state.denials,
            "audited": state.audited,
            "violations": state.violations,
            "unacknowledged": state.unacknowledged,
            "recent_violation": self.has_recent_violation(&state),
            "last_violation": state.last_violation,
            "last_violation_at": state.last_violation_at,
            "subscribed": self.subscription.lock().is_some(),
        })
    }
}

#[async_trait]
impl Worker for EthicsWorker {
    async fn initialize(&self) -> SaaiResult<()> {
        if !(0.0..=1.0).contains(&self.settings.max_risk) {
            return Err(SaaiError::initialization(
                &self.name,
                format!("max_risk {} outside [0, 1]", self.settings.max_risk),
            ));
        }
        let rx = self
            .ctx
            .bus
            .subscribe(ACTION_COMPLETED_TOPIC)
            .map_err(|e| SaaiError::initialization(&self.name, e))?;
        *self.subscription.lock() = Some(rx);
        info!(
            worker = %self.name,
            blocked = self.settings.blocked_actions.len(),
            max_risk = self.settings.max_risk,
            "Ethics worker auditing"
        );
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

        for message in &messages {
            let action = message
                .payload
                .get("action")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            let risk = message
                .payload
                .get("params")
                .and_then(|p| p.get("risk"))
                .and_then(serde_json::Value::as_f64);
            let verdict = self.judge(action, risk);

            let mut state = self.state.lock();
            state.audited += 1;
            if !verdict.approved {
                state.violations += 1;
                state.unacknowledged += 1;
                state.last_violation_at = Some(Utc::now());
                state.last_violation = Some(format!("{action}: {}", verdict.reason));
                warn!(
                    worker = %self.name,
                    action,
                    source = %message.source,
                    reason = %verdict.reason,
                    "Policy violation in completed action"
                );
            }
        }

        if closed {
            *self.subscription.lock() = None;
            return Err(SaaiError::Cycle(format!(
                "{}: action subscription closed",
                self.name
            )));
        }
        Ok(())
    }

    async fn handle_command(&self, command: serde_json::Value) -> SaaiResult<serde_json::Value> {
        match command_name(&command)? {
            "evaluate" => self.evaluate(&command),
            "stats" => Ok(self.stats()),
            "acknowledge" => Ok(self.acknowledge()),
            other => Err(unknown_command(&self.name, other)),
        }
    }

    async fn shutdown(&self) -> SaaiResult<()> {
        self.subscription.lock().take();
        info!(worker = %self.name, "Ethics worker stopped");
        Ok(())
    }

    async fn health(&self) -> SaaiResult<ComponentHealth> {
        let stats = self.stats();
        let level = if stats["recent_violation"] == false && stats["subscribed"] == true {
            HealthLevel::Healthy
        } else {
            HealthLevel::Degraded
        };
        Ok(ComponentHealth {
            level,
            details: stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saai_core::{BusConfig, MessageBus, MetricsConfig, Service};
    use saai_services::{InMemoryBus, MetricsCollector};
    use std::sync::Arc;

    async fn worker(settings: EthicsSettings) -> (Arc<InMemoryBus>, EthicsWorker) {
        let bus = Arc::new(InMemoryBus::new(&BusConfig::default()));
        bus.start().await.unwrap();
        let metrics = Arc::new(MetricsCollector::new(&MetricsConfig::default()).unwrap());
        let ctx = WorkerContext {
            bus: bus.clone(),
            metrics,
        };
        (bus, EthicsWorker::new("ethics", settings, ctx))
    }

    #[tokio::test]
    async fn test_evaluate_verdicts() {
        let (_bus, worker) = worker(EthicsSettings::default()).await;

        let ok = worker
            .handle_command(serde_json::json!({"command": "evaluate", "action": "open_door", "risk": 0.2}))
            .await
            .unwrap();
        assert_eq!(ok["approved"], true);

        let risky = worker
            .handle_command(serde_json::json!({"command": "evaluate", "action": "open_door", "risk": 0.9}))
            .await
            .unwrap();
        assert_eq!(risky["approved"], false);
        assert!(risky["reason"].as_str().unwrap().contains("threshold"));

        let denied = worker
            .handle_command(serde_json::json!({"command": "evaluate", "action": "Harm_Human"}))
            .await
            .unwrap();
        assert_eq!(denied["approved"], false);

        let stats = worker.stats();
        assert_eq!(stats["evaluations"], 3);
        assert_eq!(stats["denials"], 2);
    }

    #[tokio::test]
    async fn test_audit_counts_violations_and_degrades() {
        let (bus, worker) = worker(EthicsSettings::default()).await;
        worker.initialize().await.unwrap();
        assert!(worker.health().await.unwrap().level.is_healthy());

        for (action, risk) in [("water_plants", 0.1), ("disable_oversight", 0.0), ("drive", 0.95)] {
            bus.publish(BusMessage::new(
                ACTION_COMPLETED_TOPIC,
                "action",
                serde_json::json!({"action": action, "params": {"risk": risk}}),
            ))
            .await
            .unwrap();
        }
        worker.run_cycle().await.unwrap();

        let stats = worker.stats();
        assert_eq!(stats["audited"], 3);
        assert_eq!(stats["violations"], 2);
        assert!(stats["last_violation"]
            .as_str()
            .unwrap()
            .starts_with("drive"));
        assert_eq!(worker.health().await.unwrap().level, HealthLevel::Degraded);
    }

    async fn publish_violation(bus: &InMemoryBus) {
        bus.publish(BusMessage::new(
            ACTION_COMPLETED_TOPIC,
            "action",
            serde_json::json!({"action": "self_replicate", "params": {}}),
        ))
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_acknowledge_restores_health() {
        let (bus, worker) = worker(EthicsSettings::default()).await;
        worker.initialize().await.unwrap();
        publish_violation(&bus).await;
        worker.run_cycle().await.unwrap();
        assert_eq!(worker.health().await.unwrap().level, HealthLevel::Degraded);

        let ack = worker
            .handle_command(serde_json::json!({"command": "acknowledge"}))
            .await
            .unwrap();
        assert_eq!(ack["acknowledged"], 1);

        let health = worker.health().await.unwrap();
        assert!(health.level.is_healthy());
        assert_eq!(health.details["violations"], 1);
        assert_eq!(health.details["unacknowledged"], 0);

        publish_violation(&bus).await;
        worker.run_cycle().await.unwrap();
        assert_eq!(worker.health().await.unwrap().level, HealthLevel::Degraded);
    }

    #[tokio::test]
    async fn test_violation_outside_window_is_healthy() {
        let (bus, worker) = worker(EthicsSettings {
            violation_window_secs: 0,
            ..Default::default()
        })
        .await;
        worker.initialize().await.unwrap();
        publish_violation(&bus).await;
        worker.run_cycle().await.unwrap();

        let health = worker.health().await.unwrap();
        assert!(health.level.is_healthy());
        assert_eq!(health.details["violations"], 1);
        assert_eq!(health.details["recent_violation"], false);
    }

    #[tokio::test]
    async fn test_invalid_threshold_fails_initialize() {
        let (_bus, worker) = worker(EthicsSettings {
            max_risk: 1.5,
            ..Default::default()
        })
        .await;
        assert!(matches!(
            worker.initialize().await,
            Err(SaaiError::Initialization { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let (_bus, worker) = worker(EthicsSettings::default()).await;
        assert!(matches!(
            worker
                .handle_command(serde_json::json!({"command": "absolve"}))
                .await,
            Err(SaaiError::Worker(_))
        ));
    }
}
