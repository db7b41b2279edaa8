use crate::{command_name, unknown_command, ACTION_COMPLETED_TOPIC};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use saai_core::{
    BusMessage, ComponentHealth, SaaiError, SaaiResult, Worker, WorkerContext,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Settings read from the worker's `settings` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionSettings {
    /// Upper bound on actions executed per cycle.
    pub max_actions_per_cycle: usize,
    /// Maximum queued actions; further `enqueue` calls are rejected.
    pub queue_capacity: usize,
    /// Action names refused at enqueue time.
    pub blocked_actions: Vec<String>,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            max_actions_per_cycle: 4,
            queue_capacity: 128,
            blocked_actions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct QueuedAction {
    id: u64,
    name: String,
    params: serde_json::Value,
    requested_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ActionState {
    queue: VecDeque<QueuedAction>,
    next_id: u64,
    executed: u64,
    rejected: u64,
    failed: u64,
}

/// Executes queued actions and announces each on `action.completed`.
pub struct ActionWorker {
    name: String,
    settings: ActionSettings,
    ctx: WorkerContext,
    state: Mutex<ActionState>,
}

impl ActionWorker {
    /// Create an action worker with an empty queue.
    pub fn new(name: impl Into<String>, settings: ActionSettings, ctx: WorkerContext) -> Self {
        Self {
            name: name.into(),
            settings,
            ctx,
            state: Mutex::new(ActionState::default()),
        }
    }

    fn is_blocked(&self, action: &str) -> bool {
        self.settings
            .blocked_actions
            .iter()
            .any(|b| b.eq_ignore_ascii_case(action))
    }

    fn enqueue(&self, command: &serde_json::Value) -> SaaiResult<serde_json::Value> {
        let action = command
            .get("name")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| SaaiError::Worker("enqueue requires a 'name' string".into()))?;
        let params = command
            .get("params")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));

        let mut state = self.state.lock();
        if self.is_blocked(action) {
            state.rejected += 1;
            warn!(worker = %self.name, action, "Blocked action rejected");
            return Err(SaaiError::Worker(format!("action '{action}' is blocked")));
        }
        if state.queue.len() >= self.settings.queue_capacity {
            state.rejected += 1;
            return Err(SaaiError::Worker(format!(
                "action queue full ({} queued)",
                state.queue.len()
            )));
        }

        state.next_id += 1;
        let id = state.next_id;
        state.queue.push_back(QueuedAction {
            id,
            name: action.to_string(),
            params,
            requested_at: Utc::now(),
        });
        Ok(serde_json::json!({ "id": id, "position": state.queue.len() }))
    }

    fn pending(&self) -> serde_json::Value {
        let state = self.state.lock();
        let actions: Vec<&QueuedAction> = state.queue.iter().collect();
        serde_json::json!({ "pending": actions, "count": actions.len() })
    }

    fn stats(&self) -> serde_json::Value {
        let state = self.state.lock();
        serde_json::json!({
            "queued": state.queue.len(),
            "executed": state.executed,
            "rejected": state.rejected,
            "failed": state.failed,
        })
    }
}

#[async_trait]
impl Worker for ActionWorker {
    async fn initialize(&self) -> SaaiResult<()> {
        if self.settings.max_actions_per_cycle == 0 || self.settings.queue_capacity == 0 {
            return Err(SaaiError::initialization(
                &self.name,
                "max_actions_per_cycle and queue_capacity must be non-zero",
            ));
        }
        info!(
            worker = %self.name,
            blocked = self.settings.blocked_actions.len(),
            "Action worker ready"
        );
        Ok(())
    }

    async fn run_cycle(&self) -> SaaiResult<()> {
        for _ in 0..self.settings.max_actions_per_cycle {
            let next = self.state.lock().queue.pop_front();
            let Some(action) = next else {
                break;
            };

            let message = BusMessage::new(
                ACTION_COMPLETED_TOPIC,
                self.name.clone(),
                serde_json::json!({
                    "id": action.id,
                    "action": action.name,
                    "params": action.params,
                    "requested_at": action.requested_at,
                    "completed_at": Utc::now(),
                }),
            );
            if let Err(e) = self.ctx.bus.publish(message).await {
                let mut state = self.state.lock();
                state.failed += 1;
                state.queue.push_front(action);
                return Err(SaaiError::Cycle(format!(
                    "{}: failed to announce completion: {e}",
                    self.name
                )));
            }
            self.state.lock().executed += 1;
            debug!(worker = %self.name, id = action.id, action = %action.name, "Action executed");
        }
        Ok(())
    }

    async fn handle_command(&self, command: serde_json::Value) -> SaaiResult<serde_json::Value> {
        match command_name(&command)? {
            "enqueue" => self.enqueue(&command),
            "pending" => Ok(self.pending()),
            "stats" => Ok(self.stats()),
            other => Err(unknown_command(&self.name, other)),
        }
    }

    async fn shutdown(&self) -> SaaiResult<()> {
        let abandoned = {
            let mut state = self.state.lock();
            let n = state.queue.len();
            state.queue.clear();
            n
        };
        if abandoned > 0 {
            warn!(worker = %self.name, abandoned, "Pending actions abandoned at shutdown");
        }
        info!(worker = %self.name, "Action worker stopped");
        Ok(())
    }

    async fn health(&self) -> SaaiResult<ComponentHealth> {
        Ok(ComponentHealth::healthy(self.stats()))
    }
}
