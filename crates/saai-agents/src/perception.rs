use crate::{command_name, unknown_command, OBSERVATION_TOPIC};
use async_trait::async_trait;
use parking_lot::Mutex;
use saai_core::{
    BusMessage, ComponentHealth, SaaiError, SaaiResult, Worker, WorkerContext,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Settings read from the worker's `settings` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerceptionSettings {
    /// Stimuli buffered beyond this are dropped.
    pub max_pending: usize,
    /// Observations published per cycle.
    pub batch_size: usize,
}

impl Default for PerceptionSettings {
    fn default() -> Self {
        Self {
            max_pending: 256,
            batch_size: 16,
        }
    }
}

#[derive(Debug, Clone)]
struct Stimulus {
    signal: String,
    value: serde_json::Value,
}

#[derive(Debug, Default)]
struct PerceptionState {
    pending: VecDeque<Stimulus>,
    sequence: u64,
    published: u64,
    dropped: u64,
}

/// Turns stimuli pushed through `observe` into observations on the bus.
pub struct PerceptionWorker {
    name: String,
    settings: PerceptionSettings,
    ctx: WorkerContext,
    state: Mutex<PerceptionState>,
}

impl PerceptionWorker {
    /// Create a perception worker with an empty stimulus buffer.
    pub fn new(name: impl Into<String>, settings: PerceptionSettings, ctx: WorkerContext) -> Self {
        Self {
            name: name.into(),
            settings,
            ctx,
            state: Mutex::new(PerceptionState::default()),
        }
    }

    fn observe(&self, command: &serde_json::Value) -> SaaiResult<serde_json::Value> {
        let signal = command
            .get("signal")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| SaaiError::Worker("observe requires a 'signal' string".into()))?;
        let value = command.get("value").cloned().unwrap_or(serde_json::Value::Null);

        let mut state = self.state.lock();
        if state.pending.len() >= self.settings.max_pending {
            state.dropped += 1;
            return Err(SaaiError::Worker(format!(
                "{}: stimulus buffer full ({} pending)",
                self.name,
                state.pending.len()
            )));
        }
        state.pending.push_back(Stimulus {
            signal: signal.to_string(),
            value,
        });
        Ok(serde_json::json!({ "queued": true, "pending": state.pending.len() }))
    }

    fn stats(&self) -> serde_json::Value {
        let state = self.state.lock();
        serde_json::json!({
            "pending": state.pending.len(),
            "sequence": state.sequence,
            "published": state.published,
            "dropped": state.dropped,
        })
    }
}

#[async_trait]
impl Worker for PerceptionWorker {
    async fn initialize(&self) -> SaaiResult<()> {
        if self.settings.batch_size == 0 {
            return Err(SaaiError::initialization(&self.name, "batch_size must be non-zero"));
        }
        info!(worker = %self.name, "Perception worker ready");
        Ok(())
    }

    async fn run_cycle(&self) -> SaaiResult<()> {
        let mut batch: VecDeque<(u64, Stimulus)> = {
            let mut state = self.state.lock();
            let n = state.pending.len().min(self.settings.batch_size);
            let mut batch = VecDeque::with_capacity(n);
            for _ in 0..n {
                if let Some(stimulus) = state.pending.pop_front() {
                    state.sequence += 1;
                    batch.push_back((state.sequence, stimulus));
                }
            }
            batch
        };

        while let Some((sequence, stimulus)) = batch.front().cloned() {
            let message = BusMessage::new(
                OBSERVATION_TOPIC,
                self.name.clone(),
                serde_json::json!({
                    "sequence": sequence,
                    "signal": stimulus.signal,
                    "value": stimulus.value,
                }),
            );
            if let Err(e) = self.ctx.bus.publish(message).await {
                // Unpublished stimuli go back to the front, in order.
                let mut state = self.state.lock();
                while let Some((_, s)) = batch.pop_back() {
                    state.pending.push_front(s);
                }
                state.sequence = sequence - 1;
                return Err(SaaiError::Cycle(format!("{}: publish failed: {e}", self.name)));
            }
            batch.pop_front();
            self.state.lock().published += 1;
            debug!(worker = %self.name, sequence, "Observation published");
        }
        Ok(())
    }

    async fn handle_command(&self, command: serde_json::Value) -> SaaiResult<serde_json::Value> {
        match command_name(&command)? {
            "observe" => self.observe(&command),
            "stats" => Ok(self.stats()),
            other => Err(unknown_command(&self.name, other)),
        }
    }

    async fn shutdown(&self) -> SaaiResult<()> {
        let discarded = {
            let mut state = self.state.lock();
            let n = state.pending.len();
            state.pending.clear();
            n
        };
        info!(worker = %self.name, discarded, "Perception worker stopped");
        Ok(())
    }

    async fn health(&self) -> SaaiResult<ComponentHealth> {
        Ok(ComponentHealth::healthy(self.stats()))
    }
}
