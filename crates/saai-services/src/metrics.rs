//! Prometheus metrics sink with a text exposition endpoint.
//!
//! All metrics follow the naming convention `saai_<scope>_<metric>`:
//!
//! - `saai_worker_cycles_total{worker}` — successful cycles
//! - `saai_worker_cycle_errors_total{worker}` — failed cycles
//! - `saai_worker_commands_total{worker,outcome}` — routed commands (`ok` / `error`)
//! - `saai_worker_state{worker}` — current [`WorkerState::code`]
//!
//! Unlike a process-wide registry, every [`MetricsCollector`] owns its own
//! [`Registry`] so several orchestrators (and tests) can coexist.

use async_trait::async_trait;
use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use parking_lot::Mutex;
use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use saai_core::{
    ComponentHealth, MetricsConfig, MetricsSink, SaaiError, SaaiResult, Service, WorkerState,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const COMPONENT: &str = "metrics";

const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct Exporter {
    addr: SocketAddr,
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Collects supervisor and router metrics and serves them on `GET /metrics`.
pub struct MetricsCollector {
    host: String,
    port: u16,
    registry: Registry,
    cycles: IntCounterVec,
    cycle_errors: IntCounterVec,
    commands: IntCounterVec,
    worker_state: IntGaugeVec,
    errors_total: AtomicU64,
    last_errors: Mutex<HashMap<String, String>>,
    exporter: Mutex<Option<Exporter>>,
}

impl MetricsCollector {
    /// Create a collector and register its metrics. The exporter is not bound
    /// until [`Service::start`].
    pub fn new(config: &MetricsConfig) -> SaaiResult<Self> {
        let registry = Registry::new();

        let cycles = IntCounterVec::new(
            Opts::new("saai_worker_cycles_total", "Successful worker cycles"),
            &["worker"],
        )
        .map_err(metrics_err)?;
        let cycle_errors = IntCounterVec::new(
            Opts::new("saai_worker_cycle_errors_total", "Failed worker cycles"),
            &["worker"],
        )
        .map_err(metrics_err)?;
        let commands = IntCounterVec::new(
            Opts::new("saai_worker_commands_total", "Commands routed to workers"),
            &["worker", "outcome"],
        )
        .map_err(metrics_err)?;
        let worker_state = IntGaugeVec::new(
            Opts::new("saai_worker_state", "Current worker lifecycle state code"),
            &["worker"],
        )
        .map_err(metrics_err)?;

        registry
            .register(Box::new(cycles.clone()))
            .map_err(metrics_err)?;
        registry
            .register(Box::new(cycle_errors.clone()))
            .map_err(metrics_err)?;
        registry
            .register(Box::new(commands.clone()))
            .map_err(metrics_err)?;
        registry
            .register(Box::new(worker_state.clone()))
            .map_err(metrics_err)?;

        Ok(Self {
            host: config.host.clone(),
            port: config.port,
            registry,
            cycles,
            cycle_errors,
            commands,
            worker_state,
            errors_total: AtomicU64::new(0),
            last_errors: Mutex::new(HashMap::new()),
            exporter: Mutex::new(None),
        })
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render(&self) -> SaaiResult<String> {
        render_registry(&self.registry)
    }

    /// Address the exporter is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.exporter.lock().as_ref().map(|e| e.addr)
    }

    /// Successful cycles recorded for `worker`.
    pub fn cycles(&self, worker: &str) -> u64 {
        self.cycles.with_label_values(&[worker]).get()
    }

    /// Failed cycles recorded for `worker`.
    pub fn cycle_errors(&self, worker: &str) -> u64 {
        self.cycle_errors.with_label_values(&[worker]).get()
    }

    /// Most recent cycle error text recorded for `worker`.
    pub fn last_error(&self, worker: &str) -> Option<String> {
        self.last_errors.lock().get(worker).cloned()
    }
}

fn metrics_err(e: prometheus::Error) -> SaaiError {
    SaaiError::Metrics(e.to_string())
}

fn render_registry(registry: &Registry) -> SaaiResult<String> {
    let mut buf = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buf)
        .map_err(metrics_err)?;
    String::from_utf8(buf).map_err(|e| SaaiError::Metrics(e.to_string()))
}

async fn metrics_handler(State(registry): State<Registry>) -> impl IntoResponse {
    match render_registry(&registry) {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[async_trait]
impl Service for MetricsCollector {
    fn name(&self) -> &str {
        COMPONENT
    }

    async fn start(&self) -> SaaiResult<()> {
        if self.exporter.lock().is_some() {
            return Ok(());
        }

        let bind = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .map_err(|e| SaaiError::initialization(COMPONENT, format!("bind {bind}: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| SaaiError::initialization(COMPONENT, e))?;

        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(self.registry.clone());

        let (stop, stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = stopped.await;
            });
            if let Err(e) = server.await {
                error!(error = %e, "Metrics exporter stopped with error");
            }
        });

        *self.exporter.lock() = Some(Exporter { addr, stop, task });
        info!(addr = %addr, "Metrics exporter listening");
        Ok(())
    }

    async fn shutdown(&self) -> SaaiResult<()> {
        let exporter = self.exporter.lock().take();
        let Some(exporter) = exporter else {
            return Ok(());
        };

        let _ = exporter.stop.send(());
        match tokio::time::timeout(SERVER_STOP_TIMEOUT, exporter.task).await {
            Ok(Ok(())) => {
                info!(addr = %exporter.addr, "Metrics exporter stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(SaaiError::shutdown(COMPONENT, e)),
            Err(_) => Err(SaaiError::shutdown(
                COMPONENT,
                "exporter did not stop in time",
            )),
        }
    }

    async fn health(&self) -> SaaiResult<ComponentHealth> {
        let addr = self.local_addr();
        let errors = self.errors_total.load(Ordering::Relaxed);
        let details = serde_json::json!({
            "listening": addr.is_some(),
            "listen_addr": addr.map(|a| a.to_string()),
            "cycle_errors_total": errors,
            "last_errors": *self.last_errors.lock(),
        });
        Ok(if addr.is_some() {
            ComponentHealth::healthy(details)
        } else {
            ComponentHealth::unhealthy(details)
        })
    }
}

impl MetricsSink for MetricsCollector {
    fn record_cycle(&self, worker: &str) {
        self.cycles.with_label_values(&[worker]).inc();
    }

    fn record_cycle_error(&self, worker: &str, error: &str) {
        self.cycle_errors.with_label_values(&[worker]).inc();
        self.errors_total.fetch_add(1, Ordering::Relaxed);
        self.last_errors
            .lock()
            .insert(worker.to_string(), error.to_string());
        debug!(worker, error, "Cycle error recorded");
    }

    fn record_command(&self, worker: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        self.commands.with_label_values(&[worker, outcome]).inc();
    }

    fn record_state(&self, worker: &str, state: WorkerState) {
        self.worker_state
            .with_label_values(&[worker])
            .set(state.code());
        if state == WorkerState::Failed {
            warn!(worker, "Worker marked failed");
        }
    }
}
