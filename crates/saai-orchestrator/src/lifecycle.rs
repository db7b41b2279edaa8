//! Ordered startup and failure-tolerant shutdown.
//!
//! Startup is fail-fast: shared services start first (bus, metrics, health
//! monitor), then each worker is built and initialized in configuration order.
//! The first failure aborts and is returned; nothing is rolled back.
//!
//! Shutdown is best-effort: loops are stopped, workers are shut down in
//! reverse order, then services in reverse dependency order. Every failure is
//! logged and collected into a [`ShutdownReport`]; none stops later steps.

use crate::monitor::WorkerMonitor;
use crate::registry::WorkerRegistry;
use crate::supervisor::{panic_message, Supervisor};
use futures_util::FutureExt;
use parking_lot::Mutex;
use saai_core::{
    MessageBus, MetricsSink, OrchestratorConfig, SaaiError, SaaiResult, Service, WorkerContext,
    WorkerFactory, WorkerState,
};
use saai_services::{HealthMonitor, InMemoryBus, MetricsCollector};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Shared collaborators started before, and stopped after, every worker.
#[derive(Clone)]
pub struct Services {
    /// Message bus, started first and stopped last.
    pub bus: Arc<dyn MessageBus>,
    /// Metrics sink.
    pub metrics: Arc<dyn MetricsSink>,
    /// Health monitor, started last and stopped first.
    pub health_monitor: Arc<dyn Service>,
}

impl Services {
    /// The in-process implementations: [`InMemoryBus`], [`MetricsCollector`]
    /// and a [`HealthMonitor`] watching both.
    pub fn in_memory(config: &OrchestratorConfig) -> SaaiResult<Self> {
        let bus: Arc<dyn MessageBus> = Arc::new(InMemoryBus::new(&config.bus));
        let metrics: Arc<dyn MetricsSink> = Arc::new(MetricsCollector::new(&config.metrics)?);
        let health_monitor = Arc::new(HealthMonitor::new(
            bus.clone(),
            metrics.clone(),
            config.health.interval(),
        ));
        Ok(Self {
            bus,
            metrics,
            health_monitor,
        })
    }
}

/// One component that failed to shut down cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShutdownFailure {
    /// Worker or service name.
    pub component: String,
    /// Error text.
    pub reason: String,
}

impl std::fmt::Display for ShutdownFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.component, self.reason)
    }
}

/// Outcome of a shutdown sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Components whose `shutdown` returned an error or panicked.
    pub failures: Vec<ShutdownFailure>,
    /// Supervisor loops that outlived the grace period and were aborted.
    pub aborted_loops: Vec<String>,
}

impl ShutdownReport {
    /// No failures and no aborted loops.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.aborted_loops.is_empty()
    }

    fn record(&mut self, component: &str, reason: impl ToString) {
        self.failures.push(ShutdownFailure {
            component: component.to_string(),
            reason: reason.to_string(),
        });
    }
}

/// Starts and stops services, workers and their supervisor loops.
pub struct LifecycleManager {
    config: OrchestratorConfig,
    services: Services,
    factory: WorkerFactory,
    registry: Arc<WorkerRegistry>,
    monitor: WorkerMonitor,
    running: watch::Sender<bool>,
    loops: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl LifecycleManager {
    /// Create a manager. Nothing starts until [`initialize`](Self::initialize).
    pub fn new(
        config: OrchestratorConfig,
        services: Services,
        factory: WorkerFactory,
        registry: Arc<WorkerRegistry>,
        monitor: WorkerMonitor,
    ) -> Self {
        let (running, _) = watch::channel(false);
        Self {
            config,
            services,
            factory,
            registry,
            monitor,
            running,
            loops: Mutex::new(Vec::new()),
        }
    }

    /// Bring up services, then every configured worker, then the loops.
    pub async fn initialize(&self) -> SaaiResult<()> {
        start_service(self.services.bus.as_ref()).await?;
        start_service(self.services.metrics.as_ref()).await?;
        start_service(self.services.health_monitor.as_ref()).await?;

        let ctx = WorkerContext {
            bus: self.services.bus.clone(),
            metrics: self.services.metrics.clone(),
        };

        for worker_config in &self.config.workers {
            let name = worker_config.name.as_str();
            let worker = (self.factory)(worker_config, &ctx).map_err(|e| {
                error!(worker = name, error = %e, "Worker construction failed");
                as_initialization(name, e)
            })?;

            self.registry.insert(name, worker.clone());
            self.monitor.register(name).await;
            self.transition(name, WorkerState::Initializing).await;

            if let Err(e) = worker.initialize().await {
                self.transition(name, WorkerState::Failed).await;
                error!(worker = name, error = %e, "Worker initialization failed, aborting startup");
                return Err(as_initialization(name, e));
            }
            self.transition(name, WorkerState::Running).await;
            info!(worker = name, kind = %worker_config.kind, "Worker initialized");
        }

        self.running.send_replace(true);
        let mut loops = self.loops.lock();
        for (name, worker) in self.registry.entries() {
            let supervisor = Supervisor::new(
                name.clone(),
                worker,
                self.monitor.clone(),
                self.services.metrics.clone(),
                &self.config.supervisor,
            );
            loops.push((name, supervisor.spawn(self.running.subscribe())));
        }
        info!(workers = loops.len(), "Supervisor loops started");
        Ok(())
    }

    /// Tear everything down, collecting failures instead of raising them.
    pub async fn shutdown(&self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        self.running.send_replace(false);

        let loops = std::mem::take(&mut *self.loops.lock());
        let deadline = tokio::time::Instant::now() + self.config.supervisor.stop_grace();
        for (name, mut handle) in loops {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(worker = %name, error = %e, "Supervisor loop ended abnormally");
                }
                Err(_) => {
                    handle.abort();
                    warn!(worker = %name, "Supervisor loop did not stop within grace period, aborted");
                    report.aborted_loops.push(name);
                }
            }
        }

        for (name, worker) in self.registry.entries().into_iter().rev() {
            self.transition(&name, WorkerState::ShuttingDown).await;
            let outcome = AssertUnwindSafe(worker.shutdown())
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(SaaiError::Worker(format!(
                        "shutdown panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                });
            match outcome {
                Ok(()) => info!(worker = %name, "Worker stopped"),
                Err(e) => {
                    let failure = SaaiError::shutdown(&name, &e);
                    error!(worker = %name, error = %failure, "Worker shutdown failed");
                    report.record(&name, e);
                }
            }
            self.transition(&name, WorkerState::Stopped).await;
        }

        stop_service(self.services.health_monitor.as_ref(), &mut report).await;
        stop_service(self.services.metrics.as_ref(), &mut report).await;
        stop_service(self.services.bus.as_ref(), &mut report).await;

        if report.is_clean() {
            info!("Shutdown complete");
        } else {
            warn!(
                failures = report.failures.len(),
                aborted_loops = report.aborted_loops.len(),
                "Shutdown complete with failures"
            );
        }
        report
    }

    async fn transition(&self, name: &str, state: WorkerState) {
        self.monitor.set_state(name, state).await;
        self.services.metrics.record_state(name, state);
    }
}

fn as_initialization(component: &str, e: SaaiError) -> SaaiError {
    match e {
        SaaiError::Initialization { .. } => e,
        other => SaaiError::initialization(component, other),
    }
}

async fn start_service<S: Service + ?Sized>(service: &S) -> SaaiResult<()> {
    service.start().await.map_err(|e| {
        error!(component = service.name(), error = %e, "Service failed to start");
        as_initialization(service.name(), e)
    })?;
    info!(component = service.name(), "Service started");
    Ok(())
}

async fn stop_service<S: Service + ?Sized>(service: &S, report: &mut ShutdownReport) {
    let outcome = AssertUnwindSafe(service.shutdown())
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            Err(SaaiError::shutdown(
                service.name(),
                format!("panicked: {}", panic_message(panic.as_ref())),
            ))
        });
    match outcome {
        Ok(()) => info!(component = service.name(), "Service stopped"),
        Err(e) => {
            error!(component = service.name(), error = %e, "Service shutdown failed");
            report.record(service.name(), e);
        }
    }
}
