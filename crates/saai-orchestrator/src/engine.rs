use crate::health::{HealthAggregator, SystemStatus};
use crate::lifecycle::{LifecycleManager, Services, ShutdownReport};
use crate::monitor::WorkerMonitor;
use crate::registry::WorkerRegistry;
use crate::router::CommandRouter;
use parking_lot::RwLock;
use saai_core::{OrchestratorConfig, SaaiError, SaaiResult, WorkerFactory, WorkerState};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Coarse orchestrator lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Constructed, nothing started.
    Created,
    /// Startup in progress, or startup failed.
    Initializing,
    /// Every worker initialized and supervised.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
    /// Shut down. Terminal.
    Stopped,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Created => "created",
            Phase::Initializing => "initializing",
            Phase::Running => "running",
            Phase::ShuttingDown => "shutting_down",
            Phase::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Owns the workers, their supervisor loops and the shared services.
///
/// This is the single entry point for the boundary layer: handlers receive an
/// `Arc<Orchestrator>` and call [`route`](Self::route) and
/// [`status`](Self::status). `initialize` and `shutdown` are serialized.
pub struct Orchestrator {
    phase: RwLock<Phase>,
    initialized: AtomicBool,
    transition: Mutex<()>,
    lifecycle: LifecycleManager,
    router: CommandRouter,
    health: HealthAggregator,
    registry: Arc<WorkerRegistry>,
    monitor: WorkerMonitor,
}

impl Orchestrator {
    /// Create an orchestrator over the in-process services.
    pub fn new(config: OrchestratorConfig, factory: WorkerFactory) -> SaaiResult<Self> {
        let services = Services::in_memory(&config)?;
        Self::with_services(config, services, factory)
    }

    /// Create an orchestrator over caller-provided services.
    pub fn with_services(
        config: OrchestratorConfig,
        services: Services,
        factory: WorkerFactory,
    ) -> SaaiResult<Self> {
        config.validate()?;

        let registry = Arc::new(WorkerRegistry::new());
        let monitor = WorkerMonitor::new();
        let router = CommandRouter::new(registry.clone(), services.metrics.clone());
        let health = HealthAggregator::new(
            services.clone(),
            registry.clone(),
            monitor.clone(),
            config.health.probe_timeout(),
        );
        let lifecycle = LifecycleManager::new(
            config,
            services,
            factory,
            registry.clone(),
            monitor.clone(),
        );

        Ok(Self {
            phase: RwLock::new(Phase::Created),
            initialized: AtomicBool::new(false),
            transition: Mutex::new(()),
            lifecycle,
            router,
            health,
            registry,
            monitor,
        })
    }

    /// Start services and workers, then spawn one supervisor loop per worker.
    ///
    /// Only callable once. On failure the orchestrator is left partially
    /// started; call [`shutdown`](Self::shutdown) to release what did start.
    pub async fn initialize(&self) -> SaaiResult<()> {
        let _guard = self.transition.lock().await;
        let phase = self.phase();
        if phase != Phase::Created {
            return Err(SaaiError::initialization(
                "orchestrator",
                format!("cannot initialize from phase {phase}"),
            ));
        }

        self.set_phase(Phase::Initializing);
        info!("Initializing orchestrator");
        if let Err(e) = self.lifecycle.initialize().await {
            error!(error = %e, "Orchestrator initialization failed");
            return Err(e);
        }

        self.initialized.store(true, Ordering::Release);
        self.set_phase(Phase::Running);
        info!(workers = self.registry.len(), "Orchestrator running");
        Ok(())
    }

    /// Stop everything. Idempotent: later calls return an empty report.
    pub async fn shutdown(&self) -> ShutdownReport {
        let _guard = self.transition.lock().await;
        match self.phase() {
            Phase::Stopped => return ShutdownReport::default(),
            Phase::Created => {
                self.set_phase(Phase::Stopped);
                return ShutdownReport::default();
            }
            _ => {}
        }

        info!("Shutting down orchestrator");
        self.initialized.store(false, Ordering::Release);
        self.set_phase(Phase::ShuttingDown);
        let report = self.lifecycle.shutdown().await;
        self.set_phase(Phase::Stopped);
        report
    }

    /// Aggregated system status. Never fails.
    pub async fn status(&self) -> SystemStatus {
        match self.phase() {
            Phase::ShuttingDown | Phase::Stopped => {
                SystemStatus::stopped(self.monitor.snapshot().await)
            }
            _ if !self.is_initialized() => SystemStatus::initializing(),
            _ => self.health.collect().await,
        }
    }

    /// Forward a command to `worker`.
    pub async fn route(
        &self,
        worker: &str,
        payload: serde_json::Value,
    ) -> SaaiResult<serde_json::Value> {
        if !self.is_initialized() {
            return Err(SaaiError::Unavailable);
        }
        self.router.route(worker, payload).await
    }

    /// Registered worker names in startup order.
    pub fn workers(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Current lifecycle state of `name`.
    pub async fn worker_state(&self, name: &str) -> Option<WorkerState> {
        self.monitor.state(name).await
    }

    /// Whether startup completed and shutdown has not begun.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        *self.phase.read()
    }

    /// Per-worker state and counters.
    pub fn monitor(&self) -> &WorkerMonitor {
        &self.monitor
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.write() = phase;
    }
}
