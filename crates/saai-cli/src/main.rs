//! `saai` command-line entry point: serve the orchestrator over HTTP, list
//! configured workers, or validate a configuration file.

mod config;
mod signals;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::SaaiConfig;
use saai_core::SaaiError;
use saai_gateway::GatewayServer;
use saai_orchestrator::Orchestrator;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "saai", version, about = "SAAI Agents: supervised agent workers")]
struct Cli {
    /// Path to config file (defaults to ./saai.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the orchestrator and the HTTP gateway
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Inspect configured workers
    Agents {
        #[command(subcommand)]
        action: AgentsAction,
    },
    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum AgentsAction {
    /// List workers in startup order
    List,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Load and validate the configuration
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let config = SaaiConfig::load(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Agents {
            action: AgentsAction::List,
        } => {
            list_agents(&config);
            Ok(())
        }
        Commands::Config {
            action: ConfigAction::Check,
        } => check_config(&config),
    }
}

async fn serve(config: SaaiConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let shutdown_timeout = config.shutdown_timeout();

    // Handlers go in before anything starts so a signal during startup is seen.
    let mut signals =
        signals::ShutdownSignals::install().context("Failed to install signal handlers")?;

    let orchestrator = Arc::new(Orchestrator::new(
        config.orchestrator,
        saai_agents::worker_factory(),
    )?);

    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let app = GatewayServer::build(orchestrator.clone());
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(GatewayServer::serve(listener, app, async {
        let _ = stop_rx.await;
    }));

    match start(&orchestrator, signals.recv()).await {
        Startup::Ready => {}
        Startup::Interrupted(signal) => {
            warn!(signal, "Shutdown signal received during startup");
            return finish(stop(&orchestrator, stop_tx, server, shutdown_timeout).await);
        }
        Startup::Failed(e) => {
            error!(error = %e, "Startup failed, releasing started components");
            stop(&orchestrator, stop_tx, server, shutdown_timeout).await;
            return Err(e.into());
        }
    }
    info!(%addr, workers = orchestrator.workers().len(), "SAAI Agents running");

    tokio::select! {
        signal = signals.recv() => {
            info!(signal, "Shutdown signal received");
        }
        result = &mut server => {
            warn!(outcome = ?result, "Gateway exited before a shutdown signal");
        }
    }

    finish(stop(&orchestrator, stop_tx, server, shutdown_timeout).await)
}

/// How orchestrator startup ended.
#[derive(Debug)]
enum Startup {
    Ready,
    Interrupted(&'static str),
    Failed(SaaiError),
}

/// Run orchestrator startup unless `interrupt` resolves first. An
/// interrupted startup leaves the orchestrator mid-initialization;
/// [`Orchestrator::shutdown`] releases whatever had started.
async fn start<F>(orchestrator: &Orchestrator, interrupt: F) -> Startup
where
    F: Future<Output = &'static str>,
{
    tokio::select! {
        result = orchestrator.initialize() => match result {
            Ok(()) => Startup::Ready,
            Err(e) => Startup::Failed(e),
        },
        signal = interrupt => Startup::Interrupted(signal),
    }
}

fn finish(clean: bool) -> anyhow::Result<()> {
    if clean {
        Ok(())
    } else {
        anyhow::bail!("shutdown did not complete cleanly")
    }
}

/// Stop the HTTP server, then the orchestrator, bounded by `limit`.
/// Returns whether everything stopped cleanly.
async fn stop(
    orchestrator: &Orchestrator,
    stop_tx: oneshot::Sender<()>,
    server: JoinHandle<std::io::Result<()>>,
    limit: Duration,
) -> bool {
    let sequence = async {
        let _ = stop_tx.send(());
        if !server.is_finished() {
            match server.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "Gateway stopped with an error"),
                Err(e) => error!(error = %e, "Gateway task failed"),
            }
        }
        orchestrator.shutdown().await
    };

    match tokio::time::timeout(limit, sequence).await {
        Ok(report) if report.is_clean() => {
            info!("Shutdown complete");
            true
        }
        Ok(report) => {
            for failure in &report.failures {
                warn!(component = %failure.component, reason = %failure.reason, "Shutdown failure");
            }
            false
        }
        Err(_) => {
            error!(timeout_ms = limit.as_millis() as u64, "Shutdown timed out");
            false
        }
    }
}

fn list_agents(config: &SaaiConfig) {
    let workers = &config.orchestrator.workers;
    println!("Configured workers:");
    for worker in workers {
        println!("  {:<16} {}", worker.name, worker.kind);
    }
    println!("\nTotal: {} worker(s)", workers.len());
}

fn check_config(config: &SaaiConfig) -> anyhow::Result<()> {
    config.orchestrator.validate()?;
    for worker in &config.orchestrator.workers {
        worker
            .kind
            .parse::<saai_agents::WorkerKind>()
            .with_context(|| format!("worker '{}'", worker.name))?;
    }

    let orch = &config.orchestrator;
    println!("Configuration OK");
    println!("  server:      {}:{}", config.server.host, config.server.port);
    println!("  log level:   {}", config.log_level);
    println!("  bus:         {}", orch.bus.endpoint);
    println!("  metrics:     {}:{}", orch.metrics.host, orch.metrics.port);
    println!(
        "  supervisor:  cycle {}ms, backoff {}ms",
        orch.supervisor.cycle_interval_ms, orch.supervisor.backoff_ms
    );
    println!("  workers:     {}", orch.workers.len());
    Ok(())
}
