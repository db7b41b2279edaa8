//! Process termination signals.
//!
//! Handlers are registered by [`ShutdownSignals::install`] before anything
//! starts, so a signal delivered during startup is observed rather than
//! killing the process. On Unix, SIGINT, SIGTERM and SIGQUIT all request
//! shutdown; on Windows, ctrl-c does.

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// Registered shutdown signal handlers.
#[cfg(unix)]
pub struct ShutdownSignals {
    sigint: Signal,
    sigterm: Signal,
    sigquit: Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    /// Register the handlers. From here on these signals no longer
    /// terminate the process by default.
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
            sigquit: signal(SignalKind::quit())?,
        })
    }

    /// Wait for the next signal and return its name.
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigint.recv() => "SIGINT",
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigquit.recv() => "SIGQUIT",
        }
    }
}

/// Registered shutdown signal handlers.
#[cfg(windows)]
pub struct ShutdownSignals {
    ctrl_c: tokio::signal::windows::CtrlC,
}

#[cfg(windows)]
impl ShutdownSignals {
    /// Register the ctrl-c handler.
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    /// Wait for the next ctrl-c.
    pub async fn recv(&mut self) -> &'static str {
        self.ctrl_c.recv().await;
        "ctrl-c"
    }
}
