//! # Cross-platform OS signal handling.
//!
//! [`forward_signals`] turns process signals into supervisor requests.
//!
//! ## Signals
//! **Unix platforms:**
//! - `SIGINT`, `SIGTERM`, `SIGQUIT` → graceful shutdown
//! - `SIGHUP` → rolling restart
//!
//! **Windows platforms:**
//! - `Ctrl-C` via [`tokio::signal::ctrl_c`] → graceful shutdown

use super::supervisor::SupervisorHandle;

/// Forwards signals to `handle` until signal registration fails.
///
/// Runs forever; spawn it next to [`Supervisor::run`](super::Supervisor::run).
#[cfg(unix)]
pub async fn forward_signals(handle: SupervisorHandle) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;
    let mut sighup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            _ = sigint.recv()  => handle.shutdown(),
            _ = sigterm.recv() => handle.shutdown(),
            _ = sigquit.recv() => handle.shutdown(),
            _ = sighup.recv()  => handle.restart(),
        }
    }
}

/// Forwards Ctrl-C to `handle` as a shutdown request.
#[cfg(not(unix))]
pub async fn forward_signals(handle: SupervisorHandle) -> std::io::Result<()> {
    loop {
        tokio::signal::ctrl_c().await?;
        handle.shutdown();
    }
}
