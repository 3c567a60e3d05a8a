//! # Termination signals as a run cause.
//!
//! [`wait_for_shutdown_signal`] resolves with the [`ShutdownSignal`] that asked the
//! process to stop. [`Supervisor::run_until_signal`](crate::Supervisor::run_until_signal)
//! commits it as the cause of the run, so the result names the signal:
//! `received SIGTERM`.
//!
//! Unix listens for `SIGINT`, `SIGTERM` and `SIGQUIT`; other platforms only for
//! Ctrl-C.

use crate::error::ShutdownSignal;

/// Completes on the first termination signal and reports which one arrived.
///
/// Fails only when the signal handlers cannot be installed.
pub async fn wait_for_shutdown_signal() -> std::io::Result<ShutdownSignal> {
    let signal = recv_signal().await?;
    Ok(ShutdownSignal { signal })
}

#[cfg(unix)]
async fn recv_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut int = signal(SignalKind::interrupt())?;
    let mut term = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;
    Ok(tokio::select! {
        _ = int.recv() => "SIGINT",
        _ = term.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
    })
}

#[cfg(not(unix))]
async fn recv_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
