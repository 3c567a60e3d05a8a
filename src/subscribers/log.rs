//! # LogWriter: lifecycle events to `tracing`
//!
//! A minimal subscriber that turns incoming [`Event`]s into `tracing` records.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO stackvisor: [starting] subsystem="node"
//! INFO stackvisor: [running] subsystem="node"
//! WARN stackvisor: [stopping] subsystem="proposer" reason="execution failed: boom"
//! WARN stackvisor: [teardown-failed] subsystem="node" reason="stop node: ..."
//! INFO stackvisor: [shutdown-requested]
//! INFO stackvisor: [all-stopped]
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default, Debug, Clone, Copy)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let subsystem = e.subsystem.as_deref().unwrap_or_default();
        let reason = e.reason.as_deref().unwrap_or_default();
        match e.kind {
            EventKind::RunStarting => tracing::info!("[run-starting]"),
            EventKind::StartupComplete => tracing::info!("[startup-complete]"),
            EventKind::StartupFailed => tracing::error!(reason, "[startup-failed]"),
            EventKind::ShutdownRequested => tracing::info!(reason, "[shutdown-requested]"),
            EventKind::AllStopped => tracing::info!("[all-stopped]"),
            EventKind::GraceExceeded => tracing::error!(stuck = reason, "[grace-exceeded]"),
            EventKind::SubsystemStarting => tracing::info!(subsystem, "[starting]"),
            EventKind::SubsystemRunning => tracing::info!(subsystem, "[running]"),
            EventKind::SubsystemStopping if e.reason.is_some() => {
                tracing::warn!(subsystem, reason, "[stopping]")
            }
            EventKind::SubsystemStopping => tracing::info!(subsystem, "[stopping]"),
            EventKind::TeardownFailed => tracing::warn!(subsystem, reason, "[teardown-failed]"),
            EventKind::SubsystemStopped => tracing::info!(subsystem, "[stopped]"),
            EventKind::SubsystemFailed => tracing::warn!(subsystem, reason, "[failed]"),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
