//! # Runtime events emitted by the supervisor and subsystem tasks.
//!
//! The [`EventKind`] enum classifies event types across two categories:
//! - **Run events**: supervisor state changes (starting, startup complete, shutdown)
//! - **Subsystem events**: one task's lifecycle (starting, running, stopping, terminal)
//!
//! The [`Event`] struct carries additional metadata such as timestamps,
//! subsystem name and reasons.
//!
//! ## Ordering
//! `seq` comes from one process-wide counter. Subscribers run on separate
//! workers, so sort by `seq` when merging what several of them recorded.
//!
//! ## Example
//! ```rust
//! use stackvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::SubsystemFailed)
//!     .with_subsystem("batcher")
//!     .with_reason("boom");
//!
//! assert_eq!(ev.kind, EventKind::SubsystemFailed);
//! assert_eq!(ev.subsystem.as_deref(), Some("batcher"));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Next `seq` to hand out.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// What happened to the run or to one of its subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Run events ===
    /// A run began; the shared token was derived from the parent.
    RunStarting,

    /// Every subsystem was spawned and `after_startup` fired.
    StartupComplete,

    /// The launch plan failed before every subsystem was spawned.
    ///
    /// Sets:
    /// - `reason`: construction error
    StartupFailed,

    /// The shared token was cancelled; teardown begins.
    ///
    /// Sets:
    /// - `reason`: cause, if one was committed at that point
    ShutdownRequested,

    /// Every subsystem task joined (within the grace period, if one is set).
    AllStopped,

    /// Grace period exceeded; remaining subsystems were aborted.
    ///
    /// Sets:
    /// - `reason`: stuck subsystem names
    GraceExceeded,

    // === Subsystem lifecycle events ===
    /// Subsystem task spawned; its body is about to run.
    ///
    /// Sets:
    /// - `subsystem`: subsystem name
    SubsystemStarting,

    /// Subsystem reported itself running.
    ///
    /// Sets:
    /// - `subsystem`: subsystem name
    SubsystemRunning,

    /// Subsystem body returned; release steps are pending.
    ///
    /// Sets:
    /// - `subsystem`: subsystem name
    /// - `reason`: body error, if any
    SubsystemStopping,

    /// A release step of the subsystem failed.
    ///
    /// Sets:
    /// - `subsystem`: subsystem name
    /// - `reason`: wrapped stop error
    TeardownFailed,

    /// Subsystem finished cleanly (body and every release step).
    ///
    /// Sets:
    /// - `subsystem`: subsystem name
    SubsystemStopped,

    /// Subsystem finished with an error in its body or a release step.
    ///
    /// Sets:
    /// - `subsystem`: subsystem name
    /// - `reason`: first error
    SubsystemFailed,
}

/// One lifecycle event. Which optional fields are set depends on [`EventKind`].
#[derive(Clone, Debug)]
pub struct Event {
    /// Process-wide publication order.
    pub seq: u64,
    /// When the event was created.
    pub at: SystemTime,
    pub kind: EventKind,
    /// Name of the subsystem, if applicable.
    pub subsystem: Option<Arc<str>>,
    /// Error text, cause, or stuck subsystem names.
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Stamps a new event with the current time and the next `seq`.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            subsystem: None,
            reason: None,
        }
    }

    /// Sets `reason`.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a subsystem name.
    #[inline]
    pub fn with_subsystem(mut self, name: impl Into<Arc<str>>) -> Self {
        self.subsystem = Some(name.into());
        self
    }

    /// True for events that end a subsystem's lifecycle.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubsystemStopped | EventKind::SubsystemFailed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::RunStarting);
        let b = Event::new(EventKind::StartupComplete);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn terminal_kinds() {
        assert!(Event::new(EventKind::SubsystemStopped).is_terminal());
        assert!(Event::new(EventKind::SubsystemFailed).is_terminal());
        assert!(!Event::new(EventKind::SubsystemStopping).is_terminal());
    }
}
