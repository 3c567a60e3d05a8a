//! # Subscribe: asynchronous observers of a run.
//!
//! A subscriber sees the lifecycle [`Event`]s of every run (startup, each
//! subsystem's stop sequence, grace overruns) after the fact. It runs on its own
//! worker, so a slow exporter never holds up a subsystem or the teardown.
//!
//! Unlike [`EventListener`](crate::EventListener), a subscriber has no ordering
//! relation with the run: `after_startup` and `before_shutdown` are synchronous
//! callbacks, events are delivered whenever the worker gets to them.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use stackvisor::{Event, EventKind, Subscribe};
//!
//! /// Counts subsystem failures for an alerting exporter.
//! struct FailureAlerts;
//!
//! #[async_trait]
//! impl Subscribe for FailureAlerts {
//!     async fn on_event(&self, ev: &Event) {
//!         let _ = (&ev.subsystem, &ev.reason);
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "failure-alerts"
//!     }
//!
//!     fn accepts(&self, kind: EventKind) -> bool {
//!         matches!(kind, EventKind::SubsystemFailed | EventKind::GraceExceeded)
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

/// Observer of runtime events, driven by a dedicated worker.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Name used when a queue overflows or the handler panics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Whether events of `kind` should be queued for this subscriber at all.
    ///
    /// Filtered events never count against the queue.
    fn accepts(&self, kind: EventKind) -> bool {
        let _ = kind;
        true
    }

    /// Queue capacity; events arriving while it is full are dropped and counted.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
