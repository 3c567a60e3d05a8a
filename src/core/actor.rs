//! # SubsystemActor: wrapper around one subsystem task.
//!
//! Runs a [`Subsystem`](crate::Subsystem) body once and turns its exit into a
//! group-wide shutdown.
//!
//! ## Flow
//! ```text
//! publish SubsystemStarting
//!   └─► body(scope)  (panics caught)
//!         └─► token.cancel(body error or None)      first cause wins
//!               └─► publish SubsystemStopping
//!                     └─► wait startup gate         after_startup already fired
//!                           └─► unwind release steps (LIFO)
//!                                 └─► publish SubsystemStopped / SubsystemFailed
//! ```
//!
//! ## Rules
//! - Any exit of the body cancels the shared token; a clean exit commits `None`
//!   and so never masks a cause committed before it.
//! - Release steps run after the token is cancelled and after the startup gate
//!   opened, exactly once each.
//! - `Canceled` from the body is a graceful exit, not a failure.

use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::core::{Cause, CauseToken, SubsystemHandle, SubsystemState, Teardown};
use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};
use crate::listener::EventListener;
use crate::tasks::{Scope, SubsystemRef};

/// What a finished subsystem task reports back to its group.
#[derive(Debug)]
pub(crate) struct Outcome {
    /// Error the task tried to commit as the cause (`None` for a clean exit).
    pub committed: Option<Arc<TaskError>>,
    /// Failed release steps, already wrapped with their step names.
    pub teardown: Vec<TaskError>,
}

pub(crate) struct SubsystemActor {
    subsystem: SubsystemRef,
    handle: SubsystemHandle,
    bus: Bus,
    listener: Arc<dyn EventListener>,
    gate: CancellationToken,
}

impl SubsystemActor {
    pub fn new(
        subsystem: SubsystemRef,
        bus: Bus,
        listener: Arc<dyn EventListener>,
        gate: CancellationToken,
    ) -> Self {
        let handle = SubsystemHandle::new(subsystem.name());
        Self {
            subsystem,
            handle,
            bus,
            listener,
            gate,
        }
    }

    pub fn handle(&self) -> &SubsystemHandle {
        &self.handle
    }

    pub async fn run(self, token: CauseToken) -> Outcome {
        let name = self.handle.name_arc();
        self.bus
            .publish(Event::new(EventKind::SubsystemStarting).with_subsystem(Arc::clone(&name)));

        let teardown = Teardown::default();
        let scope = Scope::new(
            self.handle.clone(),
            token.clone(),
            teardown.clone(),
            self.listener,
            self.bus.clone(),
        );
        let body = std::panic::AssertUnwindSafe(self.subsystem.run(scope))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(TaskError::from_panic(panic)));

        let committed = body.err().map(Arc::new);
        let won = token.cancel(committed.clone().map(|e| e as Cause));
        tracing::debug!(subsystem = %name, won, "subsystem exited");

        self.handle.set(SubsystemState::Stopping);
        let mut stopping =
            Event::new(EventKind::SubsystemStopping).with_subsystem(Arc::clone(&name));
        if let Some(err) = &committed {
            stopping = stopping.with_reason(err.to_string());
        }
        self.bus.publish(stopping);

        self.gate.cancelled().await;
        let errors = teardown.unwind().await;
        for err in &errors {
            tracing::warn!(subsystem = %name, error = %err, "release step failed");
            self.bus.publish(
                Event::new(EventKind::TeardownFailed)
                    .with_subsystem(Arc::clone(&name))
                    .with_reason(err.to_string()),
            );
        }

        let first_error = committed
            .as_deref()
            .filter(|e| !e.is_canceled())
            .or(errors.first());
        match first_error {
            None => {
                self.handle.set(SubsystemState::Stopped);
                self.bus
                    .publish(Event::new(EventKind::SubsystemStopped).with_subsystem(name));
            }
            Some(err) => {
                self.handle.set(SubsystemState::Failed);
                self.bus.publish(
                    Event::new(EventKind::SubsystemFailed)
                        .with_subsystem(name)
                        .with_reason(err.to_string()),
                );
            }
        }

        Outcome {
            committed,
            teardown: errors,
        }
    }
}
