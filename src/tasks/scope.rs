//! # Scope: what a subsystem body gets to work with.
//!
//! A [`Scope`] is handed to [`Subsystem::run`](crate::Subsystem::run). It exposes:
//! - the shared [`CauseToken`] of the run (cancelled when any subsystem exits),
//! - prefixed [`Logger`]s routed to the run's [`EventListener`](crate::EventListener),
//! - the release stack: [`defer`](Scope::defer) / [`defer_close`](Scope::defer_close).
//!
//! ## Release steps
//! Register a release right after the acquisition it undoes. The supervisor runs
//! the steps in reverse order once the body returned and the shared token is
//! cancelled, even when the body bailed out halfway through its setup:
//! ```text
//! let tx = new_tx_manager()?;          scope.defer_close("close tx manager", ..)
//! let dialer = dial(...)?;             scope.defer_close("close dialer", ..)
//! submitter.start()?;                  scope.defer("stop l2 output submitting", ..)
//! scope.run_until_cancelled().await
//!                                      ─► stop submitter, close dialer, close tx manager
//! ```

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::WaitForCancellationFuture;

use crate::core::{CauseToken, SubsystemHandle, SubsystemState, Teardown};
use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};
use crate::listener::{EventListener, Logger};

/// Per-subsystem handle to the run's shared state.
///
/// Cheap to clone; clones may be moved into helper tasks spawned by the subsystem.
#[derive(Clone)]
pub struct Scope {
    handle: SubsystemHandle,
    token: CauseToken,
    teardown: Teardown,
    listener: Arc<dyn EventListener>,
    bus: Bus,
}

impl Scope {
    pub(crate) fn new(
        handle: SubsystemHandle,
        token: CauseToken,
        teardown: Teardown,
        listener: Arc<dyn EventListener>,
        bus: Bus,
    ) -> Self {
        Self {
            handle,
            token,
            teardown,
            listener,
            bus,
        }
    }

    /// Name of the subsystem this scope belongs to.
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    /// Shared cancellation token of the run.
    pub fn token(&self) -> &CauseToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the run is shutting down.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Logger whose prefix is the subsystem name.
    pub fn logger(&self) -> Logger {
        self.logger_for(self.name())
    }

    /// Logger with a custom prefix (e.g. `"proposer tx manager"`).
    pub fn logger_for(&self, prefix: &str) -> Logger {
        Logger::new(prefix, self.name(), Arc::clone(&self.listener))
    }

    /// Registers an async release step.
    ///
    /// `step` names the step in errors (`"stop node: ..."`).
    pub fn defer<F, Fut>(&self, step: impl Into<Arc<str>>, release: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let step = step.into();
        let accepted = self
            .teardown
            .push(Arc::clone(&step), Box::new(move || release().boxed()));
        if !accepted {
            tracing::warn!(
                subsystem = self.name(),
                step = %step,
                "release step registered after teardown finished; ignored"
            );
        }
    }

    /// Registers an infallible synchronous release step (a `close`).
    pub fn defer_close<F>(&self, step: impl Into<Arc<str>>, close: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.defer(step, move || {
            close();
            futures::future::ready(Ok(()))
        });
    }

    /// Reports the subsystem as running. Later calls are no-ops.
    pub fn mark_running(&self) {
        if self
            .handle
            .advance(SubsystemState::Starting, SubsystemState::Running)
        {
            self.bus.publish(
                Event::new(EventKind::SubsystemRunning).with_subsystem(self.handle.name_arc()),
            );
        }
    }

    /// Marks the subsystem running, then waits for the run to shut down.
    ///
    /// Always returns `Ok(())`; the shutdown itself is not an error of this subsystem.
    pub async fn run_until_cancelled(&self) -> Result<(), TaskError> {
        self.mark_running();
        self.token.cancelled().await;
        Ok(())
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("subsystem", &self.name())
            .field("state", &self.handle.state())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
