//! # Supervisor: launches a subsystem group, waits for its first exit, tears it down.
//!
//! The [`Supervisor`] owns the event bus, the [`EventListener`] and the runtime
//! configuration. A run spawns every subsystem of a launch plan onto one
//! task group, waits until the shared token is cancelled (first
//! subsystem exit, startup failure or parent cancellation) and returns a single
//! result after every subsystem task and release step finished.
//!
//! ## Run protocol
//! ```text
//! run(parent, plan)
//!   ├─► Starting:   token = parent.child(), publish RunStarting
//!   ├─► plan.launch(&mut launcher)         spawn subsystems, run setup steps
//!   │       ├─ Ok  ──► after_startup(), Running, open gate, wait token.cancelled()
//!   │       └─ Err ──► publish StartupFailed (after_startup never called)
//!   ├─► Cancelling: before_shutdown(), token.cancel(launch error or None)
//!   ├─► open gate, group.wait(grace)       every release step runs here
//!   └─► Stopped:    resolve(cause, outcomes)
//!                     ├─ cause is the launch error   ─► RuntimeError::Startup
//!                     ├─ any other cause             ─► RuntimeError::Cancelled
//!                     ├─ no cause, errors            ─► RuntimeError::Shutdown
//!                     ├─ grace exceeded              ─► RuntimeError::GraceExceeded
//!                     └─ no cause, no errors         ─► Ok(())
//! ```
//!
//! ## Rules
//! - `after_startup` fires at most once per run and never after a release step ran.
//! - `before_shutdown` fires exactly once per run, on every path, including a
//!   panicking launch plan and a dropped run future.
//! - Errors that lost the race to become the cause are attached as `suppressed`.
//!
//! ## Example
//! ```rust
//! use stackvisor::{CauseToken, Scope, Supervisor, SupervisorConfig, SubsystemFn, SubsystemRef, TaskError};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let sup = Supervisor::builder(SupervisorConfig::default()).build();
//!
//!     let node: SubsystemRef = SubsystemFn::arc("node", |scope: Scope| async move {
//!         scope.defer_close("stop node", || {});
//!         scope.run_until_cancelled().await
//!     });
//!     let proposer: SubsystemRef = SubsystemFn::arc("proposer", |_scope: Scope| async move {
//!         Err::<(), _>(TaskError::fail("boom"))
//!     });
//!
//!     let err = sup
//!         .run(&CauseToken::new(), vec![node, proposer])
//!         .await
//!         .unwrap_err();
//!     assert_eq!(err.to_string(), "execution failed: boom");
//! }
//! ```

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, OwnedMutexGuard, broadcast, watch};
use tokio_util::sync::CancellationToken;

use super::actor::SubsystemActor;
use super::builder::SupervisorBuilder;
use super::cause::{Cause, CauseToken};
use super::config::SupervisorConfig;
use super::group::{Joined, SubsystemHandle, TaskGroup};
use super::shutdown;
use crate::error::{RuntimeError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::listener::{EventListener, Logger};
use crate::subscribers::DropCounts;
use crate::tasks::SubsystemRef;

/// Lifecycle of a supervisor run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No run in progress.
    Idle,
    /// The launch plan is spawning subsystems.
    Starting,
    /// Every subsystem was spawned; waiting for the first exit.
    Running,
    /// The shared token is cancelled; subsystems are stopping.
    Cancelling,
    /// The last run finished.
    Stopped,
}

/// A launch plan: spawns subsystems in order, with setup steps in between.
///
/// `Vec<SubsystemRef>` is the trivial plan (spawn each, in order).
#[async_trait]
pub trait Launch: Send {
    /// Spawns the plan's subsystems. An error is a construction failure of the run.
    async fn launch(self, launcher: &mut Launcher) -> Result<(), TaskError>;
}

#[async_trait]
impl Launch for Vec<SubsystemRef> {
    async fn launch(self, launcher: &mut Launcher) -> Result<(), TaskError> {
        for subsystem in self {
            launcher.spawn(subsystem);
        }
        Ok(())
    }
}

/// Spawning side of a run, handed to [`Launch::launch`].
pub struct Launcher {
    token: CauseToken,
    group: TaskGroup,
    gate: CancellationToken,
    bus: Bus,
    listener: Arc<dyn EventListener>,
}

impl Launcher {
    fn new(token: CauseToken, bus: Bus, listener: Arc<dyn EventListener>) -> Self {
        Self {
            token,
            group: TaskGroup::new(),
            gate: CancellationToken::new(),
            bus,
            listener,
        }
    }

    /// Starts a subsystem task bound to the run's shared token.
    pub fn spawn(&mut self, subsystem: SubsystemRef) -> SubsystemHandle {
        let actor = SubsystemActor::new(
            subsystem,
            self.bus.clone(),
            Arc::clone(&self.listener),
            self.gate.clone(),
        );
        tracing::debug!(subsystem = actor.handle().name(), "spawning subsystem");
        self.group.spawn(actor, self.token.clone())
    }

    /// Runs a setup step between spawns.
    ///
    /// The step is abandoned with `Canceled` if the shared token is cancelled
    /// first (a subsystem spawned earlier already exited). Errors are wrapped
    /// with `name`.
    pub fn step<T, F>(
        &self,
        name: &str,
        fut: F,
    ) -> impl Future<Output = Result<T, TaskError>> + Send + use<T, F>
    where
        T: Send,
        F: Future<Output = Result<T, TaskError>> + Send,
    {
        let token = self.token.clone();
        let name: Arc<str> = name.into();
        async move {
            tracing::debug!(step = %name, "running setup step");
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(TaskError::Canceled.in_step(name)),
                res = fut => res.map_err(|err| err.in_step(name)),
            }
        }
    }

    /// Shared token of the run.
    pub fn token(&self) -> &CauseToken {
        &self.token
    }

    /// Logger routed to the run's listener.
    pub fn logger_for(&self, prefix: &str) -> Logger {
        Logger::new(prefix, "", Arc::clone(&self.listener))
    }

    /// Handles of the subsystems spawned so far, in spawn order.
    pub fn handles(&self) -> &[SubsystemHandle] {
        self.group.handles()
    }

    /// Lets release steps run; `after_startup` has fired or will never fire.
    fn open_gate(&self) {
        self.gate.cancel();
    }
}

/// Coordinates one subsystem group per run, event delivery and ordered teardown.
pub struct Supervisor {
    cfg: SupervisorConfig,
    bus: Bus,
    listener: Arc<dyn EventListener>,
    drops: DropCounts,
    state: Arc<watch::Sender<SupervisorState>>,
    run_lock: Arc<Mutex<()>>,
}

impl Supervisor {
    pub(crate) fn new_internal(
        cfg: SupervisorConfig,
        bus: Bus,
        listener: Arc<dyn EventListener>,
        drops: DropCounts,
    ) -> Self {
        Self {
            cfg,
            bus,
            listener,
            drops,
            state: Arc::new(watch::Sender::new(SupervisorState::Idle)),
            run_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Starts building a supervisor.
    pub fn builder(cfg: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    /// Current state of the supervisor.
    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Receiver observing every state change.
    pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Receiver of the runtime events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Events each configured subscriber missed because its queue was full.
    ///
    /// One entry per subscriber, in registration order; empty without subscribers.
    pub fn subscriber_drops(&self) -> Vec<(&'static str, u64)> {
        self.drops.snapshot()
    }

    /// Runs `plan` until the first subsystem exits or `parent` is cancelled.
    ///
    /// Returns after every subsystem task and every release step finished.
    /// Runs of the same supervisor are serialized.
    ///
    /// Dropping the returned future stops the group without a cause: the
    /// shutdown callback still fires and the release steps finish on a
    /// detached task. The next run waits for them.
    pub async fn run(&self, parent: &CauseToken, plan: impl Launch) -> Result<(), RuntimeError> {
        let lock = Arc::clone(&self.run_lock).lock_owned().await;
        let token = parent.child();
        self.set_state(SupervisorState::Starting);
        self.bus.publish(Event::new(EventKind::RunStarting));

        let launcher = Launcher::new(token.clone(), self.bus.clone(), Arc::clone(&self.listener));
        let mut run = RunGuard {
            launcher,
            state: Arc::clone(&self.state),
            grace: self.cfg.grace,
            limit: self.cfg.grace_limit(),
            lock: Some(lock),
            notified: false,
            joined: false,
        };

        let launched = AssertUnwindSafe(plan.launch(&mut run.launcher))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(TaskError::from_panic(panic)));
        let startup = match launched {
            Ok(()) => {
                self.listener.after_startup();
                self.set_state(SupervisorState::Running);
                self.bus.publish(Event::new(EventKind::StartupComplete));
                tracing::info!(subsystems = run.launcher.group.len(), "startup complete");
                run.launcher.open_gate();
                token.cancelled().await;
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "startup failed");
                self.bus
                    .publish(Event::new(EventKind::StartupFailed).with_reason(err.to_string()));
                Some(Arc::new(err))
            }
        };

        self.set_state(SupervisorState::Cancelling);
        run.notified = true;
        self.listener.before_shutdown();
        token.cancel(startup.clone().map(|err| err as Cause));

        let mut requested = Event::new(EventKind::ShutdownRequested);
        if let Some(cause) = token.cause() {
            tracing::info!(%cause, "stopping subsystems");
            requested = requested.with_reason(cause.to_string());
        }
        self.bus.publish(requested);

        run.launcher.open_gate();
        let joined = run.launcher.group.wait(self.cfg.grace_limit()).await;
        run.joined = true;
        finish(&self.bus, &self.state, &joined);

        resolve(token.cause(), startup, joined, self.cfg.grace)
    }

    /// Runs `plan` until a termination signal arrives or a subsystem exits.
    ///
    /// The received signal becomes the cause of the run ([`ShutdownSignal`](crate::ShutdownSignal)).
    pub async fn run_until_signal(&self, plan: impl Launch) -> Result<(), RuntimeError> {
        let root = CauseToken::new();
        let signals = {
            let root = root.clone();
            tokio::spawn(async move {
                match shutdown::wait_for_shutdown_signal().await {
                    Ok(signal) => {
                        tracing::info!(signal = signal.signal, "shutdown signal received");
                        root.cancel_with(signal);
                    }
                    Err(err) => tracing::error!(error = %err, "failed to install signal handlers"),
                }
            })
        };
        let res = self.run(&root, plan).await;
        signals.abort();
        res
    }

    fn set_state(&self, state: SupervisorState) {
        set_state(&self.state, state);
    }
}

fn set_state(tx: &watch::Sender<SupervisorState>, state: SupervisorState) {
    let prev = tx.send_replace(state);
    tracing::debug!(from = ?prev, to = ?state, "supervisor state");
}

/// Publishes the join result and marks the run stopped.
fn finish(bus: &Bus, state: &watch::Sender<SupervisorState>, joined: &Joined) {
    if joined.stuck.is_empty() {
        bus.publish(Event::new(EventKind::AllStopped));
    } else {
        tracing::error!(stuck = ?joined.stuck, "shutdown grace exceeded");
        bus.publish(Event::new(EventKind::GraceExceeded).with_reason(joined.stuck.join(", ")));
    }
    set_state(state, SupervisorState::Stopped);
}

/// Teardown of a run whose future is dropped before the group was joined.
///
/// Stops the group without a cause, fires `before_shutdown` if the run did not
/// get to it, and joins the group on a detached task that holds the run lock.
struct RunGuard {
    launcher: Launcher,
    state: Arc<watch::Sender<SupervisorState>>,
    grace: Duration,
    limit: Option<Duration>,
    lock: Option<OwnedMutexGuard<()>>,
    notified: bool,
    joined: bool,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.joined {
            return;
        }
        if !self.notified {
            self.launcher.listener.before_shutdown();
        }
        set_state(&self.state, SupervisorState::Cancelling);
        let token = self.launcher.token.clone();
        token.cancel(None);
        self.launcher.open_gate();
        self.launcher
            .bus
            .publish(Event::new(EventKind::ShutdownRequested).with_reason("run dropped"));

        let Ok(runtime) = Handle::try_current() else {
            tracing::error!("run dropped outside a runtime; subsystems aborted");
            return;
        };
        let mut group = std::mem::replace(&mut self.launcher.group, TaskGroup::new());
        let bus = self.launcher.bus.clone();
        let state = Arc::clone(&self.state);
        let (grace, limit) = (self.grace, self.limit);
        let lock = self.lock.take();
        runtime.spawn(async move {
            let joined = group.wait(limit).await;
            finish(&bus, &state, &joined);
            if let Err(err) = resolve(token.cause(), None, joined, grace) {
                tracing::warn!(error = %err, "dropped run stopped with errors");
            }
            drop(lock);
        });
    }
}

/// Turns the committed cause and the joined outcomes into the run result.
fn resolve(
    cause: Option<Cause>,
    startup: Option<Arc<TaskError>>,
    joined: Joined,
    grace: Duration,
) -> Result<(), RuntimeError> {
    let is_cause = |err: &Arc<TaskError>| {
        cause
            .as_ref()
            .is_some_and(|c| std::ptr::addr_eq(Arc::as_ptr(c), Arc::as_ptr(err)))
    };

    let mut suppressed = Vec::new();
    let mut startup_won = None;
    if let Some(err) = startup {
        if is_cause(&err) {
            startup_won = Some(err);
        } else if !err.is_canceled() {
            suppressed.push(err);
        }
    }
    for outcome in joined.outcomes {
        if let Some(err) = outcome.committed {
            if !is_cause(&err) && !err.is_canceled() {
                suppressed.push(err);
            }
        }
        suppressed.extend(outcome.teardown.into_iter().map(Arc::new));
    }
    for err in &suppressed {
        tracing::warn!(error = %err, "suppressed error");
    }

    if !joined.stuck.is_empty() {
        return Err(RuntimeError::GraceExceeded {
            grace,
            stuck: joined.stuck,
            cause,
        });
    }
    match (startup_won, cause) {
        (Some(source), _) => Err(RuntimeError::Startup { source, suppressed }),
        (None, Some(cause)) => Err(RuntimeError::Cancelled { cause, suppressed }),
        (None, None) if suppressed.is_empty() => Ok(()),
        (None, None) => Err(RuntimeError::Shutdown { errors: suppressed }),
    }
}
