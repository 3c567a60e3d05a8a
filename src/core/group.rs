//! # Task group: join barrier over the subsystem tasks of one run.
//!
//! [`TaskGroup`] owns a [`JoinSet`] with one entry per spawned subsystem and the
//! [`SubsystemHandle`]s used to observe them.
//!
//! ## Rules
//! - `wait` returns only after every task returned, and a task returns only after
//!   its release steps ran: body exit → release steps → terminal state → join.
//! - With a grace limit, tasks still running when it elapses are aborted and
//!   reported as stuck.
//! - Dropping the group aborts whatever is still running, so no task outlives it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time;

use super::actor::{Outcome, SubsystemActor};
use super::cause::CauseToken;

/// Lifecycle state of one subsystem task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubsystemState {
    /// Spawned; the body is setting up.
    Starting = 0,
    /// The body reported itself running.
    Running = 1,
    /// The body returned; release steps are running.
    Stopping = 2,
    /// Finished without error.
    Stopped = 3,
    /// Finished with an error (body, release step, or abort).
    Failed = 4,
}

impl SubsystemState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SubsystemState::Starting,
            1 => SubsystemState::Running,
            2 => SubsystemState::Stopping,
            3 => SubsystemState::Stopped,
            _ => SubsystemState::Failed,
        }
    }

    /// True for `Stopped` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, SubsystemState::Stopped | SubsystemState::Failed)
    }
}

/// Observer handle of one spawned subsystem.
///
/// Cloning is cheap; all clones observe the same task.
#[derive(Clone, Debug)]
pub struct SubsystemHandle {
    name: Arc<str>,
    state: Arc<AtomicU8>,
}

impl SubsystemHandle {
    pub(crate) fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(AtomicU8::new(SubsystemState::Starting as u8)),
        }
    }

    /// Subsystem name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// Current state.
    pub fn state(&self) -> SubsystemState {
        SubsystemState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: SubsystemState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Moves `from → to`; returns `false` if the task was not in `from`.
    pub(crate) fn advance(&self, from: SubsystemState, to: SubsystemState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Result of joining a group.
pub(crate) struct Joined {
    pub outcomes: Vec<Outcome>,
    pub stuck: Vec<String>,
}

/// Set of concurrently running subsystem tasks.
pub(crate) struct TaskGroup {
    set: JoinSet<Outcome>,
    handles: Vec<SubsystemHandle>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self {
            set: JoinSet::new(),
            handles: Vec::new(),
        }
    }

    /// Starts one subsystem task bound to `token`.
    pub fn spawn(&mut self, actor: SubsystemActor, token: CauseToken) -> SubsystemHandle {
        let handle = actor.handle().clone();
        self.set.spawn(actor.run(token));
        self.handles.push(handle.clone());
        handle
    }

    pub fn handles(&self) -> &[SubsystemHandle] {
        &self.handles
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Joins every task; aborts the rest once `grace` (if any) elapses.
    pub async fn wait(&mut self, grace: Option<Duration>) -> Joined {
        let mut outcomes = Vec::with_capacity(self.set.len());
        let set = &mut self.set;
        let drain = async {
            while let Some(res) = set.join_next().await {
                match res {
                    Ok(outcome) => outcomes.push(outcome),
                    Err(err) => tracing::error!(error = %err, "subsystem task did not complete"),
                }
            }
        };

        let timed_out = match grace {
            None => {
                drain.await;
                false
            }
            Some(grace) => time::timeout(grace, drain).await.is_err(),
        };

        let mut stuck = Vec::new();
        if timed_out {
            for handle in &self.handles {
                if !handle.state().is_terminal() {
                    stuck.push(handle.name().to_string());
                    handle.set(SubsystemState::Failed);
                }
            }
            self.set.shutdown().await;
        }
        Joined { outcomes, stuck }
    }
}
