//! Error types used by the stackvisor runtime and subsystems.
//!
//! This module defines two main error enums:
//!
//! - [`RuntimeError`]: the single result of [`Supervisor::run`](crate::Supervisor::run).
//! - [`TaskError`]: errors raised by individual subsystems, their setup steps and
//!   their release steps.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.
//! [`ShutdownSignal`] is the cause recorded when an OS signal stops the stack.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::core::Cause;

/// # Errors returned by a supervised run.
///
/// A run never reports partial success: it yields one error describing the first
/// fatal cause. Errors that lost the race to become the cause (and every failed
/// release step) are kept in `suppressed` instead of being dropped.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    /// The launch plan failed before every subsystem was spawned.
    #[error("startup failed: {source}{}", fmt_suppressed(.suppressed))]
    Startup {
        /// The construction error.
        source: Arc<TaskError>,
        /// Secondary errors collected during teardown.
        suppressed: Vec<Arc<TaskError>>,
    },

    /// The group was cancelled with a cause (subsystem failure or parent cancellation).
    #[error("{cause}{}", fmt_suppressed(.suppressed))]
    Cancelled {
        /// The first committed cause.
        cause: Cause,
        /// Secondary errors collected during teardown.
        suppressed: Vec<Arc<TaskError>>,
    },

    /// Shutdown was requested without a cause, but stopping a subsystem failed.
    #[error("shutdown failed:{}", fmt_suppressed(.errors))]
    Shutdown {
        /// Every error reported while stopping.
        errors: Vec<Arc<TaskError>>,
    },

    /// Shutdown grace period was exceeded; the remaining subsystems were aborted.
    #[error("shutdown grace {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Names of the subsystems that did not stop in time.
        stuck: Vec<String>,
        /// The committed cause, if any.
        cause: Option<Cause>,
    },
}

fn fmt_suppressed(errors: &[Arc<TaskError>]) -> String {
    errors.iter().map(|e| format!("; {e}")).collect()
}

impl RuntimeError {
    /// Returns the error recorded as the reason the group shut down.
    pub fn cause(&self) -> Option<Cause> {
        match self {
            RuntimeError::Startup { source, .. } => Some(source.clone() as Cause),
            RuntimeError::Cancelled { cause, .. } => Some(cause.clone()),
            RuntimeError::Shutdown { .. } => None,
            RuntimeError::GraceExceeded { cause, .. } => cause.clone(),
        }
    }

    /// Returns the secondary errors attached to this result.
    pub fn suppressed(&self) -> &[Arc<TaskError>] {
        match self {
            RuntimeError::Startup { suppressed, .. } => suppressed,
            RuntimeError::Cancelled { suppressed, .. } => suppressed,
            RuntimeError::Shutdown { errors } => errors,
            RuntimeError::GraceExceeded { .. } => &[],
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use stackvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![], cause: None };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Startup { .. } => "runtime_startup_failed",
            RuntimeError::Cancelled { .. } => "runtime_cancelled",
            RuntimeError::Shutdown { .. } => "runtime_shutdown_failed",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::Startup { source, suppressed } => {
                format!("startup: {source}; suppressed={}", suppressed.len())
            }
            RuntimeError::Cancelled { cause, suppressed } => {
                format!("cause: {cause}; suppressed={}", suppressed.len())
            }
            RuntimeError::Shutdown { errors } => format!("shutdown errors={}", errors.len()),
            RuntimeError::GraceExceeded { grace, stuck, .. } => {
                format!("grace exceeded after {grace:?}; stuck subsystems={stuck:?}")
            }
        }
    }
}

/// # Errors produced by subsystems.
///
/// A subsystem body, a launch step or a release step returns one of these.
/// The type is `Clone` so the same value can be committed as a cancellation cause
/// and still be reported by the task that produced it.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// The subsystem failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// A named setup step failed (dialing a dependency, building a client, ...).
    #[error("{step}: {source}")]
    Step {
        /// The step that failed.
        step: Arc<str>,
        /// The underlying error.
        source: Box<TaskError>,
    },

    /// A release step failed while the subsystem was stopping.
    #[error("{step}: {source}")]
    Stop {
        /// The release step that failed.
        step: Arc<str>,
        /// The underlying error.
        source: Box<TaskError>,
    },

    /// The subsystem body or one of its release steps panicked.
    #[error("panicked: {info}")]
    Panicked {
        /// Panic payload, if it was a string.
        info: String,
    },

    /// Work was abandoned because the shared token was cancelled.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Wraps this error with the name of the setup step that produced it.
    pub fn in_step(self, step: impl Into<Arc<str>>) -> Self {
        TaskError::Step {
            step: step.into(),
            source: Box::new(self),
        }
    }

    /// Wraps this error with the name of the release step that produced it.
    pub fn in_stop(self, step: impl Into<Arc<str>>) -> Self {
        TaskError::Stop {
            step: step.into(),
            source: Box::new(self),
        }
    }

    /// Builds a [`TaskError::Panicked`] from a caught panic payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let info = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        TaskError::Panicked { info }
    }

    /// True for [`TaskError::Canceled`], including when wrapped in a step.
    pub fn is_canceled(&self) -> bool {
        match self {
            TaskError::Canceled => true,
            TaskError::Step { source, .. } => source.is_canceled(),
            _ => false,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use stackvisor::TaskError;
    ///
    /// let err = TaskError::fail("boom").in_step("dial l1");
    /// assert_eq!(err.as_label(), "task_step_failed");
    /// assert_eq!(err.to_string(), "dial l1: execution failed: boom");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Step { .. } => "task_step_failed",
            TaskError::Stop { .. } => "task_stop_failed",
            TaskError::Panicked { .. } => "task_panicked",
            TaskError::Canceled => "task_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Fail { error } => format!("error: {error}"),
            TaskError::Step { step, source } => format!("step {step}: {}", source.as_message()),
            TaskError::Stop { step, source } => format!("stop {step}: {}", source.as_message()),
            TaskError::Panicked { info } => format!("panic: {info}"),
            TaskError::Canceled => "context cancelled".to_string(),
        }
    }
}

/// The process received a termination signal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("received {signal}")]
pub struct ShutdownSignal {
    /// Signal name (`SIGINT`, `SIGTERM`, `SIGQUIT`, `ctrl-c`).
    pub signal: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_and_stop_wrap_messages() {
        let err = TaskError::fail("connection refused").in_step("dial l1");
        assert_eq!(err.to_string(), "dial l1: execution failed: connection refused");

        let stop = TaskError::fail("deadline").in_stop("stop node");
        assert_eq!(stop.as_label(), "task_stop_failed");
        assert_eq!(stop.as_message(), "stop stop node: error: deadline");
    }

    #[test]
    fn canceled_is_seen_through_steps() {
        assert!(TaskError::Canceled.is_canceled());
        assert!(TaskError::Canceled.in_step("get l1 chain id").is_canceled());
        assert!(!TaskError::fail("x").is_canceled());
        assert!(!TaskError::Canceled.in_stop("stop").is_canceled());
    }

    #[test]
    fn panic_payloads_are_rendered() {
        let err = TaskError::from_panic(Box::new("kaboom"));
        assert_eq!(err.to_string(), "panicked: kaboom");
        let err = TaskError::from_panic(Box::new(String::from("owned")));
        assert_eq!(err.to_string(), "panicked: owned");
        let err = TaskError::from_panic(Box::new(7_u8));
        assert_eq!(err.to_string(), "panicked: unknown panic payload");
    }

    #[test]
    fn cancelled_display_lists_suppressed() {
        let cause: Cause = Arc::new(TaskError::fail("boom"));
        let err = RuntimeError::Cancelled {
            cause,
            suppressed: vec![Arc::new(TaskError::fail("late").in_stop("stop batcher"))],
        };
        assert_eq!(
            err.to_string(),
            "execution failed: boom; stop batcher: execution failed: late"
        );
        assert_eq!(err.suppressed().len(), 1);
        assert_eq!(err.as_label(), "runtime_cancelled");
    }

    #[test]
    fn startup_error_is_its_own_cause() {
        let err = RuntimeError::Startup {
            source: Arc::new(TaskError::fail("no l1").in_step("dial l1")),
            suppressed: Vec::new(),
        };
        let cause = err.cause().expect("startup has a cause");
        assert_eq!(cause.to_string(), "dial l1: execution failed: no l1");
    }
}
