//! # Deferred release steps of one subsystem task.
//!
//! Every resource a subsystem acquires registers its release here right after the
//! acquisition succeeds. The task wrapper owns the stack, so the steps run on every
//! exit path of the body: clean return, early `?` return, or panic.
//!
//! ## Rules
//! - Steps run **in reverse registration order**, one at a time, each exactly once.
//! - A failing or panicking step does not prevent the next one from running.
//! - Errors are wrapped with the step name ([`TaskError::Stop`]).
//! - Steps registered while unwinding still run; after unwinding finished the
//!   stack is closed and new registrations are refused.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::error::TaskError;

pub(crate) type Release = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), TaskError>> + Send>;

struct Deferred {
    step: Arc<str>,
    release: Release,
}

#[derive(Default)]
struct Stack {
    steps: Vec<Deferred>,
    closed: bool,
}

#[derive(Clone, Default)]
pub(crate) struct Teardown {
    inner: Arc<Mutex<Stack>>,
}

impl Teardown {
    fn lock(&self) -> MutexGuard<'_, Stack> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a release step; returns `false` once the stack is closed.
    pub fn push(&self, step: Arc<str>, release: Release) -> bool {
        let mut stack = self.lock();
        if stack.closed {
            return false;
        }
        stack.steps.push(Deferred { step, release });
        true
    }

    /// Number of pending steps.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().steps.len()
    }

    /// Runs every pending step (LIFO) and closes the stack.
    pub async fn unwind(&self) -> Vec<TaskError> {
        let mut errors = Vec::new();
        loop {
            let next = {
                let mut stack = self.lock();
                match stack.steps.pop() {
                    Some(d) => d,
                    None => {
                        stack.closed = true;
                        break;
                    }
                }
            };
            tracing::debug!(step = %next.step, "running release step");
            let res = std::panic::AssertUnwindSafe((next.release)())
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(TaskError::from_panic(panic)));
            if let Err(err) = res {
                errors.push(err.in_stop(next.step));
            }
        }
        errors
    }
}
