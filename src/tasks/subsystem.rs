//! # Subsystem abstraction.
//!
//! This module defines the [`Subsystem`] trait: one long-running component the
//! supervisor starts, watches and stops. The common handle type is [`SubsystemRef`],
//! an `Arc<dyn Subsystem>` suitable for sharing across the runtime.
//!
//! A subsystem receives a [`Scope`] carrying the shared cancellation token, a
//! logger, and the release stack for whatever it acquires.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskError;
use crate::tasks::Scope;

/// # Long-running, cancelable component.
///
/// A `Subsystem` has a stable [`name`](Subsystem::name) and an async
/// [`run`](Subsystem::run) method. `run` acquires resources (registering each
/// release on the scope), starts its work, and returns when the shared token is
/// cancelled or when it fails on its own. Returning in any way shuts the whole
/// group down.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use stackvisor::{Scope, Subsystem, TaskError};
///
/// struct Proposer;
///
/// #[async_trait]
/// impl Subsystem for Proposer {
///     fn name(&self) -> &str { "proposer" }
///
///     async fn run(&self, scope: Scope) -> Result<(), TaskError> {
///         // acquire + scope.defer("stop l2 output submitting", ...)
///         scope.run_until_cancelled().await
///     }
/// }
/// ```
#[async_trait]
pub trait Subsystem: Send + Sync + 'static {
    /// Returns a stable, human-readable subsystem name.
    fn name(&self) -> &str;

    /// Runs the subsystem until cancellation or failure.
    async fn run(&self, scope: Scope) -> Result<(), TaskError>;
}

/// Shared handle to a subsystem.
pub type SubsystemRef = Arc<dyn Subsystem>;
