//! # Function-backed subsystem (`SubsystemFn`)
//!
//! [`SubsystemFn`] wraps a closure `F: Fn(Scope) -> Fut`, producing a fresh
//! future per run. Shared state between the closure and the outside world goes
//! through explicit `Arc<...>` captures.
//!
//! ## Example
//! ```rust
//! use stackvisor::{Scope, SubsystemFn, SubsystemRef};
//!
//! let node: SubsystemRef = SubsystemFn::arc("node", |scope: Scope| async move {
//!     scope.logger().info("node started");
//!     scope.run_until_cancelled().await
//! });
//!
//! assert_eq!(node.name(), "node");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::TaskError;
use crate::tasks::{Scope, Subsystem};

/// Function-backed subsystem implementation.
#[derive(Debug)]
pub struct SubsystemFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> SubsystemFn<F> {
    /// Creates a new function-backed subsystem.
    ///
    /// Prefer [`SubsystemFn::arc`] when you immediately need a [`SubsystemRef`](crate::SubsystemRef).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the subsystem and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Subsystem for SubsystemFn<F>
where
    F: Fn(Scope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, scope: Scope) -> Result<(), TaskError> {
        (self.f)(scope).await
    }
}
