//! # Cancellation that remembers why.
//!
//! [`CauseToken`] pairs a tokio-util [`CancellationToken`] with a single-assignment
//! cause slot. The first `cancel` call claims the slot; every later call is a no-op,
//! so a clean exit (`None`) never erases a failure recorded before it.
//!
//! ## Rules
//! - The slot is claimed **before** the inner token is cancelled, so anyone woken by
//!   `cancelled()` can read the cause.
//! - A child cancelled through its parent commits the parent's cause on first
//!   observation; a child never cancels its parent.
//! - Once read, a cause never changes.
//!
//! ```text
//!   parent ──cancel(C)──► slot = C ──► token.cancel()
//!     │                                     │ (tokio-util propagation)
//!     ▼                                     ▼
//!   child  ─────────────── cause() ──► slot.get_or_init(parent.cause()) = C
//! ```

use std::error::Error;
use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Error value attributed to why a supervised group is shutting down.
pub type Cause = Arc<dyn Error + Send + Sync + 'static>;

struct Inner {
    token: CancellationToken,
    slot: OnceLock<Option<Cause>>,
    parent: Option<CauseToken>,
}

/// Hierarchical cancellation signal carrying an optional cause.
///
/// Cheap to clone; all clones share the same state.
///
/// # Example
/// ```
/// use stackvisor::CauseToken;
///
/// let root = CauseToken::new();
/// let child = root.child();
///
/// assert!(child.cancel_with(std::io::Error::other("boom")));
/// assert!(!child.cancel(None)); // first cause wins
/// assert_eq!(child.cause().unwrap().to_string(), "boom");
/// assert!(!root.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CauseToken {
    inner: Arc<Inner>,
}

impl CauseToken {
    /// Creates a root token.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                slot: OnceLock::new(),
                parent: None,
            }),
        }
    }

    /// Derives a token that is cancelled (with the same cause) when `self` is.
    pub fn child(&self) -> Self {
        Self {
            inner: Arc::new(Inner {
                token: self.inner.token.child_token(),
                slot: OnceLock::new(),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Cancels the token, recording `cause` if no cause was committed yet.
    ///
    /// Returns `true` if this call committed the cause.
    pub fn cancel(&self, cause: Option<Cause>) -> bool {
        self.inherit_parent_cause();
        let won = self.inner.slot.set(cause).is_ok();
        self.inner.token.cancel();
        won
    }

    /// Shorthand for `cancel(Some(Arc::new(err)))`.
    pub fn cancel_with<E>(&self, err: E) -> bool
    where
        E: Error + Send + Sync + 'static,
    {
        self.cancel(Some(Arc::new(err)))
    }

    /// True once the token (or one of its ancestors) was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Completes when the token is cancelled.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }

    /// Returns the committed cause.
    ///
    /// `None` while the token is live, or when it was cancelled without a cause.
    pub fn cause(&self) -> Option<Cause> {
        if !self.is_cancelled() {
            return None;
        }
        self.inherit_parent_cause();
        self.inner.slot.get().cloned().flatten()
    }

    /// Plain tokio-util token cancelled together with this one.
    ///
    /// Cancelling the returned token does not cancel `self`.
    pub fn child_token(&self) -> CancellationToken {
        self.inner.token.child_token()
    }

    fn inherit_parent_cause(&self) {
        if let Some(parent) = &self.inner.parent {
            if parent.is_cancelled() {
                self.inner.slot.get_or_init(|| parent.cause());
            }
        }
    }
}

impl Default for CauseToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CauseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CauseToken")
            .field("cancelled", &self.is_cancelled())
            .field("cause", &self.inner.slot.get())
            .finish()
    }
}
