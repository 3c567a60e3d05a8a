//! # Supervisor configuration.
//!
//! Provides [`SupervisorConfig`], the settings shared by every run of a
//! [`Supervisor`](crate::Supervisor).
//!
//! ## Sentinel values
//! - `grace = 0s` → wait indefinitely for subsystems to stop (no forced abort)
//! - `bus_capacity = 0` → clamped to 1

use std::time::Duration;

/// Runtime configuration of a supervisor.
///
/// ## Field semantics
/// - `grace`: Maximum wait for subsystems to stop once the group is cancelled (`0s` = no limit)
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
///
/// ## Notes
/// All fields are public. Prefer the helper accessors to avoid sprinkling
/// sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Maximum time to wait for subsystems to finish their release steps.
    ///
    /// When the shared token is cancelled:
    /// - every subsystem body observes the cancellation and returns
    /// - the supervisor waits up to `grace` for all tasks to join
    /// - if the limit elapses, the remaining tasks are aborted and the run
    ///   returns `RuntimeError::GraceExceeded`
    pub grace: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages skip
    /// older events. Minimum value is 1 (enforced by Bus).
    pub bus_capacity: usize,
}

impl SupervisorConfig {
    /// Returns the shutdown grace period as an `Option`.
    ///
    /// - `None` → wait until every subsystem stopped
    /// - `Some(d)` → abort whatever still runs after `d`
    #[inline]
    pub fn grace_limit(&self) -> Option<Duration> {
        if self.grace == Duration::ZERO {
            None
        } else {
            Some(self.grace)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `grace = 0s` (stop routines are trusted to return)
    /// - `bus_capacity = 1024` (good baseline)
    fn default() -> Self {
        Self {
            grace: Duration::ZERO,
            bus_capacity: 1024,
        }
    }
}
