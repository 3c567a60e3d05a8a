//! Runtime core: cancellation, supervision and teardown.
//!
//! The public API from this module is [`Supervisor`] (with its builder and
//! configuration), the [`CauseToken`] shared by a run, and the handles used to
//! observe subsystems.
//!
//! Internal modules:
//! - [`cause`]: cancellation token that records the first cause;
//! - [`teardown`]: per-subsystem LIFO stack of release steps;
//! - [`actor`]: runs one subsystem body, commits its exit, unwinds its releases;
//! - [`group`]: join barrier over the subsystem tasks of a run;
//! - [`supervisor`]: run protocol and result resolution;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod actor;
mod builder;
mod cause;
mod config;
mod group;
mod shutdown;
mod supervisor;
mod teardown;

pub use builder::SupervisorBuilder;
pub use cause::{Cause, CauseToken};
pub use config::SupervisorConfig;
pub use group::{SubsystemHandle, SubsystemState};
pub use shutdown::wait_for_shutdown_signal;
pub use supervisor::{Launch, Launcher, Supervisor, SupervisorState};

pub(crate) use teardown::Teardown;
