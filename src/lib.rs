//! # stackvisor
//!
//! **Stackvisor** launches a fixed set of long-running async subsystems,
//! supervises them under a fail-fast policy and tears them down in order.
//!
//! The first subsystem to exit (successfully or not), a failing startup step,
//! or cancellation of the caller's token stops every other subsystem with the
//! same recorded cause. A run returns only after every subsystem and every
//! release step it registered has finished.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  Subsystem   │   │  Subsystem   │   │  Subsystem   │
//!     │   (node)     │   │  (proposer)  │   │  (batcher)   │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor (one run at a time)                                   │
//! │  - Launch plan (spawn order, setup steps)                         │
//! │  - CauseToken (shared, records the first cause)                   │
//! │  - TaskGroup (join barrier, optional grace)                       │
//! │  - EventListener (after_startup / before_shutdown / logs)         │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   │
//!     │SubsystemActor│   │SubsystemActor│   │SubsystemActor│   │
//!     │ body + LIFO  │   │ body + LIFO  │   │ body + LIFO  │   │
//!     │  releases    │   │  releases    │   │  releases    │   │
//!     └┬─────────────┘   └┬─────────────┘   └┬─────────────┘   │
//!      │ SubsystemStarting, SubsystemStopping, SubsystemFailed │
//!      ▼                  ▼                  ▼                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │              (capacity: SupervisorConfig::bus_capacity)           │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                         SubscriberSet (per-sub queues)
//!                          ┌─────────┼─────────┐
//!                          ▼         ▼         ▼
//!                       worker1   worker2   workerN
//! ```
//!
//! ### Lifecycle of one subsystem
//! ```text
//! spawn ──► Starting ──► body(scope) ──► token.cancel(result)   (first cause wins)
//!                          │
//!                          └─ scope.defer(..) registers releases as resources are acquired
//!
//! ──► Stopping ──► wait startup gate ──► unwind releases (LIFO) ──► Stopped | Failed
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                            |
//! |-------------------|---------------------------------------------------------------|-----------------------------------------------|
//! | **Supervision**   | Launch a group, stop it on first exit, return one result.     | [`Supervisor`], [`Launch`], [`Launcher`]      |
//! | **Cancellation**  | Token that records the first cause and propagates to children.| [`CauseToken`], [`Cause`]                     |
//! | **Subsystems**    | Define subsystems as trait impls or closures.                 | [`Subsystem`], [`SubsystemFn`], [`Scope`]     |
//! | **Listener**      | Startup/shutdown callbacks and prefixed subsystem logs.       | [`EventListener`], [`Logger`]                 |
//! | **Subscriber API**| Observe lifecycle events asynchronously.                      | [`Subscribe`], [`LogWriter`]                  |
//! | **Errors**        | Typed errors for runs and subsystems.                         | [`RuntimeError`], [`TaskError`]               |
//! | **Rollup stack**  | Node, proposer and batcher launched under one supervisor.     | [`stack::OpStack`], [`stack::StackComponents`]|
//! | **Configuration** | Grace period and bus capacity.                                | [`SupervisorConfig`]                          |
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use stackvisor::{CauseToken, Scope, Supervisor, SupervisorConfig, SubsystemFn, SubsystemRef};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut cfg = SupervisorConfig::default();
//!     cfg.grace = Duration::from_secs(5);
//!     let sup = Supervisor::builder(cfg).build();
//!
//!     let worker: SubsystemRef = SubsystemFn::arc("worker", |scope: Scope| async move {
//!         scope.defer_close("close worker", || println!("worker closed"));
//!         scope.run_until_cancelled().await
//!     });
//!
//!     // Stop the group from the outside without a cause.
//!     let parent = CauseToken::new();
//!     let stopper = parent.clone();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_millis(10)).await;
//!         stopper.cancel(None);
//!     });
//!
//!     sup.run(&parent, vec![worker]).await?;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod listener;
mod tasks;

pub mod events;
pub mod stack;
pub mod subscribers;

// ---- Public re-exports ----

pub use core::{
    Cause, CauseToken, Launch, Launcher, SubsystemHandle, SubsystemState, Supervisor,
    SupervisorBuilder, SupervisorConfig, SupervisorState, wait_for_shutdown_signal,
};
pub use error::{RuntimeError, ShutdownSignal, TaskError};
pub use events::{Event, EventKind};
pub use listener::{EventListener, LogRecord, Logger, TracingListener};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use tasks::{Scope, Subsystem, SubsystemFn, SubsystemRef};
