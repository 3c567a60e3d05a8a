//! # Subsystem abstractions.
//!
//! This module provides the user-facing side of a supervised subsystem:
//! - [`Subsystem`] - trait for implementing long-running cancelable components
//! - [`SubsystemFn`] - function-backed implementation
//! - [`SubsystemRef`] - shared reference to a subsystem (`Arc<dyn Subsystem>`)
//! - [`Scope`] - what a running subsystem sees of its run

mod scope;
mod subsystem;
mod subsystem_fn;

pub use scope::Scope;
pub use subsystem::{Subsystem, SubsystemRef};
pub use subsystem_fn::SubsystemFn;
