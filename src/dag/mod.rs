// src/dag/mod.rs

//! Dependency graph and scheduling.
//!
//! - [`dependency`] holds dependency edges, conditions and the symbolic
//!   identifiers used to refer to units before the graph exists.
//! - [`unit`] wraps payloads into schedulable units.
//! - [`schedule`] builds the plan and hands out ready units.
//! - [`readiness`] tracks per-unit requirement satisfaction.
//! - [`scheduler`] provides the `Sequential` / `Parallel(n)` policies.

pub mod dependency;
pub mod readiness;
pub mod schedule;
pub mod scheduler;
pub mod unit;

pub use dependency::{Condition, Dependency, GroupId, Identifier, UnitLookup};
pub use readiness::{Requirement, UnitRunState};
pub use schedule::{Schedule, generate_schedule};
pub use scheduler::Scheduler;
pub use unit::{Identify, Unit, UnitId};
