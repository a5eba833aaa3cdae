// src/exec/mod.rs

//! Unit execution layer.
//!
//! - [`task_runner`] applies one unit's middleware and reports the outcome
//!   as a `RuntimeEvent`.
//! - [`backend`] provides the `ExecutorBackend` trait and the
//!   `TaskSetExecutor` the runtime uses in production, which tests can
//!   replace with a fake implementation.

pub mod backend;
pub mod task_runner;

pub use backend::{ExecutorBackend, TaskSetExecutor};
pub use task_runner::run_unit;
