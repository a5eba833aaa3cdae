// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - the schedule built for one run
//! - the shared state and the merge of unit results into it
//! - the runtime loop that dispatches ready units and waits for whichever
//!   finishes first
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`]. [`orchestrator`] is the public entry point
//! that turns a configuration into a run.

use crate::dag::UnitId;
use crate::state::{SharedState, StateDelta};

/// Events flowing into the runtime from the executor.
#[derive(Debug)]
pub enum RuntimeEvent {
    /// A unit's middleware returned a delta.
    UnitCompleted { unit: UnitId, delta: StateDelta },
    /// A unit's middleware returned an error.
    UnitFailed { unit: UnitId, error: anyhow::Error },
    /// A unit task panicked; the unit cannot be identified reliably.
    UnitPanicked { message: String },
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: SharedState,
    /// What the run wrote, relative to the state it was given.
    pub changes: StateDelta,
    /// Unit labels in the order they were handed to the executor.
    pub dispatch_order: Vec<String>,
    /// Unit labels in the order their results were merged.
    pub completion_order: Vec<String>,
    /// Largest number of units in flight at any time.
    pub peak_in_flight: usize,
}

pub mod core;
pub mod event_handlers;
pub mod orchestrator;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep, DispatchedUnit};
pub use orchestrator::{CONCURRENCY_KEY, ScheduledMiddlewares, StackedMiddlewares};
pub use runtime::Runtime;
