// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! The core consumes [`RuntimeEvent`]s and produces:
//! - an updated schedule and shared state
//! - a list of commands describing what the IO shell should do next
//!
//! It is the only writer of the shared state. It has no Tokio types and
//! performs no IO, so it can be driven step by step in tests.

use tracing::{error, info};

use crate::dag::Schedule;
use crate::engine::event_handlers::{
    CoreCommand, CoreStep, dispatch_ready, handle_unit_completed, handle_unit_failed,
};
use crate::engine::{RunReport, RuntimeEvent};
use crate::errors::{MiddagError, Result};
use crate::middleware::BoundMiddleware;
use crate::state::{SharedState, StateDelta};

#[derive(Debug)]
pub struct CoreRuntime {
    schedule: Schedule<BoundMiddleware>,
    state: SharedState,
    /// Everything written to `state` since the run was prepared.
    changes: StateDelta,
    dispatch_order: Vec<String>,
    completion_order: Vec<String>,
    peak_in_flight: usize,
}

impl CoreRuntime {
    pub fn new(schedule: Schedule<BoundMiddleware>, state: SharedState) -> Self {
        Self {
            schedule,
            state,
            changes: StateDelta::new(),
            dispatch_order: Vec::new(),
            completion_order: Vec::new(),
            peak_in_flight: 0,
        }
    }

    /// Seed the change set with writes made while preparing the run.
    pub fn with_changes(mut self, changes: StateDelta) -> Self {
        self.changes = changes;
        self
    }

    /// Initial dispatch: every unit ready against the starting state.
    pub fn start(&mut self) -> Result<CoreStep> {
        info!(
            units = self.schedule.len(),
            edges = self.schedule.edge_count(),
            cap = ?self.schedule.concurrency(),
            "starting run"
        );
        self.advance()
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    ///
    /// A failed or panicked unit is returned as an error; the shell is
    /// expected to stop dispatching and cancel whatever is still in flight.
    pub fn step(&mut self, event: RuntimeEvent) -> Result<CoreStep> {
        match event {
            RuntimeEvent::UnitCompleted { unit, delta } => {
                let label = handle_unit_completed(
                    &mut self.schedule,
                    &mut self.state,
                    &mut self.changes,
                    unit,
                    delta,
                )?;
                info!(unit = %label, in_flight = self.schedule.in_flight(), "unit completed");
                self.completion_order.push(label);
                self.advance()
            }
            RuntimeEvent::UnitFailed { unit, error } => {
                let err = handle_unit_failed(&self.schedule, unit, error);
                error!(error = %err, "unit failed");
                Err(err)
            }
            RuntimeEvent::UnitPanicked { message } => {
                error!(%message, "unit task panicked");
                Err(MiddagError::UnitPanicked(message))
            }
        }
    }

    fn advance(&mut self) -> Result<CoreStep> {
        let step = dispatch_ready(&mut self.schedule, &self.state)?;

        for command in &step.commands {
            if let CoreCommand::Dispatch(units) = command {
                self.dispatch_order
                    .extend(units.iter().map(|u| u.label.clone()));
            }
        }
        self.peak_in_flight = self.peak_in_flight.max(self.schedule.in_flight());

        Ok(step)
    }

    pub fn in_flight(&self) -> usize {
        self.schedule.in_flight()
    }

    pub fn is_finished(&self) -> bool {
        self.schedule.is_finished()
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn schedule(&self) -> &Schedule<BoundMiddleware> {
        &self.schedule
    }

    pub fn into_report(self) -> RunReport {
        RunReport {
            state: self.state,
            changes: self.changes,
            dispatch_order: self.dispatch_order,
            completion_order: self.completion_order,
            peak_in_flight: self.peak_in_flight,
        }
    }
}
