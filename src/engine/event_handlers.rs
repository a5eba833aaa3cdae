// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use std::sync::Arc;

use tracing::{debug, info};

use crate::dag::{Schedule, UnitId};
use crate::errors::{MiddagError, Result};
use crate::middleware::{BoundMiddleware, Middleware};
use crate::state::{SharedState, StateDelta};
use crate::types::ApplyMethod;

/// A unit handed to the executor, with the state snapshot it runs against.
#[derive(Debug, Clone)]
pub struct DispatchedUnit {
    pub id: UnitId,
    pub label: String,
    pub middleware: Arc<dyn Middleware>,
    pub apply_method: ApplyMethod,
    pub state: SharedState,
}

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these units to the executor.
    Dispatch(Vec<DispatchedUnit>),
    /// Every unit is done; the run can return its state.
    Finish,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep waiting for completions.
    pub keep_running: bool,
}

/// Handle a successful unit.
///
/// The unit is marked done first (rejecting stray completions), then its
/// delta is merged: into the root bag for `Into`, into the child scope named
/// after the unit for `Onto`. `changes` accumulates the same writes.
pub fn handle_unit_completed(
    schedule: &mut Schedule<BoundMiddleware>,
    state: &mut SharedState,
    changes: &mut StateDelta,
    unit: UnitId,
    delta: StateDelta,
) -> Result<String> {
    schedule.complete(unit)?;

    let label = schedule.label(unit);
    let apply_method = schedule
        .unit(unit)
        .map(|u| u.payload().apply_method())
        .unwrap_or_default();

    debug!(
        unit = %label,
        apply = %apply_method,
        keys = ?delta.keys().collect::<Vec<_>>(),
        "merging unit result"
    );

    match apply_method {
        ApplyMethod::Into => {
            changes.absorb(delta.clone());
            state.merge(delta);
        }
        ApplyMethod::Onto => {
            changes.absorb_into_scope(&label, delta.clone());
            state.merge_into_scope(&label, delta);
        }
    }

    Ok(label)
}

/// Handle a failed unit: the run stops with the unit's error.
pub fn handle_unit_failed(
    schedule: &Schedule<BoundMiddleware>,
    unit: UnitId,
    error: anyhow::Error,
) -> MiddagError {
    MiddagError::UnitExecution {
        unit: schedule.label(unit),
        source: error,
    }
}

/// Release every unit that is ready against the current state.
///
/// Returns `Finish` once all units are done. Stalls surface as `Scheduling`
/// errors from the schedule.
pub fn dispatch_ready(
    schedule: &mut Schedule<BoundMiddleware>,
    state: &SharedState,
) -> Result<CoreStep> {
    if schedule.is_finished() {
        info!(units = schedule.len(), "all units completed");
        return Ok(CoreStep {
            commands: vec![CoreCommand::Finish],
            keep_running: false,
        });
    }

    let ready = schedule.next_ready(state)?;
    let mut commands = Vec::new();

    if !ready.is_empty() {
        let units = ready
            .into_iter()
            .filter_map(|id| {
                let unit = schedule.unit(id)?;
                let label = unit.label();
                let payload = unit.payload();
                let snapshot = match payload.apply_method() {
                    ApplyMethod::Into => state.clone(),
                    ApplyMethod::Onto => state.layered(&label),
                };
                Some(DispatchedUnit {
                    id,
                    label,
                    middleware: Arc::clone(payload.middleware()),
                    apply_method: payload.apply_method(),
                    state: snapshot,
                })
            })
            .collect();
        commands.push(CoreCommand::Dispatch(units));
    }

    Ok(CoreStep {
        commands,
        keep_running: true,
    })
}
