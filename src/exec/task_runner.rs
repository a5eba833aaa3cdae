// src/exec/task_runner.rs

//! Runs a single dispatched unit and turns its outcome into an event.

use std::any::Any;
use std::time::Instant;

use tracing::{error, info};

use crate::engine::{DispatchedUnit, RuntimeEvent};

/// Apply the unit's middleware to its snapshot.
///
/// Never fails: middleware errors become `UnitFailed` so the runtime can
/// decide what to do with them.
pub async fn run_unit(unit: DispatchedUnit) -> RuntimeEvent {
    let DispatchedUnit {
        id,
        label,
        middleware,
        apply_method,
        state,
    } = unit;

    info!(
        unit = %label,
        unit_id = %id,
        kind = middleware.kind(),
        apply = %apply_method,
        "starting unit"
    );
    let started = Instant::now();

    match middleware.apply(state).await {
        Ok(delta) => {
            info!(
                unit = %label,
                elapsed_ms = started.elapsed().as_millis() as u64,
                keys = ?delta.keys().collect::<Vec<_>>(),
                "unit finished"
            );
            RuntimeEvent::UnitCompleted { unit: id, delta }
        }
        Err(err) => {
            let message = format!("{err:#}");
            error!(
                unit = %label,
                elapsed_ms = started.elapsed().as_millis() as u64,
                error = %message,
                "unit execution error"
            );
            RuntimeEvent::UnitFailed { unit: id, error: err }
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(s) => *s,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(s) => (*s).to_string(),
            Err(_) => "unknown panic payload".to_string(),
        },
    }
}
