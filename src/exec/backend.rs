// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning tasks
//! itself. This makes it easy to swap in a fake executor in tests while
//! keeping the production implementation here.
//!
//! - [`TaskSetExecutor`] is the default implementation. It runs one Tokio
//!   task per unit inside a `JoinSet` and reports whichever finishes first.
//! - Tests can provide their own `ExecutorBackend` that, for example, runs
//!   units inline and records the dispatch batches.

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::engine::{DispatchedUnit, RuntimeEvent};
use crate::errors::Result;
use crate::middleware::BoxFuture;

use super::task_runner::{panic_message, run_unit};

/// Trait abstracting how dispatched units are executed.
pub trait ExecutorBackend: Send {
    /// Start executing the given units.
    fn spawn_ready_units(&mut self, units: Vec<DispatchedUnit>) -> BoxFuture<'_, Result<()>>;

    /// Wait for the next unit to finish. `None` when nothing is in flight.
    fn next_event(&mut self) -> BoxFuture<'_, Option<RuntimeEvent>>;

    /// Units started but not yet reported.
    fn in_flight(&self) -> usize;

    /// Abort everything still running. Aborted units report nothing.
    fn cancel_all(&mut self);
}

/// Production backend: a bounded set of Tokio tasks.
///
/// The bound comes from the schedule, which never hands out more units than
/// the concurrency cap allows.
#[derive(Debug, Default)]
pub struct TaskSetExecutor {
    tasks: JoinSet<RuntimeEvent>,
}

impl TaskSetExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutorBackend for TaskSetExecutor {
    fn spawn_ready_units(&mut self, units: Vec<DispatchedUnit>) -> BoxFuture<'_, Result<()>> {
        for unit in units {
            debug!(unit = %unit.label, "spawning unit task");
            self.tasks.spawn(run_unit(unit));
        }
        Box::pin(async { Ok(()) })
    }

    fn next_event(&mut self) -> BoxFuture<'_, Option<RuntimeEvent>> {
        Box::pin(async move {
            let joined = self.tasks.join_next().await?;
            Some(match joined {
                Ok(event) => event,
                Err(err) if err.is_panic() => RuntimeEvent::UnitPanicked {
                    message: panic_message(err.into_panic()),
                },
                Err(err) => RuntimeEvent::UnitPanicked {
                    message: format!("unit task ended abnormally: {err}"),
                },
            })
        })
    }

    fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    fn cancel_all(&mut self) {
        if !self.tasks.is_empty() {
            warn!(in_flight = self.tasks.len(), "aborting in-flight units");
        }
        self.tasks.abort_all();
        // Drop the aborted handles without waiting on them.
        self.tasks.detach_all();
    }
}
