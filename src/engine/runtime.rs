// src/engine/runtime.rs

use std::fmt;

use tracing::{debug, error, info};

use crate::errors::{MiddagError, Result};
use crate::exec::ExecutorBackend;

use super::core::CoreRuntime;
use super::{CoreCommand, CoreStep, DispatchedUnit, RunReport};

/// Drives one run: dispatches ready units to an `ExecutorBackend`, waits for
/// whichever finishes first, and feeds the outcome back into the core.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// scheduling and merge semantics.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    executor: E,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(core: CoreRuntime, executor: E) -> Self {
        Self { core, executor }
    }

    /// Main loop.
    ///
    /// - Dispatches the initially ready units.
    /// - Waits for the next completion and feeds it into the core.
    /// - Executes the commands returned by the core.
    ///
    /// On the first error nothing new is dispatched, in-flight units are
    /// aborted, and the error is returned.
    pub async fn run(mut self) -> Result<RunReport> {
        let step = self.core.start();
        let mut keep_running = self.apply_step(step).await?;

        while keep_running {
            let Some(event) = self.executor.next_event().await else {
                let err = MiddagError::scheduling(format!(
                    "executor went idle with {} unit(s) still marked in flight",
                    self.core.in_flight()
                ));
                error!(error = %err, "runtime stalled");
                return Err(err);
            };

            debug!(?event, "runtime received event");

            let step = self.core.step(event);
            keep_running = self.apply_step(step).await?;
        }

        info!("run finished");
        Ok(self.core.into_report())
    }

    /// Execute the commands of one core step, cancelling everything if the
    /// step (or a dispatch) failed.
    async fn apply_step(&mut self, step: Result<CoreStep>) -> Result<bool> {
        let step = match step {
            Ok(step) => step,
            Err(err) => {
                self.abort(&err);
                return Err(err);
            }
        };

        for command in step.commands {
            if let Err(err) = self.execute_command(command).await {
                self.abort(&err);
                return Err(err);
            }
        }

        Ok(step.keep_running)
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::Dispatch(units) => self.spawn_ready(units).await,
            CoreCommand::Finish => {
                debug!("core issued Finish command");
                Ok(())
            }
        }
    }

    async fn spawn_ready(&mut self, units: Vec<DispatchedUnit>) -> Result<()> {
        if units.is_empty() {
            return Ok(());
        }

        {
            let labels: Vec<_> = units.iter().map(|u| u.label.as_str()).collect();
            info!(units = ?labels, in_flight = self.core.in_flight(), "dispatching ready units");
        }

        self.executor.spawn_ready_units(units).await
    }

    fn abort(&mut self, err: &MiddagError) {
        info!(
            error = %err,
            in_flight = self.executor.in_flight(),
            "run failed; cancelling in-flight units"
        );
        self.executor.cancel_all();
    }
}
