// src/engine/orchestrator.rs

//! Public entry points: turn a [`PipelineConfig`] into a run.
//!
//! A run goes through these phases, in order:
//!
//! 1. Resolve the plan (`concurrency` becomes `Parallel(n)` and is recorded
//!    under [`CONCURRENCY_KEY`]; `scheduling` is taken as is), merging any
//!    state produced while computing it.
//! 2. Evaluate `value` and instantiate one middleware per entry through the
//!    registry.
//! 3. Build the schedule.
//! 4. Drive it with the runtime until every unit is done or one fails.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{
    MiddlewareSpec, PipelineConfig, Plan, RawPipelineConfig, SchedulingPlan,
};
use crate::config::validate::apply_stack;
use crate::dag::{Schedule, Scheduler, generate_schedule};
use crate::engine::{CoreRuntime, RunReport, Runtime};
use crate::errors::{MiddagError, Result};
use crate::exec::{ExecutorBackend, TaskSetExecutor};
use crate::middleware::builtin::parse_params;
use crate::middleware::{BoundMiddleware, BoxFuture, Middleware, MiddlewareRegistry};
use crate::state::{SharedState, StateDelta};

/// State key holding the resolved concurrency of the current pipeline.
pub const CONCURRENCY_KEY: &str = "$concurrency";

/// Output of the configuration-time phases.
struct Prepared {
    schedule: Schedule<BoundMiddleware>,
    state: SharedState,
    /// Writes produced by computed configuration entries.
    changes: StateDelta,
}

/// A set of middlewares executed according to a schedule.
#[derive(Debug, Clone)]
pub struct ScheduledMiddlewares {
    config: PipelineConfig,
    registry: MiddlewareRegistry,
}

impl ScheduledMiddlewares {
    pub fn new(config: PipelineConfig, registry: MiddlewareRegistry) -> Self {
        Self { config, registry }
    }

    /// Normalize and validate a pipeline file.
    pub fn from_raw(raw: RawPipelineConfig, registry: MiddlewareRegistry) -> Result<Self> {
        Ok(Self::new(PipelineConfig::try_from(raw)?, registry))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &MiddlewareRegistry {
        &self.registry
    }

    /// Run the configuration-time phases without executing any unit.
    ///
    /// Returns the schedule and the state after merging whatever computed
    /// configuration entries produced.
    pub fn prepare(
        &self,
        state: SharedState,
    ) -> Result<(Schedule<BoundMiddleware>, SharedState)> {
        let prepared = self.prepare_run(state)?;
        Ok((prepared.schedule, prepared.state))
    }

    fn prepare_run(&self, mut state: SharedState) -> Result<Prepared> {
        let mut changes = StateDelta::new();

        let plan = match self.config.plan() {
            Plan::Concurrency(source) => {
                let evaluated = source.evaluate(&state)?;
                changes.absorb(evaluated.delta.clone());
                state.merge(evaluated.delta);
                // Visible to this pipeline only; not handed back when nested.
                state.insert(CONCURRENCY_KEY, evaluated.value);
                SchedulingPlan::Scheduler(Scheduler::parallel(evaluated.value)?)
            }
            Plan::Scheduling(source) => {
                let evaluated = source.evaluate(&state)?;
                changes.absorb(evaluated.delta.clone());
                state.merge(evaluated.delta);
                evaluated.value
            }
        };

        let evaluated = self.config.value().evaluate(&state)?;
        changes.absorb(evaluated.delta.clone());
        state.merge(evaluated.delta);
        let specs = apply_stack(evaluated.value, self.config.stack())?;

        let payloads = self.instantiate(&specs)?;

        let schedule = match plan {
            SchedulingPlan::Scheduler(scheduler) => {
                debug!(policy = %scheduler, "scheduling with policy");
                scheduler.schedule(payloads)?
            }
            SchedulingPlan::Dependencies(dependencies) => {
                debug!(edges = dependencies.len(), "scheduling with explicit dependencies");
                generate_schedule(payloads, dependencies)?
            }
        };

        Ok(Prepared {
            schedule,
            state,
            changes,
        })
    }

    fn instantiate(&self, specs: &[MiddlewareSpec]) -> Result<Vec<BoundMiddleware>> {
        specs.iter().map(|spec| self.registry.bind(spec)).collect()
    }

    /// Run the pipeline against `state` and return the final state.
    pub async fn apply(&self, state: SharedState) -> Result<SharedState> {
        Ok(self.apply_with_report(state).await?.state)
    }

    /// Like [`apply`](Self::apply), also returning dispatch diagnostics.
    pub async fn apply_with_report(&self, state: SharedState) -> Result<RunReport> {
        self.apply_with(state, TaskSetExecutor::new()).await
    }

    /// Run with a caller-provided executor backend.
    pub async fn apply_with<E: ExecutorBackend>(
        &self,
        state: SharedState,
        executor: E,
    ) -> Result<RunReport> {
        let Prepared {
            schedule,
            state,
            changes,
        } = self.prepare_run(state)?;
        info!(units = schedule.len(), "pipeline prepared");

        let core = CoreRuntime::new(schedule, state).with_changes(changes);
        Runtime::new(core, executor).run().await
    }
}

/// Nested pipelines: whatever the inner run wrote is the unit's delta.
impl Middleware for ScheduledMiddlewares {
    fn kind(&self) -> &str {
        "pipeline"
    }

    fn apply(&self, state: SharedState) -> BoxFuture<'_, anyhow::Result<StateDelta>> {
        Box::pin(async move {
            let report = self.apply_with_report(state).await?;
            Ok(report.changes)
        })
    }
}

/// Register the `pipeline` kind: `params` is a pipeline table in the same
/// shape as a pipeline file.
pub fn register(registry: &mut MiddlewareRegistry) {
    registry.register("pipeline", |spec, registry| {
        let raw: RawPipelineConfig = parse_params(spec)?;
        let nested = ScheduledMiddlewares::from_raw(raw, registry.clone())?;
        Ok(Arc::new(nested) as Arc<dyn Middleware>)
    });
}

/// Scheduled middlewares that all share one middleware kind.
///
/// Entries may omit `kind`; entries naming a different kind are rejected.
#[derive(Debug, Clone)]
pub struct StackedMiddlewares {
    kind: String,
    inner: ScheduledMiddlewares,
}

impl StackedMiddlewares {
    pub fn new(
        kind: impl Into<String>,
        config: PipelineConfig,
        registry: MiddlewareRegistry,
    ) -> Result<Self> {
        let kind = kind.into();
        if !registry.contains(&kind) {
            return Err(MiddagError::config(format!(
                "cannot stack unknown middleware kind '{kind}'"
            )));
        }
        let config = config.with_stack(kind.clone())?;
        Ok(Self {
            kind,
            inner: ScheduledMiddlewares::new(config, registry),
        })
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn inner(&self) -> &ScheduledMiddlewares {
        &self.inner
    }

    pub async fn apply(&self, state: SharedState) -> Result<SharedState> {
        self.inner.apply(state).await
    }

    pub async fn apply_with_report(&self, state: SharedState) -> Result<RunReport> {
        self.inner.apply_with_report(state).await
    }
}
