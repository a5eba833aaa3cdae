// src/config/pipeline.rs

//! Canonical pipeline configuration.
//!
//! Every entry is either fixed or computed from the shared state at the
//! start of a run. Computed entries return an [`Evaluated`] whose delta is
//! merged into the state before the next entry is evaluated.

use std::fmt;
use std::sync::Arc;

use crate::config::model::MiddlewareSpec;
use crate::config::validate;
use crate::dag::{Dependency, Identifier, Scheduler};
use crate::errors::{MiddagError, Result};
use crate::state::{Evaluated, SharedState};

/// A configuration entry computed from the shared state.
pub type StateFn<T> = Arc<dyn Fn(&SharedState) -> anyhow::Result<Evaluated<T>> + Send + Sync>;

#[derive(Clone)]
pub enum ValueSource {
    List(Vec<MiddlewareSpec>),
    Computed(StateFn<Vec<MiddlewareSpec>>),
}

/// How units are ordered.
#[derive(Debug, Clone)]
pub enum SchedulingPlan {
    /// Explicit edges; no concurrency cap beyond the graph itself.
    Dependencies(Vec<Dependency<Identifier>>),
    /// A policy that derives the edges and the cap.
    Scheduler(Scheduler),
}

#[derive(Clone)]
pub enum SchedulingSource {
    Fixed(SchedulingPlan),
    Computed(StateFn<SchedulingPlan>),
}

#[derive(Clone)]
pub enum ConcurrencySource {
    Fixed(usize),
    Computed(StateFn<usize>),
}

/// Exactly one of `scheduling` or `concurrency`.
#[derive(Debug, Clone)]
pub enum Plan {
    Scheduling(SchedulingSource),
    Concurrency(ConcurrencySource),
}

impl fmt::Debug for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSource::List(specs) => f.debug_tuple("List").field(specs).finish(),
            ValueSource::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl fmt::Debug for SchedulingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulingSource::Fixed(plan) => f.debug_tuple("Fixed").field(plan).finish(),
            SchedulingSource::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl fmt::Debug for ConcurrencySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencySource::Fixed(n) => f.debug_tuple("Fixed").field(n).finish(),
            ConcurrencySource::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

fn evaluate<T>(what: &str, f: &StateFn<T>, state: &SharedState) -> Result<Evaluated<T>> {
    f(state).map_err(|e| MiddagError::Other(e.context(format!("evaluating `{what}`"))))
}

impl ValueSource {
    pub fn evaluate(&self, state: &SharedState) -> Result<Evaluated<Vec<MiddlewareSpec>>> {
        match self {
            ValueSource::List(specs) => Ok(Evaluated::new(specs.clone())),
            ValueSource::Computed(f) => evaluate("value", f, state),
        }
    }
}

impl SchedulingSource {
    pub fn evaluate(&self, state: &SharedState) -> Result<Evaluated<SchedulingPlan>> {
        match self {
            SchedulingSource::Fixed(plan) => Ok(Evaluated::new(plan.clone())),
            SchedulingSource::Computed(f) => evaluate("scheduling", f, state),
        }
    }
}

impl ConcurrencySource {
    /// Resolve the limit; zero is rejected here for computed sources too.
    pub fn evaluate(&self, state: &SharedState) -> Result<Evaluated<usize>> {
        let evaluated = match self {
            ConcurrencySource::Fixed(n) => Evaluated::new(*n),
            ConcurrencySource::Computed(f) => evaluate("concurrency", f, state)?,
        };
        if evaluated.value == 0 {
            return Err(MiddagError::config("concurrency must be >= 1 (got 0)"));
        }
        Ok(evaluated)
    }
}

/// Validated pipeline configuration. Build with [`PipelineConfig::builder`]
/// or convert from a [`RawPipelineConfig`](crate::config::RawPipelineConfig).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    value: ValueSource,
    plan: Plan,
    stack: Option<String>,
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Fixed middleware list run one after another.
    pub fn sequential(value: Vec<MiddlewareSpec>) -> Result<Self> {
        Self::builder()
            .value(value)
            .scheduler(Scheduler::Sequential)
            .build()
    }

    pub fn value(&self) -> &ValueSource {
        &self.value
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    /// Same configuration with every entry forced to `kind`.
    pub fn with_stack(mut self, kind: impl Into<String>) -> Result<Self> {
        self.stack = Some(kind.into());
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if let ValueSource::List(specs) = &self.value {
            let specs = validate::apply_stack(specs.clone(), self.stack.as_deref())?;
            if let Plan::Scheduling(SchedulingSource::Fixed(SchedulingPlan::Dependencies(deps))) =
                &self.plan
            {
                validate::check_dependencies(&specs, deps)?;
            }
        }
        match &self.plan {
            Plan::Concurrency(ConcurrencySource::Fixed(0))
            | Plan::Scheduling(SchedulingSource::Fixed(SchedulingPlan::Scheduler(
                Scheduler::Parallel(0),
            ))) => Err(MiddagError::config("concurrency must be >= 1 (got 0)")),
            _ => Ok(()),
        }
    }
}

/// Builder with explicit optional fields; `build` enforces the
/// exactly-one-plan rule.
#[derive(Default)]
pub struct PipelineConfigBuilder {
    value: Option<ValueSource>,
    scheduling: Option<SchedulingSource>,
    concurrency: Option<ConcurrencySource>,
    stack: Option<String>,
}

impl PipelineConfigBuilder {
    pub fn value(mut self, specs: Vec<MiddlewareSpec>) -> Self {
        self.value = Some(ValueSource::List(specs));
        self
    }

    pub fn value_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&SharedState) -> anyhow::Result<Evaluated<Vec<MiddlewareSpec>>> + Send + Sync + 'static,
    {
        self.value = Some(ValueSource::Computed(Arc::new(f)));
        self
    }

    pub fn dependencies(mut self, dependencies: Vec<Dependency<Identifier>>) -> Self {
        self.scheduling = Some(SchedulingSource::Fixed(SchedulingPlan::Dependencies(
            dependencies,
        )));
        self
    }

    pub fn scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduling = Some(SchedulingSource::Fixed(SchedulingPlan::Scheduler(scheduler)));
        self
    }

    pub fn scheduling_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&SharedState) -> anyhow::Result<Evaluated<SchedulingPlan>> + Send + Sync + 'static,
    {
        self.scheduling = Some(SchedulingSource::Computed(Arc::new(f)));
        self
    }

    pub fn concurrency(mut self, limit: usize) -> Self {
        self.concurrency = Some(ConcurrencySource::Fixed(limit));
        self
    }

    pub fn concurrency_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&SharedState) -> anyhow::Result<Evaluated<usize>> + Send + Sync + 'static,
    {
        self.concurrency = Some(ConcurrencySource::Computed(Arc::new(f)));
        self
    }

    pub fn stack(mut self, kind: impl Into<String>) -> Self {
        self.stack = Some(kind.into());
        self
    }

    pub fn build(self) -> Result<PipelineConfig> {
        let value = self
            .value
            .ok_or_else(|| MiddagError::config("pipeline requires `value`"))?;

        let plan = match (self.scheduling, self.concurrency) {
            (Some(_), Some(_)) => {
                return Err(MiddagError::config(
                    "only one of `scheduling` and `concurrency` can be specified",
                ));
            }
            (None, None) => {
                return Err(MiddagError::config(
                    "one of `scheduling` or `concurrency` must be specified",
                ));
            }
            (Some(scheduling), None) => Plan::Scheduling(scheduling),
            (None, Some(concurrency)) => Plan::Concurrency(concurrency),
        };

        let config = PipelineConfig {
            value,
            plan,
            stack: self.stack,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::StateDelta;
    use serde_json::json;

    fn specs() -> Vec<MiddlewareSpec> {
        vec![
            MiddlewareSpec::new("set").with_name("a"),
            MiddlewareSpec::new("set").with_name("b"),
        ]
    }

    fn expect_config_error(res: Result<PipelineConfig>, needle: &str) {
        match res {
            Err(MiddagError::Configuration(msg)) => assert!(msg.contains(needle), "{msg}"),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn missing_value_is_rejected() {
        expect_config_error(PipelineConfig::builder().concurrency(1).build(), "value");
    }

    #[test]
    fn plan_must_be_exactly_one() {
        expect_config_error(
            PipelineConfig::builder().value(specs()).build(),
            "must be specified",
        );
        expect_config_error(
            PipelineConfig::builder()
                .value(specs())
                .concurrency(2)
                .scheduler(Scheduler::Sequential)
                .build(),
            "only one",
        );
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        expect_config_error(
            PipelineConfig::builder().value(specs()).concurrency(0).build(),
            "concurrency",
        );
    }

    #[test]
    fn fixed_dependencies_are_checked_eagerly() {
        expect_config_error(
            PipelineConfig::builder()
                .value(specs())
                .dependencies(vec![("b", "zzz").into()])
                .build(),
            "zzz",
        );
    }

    #[test]
    fn computed_concurrency_carries_its_delta() {
        let source = ConcurrencySource::Computed(Arc::new(|state: &SharedState| {
            let n = state.get("workers").and_then(|v| v.as_u64()).unwrap_or(1) as usize;
            Ok(Evaluated::with_delta(n, StateDelta::new().with("resolved", n)))
        }));

        let state: SharedState = [("workers", json!(4))].into_iter().collect();
        let evaluated = source.evaluate(&state).unwrap();
        assert_eq!(evaluated.value, 4);
        assert_eq!(evaluated.delta.get("resolved"), Some(&json!(4)));

        let zero: SharedState = [("workers", json!(0))].into_iter().collect();
        assert!(source.evaluate(&zero).is_err());
    }
}
