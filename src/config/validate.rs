// src/config/validate.rs

//! Static checks run before any unit executes.

use crate::config::model::{MiddlewareSpec, RawPipelineConfig};
use crate::config::pipeline::PipelineConfig;
use crate::dag::schedule::find_cycle;
use crate::dag::{Dependency, Identifier, Scheduler, UnitLookup};
use crate::errors::{MiddagError, Result};
use crate::types::ApplyMethod;

impl TryFrom<RawPipelineConfig> for PipelineConfig {
    type Error = MiddagError;

    /// Normalize a pipeline file into the canonical form.
    ///
    /// Neither `scheduling` nor `concurrency` means "run sequentially".
    fn try_from(raw: RawPipelineConfig) -> std::result::Result<Self, Self::Error> {
        let value = raw.value.ok_or_else(|| {
            MiddagError::config("pipeline must contain at least a `value` list")
        })?;

        let mut builder = PipelineConfig::builder().value(value);

        builder = match (raw.scheduling, raw.concurrency) {
            (Some(_), Some(_)) => {
                return Err(MiddagError::config(
                    "only one of `scheduling` and `concurrency` can be specified",
                ));
            }
            (Some(scheduling), None) => builder.dependencies(
                scheduling
                    .into_iter()
                    .map(|raw| raw.into_dependency())
                    .collect(),
            ),
            (None, Some(concurrency)) => builder.concurrency(concurrency),
            (None, None) => builder.scheduler(Scheduler::Sequential),
        };

        if let Some(stack) = raw.stack {
            builder = builder.stack(stack);
        }

        builder.build()
    }
}

/// Fill missing kinds with `stack` and reject entries that name another kind.
///
/// Stacked entries without an explicit `apply` are applied onto their own
/// scope.
pub fn apply_stack(specs: Vec<MiddlewareSpec>, stack: Option<&str>) -> Result<Vec<MiddlewareSpec>> {
    let Some(stack) = stack else {
        return Ok(specs);
    };

    specs
        .into_iter()
        .enumerate()
        .map(|(index, mut spec)| {
            match spec.kind.as_deref() {
                None => spec.kind = Some(stack.to_string()),
                Some(kind) if kind == stack => {}
                Some(kind) => {
                    return Err(MiddagError::config(format!(
                        "entry {index} ({}) has kind '{kind}' but the pipeline is stacked on '{stack}'",
                        spec.display_name()
                    )));
                }
            }
            spec.apply.get_or_insert(ApplyMethod::Onto);
            Ok(spec)
        })
        .collect()
}

/// Check explicit dependencies against the entries they refer to.
///
/// - Every endpoint must name an entry (by index, `name` or `key`).
/// - No entry may depend on itself.
/// - Unconditional, ungrouped edges must not form a cycle.
pub fn check_dependencies(
    specs: &[MiddlewareSpec],
    dependencies: &[Dependency<Identifier>],
) -> Result<()> {
    let lookup = UnitLookup::from_payloads(specs);
    let mut hard_edges = Vec::new();

    for dependency in dependencies {
        let resolved = dependency.clone().resolve(|identifier| lookup.get(identifier))?;

        if resolved.dependent == resolved.prerequisite {
            return Err(MiddagError::config(format!(
                "entry {} cannot depend on itself",
                dependency.dependent
            )));
        }

        if resolved.is_hard() {
            hard_edges.push((resolved.prerequisite.index(), resolved.dependent.index()));
        }
    }

    match find_cycle(specs.len(), hard_edges) {
        None => Ok(()),
        Some(index) => Err(MiddagError::scheduling(format!(
            "cycle detected in `scheduling` involving entry {}",
            specs[index].display_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_src: &str) -> Result<PipelineConfig> {
        let raw: RawPipelineConfig = toml::from_str(toml_src)?;
        PipelineConfig::try_from(raw)
    }

    const TWO: &str = r#"
        [[value]]
        kind = "set"
        name = "a"

        [[value]]
        kind = "set"
        name = "b"
    "#;

    #[test]
    fn neither_plan_defaults_to_sequential() {
        let config = parse(TWO).unwrap();
        assert!(matches!(
            config.plan(),
            crate::config::Plan::Scheduling(crate::config::SchedulingSource::Fixed(
                crate::config::SchedulingPlan::Scheduler(Scheduler::Sequential)
            ))
        ));
    }

    #[test]
    fn both_plans_are_rejected() {
        let src = format!(
            "concurrency = 2\n{TWO}\n[[scheduling]]\ndependent = \"b\"\nprerequisite = \"a\"\n"
        );
        assert!(matches!(parse(&src), Err(MiddagError::Configuration(_))));
    }

    #[test]
    fn missing_value_is_rejected() {
        assert!(matches!(
            parse("concurrency = 2"),
            Err(MiddagError::Configuration(_))
        ));
    }

    #[test]
    fn self_dependency_is_rejected() {
        let src = format!("{TWO}\n[[scheduling]]\ndependent = \"a\"\nprerequisite = 0\n");
        match parse(&src) {
            Err(MiddagError::Configuration(msg)) => assert!(msg.contains("itself"), "{msg}"),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn hard_cycle_is_rejected() {
        let src = format!(
            "{TWO}\n[[scheduling]]\ndependent = \"a\"\nprerequisite = \"b\"\n\
             [[scheduling]]\ndependent = \"b\"\nprerequisite = \"a\"\n"
        );
        assert!(matches!(parse(&src), Err(MiddagError::Scheduling(_))));
    }

    #[test]
    fn conditional_cycle_is_left_to_run_time() {
        let src = format!(
            "{TWO}\n[[scheduling]]\ndependent = \"a\"\nprerequisite = \"b\"\nwhen = \"loop\"\n\
             [[scheduling]]\ndependent = \"b\"\nprerequisite = \"a\"\n"
        );
        assert!(parse(&src).is_ok());
    }

    #[test]
    fn stack_fills_and_checks_kinds() {
        let specs = vec![
            MiddlewareSpec::untyped(),
            MiddlewareSpec::new("shell"),
        ];
        let filled = apply_stack(specs.clone(), Some("shell")).unwrap();
        assert!(filled.iter().all(|s| s.kind.as_deref() == Some("shell")));
        assert!(filled.iter().all(|s| s.apply_method() == ApplyMethod::Onto));

        assert!(matches!(
            apply_stack(specs, Some("set")),
            Err(MiddagError::Configuration(_))
        ));
    }

    #[test]
    fn stack_keeps_an_explicit_apply_method() {
        let specs = vec![
            MiddlewareSpec::untyped().with_apply(ApplyMethod::Into),
            MiddlewareSpec::untyped(),
        ];
        let filled = apply_stack(specs.clone(), Some("set")).unwrap();
        assert_eq!(filled[0].apply_method(), ApplyMethod::Into);
        assert_eq!(filled[1].apply_method(), ApplyMethod::Onto);

        let unstacked = apply_stack(specs, None).unwrap();
        assert_eq!(unstacked[1].apply_method(), ApplyMethod::Into);
    }
}
