// tests/nested_and_stacked.rs

use serde_json::json;

use middag::config::{MiddlewareSpec, PipelineConfig, RawPipelineConfig, SchedulingPlan};
use middag::dag::{Dependency, Identifier, Scheduler};
use middag::engine::{ScheduledMiddlewares, StackedMiddlewares};
use middag::errors::MiddagError;
use middag::middleware::MiddlewareRegistry;
use middag::state::{Evaluated, SharedState, StateDelta};
use middag_test_utils::builders::record;
use middag_test_utils::timeline::{Timeline, recording_registry};
use middag_test_utils::{init_tracing, with_timeout};

#[tokio::test]
async fn nested_pipeline_contributes_its_final_state() {
    init_tracing();
    let raw: RawPipelineConfig = toml::from_str(
        r#"
        [[value]]
        kind = "set"
        name = "seed"
        params = { key = "seed", value = 10 }

        [[value]]
        kind = "pipeline"
        name = "inner"
        params = { concurrency = 2, value = [
            { kind = "copy", params = { from = "seed", to = "copied" } },
            { kind = "set", params = { key = "inner_done" } },
        ] }

        [[value]]
        kind = "copy"
        name = "after"
        params = { from = "copied", to = "outer_copy" }
        "#,
    )
    .unwrap();

    let pipeline = ScheduledMiddlewares::from_raw(raw, MiddlewareRegistry::with_builtins()).unwrap();
    let state = with_timeout(pipeline.apply(SharedState::new())).await.unwrap();

    assert_eq!(state.get("copied"), Some(&json!(10)));
    assert_eq!(state.get("inner_done"), Some(&json!(true)));
    assert_eq!(state.get("outer_copy"), Some(&json!(10)));
}

#[tokio::test]
async fn nested_pipeline_keeps_a_sibling_write_made_while_it_ran() {
    init_tracing();
    let raw: RawPipelineConfig = toml::from_str(
        r#"
        concurrency = 2

        [[value]]
        kind = "pipeline"
        name = "inner"
        params = { value = [ { kind = "sleep", params = { ms = 100, key = "inner_done" } } ] }

        [[value]]
        kind = "set"
        name = "fast"
        params = { key = "x", value = 2 }
        "#,
    )
    .unwrap();

    let pipeline = ScheduledMiddlewares::from_raw(raw, MiddlewareRegistry::with_builtins()).unwrap();
    let initial: SharedState = [("x", json!(1))].into_iter().collect();
    let report = with_timeout(pipeline.apply_with_report(initial)).await.unwrap();

    assert_eq!(report.completion_order, vec!["fast", "inner"]);
    assert_eq!(report.state.get("x"), Some(&json!(2)));
    assert_eq!(report.state.get("inner_done"), Some(&json!(true)));
}

#[tokio::test]
async fn nested_pipeline_onto_stays_in_its_scope() {
    init_tracing();
    let raw: RawPipelineConfig = toml::from_str(
        r#"
        [[value]]
        kind = "pipeline"
        name = "child"
        apply = "onto"
        params = { value = [ { kind = "set", params = { key = "x", value = "child" } } ] }
        "#,
    )
    .unwrap();

    let pipeline = ScheduledMiddlewares::from_raw(raw, MiddlewareRegistry::with_builtins()).unwrap();
    let state = with_timeout(pipeline.apply(SharedState::new())).await.unwrap();

    assert!(state.get("x").is_none());
    assert_eq!(state.scope("child").and_then(|s| s.get("x")), Some(&json!("child")));
}

#[test]
fn invalid_nested_pipeline_is_a_configuration_error() {
    let raw: RawPipelineConfig = toml::from_str(
        r#"
        [[value]]
        kind = "pipeline"
        params = { concurrency = 1, scheduling = [], value = [] }
        "#,
    )
    .unwrap();

    let pipeline = ScheduledMiddlewares::from_raw(raw, MiddlewareRegistry::with_builtins()).unwrap();
    assert!(matches!(
        pipeline.prepare(SharedState::new()),
        Err(MiddagError::Configuration(_))
    ));
}

#[tokio::test]
async fn stacked_pipeline_shares_one_kind() {
    init_tracing();
    let timeline = Timeline::new();
    let entries = vec![
        MiddlewareSpec::untyped().with_name("one").with_params(json!({ "ms": 5 })),
        MiddlewareSpec::untyped().with_name("two").with_params(json!({ "ms": 5 })),
        record("three", 5),
    ];
    let config = PipelineConfig::builder()
        .value(entries)
        .dependencies(vec![("three", "one").into(), ("three", "two").into()])
        .build()
        .unwrap();

    let stacked = StackedMiddlewares::new("record", config, recording_registry(&timeline)).unwrap();
    assert_eq!(stacked.kind(), "record");

    let report = with_timeout(stacked.apply_with_report(SharedState::new()))
        .await
        .unwrap();

    assert_eq!(report.dispatch_order.last().map(String::as_str), Some("three"));
    assert!(timeline.finished_before_started("one", "three"));
    assert!(timeline.finished_before_started("two", "three"));
}

#[tokio::test]
async fn stacked_entries_land_in_their_own_scopes() {
    init_tracing();
    let raw: RawPipelineConfig = toml::from_str(
        r#"
        stack = "set"
        concurrency = 2

        [[value]]
        name = "left"
        params = { key = "side", value = "L" }

        [[value]]
        name = "right"
        params = { key = "side", value = "R" }

        [[value]]
        name = "shared"
        apply = "into"
        params = { key = "side", value = "root" }
        "#,
    )
    .unwrap();

    let pipeline = ScheduledMiddlewares::from_raw(raw, MiddlewareRegistry::with_builtins()).unwrap();
    let state = with_timeout(pipeline.apply(SharedState::new())).await.unwrap();

    assert_eq!(state.get("side"), Some(&json!("root")));
    assert_eq!(state.scope("left").and_then(|s| s.get("side")), Some(&json!("L")));
    assert_eq!(state.scope("right").and_then(|s| s.get("side")), Some(&json!("R")));
    assert!(state.scope("shared").is_none());
}

#[test]
fn stacked_rejects_a_foreign_kind() {
    let config = PipelineConfig::sequential(vec![MiddlewareSpec::new("set")]).unwrap();
    assert!(matches!(
        StackedMiddlewares::new("copy", config, MiddlewareRegistry::with_builtins()),
        Err(MiddagError::Configuration(_))
    ));
}

#[tokio::test]
async fn computed_entries_see_and_extend_the_state() {
    init_tracing();
    let config = PipelineConfig::builder()
        .concurrency_fn(|state: &SharedState| {
            let n = state.get("workers").and_then(|v| v.as_u64()).unwrap_or(1) as usize;
            Ok(Evaluated::with_delta(n, StateDelta::new().with("plan", "parallel")))
        })
        .value_fn(|state: &SharedState| {
            let count = state.get("count").and_then(|v| v.as_u64()).unwrap_or(0);
            let specs = (0..count)
                .map(|i| {
                    let key = format!("item{i}");
                    MiddlewareSpec::new("set")
                        .with_name(key.clone())
                        .with_params(json!({ "key": key, "value": i }))
                })
                .collect();
            Ok(Evaluated::new(specs))
        })
        .build()
        .unwrap();

    let pipeline = ScheduledMiddlewares::new(config, MiddlewareRegistry::with_builtins());
    let initial: SharedState = [("workers", json!(2)), ("count", json!(3))].into_iter().collect();
    let report = with_timeout(pipeline.apply_with_report(initial)).await.unwrap();

    assert_eq!(report.state.get("plan"), Some(&json!("parallel")));
    assert_eq!(report.state.get("item2"), Some(&json!(2)));
    assert_eq!(report.dispatch_order.len(), 3);
    assert!(report.peak_in_flight <= 2);
}

#[tokio::test]
async fn computed_schedule_is_used_as_given() {
    init_tracing();
    let config = PipelineConfig::builder()
        .value(vec![
            MiddlewareSpec::new("set").with_name("a").with_params(json!({ "key": "a" })),
            MiddlewareSpec::new("set").with_name("b").with_params(json!({ "key": "b" })),
        ])
        .scheduling_fn(|state: &SharedState| {
            let plan = if state.is_truthy("reverse") {
                SchedulingPlan::Dependencies(vec![Dependency::<Identifier>::new("a", "b")])
            } else {
                SchedulingPlan::Scheduler(Scheduler::Sequential)
            };
            Ok(Evaluated::new(plan))
        })
        .build()
        .unwrap();

    let pipeline = ScheduledMiddlewares::new(config, MiddlewareRegistry::with_builtins());

    let forward = pipeline.apply_with_report(SharedState::new()).await.unwrap();
    assert_eq!(forward.dispatch_order, vec!["a", "b"]);

    let reverse_state: SharedState = [("reverse", json!(true))].into_iter().collect();
    let reversed = pipeline.apply_with_report(reverse_state).await.unwrap();
    assert_eq!(reversed.dispatch_order, vec!["b", "a"]);
}

#[cfg(unix)]
#[tokio::test]
async fn shell_units_pass_values_through_the_state() {
    init_tracing();
    let raw: RawPipelineConfig = toml::from_str(
        r#"
        stack = "shell"

        [[value]]
        name = "version"
        apply = "into"
        params = { cmd = "echo 'release v2.7.1'", capture = 'v(\d+\.\d+\.\d+)' }

        [[value]]
        name = "banner"
        params = { cmd = "printf 'building %s' \"$MIDDAG_VERSION\"" }
        "#,
    )
    .unwrap();

    let pipeline = ScheduledMiddlewares::from_raw(raw, MiddlewareRegistry::with_builtins()).unwrap();
    let state = with_timeout(pipeline.apply(SharedState::new())).await.unwrap();

    assert_eq!(state.get("version"), Some(&json!("2.7.1")));
    assert!(state.get("banner").is_none());
    assert_eq!(
        state.scope("banner").and_then(|s| s.get("banner")),
        Some(&json!("building 2.7.1"))
    );
}

#[cfg(unix)]
#[tokio::test]
async fn failing_shell_unit_names_the_unit() {
    init_tracing();
    let raw: RawPipelineConfig = toml::from_str(
        r#"
        [[value]]
        kind = "shell"
        name = "broken"
        params = { cmd = "echo oops >&2; exit 4" }
        "#,
    )
    .unwrap();

    let pipeline = ScheduledMiddlewares::from_raw(raw, MiddlewareRegistry::with_builtins()).unwrap();
    match with_timeout(pipeline.apply(SharedState::new())).await {
        Err(MiddagError::UnitExecution { unit, source }) => {
            assert_eq!(unit, "broken");
            assert!(source.to_string().contains("code 4"));
        }
        other => panic!("expected unit execution error, got {other:?}"),
    }
}
