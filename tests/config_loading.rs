// tests/config_loading.rs

use std::fs;
use std::path::PathBuf;

use serde_json::json;
use tempfile::TempDir;

use middag::config::{
    Plan, SchedulingPlan, SchedulingSource, load_and_validate, load_from_path,
    load_state_from_path,
};
use middag::dag::Scheduler;
use middag::engine::ScheduledMiddlewares;
use middag::errors::MiddagError;
use middag::middleware::MiddlewareRegistry;
use middag::state::SharedState;
use middag_test_utils::{init_tracing, with_timeout};

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

const DIAMOND: &str = r#"
[[value]]
kind = "set"
name = "fetch"
params = { key = "fetched", value = 1 }

[[value]]
kind = "copy"
name = "left"
params = { from = "fetched", to = "left" }

[[value]]
kind = "copy"
name = "right"
params = { from = "fetched", to = "right" }

[[value]]
kind = "set"
key = "join"
params = { key = "joined" }

[[scheduling]]
dependent = "left"
prerequisite = "fetch"

[[scheduling]]
dependent = 2
prerequisite = 0

[[scheduling]]
dependent = "join"
prerequisite = "left"

[[scheduling]]
dependent = "join"
prerequisite = "right"
"#;

#[tokio::test]
async fn diamond_pipeline_runs_from_file() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "Middag.toml", DIAMOND);

    let config = load_and_validate(&path).unwrap();
    let pipeline = ScheduledMiddlewares::new(config, MiddlewareRegistry::with_builtins());

    let report = with_timeout(pipeline.apply_with_report(SharedState::new()))
        .await
        .unwrap();

    assert_eq!(report.state.get("left"), Some(&json!(1)));
    assert_eq!(report.state.get("right"), Some(&json!(1)));
    assert_eq!(report.state.get("joined"), Some(&json!(true)));
    assert_eq!(report.dispatch_order.first().map(String::as_str), Some("fetch"));
    assert_eq!(report.dispatch_order.last().map(String::as_str), Some("join"));
}

#[test]
fn empty_scheduling_list_means_no_ordering() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "p.toml",
        r#"
        scheduling = []

        [[value]]
        kind = "set"
        params = { key = "a" }
        "#,
    );

    let config = load_and_validate(&path).unwrap();
    match config.plan() {
        Plan::Scheduling(SchedulingSource::Fixed(SchedulingPlan::Dependencies(deps))) => {
            assert!(deps.is_empty())
        }
        other => panic!("unexpected plan {other:?}"),
    }
}

#[test]
fn concurrency_becomes_the_plan() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "p.toml",
        "concurrency = 3\n[[value]]\nkind = \"set\"\nparams = { key = \"a\" }\n",
    );

    let config = load_and_validate(&path).unwrap();
    assert!(matches!(config.plan(), Plan::Concurrency(_)));
}

#[test]
fn missing_plan_defaults_to_sequential() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "p.toml", "[[value]]\nkind = \"set\"\n");

    let config = load_and_validate(&path).unwrap();
    assert!(matches!(
        config.plan(),
        Plan::Scheduling(SchedulingSource::Fixed(SchedulingPlan::Scheduler(
            Scheduler::Sequential
        )))
    ));
}

#[test]
fn invalid_files_are_rejected() {
    let dir = TempDir::new().unwrap();

    let cases = [
        ("both.toml", "concurrency = 2\nscheduling = []\n[[value]]\nkind = \"set\"\n"),
        ("zero.toml", "concurrency = 0\n[[value]]\nkind = \"set\"\n"),
        (
            "unknown_ref.toml",
            "[[value]]\nkind = \"set\"\nname = \"a\"\n[[scheduling]]\ndependent = \"a\"\nprerequisite = \"ghost\"\n",
        ),
        (
            "bad_index.toml",
            "[[value]]\nkind = \"set\"\n[[scheduling]]\ndependent = 0\nprerequisite = 5\n",
        ),
        ("stack.toml", "stack = \"shell\"\n[[value]]\nkind = \"set\"\n"),
    ];

    for (name, contents) in cases {
        let path = write(&dir, name, contents);
        match load_and_validate(&path) {
            Err(MiddagError::Configuration(_)) => {}
            other => panic!("{name}: expected configuration error, got {other:?}"),
        }
    }
}

#[test]
fn hard_cycle_is_a_scheduling_error() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "cycle.toml",
        r#"
        [[value]]
        kind = "set"
        name = "a"
        [[value]]
        kind = "set"
        name = "b"
        [[value]]
        kind = "set"
        name = "c"

        [[scheduling]]
        dependent = "b"
        prerequisite = "a"
        [[scheduling]]
        dependent = "c"
        prerequisite = "b"
        [[scheduling]]
        dependent = "a"
        prerequisite = "c"
        "#,
    );

    assert!(matches!(
        load_and_validate(&path),
        Err(MiddagError::Scheduling(_))
    ));
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "bad.toml", "[[value]\nkind = ");
    assert!(matches!(load_from_path(&path), Err(MiddagError::TomlError(_))));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.toml");
    assert!(matches!(load_from_path(&missing), Err(MiddagError::IoError(_))));
}

#[test]
fn initial_state_loads_from_json() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "state.json", r#"{ "n": 3, "name": "x" }"#);

    let state = load_state_from_path(&path).unwrap();
    assert_eq!(state.get("n"), Some(&json!(3)));
    assert_eq!(state.get("name"), Some(&json!("x")));

    let not_object = write(&dir, "list.json", "[1, 2]");
    assert!(matches!(
        load_state_from_path(&not_object),
        Err(MiddagError::Configuration(_))
    ));
}

#[tokio::test]
async fn cli_entry_point_runs_and_dry_runs() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "Middag.toml", DIAMOND);
    let state = write(&dir, "state.json", r#"{ "preset": true }"#);

    let graph = dir.path().join("graph.dot");

    let args = middag::cli::CliArgs {
        config: path,
        state: Some(state),
        log_level: None,
        dry_run: true,
        dot: Some(graph.clone()),
    };
    with_timeout(middag::run(args.clone())).await.unwrap();

    let dot = fs::read_to_string(&graph).unwrap();
    assert!(dot.starts_with("digraph {"), "{dot}");
    assert!(dot.contains("label = \"fetch\""), "{dot}");
    assert_eq!(dot.matches("->").count(), 4);

    let args = middag::cli::CliArgs {
        dry_run: false,
        ..args
    };
    with_timeout(middag::run(args)).await.unwrap();
}
