// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod middleware;
pub mod state;
pub mod types;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::{load_and_validate, load_state_from_path};
use crate::dag::Schedule;
use crate::engine::ScheduledMiddlewares;
use crate::middleware::{BoundMiddleware, MiddlewareRegistry};
use crate::state::SharedState;

pub use crate::errors::{MiddagError, Result as MiddagResult};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - pipeline loading and validation
/// - the initial state (empty, or from `--state`)
/// - the builtin middleware registry
/// - the optional Graphviz export (`--dot`)
/// - the run itself, printing the final state as JSON on stdout
pub async fn run(args: CliArgs) -> Result<()> {
    let config = load_and_validate(&args.config)?;
    info!(config = %args.config.display(), "pipeline loaded");

    let state = match &args.state {
        Some(path) => load_state_from_path(path)?,
        None => SharedState::new(),
    };

    let pipeline = ScheduledMiddlewares::new(config, MiddlewareRegistry::with_builtins());

    if let Some(path) = &args.dot {
        let (schedule, _) = pipeline.prepare(state.clone())?;
        std::fs::write(path, schedule.to_dot())
            .with_context(|| format!("writing graph to {}", path.display()))?;
        info!(path = %path.display(), "dependency graph written");
    }

    if args.dry_run {
        let (mut schedule, state) = pipeline.prepare(state)?;
        print_dry_run(&mut schedule, &state)?;
        return Ok(());
    }

    let report = pipeline.apply_with_report(state).await?;
    info!(
        units = report.dispatch_order.len(),
        peak_in_flight = report.peak_in_flight,
        "pipeline complete"
    );

    println!("{}", serde_json::to_string_pretty(&report.state)?);
    Ok(())
}

/// Print units, their requirements, and the waves they would be dispatched
/// in against the initial state.
fn print_dry_run(schedule: &mut Schedule<BoundMiddleware>, state: &SharedState) -> Result<()> {
    println!("middag dry-run");
    match schedule.concurrency() {
        Some(cap) => println!("  concurrency = {cap}"),
        None => println!("  concurrency = unbounded"),
    }
    println!();

    println!("units ({}):", schedule.len());
    for unit in schedule.units() {
        let payload = unit.payload();
        println!("  - {} [{}]", unit.label(), unit.id());
        println!("      kind: {}", payload.kind());
        println!("      apply: {}", payload.apply_method());
        for requirement in schedule.requirements_of(unit.id()) {
            let mut line = format!("after {}", schedule.label(requirement.prerequisite()));
            if let Some(condition) = requirement.condition() {
                line.push_str(&format!(" if {}", condition.description()));
            }
            if let Some(group) = requirement.group() {
                line.push_str(&format!(" (group {group})"));
            }
            println!("      {line}");
        }
    }
    println!();

    let waves = schedule.simulate(state)?;
    println!("waves ({}):", waves.len());
    for (i, wave) in waves.iter().enumerate() {
        let labels: Vec<_> = wave.iter().map(|id| schedule.label(*id)).collect();
        println!("  {}: {}", i + 1, labels.join(", "));
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}
