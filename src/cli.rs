// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `middag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "middag",
    version,
    about = "Run a pipeline of middlewares according to a dependency schedule.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    ///
    /// Default: `Middag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Middag.toml")]
    pub config: PathBuf,

    /// JSON object used as the initial shared state.
    #[arg(long, value_name = "PATH")]
    pub state: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `MIDDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print units and dispatch waves, but don't run them.
    #[arg(long)]
    pub dry_run: bool,

    /// Write the dependency graph in Graphviz DOT format to PATH.
    #[arg(long, value_name = "PATH")]
    pub dot: Option<PathBuf>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = CliArgs::parse_from(["middag"]);
        assert_eq!(args.config, PathBuf::from("Middag.toml"));
        assert!(args.state.is_none());
        assert!(!args.dry_run);
        assert!(args.dot.is_none());
    }

    #[test]
    fn all_flags() {
        let args = CliArgs::parse_from([
            "middag",
            "--config",
            "p.toml",
            "--state",
            "s.json",
            "--log-level",
            "debug",
            "--dry-run",
            "--dot",
            "graph.dot",
        ]);
        assert_eq!(args.config, PathBuf::from("p.toml"));
        assert_eq!(args.state, Some(PathBuf::from("s.json")));
        assert!(matches!(args.log_level, Some(LogLevel::Debug)));
        assert!(args.dry_run);
        assert_eq!(args.dot, Some(PathBuf::from("graph.dot")));
    }
}
