// src/middleware/shell.rs

//! `shell` middleware: run a command through the platform shell and store
//! its stdout in the state.
//!
//! String, number and boolean state values whose keys are valid identifiers
//! are exported to the child as `MIDDAG_<KEY>` environment variables.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, bail};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info};

use crate::middleware::builtin::parse_params;
use crate::middleware::{BoxFuture, Middleware, MiddlewareRegistry};
use crate::state::{SharedState, StateDelta};

pub fn register(registry: &mut MiddlewareRegistry) {
    registry.register("shell", |spec, _| {
        let params: ShellParams = parse_params(spec)?;
        let store = params
            .store
            .or_else(|| spec.key.clone())
            .or_else(|| spec.name.clone())
            .unwrap_or_else(|| "stdout".to_string());
        let capture = params
            .capture
            .as_deref()
            .map(Regex::new)
            .transpose()
            .context("compiling `capture` pattern")?;
        Ok(Arc::new(ShellMiddleware {
            cmd: params.cmd,
            store,
            capture,
        }) as Arc<dyn Middleware>)
    });
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ShellParams {
    cmd: String,
    #[serde(default)]
    store: Option<String>,
    #[serde(default)]
    capture: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ShellMiddleware {
    cmd: String,
    store: String,
    capture: Option<Regex>,
}

impl ShellMiddleware {
    pub fn new(cmd: impl Into<String>, store: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            store: store.into(),
            capture: None,
        }
    }

    /// Store only the first capture group (or whole match) of `pattern`.
    pub fn with_capture(mut self, pattern: Regex) -> Self {
        self.capture = Some(pattern);
        self
    }

    fn command(&self, state: &SharedState) -> Command {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        for (key, value) in state.iter() {
            if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                continue;
            }
            if let Some(text) = env_value(value) {
                cmd.env(format!("MIDDAG_{}", key.to_ascii_uppercase()), text);
            }
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, state: SharedState) -> anyhow::Result<StateDelta> {
        info!(cmd = %self.cmd, store = %self.store, "starting shell command");

        let output = self
            .command(&state)
            .output()
            .await
            .with_context(|| format!("spawning `{}`", self.cmd))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            debug!(cmd = %self.cmd, "stderr: {}", line);
        }

        let code = output.status.code().unwrap_or(-1);
        info!(
            cmd = %self.cmd,
            exit_code = code,
            success = output.status.success(),
            "shell command exited"
        );
        if !output.status.success() {
            bail!("`{}` exited with code {}", self.cmd, code);
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let stored = match &self.capture {
            None => stdout,
            Some(re) => {
                let Some(caps) = re.captures(&stdout) else {
                    bail!("output of `{}` did not match /{}/", self.cmd, re.as_str());
                };
                caps.get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default()
            }
        };

        Ok(StateDelta::new().with(self.store.clone(), stored))
    }
}

fn env_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl Middleware for ShellMiddleware {
    fn kind(&self) -> &str {
        "shell"
    }

    fn apply(&self, state: SharedState) -> BoxFuture<'_, anyhow::Result<StateDelta>> {
        Box::pin(self.run(state))
    }
}
