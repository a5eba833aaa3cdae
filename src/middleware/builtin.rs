// src/middleware/builtin.rs

//! Small state-manipulating middlewares: `set`, `copy`, `sleep`, `fail`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::MiddlewareSpec;
use crate::middleware::{BoxFuture, Middleware, MiddlewareRegistry};
use crate::state::{SharedState, StateDelta};

pub fn register(registry: &mut MiddlewareRegistry) {
    registry
        .register("set", |spec, _| {
            Ok(Arc::new(SetMiddleware::from_params(parse_params(spec)?)) as Arc<dyn Middleware>)
        })
        .register("copy", |spec, _| {
            Ok(Arc::new(CopyMiddleware::from_params(parse_params(spec)?)) as Arc<dyn Middleware>)
        })
        .register("sleep", |spec, _| {
            Ok(Arc::new(SleepMiddleware::from_params(parse_params(spec)?)) as Arc<dyn Middleware>)
        })
        .register("fail", |spec, _| {
            Ok(Arc::new(FailMiddleware::from_params(parse_params(spec)?)) as Arc<dyn Middleware>)
        });
}

/// Deserialize `spec.params`, treating absent params as an empty table.
pub(crate) fn parse_params<T: DeserializeOwned>(spec: &MiddlewareSpec) -> anyhow::Result<T> {
    let value = match &spec.params {
        Value::Null => Value::Object(Default::default()),
        other => other.clone(),
    };
    serde_json::from_value(value).context("decoding `params`")
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SetParams {
    key: String,
    #[serde(default = "default_true")]
    value: Value,
}

fn default_true() -> Value {
    Value::Bool(true)
}

/// Writes a fixed value under a key.
#[derive(Debug, Clone)]
pub struct SetMiddleware {
    key: String,
    value: Value,
}

impl SetMiddleware {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    fn from_params(p: SetParams) -> Self {
        Self::new(p.key, p.value)
    }
}

impl Middleware for SetMiddleware {
    fn kind(&self) -> &str {
        "set"
    }

    fn apply(&self, _state: SharedState) -> BoxFuture<'_, anyhow::Result<StateDelta>> {
        Box::pin(async move { Ok(StateDelta::new().with(self.key.clone(), self.value.clone())) })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CopyParams {
    from: String,
    to: String,
}

/// Copies the value at `from` to `to`; missing sources are an error.
#[derive(Debug, Clone)]
pub struct CopyMiddleware {
    from: String,
    to: String,
}

impl CopyMiddleware {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    fn from_params(p: CopyParams) -> Self {
        Self::new(p.from, p.to)
    }
}

impl Middleware for CopyMiddleware {
    fn kind(&self) -> &str {
        "copy"
    }

    fn apply(&self, state: SharedState) -> BoxFuture<'_, anyhow::Result<StateDelta>> {
        Box::pin(async move {
            let value = state
                .get(&self.from)
                .cloned()
                .ok_or_else(|| anyhow!("key '{}' is not present in the state", self.from))?;
            Ok(StateDelta::new().with(self.to.clone(), value))
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SleepParams {
    ms: u64,
    #[serde(default)]
    key: Option<String>,
    #[serde(default = "default_true")]
    value: Value,
}

/// Waits, then optionally marks completion under `key`.
#[derive(Debug, Clone)]
pub struct SleepMiddleware {
    duration: Duration,
    key: Option<String>,
    value: Value,
}

impl SleepMiddleware {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            key: None,
            value: Value::Bool(true),
        }
    }

    pub fn then_set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.key = Some(key.into());
        self.value = value.into();
        self
    }

    fn from_params(p: SleepParams) -> Self {
        Self {
            duration: Duration::from_millis(p.ms),
            key: p.key,
            value: p.value,
        }
    }
}

impl Middleware for SleepMiddleware {
    fn kind(&self) -> &str {
        "sleep"
    }

    fn apply(&self, _state: SharedState) -> BoxFuture<'_, anyhow::Result<StateDelta>> {
        Box::pin(async move {
            debug!(ms = self.duration.as_millis() as u64, "sleeping");
            tokio::time::sleep(self.duration).await;
            let mut delta = StateDelta::new();
            if let Some(key) = &self.key {
                delta.set(key.clone(), self.value.clone());
            }
            Ok(delta)
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FailParams {
    #[serde(default = "default_failure")]
    message: String,
}

fn default_failure() -> String {
    "failure requested".to_string()
}

/// Always fails with `message`.
#[derive(Debug, Clone)]
pub struct FailMiddleware {
    message: String,
}

impl FailMiddleware {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn from_params(p: FailParams) -> Self {
        Self::new(p.message)
    }
}

impl Middleware for FailMiddleware {
    fn kind(&self) -> &str {
        "fail"
    }

    fn apply(&self, _state: SharedState) -> BoxFuture<'_, anyhow::Result<StateDelta>> {
        Box::pin(async move { Err(anyhow!("{}", self.message)) })
    }
}
