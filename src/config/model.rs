// src/config/model.rs

//! TOML-backed data model for pipeline files.
//!
//! ```toml
//! concurrency = 2
//!
//! [[value]]
//! kind = "shell"
//! name = "build"
//! params = { cmd = "make" }
//!
//! [[scheduling]]
//! dependent = "test"
//! prerequisite = "build"
//! ```

use serde::Deserialize;
use serde_json::Value;

use crate::dag::{Condition, Dependency, Identifier, Identify};
use crate::types::ApplyMethod;

/// Pipeline file as deserialized, before validation.
///
/// Use `PipelineConfig::try_from` (or
/// [`load_and_validate`](crate::config::load_and_validate)) to obtain the
/// canonical form.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawPipelineConfig {
    /// Middleware entries, one unit each, in declaration order.
    #[serde(default)]
    pub value: Option<Vec<MiddlewareSpec>>,

    /// Explicit dependency edges. An empty list means "no ordering at all".
    #[serde(default)]
    pub scheduling: Option<Vec<RawDependency>>,

    /// Parallel limit. Mutually exclusive with `scheduling`.
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Middleware kind shared by every entry.
    #[serde(default)]
    pub stack: Option<String>,
}

/// One `[[value]]` entry.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct MiddlewareSpec {
    /// Registry type tag. May be omitted when the pipeline sets `stack`.
    #[serde(default)]
    pub kind: Option<String>,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub key: Option<String>,

    /// Unset means `into`, or `onto` under a stacked pipeline.
    #[serde(default)]
    pub apply: Option<ApplyMethod>,

    /// Kind-specific parameters, decoded by the middleware's factory.
    #[serde(default)]
    pub params: Value,
}

impl MiddlewareSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            name: None,
            key: None,
            apply: None,
            params: Value::Null,
        }
    }

    /// Entry without a kind, for use under a stacked pipeline.
    pub fn untyped() -> Self {
        Self {
            kind: None,
            name: None,
            key: None,
            apply: None,
            params: Value::Null,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    pub fn onto(mut self) -> Self {
        self.apply = Some(ApplyMethod::Onto);
        self
    }

    pub fn with_apply(mut self, apply: ApplyMethod) -> Self {
        self.apply = Some(apply);
        self
    }

    /// Effective apply method; `into` when the entry leaves it unset.
    pub fn apply_method(&self) -> ApplyMethod {
        self.apply.unwrap_or_default()
    }

    /// Human-readable reference used in error messages.
    pub fn display_name(&self) -> String {
        match (&self.name, &self.key) {
            (Some(name), _) => format!("'{name}'"),
            (None, Some(key)) => format!("'{key}'"),
            (None, None) => format!("of kind '{}'", self.kind.as_deref().unwrap_or("?")),
        }
    }
}

impl Identify for MiddlewareSpec {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}

/// Unit reference in a `[[scheduling]]` entry: an integer index or a
/// name/key string.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RawIdentifier {
    Index(usize),
    Name(String),
}

impl From<RawIdentifier> for Identifier {
    fn from(raw: RawIdentifier) -> Self {
        match raw {
            RawIdentifier::Index(i) => Identifier::Index(i),
            RawIdentifier::Name(n) => Identifier::Name(n),
        }
    }
}

/// One `[[scheduling]]` entry.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RawDependency {
    pub dependent: RawIdentifier,
    pub prerequisite: RawIdentifier,

    /// Edge applies only while this state key is truthy.
    #[serde(default)]
    pub when: Option<String>,

    /// Edge applies only while this state key is falsy.
    #[serde(default)]
    pub unless: Option<String>,

    #[serde(default)]
    pub group: Option<String>,
}

impl RawDependency {
    pub fn into_dependency(self) -> Dependency<Identifier> {
        let condition = match (self.when, self.unless) {
            (None, None) => None,
            (Some(w), None) => Some(Condition::when(w)),
            (None, Some(u)) => Some(Condition::unless(u)),
            (Some(w), Some(u)) => Some(Condition::when(w).and(Condition::unless(u))),
        };

        let mut dependency: Dependency<Identifier> =
            Dependency::new(Identifier::from(self.dependent), Identifier::from(self.prerequisite));
        if let Some(condition) = condition {
            dependency = dependency.when(condition);
        }
        if let Some(group) = self.group {
            dependency = dependency.in_group(group);
        }
        dependency
    }
}
