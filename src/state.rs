// src/state.rs

//! Shared execution state threaded through a pipeline run.
//!
//! A [`SharedState`] is a key-value bag (`String -> serde_json::Value`) with
//! optional named child scopes. Units never mutate it directly: each unit gets
//! an owned snapshot at dispatch time and hands back a [`StateDelta`], which
//! the orchestrator merges after the unit completes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key-value state bag plus named child scopes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedState {
    #[serde(
        rename = "$scopes",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    scopes: BTreeMap<String, SharedState>,

    #[serde(flatten)]
    values: BTreeMap<String, Value>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.values.insert(key.into(), value.into())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Whether `key` is present and holds a "truthy" value.
    ///
    /// `null`, `false`, `0`, `""`, `[]` and `{}` are falsy, as is a missing key.
    pub fn is_truthy(&self, key: &str) -> bool {
        self.values.get(key).is_some_and(is_truthy)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.scopes.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Named child scope, if any unit has written into it.
    pub fn scope(&self, name: &str) -> Option<&SharedState> {
        self.scopes.get(name)
    }

    pub fn scope_names(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(|k| k.as_str())
    }

    /// Snapshot for a unit applied onto the child scope `name`: the shared
    /// values with that scope's own values layered on top.
    pub fn layered(&self, name: &str) -> SharedState {
        let mut view = SharedState {
            scopes: BTreeMap::new(),
            values: self.values.clone(),
        };
        if let Some(scope) = self.scopes.get(name) {
            for (k, v) in scope.values.iter() {
                view.values.insert(k.clone(), v.clone());
            }
        }
        view
    }

    /// Fold a delta into this bag. Later writes win.
    pub fn merge(&mut self, delta: StateDelta) {
        for (k, v) in delta.values {
            self.values.insert(k, v);
        }
        for (name, child) in delta.scopes {
            self.scopes.entry(name).or_default().merge(child);
        }
    }

    /// Fold a delta into the child scope `name`, creating it if needed.
    pub fn merge_into_scope(&mut self, name: &str, delta: StateDelta) {
        self.scopes.entry(name.to_string()).or_default().merge(delta);
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for SharedState {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut state = SharedState::new();
        for (k, v) in iter {
            state.insert(k, v);
        }
        state
    }
}

/// Partial update produced by one unit (or by evaluating a computed
/// configuration value), merged into the shared state by the orchestrator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDelta {
    values: BTreeMap<String, Value>,
    scopes: BTreeMap<String, StateDelta>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.scopes.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    pub fn scope(&self, name: &str) -> Option<&StateDelta> {
        self.scopes.get(name)
    }

    /// Fold a later delta into this one. Later writes win.
    pub fn absorb(&mut self, later: StateDelta) {
        self.values.extend(later.values);
        for (name, child) in later.scopes {
            self.scopes.entry(name).or_default().absorb(child);
        }
    }

    /// Fold a later delta into the child scope `name`.
    pub fn absorb_into_scope(&mut self, name: &str, later: StateDelta) {
        self.scopes.entry(name.to_string()).or_default().absorb(later);
    }
}

/// Result of evaluating a computed configuration entry against the shared
/// state: the value itself plus whatever state the evaluation produced.
#[derive(Debug, Clone)]
pub struct Evaluated<T> {
    pub value: T,
    pub delta: StateDelta,
}

impl<T> Evaluated<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            delta: StateDelta::new(),
        }
    }

    pub fn with_delta(value: T, delta: StateDelta) -> Self {
        Self { value, delta }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
