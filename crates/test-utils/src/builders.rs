#![allow(dead_code)]

use serde_json::{Value, json};

use middag::config::{
    MiddlewareSpec, PipelineConfig, RawDependency, RawIdentifier, RawPipelineConfig,
};

/// `record` entry named `name` that sleeps `ms` milliseconds.
pub fn record(name: &str, ms: u64) -> MiddlewareSpec {
    MiddlewareSpec::new("record")
        .with_name(name)
        .with_params(json!({ "ms": ms }))
}

/// `record` entry that also writes `key = value` into the state.
pub fn record_setting(name: &str, ms: u64, key: &str, value: Value) -> MiddlewareSpec {
    MiddlewareSpec::new("record")
        .with_name(name)
        .with_params(json!({ "ms": ms, "set": { key: value } }))
}

/// `failing` entry named `name` that fails after `ms` milliseconds.
pub fn failing(name: &str, ms: u64) -> MiddlewareSpec {
    MiddlewareSpec::new("failing")
        .with_name(name)
        .with_params(json!({ "ms": ms }))
}

/// Builder for `RawPipelineConfig` to simplify test setup.
pub struct PipelineBuilder {
    config: RawPipelineConfig,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            config: RawPipelineConfig {
                value: Some(Vec::new()),
                ..Default::default()
            },
        }
    }

    pub fn with_unit(mut self, spec: MiddlewareSpec) -> Self {
        self.config.value.get_or_insert_with(Vec::new).push(spec);
        self
    }

    /// `dependent` runs after `prerequisite` (both by name).
    pub fn after(self, dependent: &str, prerequisite: &str) -> Self {
        self.with_dependency(RawDependency {
            dependent: RawIdentifier::Name(dependent.to_string()),
            prerequisite: RawIdentifier::Name(prerequisite.to_string()),
            when: None,
            unless: None,
            group: None,
        })
    }

    pub fn with_dependency(mut self, dependency: RawDependency) -> Self {
        self.config
            .scheduling
            .get_or_insert_with(Vec::new)
            .push(dependency);
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = Some(n);
        self
    }

    pub fn stacked(mut self, kind: &str) -> Self {
        self.config.stack = Some(kind.to_string());
        self
    }

    pub fn raw(self) -> RawPipelineConfig {
        self.config
    }

    pub fn build(self) -> PipelineConfig {
        PipelineConfig::try_from(self.config).expect("Failed to build valid pipeline from builder")
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Dependency edge with optional condition keys and group.
pub struct DependencyBuilder {
    dependency: RawDependency,
}

impl DependencyBuilder {
    pub fn new(dependent: &str, prerequisite: &str) -> Self {
        Self {
            dependency: RawDependency {
                dependent: RawIdentifier::Name(dependent.to_string()),
                prerequisite: RawIdentifier::Name(prerequisite.to_string()),
                when: None,
                unless: None,
                group: None,
            },
        }
    }

    pub fn when(mut self, key: &str) -> Self {
        self.dependency.when = Some(key.to_string());
        self
    }

    pub fn unless(mut self, key: &str) -> Self {
        self.dependency.unless = Some(key.to_string());
        self
    }

    pub fn group(mut self, group: &str) -> Self {
        self.dependency.group = Some(group.to_string());
        self
    }

    pub fn build(self) -> RawDependency {
        self.dependency
    }
}
