// src/middleware/registry.rs

//! Explicit `type tag -> factory` registry for middlewares.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::MiddlewareSpec;
use crate::errors::{MiddagError, Result};
use crate::middleware::{BoundMiddleware, Middleware};

/// Builds a middleware from its declaration. The registry is passed along
/// so composite middlewares can build their children.
pub type MiddlewareFactory = Arc<
    dyn Fn(&MiddlewareSpec, &MiddlewareRegistry) -> anyhow::Result<Arc<dyn Middleware>>
        + Send
        + Sync,
>;

#[derive(Clone, Default)]
pub struct MiddlewareRegistry {
    factories: BTreeMap<String, MiddlewareFactory>,
}

impl fmt::Debug for MiddlewareRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareRegistry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MiddlewareRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every middleware shipped by this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::middleware::builtin::register(&mut registry);
        crate::middleware::shell::register(&mut registry);
        crate::engine::orchestrator::register(&mut registry);
        registry
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&MiddlewareSpec, &MiddlewareRegistry) -> anyhow::Result<Arc<dyn Middleware>>
            + Send
            + Sync
            + 'static,
    {
        let kind = kind.into();
        debug!(kind = %kind, "registering middleware factory");
        self.factories.insert(kind, Arc::new(factory));
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(|k| k.as_str())
    }

    /// Instantiate the middleware declared by `spec`.
    pub fn create(&self, spec: &MiddlewareSpec) -> Result<Arc<dyn Middleware>> {
        let kind = spec.kind.as_deref().ok_or_else(|| {
            MiddagError::config(format!(
                "middleware entry {} has no `kind`",
                spec.display_name()
            ))
        })?;

        let factory = self.factories.get(kind).ok_or_else(|| {
            MiddagError::config(format!(
                "unknown middleware kind '{}' (known: {})",
                kind,
                self.kinds().collect::<Vec<_>>().join(", ")
            ))
        })?;

        factory(spec, self).map_err(|e| {
            MiddagError::config(format!(
                "invalid `{kind}` middleware {}: {e:#}",
                spec.display_name()
            ))
        })
    }

    /// Instantiate and bind with the entry's identifiers and apply method.
    pub fn bind(&self, spec: &MiddlewareSpec) -> Result<BoundMiddleware> {
        let middleware = self.create(spec)?;
        Ok(BoundMiddleware::from_spec(middleware, spec))
    }
}
