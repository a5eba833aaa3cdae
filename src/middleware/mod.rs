// src/middleware/mod.rs

//! Middlewares: the work carried by each scheduled unit.
//!
//! - [`registry`] maps type tags from configuration to factories.
//! - [`builtin`] provides the small state-manipulating middlewares.
//! - [`shell`] runs a shell command and stores its output.
//!
//! A middleware receives an owned snapshot of the shared state and returns
//! a [`StateDelta`]; it never touches the shared bag directly.

pub mod builtin;
pub mod registry;
pub mod shell;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::MiddlewareSpec;
use crate::dag::Identify;
use crate::state::{SharedState, StateDelta};
use crate::types::ApplyMethod;

pub use registry::{MiddlewareFactory, MiddlewareRegistry};

/// Boxed, sendable future used at the trait seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait Middleware: Send + Sync + fmt::Debug {
    /// Registry type tag this middleware answers to.
    fn kind(&self) -> &str;

    /// Apply against a snapshot of the shared state and return the update.
    fn apply(&self, state: SharedState) -> BoxFuture<'_, anyhow::Result<StateDelta>>;
}

/// A middleware instance plus how its result is applied: the payload of a
/// scheduled unit.
#[derive(Debug, Clone)]
pub struct BoundMiddleware {
    middleware: Arc<dyn Middleware>,
    apply_method: ApplyMethod,
    name: Option<String>,
    key: Option<String>,
}

impl BoundMiddleware {
    pub fn new(middleware: Arc<dyn Middleware>, apply_method: ApplyMethod) -> Self {
        Self {
            middleware,
            apply_method,
            name: None,
            key: None,
        }
    }

    /// Bind using the identifiers and apply method declared in `spec`.
    pub fn from_spec(middleware: Arc<dyn Middleware>, spec: &MiddlewareSpec) -> Self {
        Self {
            middleware,
            apply_method: spec.apply_method(),
            name: spec.name.clone(),
            key: spec.key.clone(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn middleware(&self) -> &Arc<dyn Middleware> {
        &self.middleware
    }

    pub fn apply_method(&self) -> ApplyMethod {
        self.apply_method
    }

    pub fn kind(&self) -> &str {
        self.middleware.kind()
    }
}

impl Identify for BoundMiddleware {
    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }
}
