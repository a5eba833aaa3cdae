// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MiddagError {
    /// Malformed declarative input, detected before any unit executes.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Cyclic or otherwise unsatisfiable dependency graph.
    #[error("Scheduling error: {0}")]
    Scheduling(String),

    /// A middleware's own logic failed while applying a unit.
    #[error("Unit '{unit}' failed: {source:#}")]
    UnitExecution {
        unit: String,
        #[source]
        source: anyhow::Error,
    },

    /// A unit's task panicked or was torn down before reporting back.
    #[error("Unit task aborted abnormally: {0}")]
    UnitPanicked(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MiddagError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        MiddagError::Configuration(msg.into())
    }

    pub(crate) fn scheduling(msg: impl Into<String>) -> Self {
        MiddagError::Scheduling(msg.into())
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, MiddagError>;
