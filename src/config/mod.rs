// src/config/mod.rs

//! Pipeline configuration.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Define the canonical, validated form and its builder (`pipeline.rs`).
//! - Load a pipeline file from disk (`loader.rs`).
//! - Validate references, plans and DAG correctness (`validate.rs`).

pub mod loader;
pub mod model;
pub mod pipeline;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_state_from_path};
pub use model::{MiddlewareSpec, RawDependency, RawIdentifier, RawPipelineConfig};
pub use pipeline::{
    ConcurrencySource, Plan, PipelineConfig, PipelineConfigBuilder, SchedulingPlan,
    SchedulingSource, StateFn, ValueSource,
};
