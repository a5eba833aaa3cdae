// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::RawPipelineConfig;
use crate::config::pipeline::PipelineConfig;
use crate::errors::{MiddagError, Result};
use crate::state::SharedState;

/// Load a pipeline file and return the raw `RawPipelineConfig`.
///
/// This only performs TOML deserialization; it does **not** check
/// dependencies or the plan. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawPipelineConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawPipelineConfig = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a pipeline file and normalize it into a [`PipelineConfig`].
///
/// - Reads TOML.
/// - Applies the default plan (sequential) when none is given.
/// - Rejects unknown references, self-dependencies and cycles.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<PipelineConfig> {
    let raw_config = load_from_path(&path)?;
    let config = PipelineConfig::try_from(raw_config)?;
    Ok(config)
}

/// Load an initial state bag from a JSON object file.
pub fn load_state_from_path(path: impl AsRef<Path>) -> Result<SharedState> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let value: serde_json::Value = serde_json::from_str(&contents)?;
    if !value.is_object() {
        return Err(MiddagError::config(format!(
            "initial state in '{}' must be a JSON object",
            path.display()
        )));
    }

    Ok(serde_json::from_value(value)?)
}

/// `Middag.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Middag.toml")
}
