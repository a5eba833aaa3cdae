// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// How a unit's result is folded back into the shared state.
///
/// - `Into`: the middleware's delta is merged straight into the shared bag
///   (default behaviour).
/// - `Onto`: the middleware runs in a fresh child scope named after the unit,
///   layered over the shared bag; its delta lands in that scope only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplyMethod {
    Into,
    Onto,
}

impl Default for ApplyMethod {
    fn default() -> Self {
        ApplyMethod::Into
    }
}

impl FromStr for ApplyMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "into" => Ok(ApplyMethod::Into),
            "onto" => Ok(ApplyMethod::Onto),
            other => Err(format!(
                "invalid apply method: {other} (expected \"into\" or \"onto\")"
            )),
        }
    }
}

impl fmt::Display for ApplyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApplyMethod::Into => f.write_str("into"),
            ApplyMethod::Onto => f.write_str("onto"),
        }
    }
}
