//! Error types for the replay harness.

use arnav_core::guidance::GuidanceError;
use arnav_core::{ConfigError, LoopError};

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("Walker path needs at least one waypoint")]
    EmptyPath,

    #[error("Scenario route is invalid: {0}")]
    Route(#[from] GuidanceError),

    #[error("Tick rate must be positive, got {0}")]
    InvalidRate(f64),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Loop(#[from] LoopError),

    #[error("Export failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}
