//! Error types for the ARNav environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// No async runtime is available to drive background work
    #[error("No runtime available: {0}")]
    RuntimeUnavailable(String),
}

impl EnvError {
    /// Creates a runtime-unavailable error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::RuntimeUnavailable(msg.into())
    }
}
