//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;
use hearth_core::ConfigurationError;
use hearth_framework::DispatchError;

/// Errors raised while assembling or driving an [`Application`](crate::Application).
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Container or route setup defect.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Endpoint already registered: {0}")]
    DuplicateEndpoint(String),

    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
