//! Runtime error types.

use postal_core::ConfigurationError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur while composing buses.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Loading or validating configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A bus failed to build.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A bus lists a middleware with no registered factory.
    #[error("Bus '{bus}' uses unknown middleware '{name}'")]
    UnknownMiddleware { bus: String, name: String },

    /// A bus with this name already exists.
    #[error("Bus already exists: {0}")]
    DuplicateBus(String),

    /// Bus not found.
    #[error("Bus not found: {0}")]
    BusNotFound(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
