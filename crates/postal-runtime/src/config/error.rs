use std::path::PathBuf;

use thiserror::Error;

/// Failure to load or validate a [`PostalConfig`](super::PostalConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file {0} does not exist")]
    FileNotFound(PathBuf),

    /// Unknown extension, or its format feature is disabled.
    #[error("unsupported config file extension '.{0}'")]
    UnsupportedFormat(String),

    /// The merged sources do not deserialize into the schema.
    #[error("malformed configuration: {0}")]
    ParseError(String),

    #[error("invalid configuration: {message}")]
    ValidationError { message: String },

    #[error("default bus '{0}' is not configured")]
    UnknownDefaultBus(String),
}

impl ConfigError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
