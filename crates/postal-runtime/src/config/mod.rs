//! Configuration module for the Postal runtime.
//!
//! Layered loading with figment, serde schema types for logging and buses,
//! and validation of the merged result.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    BusConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, PostalConfig,
    SpanEventConfig,
};
pub use validation::validate_config;
