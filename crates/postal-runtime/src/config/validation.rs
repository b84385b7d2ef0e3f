//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{BusConfig, LogOutput, LoggingConfig, PostalConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &PostalConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;

    for (name, bus) in &config.buses {
        validate_bus_config(name, bus)?;
    }

    if let Some(default_bus) = &config.default_bus
        && !config.buses.contains_key(default_bus)
    {
        return Err(ConfigError::UnknownDefaultBus(default_bus.clone()));
    }

    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File
        && logging
            .file_path
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
    {
        return Err(ConfigError::validation("Log file path must not be empty"));
    }

    if let Some(target) = logging.filters.keys().find(|t| t.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Invalid log filter target: {target:?}"
        )));
    }

    Ok(())
}

/// Validates a single bus.
fn validate_bus_config(name: &str, bus: &BusConfig) -> ConfigResult<()> {
    if name.trim().is_empty() {
        return Err(ConfigError::validation("Bus name must not be empty"));
    }

    if name.chars().any(char::is_whitespace) {
        return Err(ConfigError::validation(format!(
            "Bus name cannot contain whitespace: {name:?}"
        )));
    }

    let mut seen = HashSet::new();
    for middleware in &bus.middleware {
        if middleware.trim().is_empty() {
            return Err(ConfigError::validation(format!(
                "Bus '{name}' lists an empty middleware name"
            )));
        }
        if !seen.insert(middleware.as_str()) {
            return Err(ConfigError::validation(format!(
                "Bus '{name}' lists middleware '{middleware}' twice"
            )));
        }
    }

    Ok(())
}
