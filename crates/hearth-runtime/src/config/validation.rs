//! Configuration validation.

use super::error::{ConfigError, ConfigResult};
use super::schema::{HearthConfig, LogFormat, LogOutput, LoggingConfig};

/// Validates the entire configuration.
///
/// Unknown level names are already rejected while extracting; this covers
/// the cross-field rules serde cannot express.
pub fn validate_config(config: &HearthConfig) -> ConfigResult<()> {
    validate_logging(&config.logging)?;

    if config.offload.max_blocking == 0 {
        return Err(ConfigError::validation(
            "offload.max_blocking must be greater than 0",
        ));
    }

    if !config.settings.is_object() {
        return Err(ConfigError::validation("settings must be a table"));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output = \"file\"",
        ));
    }

    if logging.format == LogFormat::Json && !cfg!(feature = "json-log") {
        return Err(ConfigError::validation(
            "logging.format = \"json\" requires the json-log feature",
        ));
    }

    for module in logging.filters.keys() {
        if module.is_empty() || module.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid logging filter target: {module:?}"
            )));
        }
    }

    Ok(())
}
