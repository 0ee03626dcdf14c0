//! Configuration for a Hearth application.
//!
//! Loading is layered through figment (defaults, TOML files, `HEARTH_*`
//! environment variables) and finishes with [`validate_config`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    DispatchConfig, HearthConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    OffloadConfig, SpanEventConfig,
};
pub use validation::validate_config;
