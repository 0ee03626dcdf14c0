//! # Hearth Runtime
//!
//! Everything around the dispatch core that an application needs at startup:
//! - [`config`]: figment-based loading of [`HearthConfig`] from defaults,
//!   `hearth.toml` and `HEARTH_*` variables, plus validation
//! - [`logging`]: `tracing-subscriber` setup driven by that configuration
//! - [`Application`]: a dependency container and its routes wired together
//!
//! ```rust,ignore
//! let app = Application::builder()
//!     .load_config(ConfigLoader::new())?
//!     .route("health", |r| r.on(Verb::Get, health).error_handlers(errors()))
//!     .build()?;
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod logging;

pub use app::{Application, ApplicationBuilder};
pub use config::{ConfigError, ConfigLoader, ConfigResult, HearthConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for application code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
