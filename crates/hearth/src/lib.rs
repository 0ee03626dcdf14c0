//! # Hearth
//!
//! Dependency injection and hook-chain request dispatch for async Rust
//! services.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────────┐   ┌──────────────────────────────────────────────┐
//! │  server  │──▶│ ContextInjector │──▶│ Route: user loader → before → handler → after │
//! │ (tower)  │   │ (Container)     │   │        └─ on failure: error handler → teardown │
//! └──────────┘   └─────────────────┘   └──────────────────────────────────────────────┘
//! ```
//!
//! - **Container**: named async factories, singleton or prototype, resolved
//!   recursively with cycle detection
//! - **ContextInjector**: attaches every registered dependency to each request
//! - **Route**: the per-endpoint hook chain with typed error routing
//! - **Application**: configuration, logging and routes wired together
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hearth::prelude::*;
//!
//! let app = Application::builder()
//!     .load_config(ConfigLoader::new())?
//!     .register(|c| {
//!         c.singleton("greeting", Vec::<String>::new(), |_| async { Ok(String::from("hi")) })?;
//!         Ok(())
//!     })?
//!     .route("hello", |r| {
//!         r.on(Verb::Get, |ex, _| Box::pin(async move {
//!             let greeting = ex.dependency::<String>("greeting")?;
//!             ex.write(greeting.as_bytes());
//!             Ok(())
//!         }))
//!         .error_handlers(ErrorHandlers::new(status_handler(500)))
//!     })
//!     .build()?;
//! ```
//!
//! ## Features
//!
//! - `toml-config`: load `hearth.toml` files (default)
//! - `json-log`: JSON log output

pub use hearth_core as core;
pub use hearth_framework as framework;
pub use hearth_runtime as runtime;

/// Commonly used types.
pub mod prelude {
    // Application entry point
    pub use hearth_runtime::{Application, ConfigLoader, HearthConfig, RuntimeError};

    // Dependency injection
    pub use hearth_core::{
        Component, Container, ContainerBuilder, ContainerError, ContextInjector, Dependencies,
        RequestContext, Strategy,
    };

    // Dispatch
    pub use hearth_framework::{
        ErrorHandlers, ErrorKind, Exchange, HookError, HookResult, Identity, MethodDefinition,
        ParseOptions, PathArgs, RawRequest, Response, Route, RouteBuilder, TeardownPolicy, Verb,
        status_handler,
    };
}
