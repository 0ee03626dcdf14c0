//! # Hearth Framework
//!
//! Request dispatch for the Hearth request framework.
//!
//! This layer provides:
//! - [`Route`]: the per-endpoint hook chain (user loader, before-hooks,
//!   handler, after-hooks) with typed error routing and teardown
//! - Hook traits plus closure adapters for each stage
//! - [`Exchange`]: the per-request object carrying the payload, identity,
//!   injected dependencies and the response being built
//! - [`OffloadExecutor`]: a bounded pool for blocking work
//! - [`RouteService`]: a `tower::Service` wrapper around a route
//!
//! Dependency injection itself comes from `hearth-core`.

pub mod body;
pub mod error;
pub mod exchange;
pub mod hooks;
pub mod method;
pub mod offload;
pub mod route;
pub mod service;

pub use body::{BodyDecoder, ParseOptions};
pub use error::{
    BodyError, DispatchError, DispatchResult, ErrorKind, HookError, HookResult, OffloadError,
    ParseVerbError,
};
pub use exchange::{Exchange, RawRequest, Response};
pub use hooks::{
    AfterHook, BeforeHook, ErrorHandler, ErrorHandlers, FnErrorHandler, FnHandler, FnHook,
    Handler, HookFuture, Identity, SyncHook, TeardownHook, TeardownPolicy, UserLoader,
};
pub use method::{EndpointDefinition, MethodDefinition, PathArgs, Verb};
pub use offload::OffloadExecutor;
pub use route::{Outcome, Route, RouteBuilder, Stage, status_handler};
pub use service::{Inbound, RouteService};
