//! Hook traits for the dispatch chain.
//!
//! Every stage of a request is pluggable:
//!
//! | Stage        | Trait            | Short-circuits on failure |
//! |--------------|------------------|---------------------------|
//! | user load    | [`UserLoader`]   | yes                       |
//! | before       | [`BeforeHook`]   | yes                       |
//! | handler      | [`Handler`]      | yes                       |
//! | after        | [`AfterHook`]    | yes                       |
//! | error        | [`ErrorHandler`] | infallible                |
//! | teardown     | [`TeardownHook`] | no, failures are logged   |
//!
//! Each trait can be implemented on a struct, or supplied as a closure
//! returning a boxed future through the `FnHook`-style wrappers the route
//! builder applies for you:
//!
//! ```rust,ignore
//! RouteBuilder::new("orders")
//!     .before(|ex, method| Box::pin(async move {
//!         if method.get_attr("auth_required").is_some() && ex.user().is_none() {
//!             return Err(HookError::custom(Unauthorized));
//!         }
//!         Ok(())
//!     }))
//!     .before_sync(|ex, _| { ex.set_header("x-served-by", "hearth"); Ok(()) });
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, HookError, HookResult};
use crate::exchange::Exchange;
use crate::method::{MethodDefinition, PathArgs};

/// Boxed future returned by closure hooks.
pub type HookFuture<'a, T> = BoxFuture<'a, HookResult<T>>;

// ============================================================================
// Identity
// ============================================================================

/// The authenticated principal produced by a [`UserLoader`].
#[derive(Clone)]
pub struct Identity(Arc<dyn Any + Send + Sync>);

impl Identity {
    pub fn new<T: Send + Sync + 'static>(user: T) -> Self {
        Self(Arc::new(user))
    }

    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Identity(..)")
    }
}

// ============================================================================
// Hook traits
// ============================================================================

/// Loads the current user before any other hook runs.
///
/// `Ok(None)` means anonymous; the exchange's user stays unset.
#[async_trait]
pub trait UserLoader: Send + Sync {
    async fn load(
        &self,
        exchange: &mut Exchange,
        method: &MethodDefinition,
    ) -> HookResult<Option<Identity>>;
}

#[async_trait]
pub trait BeforeHook: Send + Sync {
    async fn before(&self, exchange: &mut Exchange, method: &MethodDefinition) -> HookResult<()>;
}

#[async_trait]
pub trait AfterHook: Send + Sync {
    async fn after(&self, exchange: &mut Exchange, method: &MethodDefinition) -> HookResult<()>;
}

/// Runs after the error handler, or after every request under
/// [`TeardownPolicy::Always`].
#[async_trait]
pub trait TeardownHook: Send + Sync {
    async fn teardown(&self, exchange: &mut Exchange, method: &MethodDefinition)
    -> HookResult<()>;
}

/// The function bound to a verb.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn call(&self, exchange: &mut Exchange, args: &PathArgs) -> HookResult<()>;
}

/// Turns a failure into a response. Error handlers cannot fail; anything
/// they need to report goes into the exchange's response.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle(&self, exchange: &mut Exchange, error: &HookError);
}

// ============================================================================
// Closure adapters
// ============================================================================

/// Adapts an async closure to the hook traits.
pub struct FnHook<F>(pub F);

#[async_trait]
impl<F> UserLoader for FnHook<F>
where
    F: for<'a> Fn(&'a mut Exchange, &'a MethodDefinition) -> HookFuture<'a, Option<Identity>>
        + Send
        + Sync,
{
    async fn load(
        &self,
        exchange: &mut Exchange,
        method: &MethodDefinition,
    ) -> HookResult<Option<Identity>> {
        (self.0)(exchange, method).await
    }
}

#[async_trait]
impl<F> BeforeHook for FnHook<F>
where
    F: for<'a> Fn(&'a mut Exchange, &'a MethodDefinition) -> HookFuture<'a, ()> + Send + Sync,
{
    async fn before(&self, exchange: &mut Exchange, method: &MethodDefinition) -> HookResult<()> {
        (self.0)(exchange, method).await
    }
}

#[async_trait]
impl<F> AfterHook for FnHook<F>
where
    F: for<'a> Fn(&'a mut Exchange, &'a MethodDefinition) -> HookFuture<'a, ()> + Send + Sync,
{
    async fn after(&self, exchange: &mut Exchange, method: &MethodDefinition) -> HookResult<()> {
        (self.0)(exchange, method).await
    }
}

#[async_trait]
impl<F> TeardownHook for FnHook<F>
where
    F: for<'a> Fn(&'a mut Exchange, &'a MethodDefinition) -> HookFuture<'a, ()> + Send + Sync,
{
    async fn teardown(
        &self,
        exchange: &mut Exchange,
        method: &MethodDefinition,
    ) -> HookResult<()> {
        (self.0)(exchange, method).await
    }
}

/// Adapts a synchronous closure to the hook traits.
pub struct SyncHook<F>(pub F);

#[async_trait]
impl<F> UserLoader for SyncHook<F>
where
    F: Fn(&mut Exchange, &MethodDefinition) -> HookResult<Option<Identity>> + Send + Sync,
{
    async fn load(
        &self,
        exchange: &mut Exchange,
        method: &MethodDefinition,
    ) -> HookResult<Option<Identity>> {
        (self.0)(exchange, method)
    }
}

#[async_trait]
impl<F> BeforeHook for SyncHook<F>
where
    F: Fn(&mut Exchange, &MethodDefinition) -> HookResult<()> + Send + Sync,
{
    async fn before(&self, exchange: &mut Exchange, method: &MethodDefinition) -> HookResult<()> {
        (self.0)(exchange, method)
    }
}

#[async_trait]
impl<F> AfterHook for SyncHook<F>
where
    F: Fn(&mut Exchange, &MethodDefinition) -> HookResult<()> + Send + Sync,
{
    async fn after(&self, exchange: &mut Exchange, method: &MethodDefinition) -> HookResult<()> {
        (self.0)(exchange, method)
    }
}

#[async_trait]
impl<F> TeardownHook for SyncHook<F>
where
    F: Fn(&mut Exchange, &MethodDefinition) -> HookResult<()> + Send + Sync,
{
    async fn teardown(
        &self,
        exchange: &mut Exchange,
        method: &MethodDefinition,
    ) -> HookResult<()> {
        (self.0)(exchange, method)
    }
}

pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: for<'a> Fn(&'a mut Exchange, &'a PathArgs) -> HookFuture<'a, ()> + Send + Sync,
{
    async fn call(&self, exchange: &mut Exchange, args: &PathArgs) -> HookResult<()> {
        (self.0)(exchange, args).await
    }
}

pub struct FnErrorHandler<F>(pub F);

#[async_trait]
impl<F> ErrorHandler for FnErrorHandler<F>
where
    F: for<'a> Fn(&'a mut Exchange, &'a HookError) -> BoxFuture<'a, ()> + Send + Sync,
{
    async fn handle(&self, exchange: &mut Exchange, error: &HookError) {
        (self.0)(exchange, error).await
    }
}

// ============================================================================
// ErrorHandlers
// ============================================================================

/// Error-kind to handler table with a mandatory fallback.
///
/// Selection is by exact kind; there is no walk up an error hierarchy.
/// Anything without an exact match goes to the fallback.
#[derive(Clone)]
pub struct ErrorHandlers {
    by_kind: HashMap<ErrorKind, Arc<dyn ErrorHandler>>,
    fallback: Arc<dyn ErrorHandler>,
}

impl ErrorHandlers {
    /// Creates a table whose fallback is the given closure.
    pub fn new<F>(fallback: F) -> Self
    where
        F: for<'a> Fn(&'a mut Exchange, &'a HookError) -> BoxFuture<'a, ()>
            + Send
            + Sync
            + 'static,
    {
        Self::with_fallback(FnErrorHandler(fallback))
    }

    pub fn with_fallback(fallback: impl ErrorHandler + 'static) -> Self {
        Self {
            by_kind: HashMap::new(),
            fallback: Arc::new(fallback),
        }
    }

    /// Handles application errors of type `E`.
    pub fn on<E, F>(self, handler: F) -> Self
    where
        E: 'static,
        F: for<'a> Fn(&'a mut Exchange, &'a HookError) -> BoxFuture<'a, ()>
            + Send
            + Sync
            + 'static,
    {
        self.on_kind(ErrorKind::of::<E>(), handler)
    }

    pub fn on_kind<F>(self, kind: ErrorKind, handler: F) -> Self
    where
        F: for<'a> Fn(&'a mut Exchange, &'a HookError) -> BoxFuture<'a, ()>
            + Send
            + Sync
            + 'static,
    {
        self.on_kind_handler(kind, FnErrorHandler(handler))
    }

    pub fn on_kind_handler(mut self, kind: ErrorKind, handler: impl ErrorHandler + 'static) -> Self {
        self.by_kind.insert(kind, Arc::new(handler));
        self
    }

    /// Returns the handler for `kind` and whether it is the fallback.
    pub fn select(&self, kind: ErrorKind) -> (&Arc<dyn ErrorHandler>, bool) {
        match self.by_kind.get(&kind) {
            Some(handler) => (handler, false),
            None => (&self.fallback, true),
        }
    }

    pub fn handles(&self, kind: ErrorKind) -> bool {
        self.by_kind.contains_key(&kind)
    }
}

impl fmt::Debug for ErrorHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHandlers")
            .field("kinds", &self.by_kind.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TeardownPolicy
// ============================================================================

/// When teardown hooks run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeardownPolicy {
    /// Only after a failure has been routed to an error handler.
    #[default]
    OnError,
    /// After every request.
    Always,
}

impl TeardownPolicy {
    pub fn runs_after(self, failed: bool) -> bool {
        failed || self == TeardownPolicy::Always
    }
}

impl fmt::Display for TeardownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeardownPolicy::OnError => f.write_str("on-error"),
            TeardownPolicy::Always => f.write_str("always"),
        }
    }
}
