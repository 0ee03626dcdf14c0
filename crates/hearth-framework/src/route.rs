//! Hook-chain dispatch for one endpoint.
//!
//! A [`Route`] runs each request through a fixed sequence:
//!
//! 1. user loader (if any); its result becomes the exchange's user
//! 2. before-hooks, in registration order
//! 3. the handler bound to the request verb; a missing handler fails with
//!    [`HookError::MethodNotAllowed`]
//! 4. after-hooks, in registration order
//!
//! The first failure in any stage skips the rest of the sequence. It is
//! routed to exactly one error handler, chosen by exact [`ErrorKind`] with
//! a mandatory fallback, and then the teardown hooks run. A request that
//! completes normally skips teardown unless the route's
//! [`TeardownPolicy`] is [`Always`](TeardownPolicy::Always).
//!
//! ```rust,ignore
//! let route = RouteBuilder::new("orders")
//!     .app_context(injector)
//!     .on(Verb::Get, |ex, args| Box::pin(async move {
//!         let db = ex.dependency::<Db>("db")?;
//!         ex.write_json(200, &db.order(args.get(0))?)
//!     }))
//!     .error_handlers(ErrorHandlers::new(|ex, err| Box::pin(async move {
//!         ex.set_status(500);
//!         ex.write(err.to_string());
//!     })))
//!     .build()?;
//!
//! let response = route.handle(RawRequest::new(Verb::Get, "/orders/7"), PathArgs::new().push("7")).await?;
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{Instrument, Level, debug, error, span, warn};

use crate::error::{DispatchResult, ErrorKind, HookError, HookResult};
use crate::exchange::{Exchange, RawRequest, Response};
use crate::hooks::{
    AfterHook, BeforeHook, ErrorHandlers, FnHook, HookFuture, Identity, SyncHook, TeardownHook,
    TeardownPolicy, UserLoader,
};
use crate::method::{EndpointDefinition, MethodDefinition, PathArgs, Verb};
use crate::offload::OffloadExecutor;
use hearth_core::{ConfigurationError, ConfigurationResult, ContextInjector, Instance};

// ============================================================================
// Stage / Outcome
// ============================================================================

/// Chain stage in which a failure was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    UserLoad,
    BeforeHooks,
    Handler,
    AfterHooks,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::UserLoad => "user_load",
            Stage::BeforeHooks => "before_hooks",
            Stage::Handler => "handler",
            Stage::AfterHooks => "after_hooks",
        })
    }
}

/// How a dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed {
        stage: Stage,
        kind: ErrorKind,
        /// The fallback handler was used.
        fallback: bool,
    },
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

// ============================================================================
// Route
// ============================================================================

/// One endpoint's hook chain, verb table and per-route configuration.
pub struct Route {
    endpoint: Arc<str>,
    definition: EndpointDefinition,
    user_loader: Option<Arc<dyn UserLoader>>,
    before: Vec<Arc<dyn BeforeHook>>,
    after: Vec<Arc<dyn AfterHook>>,
    teardown: Vec<Arc<dyn TeardownHook>>,
    errors: ErrorHandlers,
    teardown_policy: TeardownPolicy,
    injector: Arc<ContextInjector>,
    offload: Option<OffloadExecutor>,
    caches: Arc<HashMap<String, Instance>>,
    settings: Arc<Value>,
}

impl Route {
    pub fn builder(endpoint: impl Into<String>) -> RouteBuilder {
        RouteBuilder::new(endpoint)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn definition(&self) -> &EndpointDefinition {
        &self.definition
    }

    pub fn teardown_policy(&self) -> TeardownPolicy {
        self.teardown_policy
    }

    /// Serves one request.
    ///
    /// Injection runs before the chain; if it fails the request is aborted
    /// with a [`DispatchError`](crate::DispatchError) and no hook sees it.
    pub async fn handle(&self, request: RawRequest, args: PathArgs) -> DispatchResult<Response> {
        let (response, _) = self.handle_with_outcome(request, args).await?;
        Ok(response)
    }

    /// Like [`handle`](Self::handle), also reporting how the chain ended.
    pub async fn handle_with_outcome(
        &self,
        request: RawRequest,
        args: PathArgs,
    ) -> DispatchResult<(Response, Outcome)> {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            endpoint = %self.endpoint,
            verb = %request.verb(),
            path = request.path()
        );

        async move {
            let mut exchange = self.exchange(request);
            self.injector.inject(exchange.context_mut()).await?;
            let outcome = self.dispatch(&mut exchange, &args).await;
            Ok((exchange.into_response(), outcome))
        }
        .instrument(span)
        .await
    }

    /// Creates the exchange a request runs with.
    pub fn exchange(&self, request: RawRequest) -> Exchange {
        Exchange::for_route(
            Arc::clone(&self.endpoint),
            request,
            Arc::clone(&self.caches),
            Arc::clone(&self.settings),
            self.offload.clone(),
        )
    }

    /// Runs the hook chain on an already-populated exchange.
    pub async fn dispatch(&self, exchange: &mut Exchange, args: &PathArgs) -> Outcome {
        let verb = exchange.request().verb();
        let unbound;
        let method = match self.definition.get(verb) {
            Some(method) => method,
            None => {
                unbound = MethodDefinition::new(verb);
                &unbound
            }
        };

        let outcome = match self.run_chain(exchange, method, args).await {
            Ok(()) => Outcome::Completed,
            Err((stage, error)) => self.route_error(exchange, stage, error).await,
        };

        if self.teardown_policy.runs_after(outcome.is_failed()) {
            self.run_teardown(exchange, method).await;
        }

        debug!(outcome = ?outcome, status = exchange.response().status(), "Dispatch finished");
        outcome
    }

    async fn run_chain(
        &self,
        exchange: &mut Exchange,
        method: &MethodDefinition,
        args: &PathArgs,
    ) -> Result<(), (Stage, HookError)> {
        if let Some(loader) = &self.user_loader {
            let user = loader
                .load(exchange, method)
                .await
                .map_err(|e| (Stage::UserLoad, e))?;
            exchange.set_user(user);
        }

        for hook in &self.before {
            hook.before(exchange, method)
                .await
                .map_err(|e| (Stage::BeforeHooks, e))?;
        }

        let handler = method.handler_fn().ok_or((
            Stage::Handler,
            HookError::MethodNotAllowed {
                verb: method.verb(),
            },
        ))?;
        handler
            .call(exchange, args)
            .await
            .map_err(|e| (Stage::Handler, e))?;

        for hook in &self.after {
            hook.after(exchange, method)
                .await
                .map_err(|e| (Stage::AfterHooks, e))?;
        }

        Ok(())
    }

    async fn route_error(&self, exchange: &mut Exchange, stage: Stage, error: HookError) -> Outcome {
        let kind = error.kind();
        let (handler, fallback) = self.errors.select(kind);
        warn!(
            stage = %stage,
            kind = error.kind_name(),
            fallback,
            error = %error,
            "Request failed, routing to error handler"
        );
        handler.handle(exchange, &error).await;
        Outcome::Failed {
            stage,
            kind,
            fallback,
        }
    }

    async fn run_teardown(&self, exchange: &mut Exchange, method: &MethodDefinition) {
        for hook in &self.teardown {
            if let Err(e) = hook.teardown(exchange, method).await {
                error!(error = %e, "Teardown hook failed");
            }
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("endpoint", &self.endpoint)
            .field("allowed", &self.definition.allowed())
            .field("user_loader", &self.user_loader.is_some())
            .field("before", &self.before.len())
            .field("after", &self.after.len())
            .field("teardown", &self.teardown.len())
            .field("teardown_policy", &self.teardown_policy)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// RouteBuilder
// ============================================================================

/// Builder for [`Route`].
///
/// A route needs an application context and error handlers; [`build`]
/// fails without either.
///
/// [`build`]: RouteBuilder::build
pub struct RouteBuilder {
    endpoint: String,
    definition: EndpointDefinition,
    user_loader: Option<Arc<dyn UserLoader>>,
    before: Vec<Arc<dyn BeforeHook>>,
    after: Vec<Arc<dyn AfterHook>>,
    teardown: Vec<Arc<dyn TeardownHook>>,
    errors: Option<ErrorHandlers>,
    teardown_policy: TeardownPolicy,
    injector: Option<Arc<ContextInjector>>,
    offload: Option<OffloadExecutor>,
    caches: HashMap<String, Instance>,
    settings: Value,
}

impl RouteBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            definition: EndpointDefinition::new(),
            user_loader: None,
            before: Vec::new(),
            after: Vec::new(),
            teardown: Vec::new(),
            errors: None,
            teardown_policy: TeardownPolicy::default(),
            injector: None,
            offload: None,
            caches: HashMap::new(),
            settings: Value::Null,
        }
    }

    // ---- verbs ----

    pub fn method(mut self, method: MethodDefinition) -> Self {
        self.definition.insert(method);
        self
    }

    /// Binds an async closure to `verb`.
    pub fn on<F>(self, verb: Verb, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Exchange, &'a PathArgs) -> HookFuture<'a, ()>
            + Send
            + Sync
            + 'static,
    {
        self.method(MethodDefinition::new(verb).function(f))
    }

    // ---- hooks ----

    pub fn user_loader<F>(self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Exchange, &'a MethodDefinition) -> HookFuture<'a, Option<Identity>>
            + Send
            + Sync
            + 'static,
    {
        self.user_loader_hook(FnHook(f))
    }

    pub fn user_loader_sync<F>(self, f: F) -> Self
    where
        F: Fn(&mut Exchange, &MethodDefinition) -> HookResult<Option<Identity>>
            + Send
            + Sync
            + 'static,
    {
        self.user_loader_hook(SyncHook(f))
    }

    pub fn user_loader_hook(mut self, loader: impl UserLoader + 'static) -> Self {
        self.user_loader = Some(Arc::new(loader));
        self
    }

    pub fn before<F>(self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Exchange, &'a MethodDefinition) -> HookFuture<'a, ()>
            + Send
            + Sync
            + 'static,
    {
        self.before_hook(FnHook(f))
    }

    pub fn before_sync<F>(self, f: F) -> Self
    where
        F: Fn(&mut Exchange, &MethodDefinition) -> HookResult<()> + Send + Sync + 'static,
    {
        self.before_hook(SyncHook(f))
    }

    pub fn before_hook(mut self, hook: impl BeforeHook + 'static) -> Self {
        self.before.push(Arc::new(hook));
        self
    }

    pub fn after<F>(self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Exchange, &'a MethodDefinition) -> HookFuture<'a, ()>
            + Send
            + Sync
            + 'static,
    {
        self.after_hook(FnHook(f))
    }

    pub fn after_hook(mut self, hook: impl AfterHook + 'static) -> Self {
        self.after.push(Arc::new(hook));
        self
    }

    pub fn teardown<F>(self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Exchange, &'a MethodDefinition) -> HookFuture<'a, ()>
            + Send
            + Sync
            + 'static,
    {
        self.teardown_hook(FnHook(f))
    }

    pub fn teardown_hook(mut self, hook: impl TeardownHook + 'static) -> Self {
        self.teardown.push(Arc::new(hook));
        self
    }

    pub fn error_handlers(mut self, errors: ErrorHandlers) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn teardown_policy(mut self, policy: TeardownPolicy) -> Self {
        self.teardown_policy = policy;
        self
    }

    // ---- per-route configuration ----

    pub fn app_context(mut self, injector: Arc<ContextInjector>) -> Self {
        self.injector = Some(injector);
        self
    }

    pub fn offload_executor(mut self, executor: OffloadExecutor) -> Self {
        self.offload = Some(executor);
        self
    }

    /// Attaches a shared object readable through [`Exchange::cache`].
    pub fn cache<T: Send + Sync + 'static>(mut self, name: impl Into<String>, value: T) -> Self {
        self.caches
            .insert(name.into(), Arc::new(value) as Arc<dyn Any + Send + Sync>);
        self
    }

    pub fn settings(mut self, settings: Value) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> ConfigurationResult<Route> {
        let injector = self.injector.ok_or(ConfigurationError::MissingContext)?;
        let errors = self
            .errors
            .ok_or_else(|| ConfigurationError::MissingFallbackHandler {
                endpoint: self.endpoint.clone(),
            })?;

        debug!(
            endpoint = %self.endpoint,
            allowed = ?self.definition.allowed(),
            before = self.before.len(),
            after = self.after.len(),
            teardown = self.teardown.len(),
            "Route built"
        );

        Ok(Route {
            endpoint: Arc::from(self.endpoint),
            definition: self.definition,
            user_loader: self.user_loader,
            before: self.before,
            after: self.after,
            teardown: self.teardown,
            errors,
            teardown_policy: self.teardown_policy,
            injector,
            offload: self.offload,
            caches: Arc::new(self.caches),
            settings: Arc::new(self.settings),
        })
    }
}

/// Convenience for error handlers that only set a status and message.
pub fn status_handler(
    status: u16,
) -> impl for<'a> Fn(&'a mut Exchange, &'a HookError) -> BoxFuture<'a, ()> + Send + Sync + 'static
{
    move |exchange, error| {
        Box::pin(async move {
            exchange.set_status(status);
            let message = error.to_string();
            if let Err(e) = exchange.write_json(status, &serde_json::json!({ "error": message })) {
                error!(error = %e, status, "Failed to write error response");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::ContainerBuilder;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Log = Arc<Mutex<Vec<String>>>;

    #[derive(Debug, thiserror::Error)]
    #[error("kind x")]
    struct KindX;

    #[derive(Debug, thiserror::Error)]
    #[error("unauthorized")]
    struct Unauthorized;

    fn injector() -> Arc<ContextInjector> {
        let mut builder = ContainerBuilder::new();
        builder
            .singleton("greeting", Vec::<String>::new(), |_| async {
                Ok(String::from("hello"))
            })
            .unwrap();
        Arc::new(ContextInjector::new(Arc::new(builder.build().unwrap())))
    }

    fn recorder(
        log: &Log,
        tag: &'static str,
    ) -> impl Fn(&mut Exchange, &MethodDefinition) -> HookResult<()> + Send + Sync + 'static {
        let log = Arc::clone(log);
        move |_, _| {
            log.lock().push(tag.to_string());
            Ok(())
        }
    }

    fn fallback_table(log: &Log) -> ErrorHandlers {
        let log = Arc::clone(log);
        ErrorHandlers::new(move |ex, err| {
            log.lock().push(format!("default:{}", err.kind_name()));
            Box::pin(async move {
                ex.set_status(500);
            })
        })
    }

    fn traced_route(log: &Log) -> RouteBuilder {
        let teardown_log = Arc::clone(log);
        RouteBuilder::new("things")
            .app_context(injector())
            .before_sync(recorder(log, "before1"))
            .before_sync(recorder(log, "before2"))
            .after_hook(SyncHook(recorder(log, "after")))
            .teardown_hook(SyncHook(move |_: &mut Exchange, _: &MethodDefinition| {
                teardown_log.lock().push("teardown".to_string());
                Ok::<_, HookError>(())
            }))
            .error_handlers(fallback_table(log))
    }

    fn handler_logging(
        log: &Log,
    ) -> impl for<'a> Fn(&'a mut Exchange, &'a PathArgs) -> HookFuture<'a, ()> + Send + Sync + 'static
    {
        let log = Arc::clone(log);
        move |ex, _| {
            log.lock().push("handler".to_string());
            Box::pin(async move {
                let greeting = ex.dependency::<String>("greeting")?;
                ex.write(greeting.as_bytes());
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn successful_request_runs_chain_in_order() {
        let log: Log = Arc::default();
        let route = traced_route(&log)
            .on(Verb::Get, handler_logging(&log))
            .build()
            .unwrap();

        let (response, outcome) = route
            .handle_with_outcome(RawRequest::new(Verb::Get, "/things"), PathArgs::new())
            .await
            .unwrap();

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(response.status(), 200);
        assert_eq!(response.body(), b"hello");
        assert_eq!(*log.lock(), ["before1", "before2", "handler", "after"]);
    }

    #[tokio::test]
    async fn teardown_always_runs_after_success() {
        let log: Log = Arc::default();
        let route = traced_route(&log)
            .on(Verb::Get, handler_logging(&log))
            .teardown_policy(TeardownPolicy::Always)
            .build()
            .unwrap();

        route
            .handle(RawRequest::new(Verb::Get, "/things"), PathArgs::new())
            .await
            .unwrap();
        assert_eq!(log.lock().last().map(String::as_str), Some("teardown"));
    }

    #[tokio::test]
    async fn custom_kind_goes_to_its_handler() {
        let log: Log = Arc::default();
        let kind_log = Arc::clone(&log);
        let route = RouteBuilder::new("things")
            .app_context(injector())
            .before_sync(|_, _| Err(HookError::custom(KindX)))
            .on(Verb::Get, handler_logging(&log))
            .after_hook(SyncHook(recorder(&log, "after")))
            .error_handlers(fallback_table(&log).on::<KindX, _>(move |ex, _| {
                kind_log.lock().push("kind_x".to_string());
                Box::pin(async move {
                    ex.set_status(409);
                })
            }))
            .teardown(|ex, _| {
                Box::pin(async move {
                    ex.set_header("x-teardown", "done");
                    Ok(())
                })
            })
            .build()
            .unwrap();

        let (response, outcome) = route
            .handle_with_outcome(RawRequest::new(Verb::Get, "/things"), PathArgs::new())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            Outcome::Failed {
                stage: Stage::BeforeHooks,
                kind: ErrorKind::of::<KindX>(),
                fallback: false,
            }
        );
        assert_eq!(response.status(), 409);
        assert_eq!(response.header("x-teardown"), Some("done"));
        assert_eq!(*log.lock(), ["kind_x"]);
    }

    #[tokio::test]
    async fn configuration_error_has_its_own_handler() {
        let route = RouteBuilder::new("things")
            .app_context(injector())
            .before_sync(|_, _| Err(ConfigurationError::MissingContext.into()))
            .on(Verb::Get, |_, _| Box::pin(async { Ok(()) }))
            .error_handlers(
                ErrorHandlers::new(status_handler(500))
                    .on::<ConfigurationError, _>(status_handler(503)),
            )
            .build()
            .unwrap();

        let (response, outcome) = route
            .handle_with_outcome(RawRequest::new(Verb::Get, "/things"), PathArgs::new())
            .await
            .unwrap();
        assert_eq!(response.status(), 503);
        assert_eq!(
            outcome,
            Outcome::Failed {
                stage: Stage::BeforeHooks,
                kind: ErrorKind::of::<ConfigurationError>(),
                fallback: false,
            }
        );
    }

    #[tokio::test]
    async fn missing_dependency_in_handler_is_a_configuration_error() {
        let route = RouteBuilder::new("things")
            .app_context(injector())
            .on(Verb::Get, |ex, _| {
                Box::pin(async move {
                    ex.dependency::<String>("mailer")?;
                    Ok(())
                })
            })
            .error_handlers(
                ErrorHandlers::new(status_handler(500))
                    .on::<ConfigurationError, _>(status_handler(503)),
            )
            .build()
            .unwrap();

        let response = route
            .handle(RawRequest::new(Verb::Get, "/things"), PathArgs::new())
            .await
            .unwrap();
        assert_eq!(response.status(), 503);
        assert_eq!(
            response.json().unwrap(),
            serde_json::json!({ "error": "dependent object 'mailer' not found" })
        );
    }

    #[tokio::test]
    async fn status_handler_sets_status_and_message() {
        let mut ex = Exchange::new(RawRequest::new(Verb::Get, "/things"));
        ex.write("partial");
        let err = HookError::custom(KindX);

        status_handler(418)(&mut ex, &err).await;

        let response = ex.into_response();
        assert_eq!(response.status(), 418);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.json().unwrap(), serde_json::json!({ "error": "kind x" }));
    }

    #[tokio::test]
    async fn unbound_verb_goes_to_default_handler() {
        let log: Log = Arc::default();
        let route = traced_route(&log)
            .on(Verb::Get, handler_logging(&log))
            .method(MethodDefinition::new(Verb::Put))
            .build()
            .unwrap();

        for verb in [Verb::Post, Verb::Put] {
            log.lock().clear();
            let (response, outcome) = route
                .handle_with_outcome(RawRequest::new(verb, "/things"), PathArgs::new())
                .await
                .unwrap();

            assert_eq!(
                outcome,
                Outcome::Failed {
                    stage: Stage::Handler,
                    kind: ErrorKind::MethodNotAllowed,
                    fallback: true,
                }
            );
            assert_eq!(response.status(), 500);
            assert_eq!(
                *log.lock(),
                ["before1", "before2", "default:method_not_allowed", "teardown"]
            );
        }
    }

    #[tokio::test]
    async fn method_not_allowed_can_have_its_own_handler() {
        let route = RouteBuilder::new("things")
            .app_context(injector())
            .error_handlers(
                ErrorHandlers::new(status_handler(500))
                    .on_kind(ErrorKind::MethodNotAllowed, status_handler(405)),
            )
            .build()
            .unwrap();

        let response = route
            .handle(RawRequest::new(Verb::Delete, "/things"), PathArgs::new())
            .await
            .unwrap();
        assert_eq!(response.status(), 405);
        assert_eq!(
            response.json().unwrap(),
            serde_json::json!({ "error": "method DELETE is not allowed" })
        );
    }

    #[tokio::test]
    async fn user_loader_sets_identity() {
        let route = RouteBuilder::new("me")
            .app_context(injector())
            .user_loader_sync(|ex, _| {
                Ok(ex
                    .request()
                    .get_header("x-user")
                    .map(|name| Identity::new(name.to_string())))
            })
            .before_sync(|ex, method| {
                if method.get_attr("auth_required").is_some() && ex.user().is_none() {
                    return Err(HookError::custom(Unauthorized));
                }
                Ok(())
            })
            .method(
                MethodDefinition::new(Verb::Get)
                    .attr("auth_required", true)
                    .function(|ex, _| {
                        Box::pin(async move {
                            let user = ex.user().and_then(|u| u.downcast::<String>());
                            let name = user.map(|u| u.to_string()).unwrap_or_default();
                            ex.write(name);
                            Ok(())
                        })
                    }),
            )
            .error_handlers(
                ErrorHandlers::new(status_handler(500)).on::<Unauthorized, _>(status_handler(401)),
            )
            .build()
            .unwrap();

        let ok = route
            .handle(
                RawRequest::new(Verb::Get, "/me").header("X-User", "alice"),
                PathArgs::new(),
            )
            .await
            .unwrap();
        assert_eq!(ok.body(), b"alice");

        let denied = route
            .handle(RawRequest::new(Verb::Get, "/me"), PathArgs::new())
            .await
            .unwrap();
        assert_eq!(denied.status(), 401);
    }

    #[tokio::test]
    async fn user_loader_failure_skips_everything_else() {
        let log: Log = Arc::default();
        let route = traced_route(&log)
            .user_loader(|_, _| Box::pin(async { Err(HookError::custom(Unauthorized)) }))
            .on(Verb::Get, handler_logging(&log))
            .build()
            .unwrap();

        let (_, outcome) = route
            .handle_with_outcome(RawRequest::new(Verb::Get, "/"), PathArgs::new())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            Outcome::Failed {
                stage: Stage::UserLoad,
                ..
            }
        ));
        let expected = [
            format!("default:{}", std::any::type_name::<Unauthorized>()),
            "teardown".to_string(),
        ];
        assert_eq!(*log.lock(), expected);
    }

    #[tokio::test]
    async fn after_hook_failure_is_routed() {
        let route = RouteBuilder::new("things")
            .app_context(injector())
            .on(Verb::Get, |ex, _| {
                Box::pin(async move {
                    ex.write("partial");
                    Ok(())
                })
            })
            .after_hook(SyncHook(|_: &mut Exchange, _: &MethodDefinition| {
                Err::<(), _>(HookError::custom(KindX))
            }))
            .error_handlers(ErrorHandlers::new(status_handler(500)))
            .build()
            .unwrap();

        let (response, outcome) = route
            .handle_with_outcome(RawRequest::new(Verb::Get, "/"), PathArgs::new())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            Outcome::Failed {
                stage: Stage::AfterHooks,
                fallback: true,
                ..
            }
        ));
        assert_eq!(response.status(), 500);
    }

    #[tokio::test]
    async fn teardown_failures_do_not_stop_other_teardowns() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let route = RouteBuilder::new("things")
            .app_context(injector())
            .teardown_policy(TeardownPolicy::Always)
            .teardown_hook(SyncHook(|_: &mut Exchange, _: &MethodDefinition| {
                Err::<(), _>(HookError::custom(KindX))
            }))
            .teardown_hook(SyncHook(move |_: &mut Exchange, _: &MethodDefinition| {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok::<_, HookError>(())
            }))
            .on(Verb::Get, |_, _| Box::pin(async { Ok(()) }))
            .error_handlers(ErrorHandlers::new(status_handler(500)))
            .build()
            .unwrap();

        let response = route
            .handle(RawRequest::new(Verb::Get, "/"), PathArgs::new())
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bad_request_from_strict_body_parse() {
        let route = RouteBuilder::new("orders")
            .app_context(injector())
            .on(Verb::Post, |ex, _| {
                Box::pin(async move {
                    let body = ex
                        .parsed_body(crate::ParseOptions::default(), true)?
                        .cloned();
                    ex.write_json(201, &body)
                })
            })
            .error_handlers(
                ErrorHandlers::new(status_handler(500))
                    .on_kind(ErrorKind::BadRequest, status_handler(400)),
            )
            .build()
            .unwrap();

        let created = route
            .handle(
                RawRequest::new(Verb::Post, "/orders").body(r#"{"qty":1}"#),
                PathArgs::new(),
            )
            .await
            .unwrap();
        assert_eq!(created.status(), 201);

        let rejected = route
            .handle(RawRequest::new(Verb::Post, "/orders").body("{"), PathArgs::new())
            .await
            .unwrap();
        assert_eq!(rejected.status(), 400);
    }

    #[tokio::test]
    async fn caches_and_settings_reach_the_exchange() {
        let route = RouteBuilder::new("config")
            .app_context(injector())
            .cache("limit", 25usize)
            .settings(serde_json::json!({ "site": { "name": "hearth" } }))
            .on(Verb::Get, |ex, _| {
                Box::pin(async move {
                    let limit = ex.cache::<usize>("limit").map(|l| *l).unwrap_or_default();
                    let site = ex
                        .setting("site.name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    ex.write(format!("{site}:{limit}"));
                    Ok(())
                })
            })
            .error_handlers(ErrorHandlers::new(status_handler(500)))
            .build()
            .unwrap();

        let response = route
            .handle(RawRequest::new(Verb::Get, "/"), PathArgs::new())
            .await
            .unwrap();
        assert_eq!(response.body(), b"hearth:25");
    }

    #[tokio::test]
    async fn handlers_can_offload_blocking_work() {
        let route = RouteBuilder::new("report")
            .app_context(injector())
            .offload_executor(OffloadExecutor::new(1))
            .on(Verb::Get, |ex, _| {
                Box::pin(async move {
                    let total = ex.run_blocking(|| (1..=10u32).sum::<u32>()).await?;
                    ex.write(total.to_string());
                    Ok(())
                })
            })
            .error_handlers(ErrorHandlers::new(status_handler(500)))
            .build()
            .unwrap();

        let response = route
            .handle(RawRequest::new(Verb::Get, "/report"), PathArgs::new())
            .await
            .unwrap();
        assert_eq!(response.body(), b"55");
    }

    #[test]
    fn build_requires_context_and_error_handlers() {
        let missing_context = RouteBuilder::new("a")
            .error_handlers(ErrorHandlers::new(status_handler(500)))
            .build()
            .unwrap_err();
        assert_eq!(missing_context, ConfigurationError::MissingContext);

        let missing_fallback = RouteBuilder::new("a")
            .app_context(injector())
            .build()
            .unwrap_err();
        assert_eq!(
            missing_fallback,
            ConfigurationError::MissingFallbackHandler {
                endpoint: "a".to_string()
            }
        );
    }

    #[tokio::test]
    async fn injection_failure_aborts_request() {
        let mut builder = ContainerBuilder::new();
        builder
            .singleton("broken", Vec::<String>::new(), |_| async {
                Err::<u8, _>("no database".into())
            })
            .unwrap();
        let injector = Arc::new(ContextInjector::new(Arc::new(builder.build().unwrap())));
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&hits);
        let route = RouteBuilder::new("a")
            .app_context(injector)
            .before_sync(move |_, _| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .error_handlers(ErrorHandlers::new(status_handler(500)))
            .build()
            .unwrap();

        let err = route
            .handle(RawRequest::new(Verb::Get, "/"), PathArgs::new())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::DispatchError::Injection(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
