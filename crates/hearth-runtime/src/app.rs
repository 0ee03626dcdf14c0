//! Application wiring: one container, many routes.
//!
//! ```rust,ignore
//! use hearth_runtime::{Application, config::ConfigLoader};
//!
//! let app = Application::builder()
//!     .load_config(ConfigLoader::new())?
//!     .register(|c| {
//!         c.singleton("db", Vec::<String>::new(), |_| async { Ok(Db::connect()) })?;
//!         Ok(())
//!     })?
//!     .route("orders", |r| {
//!         r.on(Verb::Get, list_orders)
//!             .error_handlers(ErrorHandlers::new(status_handler(500)))
//!     })
//!     .build()?;
//!
//! let response = app.handle("orders", RawRequest::new(Verb::Get, "/orders"), PathArgs::new()).await?;
//! ```
//!
//! Every route built through the application shares its
//! [`ContextInjector`], [`OffloadExecutor`] and settings, and starts from
//! the configured teardown policy. The route closure can override any of
//! them.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::{ConfigLoader, HearthConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use hearth_core::{ConfigurationResult, Container, ContainerBuilder, ContextInjector};
use hearth_framework::{
    OffloadExecutor, PathArgs, RawRequest, Response, Route, RouteBuilder, RouteService,
};

type RouteSetup = Box<dyn FnOnce(RouteBuilder) -> RouteBuilder + Send>;

/// A fully wired set of routes over one dependency container.
pub struct Application {
    config: HearthConfig,
    container: Arc<Container>,
    offload: OffloadExecutor,
    routes: HashMap<String, Arc<Route>>,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    pub fn config(&self) -> &HearthConfig {
        &self.config
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn offload(&self) -> &OffloadExecutor {
        &self.offload
    }

    pub fn route(&self, endpoint: &str) -> Option<&Arc<Route>> {
        self.routes.get(endpoint)
    }

    /// Endpoint labels, sorted.
    pub fn endpoints(&self) -> Vec<&str> {
        let mut endpoints: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        endpoints.sort_unstable();
        endpoints
    }

    /// A `tower` service for one endpoint.
    pub fn service(&self, endpoint: &str) -> RuntimeResult<RouteService> {
        self.route(endpoint)
            .map(|route| RouteService::new(Arc::clone(route)))
            .ok_or_else(|| RuntimeError::UnknownEndpoint(endpoint.to_string()))
    }

    /// Serves one request on the route labelled `endpoint`.
    pub async fn handle(
        &self,
        endpoint: &str,
        request: RawRequest,
        args: PathArgs,
    ) -> RuntimeResult<Response> {
        let route = self
            .route(endpoint)
            .ok_or_else(|| RuntimeError::UnknownEndpoint(endpoint.to_string()))?;
        Ok(route.handle(request, args).await?)
    }

    /// Stops accepting blocking work.
    pub fn shutdown(&self) {
        self.offload.close();
        info!(endpoints = self.routes.len(), "Application shut down");
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("endpoints", &self.endpoints())
            .field("dependencies", &self.container.names())
            .field("max_blocking", &self.offload.max_blocking())
            .finish()
    }
}

/// Builder for [`Application`].
pub struct ApplicationBuilder {
    config: HearthConfig,
    container: ContainerBuilder,
    routes: Vec<(String, RouteSetup)>,
    init_logging: bool,
}

impl Default for ApplicationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ApplicationBuilder {
    pub fn new() -> Self {
        Self {
            config: HearthConfig::default(),
            container: ContainerBuilder::new(),
            routes: Vec::new(),
            init_logging: true,
        }
    }

    pub fn config(mut self, config: HearthConfig) -> Self {
        self.config = config;
        self
    }

    pub fn load_config(self, loader: ConfigLoader) -> RuntimeResult<Self> {
        Ok(self.config(loader.load()?))
    }

    /// Leaves the global subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Registers factories on the application's container.
    pub fn register<F>(mut self, f: F) -> RuntimeResult<Self>
    where
        F: FnOnce(&mut ContainerBuilder) -> ConfigurationResult<()>,
    {
        f(&mut self.container)?;
        Ok(self)
    }

    /// Adds a route; `setup` receives a builder preloaded with the shared
    /// context, pool, settings and teardown policy.
    pub fn route<F>(mut self, endpoint: impl Into<String>, setup: F) -> Self
    where
        F: FnOnce(RouteBuilder) -> RouteBuilder + Send + 'static,
    {
        self.routes.push((endpoint.into(), Box::new(setup)));
        self
    }

    pub fn build(self) -> RuntimeResult<Application> {
        validate_config(&self.config)?;
        if self.init_logging {
            logging::init_from_config(&self.config.logging);
        }

        let container = Arc::new(self.container.build()?);
        let injector = Arc::new(ContextInjector::new(Arc::clone(&container)));
        let offload = OffloadExecutor::new(self.config.offload.max_blocking);

        let mut routes = HashMap::with_capacity(self.routes.len());
        for (endpoint, setup) in self.routes {
            if routes.contains_key(&endpoint) {
                return Err(RuntimeError::DuplicateEndpoint(endpoint));
            }
            let builder = RouteBuilder::new(endpoint.clone())
                .app_context(Arc::clone(&injector))
                .offload_executor(offload.clone())
                .settings(self.config.settings.clone())
                .teardown_policy(self.config.dispatch.teardown);
            routes.insert(endpoint, Arc::new(setup(builder).build()?));
        }

        info!(
            endpoints = routes.len(),
            dependencies = container.names().len(),
            max_blocking = offload.max_blocking(),
            teardown = %self.config.dispatch.teardown,
            "Application ready"
        );

        Ok(Application {
            config: self.config,
            container,
            offload,
            routes,
        })
    }
}
