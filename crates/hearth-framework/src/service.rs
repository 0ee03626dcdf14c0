//! `tower` adapter for [`Route`].
//!
//! [`RouteService`] lets a route sit underneath ordinary tower middleware
//! (timeouts, concurrency limits, tracing layers) in whatever server the
//! application embeds it in.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::Service;

use crate::error::DispatchError;
use crate::exchange::{RawRequest, Response};
use crate::method::PathArgs;
use crate::route::Route;

/// A request together with the path arguments the router extracted.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub request: RawRequest,
    pub args: PathArgs,
}

impl Inbound {
    pub fn new(request: RawRequest) -> Self {
        Self {
            request,
            args: PathArgs::new(),
        }
    }

    pub fn with_args(mut self, args: PathArgs) -> Self {
        self.args = args;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RouteService {
    route: Arc<Route>,
}

impl RouteService {
    pub fn new(route: Arc<Route>) -> Self {
        Self { route }
    }

    pub fn route(&self) -> &Arc<Route> {
        &self.route
    }
}

impl Service<Inbound> for RouteService {
    type Response = Response;
    type Error = DispatchError;
    type Future = BoxFuture<'static, Result<Response, DispatchError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, inbound: Inbound) -> Self::Future {
        let route = Arc::clone(&self.route);
        Box::pin(async move { route.handle(inbound.request, inbound.args).await })
    }
}
