//! Context injection.
//!
//! Before the hook chain runs, every registered name is resolved and attached
//! to the request's [`RequestContext`]. Every name is resolved on every
//! request, whether or not the handler uses it, so prototypes are rebuilt
//! per request unconditionally.

use std::sync::Arc;

use tracing::trace;

use crate::container::Container;
use crate::context::RequestContext;
use crate::error::{ConfigurationError, ContainerResult};

/// Populates request contexts from a shared [`Container`].
#[derive(Debug, Clone)]
pub struct ContextInjector {
    container: Arc<Container>,
}

impl ContextInjector {
    pub fn new(container: Arc<Container>) -> Self {
        Self { container }
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    /// Resolves every registered name into `context`.
    ///
    /// A missing context is a setup defect and fails with
    /// [`ConfigurationError::MissingContext`]. Resolution errors are returned
    /// as-is; they are not meant to be handled per request.
    pub async fn inject(&self, context: Option<&mut RequestContext>) -> ContainerResult<()> {
        let context = context.ok_or(ConfigurationError::MissingContext)?;
        for name in self.container.names() {
            let instance = self.container.resolve(name).await?;
            context.insert(name.as_str(), instance);
        }
        trace!(attributes = context.len(), "Request context populated");
        Ok(())
    }

    /// Creates a fresh context and injects into it.
    pub async fn fresh_context(&self) -> ContainerResult<RequestContext> {
        let mut context = RequestContext::new();
        self.inject(Some(&mut context)).await?;
        Ok(context)
    }
}
