//! Per-request dependency context.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ConfigurationError, ContainerResult};
use crate::registry::{Instance, downcast};

/// One attribute per registered dependency name, populated for a single
/// request by the [`ContextInjector`](crate::ContextInjector).
#[derive(Default, Clone)]
pub struct RequestContext {
    attributes: HashMap<String, Instance>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches `instance` under `name`, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, instance: Instance) {
        self.attributes.insert(name.into(), instance);
    }

    /// Returns the attribute `name`, downcast to `T`.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> ContainerResult<Arc<T>> {
        let instance = self
            .attributes
            .get(name)
            .ok_or_else(|| ConfigurationError::DependencyNotFound(name.to_string()))?;
        downcast(name, instance)
    }

    /// Returns the raw attribute `name`.
    pub fn instance(&self, name: &str) -> Option<&Instance> {
        self.attributes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("RequestContext")
            .field("attributes", &names)
            .finish()
    }
}
