//! Factory registry: the immutable-after-setup table of named factories.
//!
//! Each [`FactoryDescriptor`] binds a unique name to an async factory, a
//! lifetime [`Strategy`] and the ordered list of names the factory depends
//! on. Dependency names are declared explicitly and checked against the
//! registry by [`Registry::validate`] before any resolution happens.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::{BoxError, ConfigurationError, ConfigurationResult, ContainerError, ContainerResult};

/// A type-erased instance produced by a factory.
///
/// The concrete value is an `Arc<T>` upcast to `Any`; use
/// [`Dependencies::get`] or [`RequestContext::get`](crate::RequestContext::get)
/// to recover `Arc<T>`.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// The erased factory signature stored by the registry.
pub type FactoryFn =
    Arc<dyn Fn(Dependencies) -> BoxFuture<'static, Result<Instance, BoxError>> + Send + Sync>;

/// Instance lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
    /// One instance for the lifetime of the container.
    #[default]
    Singleton,
    /// A fresh instance on every resolution.
    Prototype,
}

impl Strategy {
    /// Returns the strategy name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Singleton => "singleton",
            Self::Prototype => "prototype",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) fn downcast<T: Send + Sync + 'static>(
    name: &str,
    instance: &Instance,
) -> ContainerResult<Arc<T>> {
    Arc::clone(instance)
        .downcast::<T>()
        .map_err(|_| ContainerError::TypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<T>(),
        })
}

// =============================================================================
// Dependencies
// =============================================================================

/// The resolved arguments handed to a factory, in declared order.
#[derive(Clone, Default)]
pub struct Dependencies {
    resolved: Vec<(String, Instance)>,
}

impl Dependencies {
    pub(crate) fn new(resolved: Vec<(String, Instance)>) -> Self {
        Self { resolved }
    }

    /// Returns the dependency declared under `name`, downcast to `T`.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> ContainerResult<Arc<T>> {
        let (name, instance) = self
            .resolved
            .iter()
            .find(|(n, _)| n == name)
            .ok_or_else(|| ConfigurationError::DependencyNotFound(name.to_string()))?;
        downcast(name, instance)
    }

    /// Returns the dependency at declared position `index`, downcast to `T`.
    pub fn at<T: Send + Sync + 'static>(&self, index: usize) -> ContainerResult<Arc<T>> {
        let (name, instance) = self.resolved.get(index).ok_or_else(|| {
            ConfigurationError::DependencyNotFound(format!("#{index}"))
        })?;
        downcast(name, instance)
    }

    /// Returns the raw instance at `index`.
    pub fn instance(&self, index: usize) -> Option<&Instance> {
        self.resolved.get(index).map(|(_, i)| i)
    }

    /// Iterates `(name, instance)` pairs in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Instance)> {
        self.resolved.iter().map(|(n, i)| (n.as_str(), i))
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.resolved.iter().map(|(n, _)| n))
            .finish()
    }
}

// =============================================================================
// FactoryDescriptor
// =============================================================================

/// A registered factory. Created once at registration, immutable afterwards.
#[derive(Clone)]
pub struct FactoryDescriptor {
    name: String,
    strategy: Strategy,
    dependencies: Vec<String>,
    factory: FactoryFn,
}

impl FactoryDescriptor {
    /// Creates a descriptor from an already-erased factory.
    pub fn new(
        name: impl Into<String>,
        strategy: Strategy,
        dependencies: Vec<String>,
        factory: FactoryFn,
    ) -> Self {
        Self {
            name: name.into(),
            strategy,
            dependencies,
            factory,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Declared dependency names, in the order they are passed to the factory.
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub(crate) fn invoke(&self, deps: Dependencies) -> BoxFuture<'static, Result<Instance, BoxError>> {
        (self.factory)(deps)
    }
}

impl fmt::Debug for FactoryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryDescriptor")
            .field("name", &self.name)
            .field("strategy", &self.strategy)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Mapping name → [`FactoryDescriptor`], plus the registration order.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    descriptors: HashMap<String, FactoryDescriptor>,
    order: Vec<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a descriptor. Fails if the name is already taken.
    pub fn insert(&mut self, descriptor: FactoryDescriptor) -> ConfigurationResult<()> {
        if self.descriptors.contains_key(descriptor.name()) {
            return Err(ConfigurationError::DuplicateName(descriptor.name().to_string()));
        }
        self.order.push(descriptor.name().to_string());
        self.descriptors
            .insert(descriptor.name().to_string(), descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FactoryDescriptor> {
        self.descriptors.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Checks that every declared dependency names a registered factory.
    pub fn validate(&self) -> ConfigurationResult<()> {
        for name in &self.order {
            let descriptor = &self.descriptors[name];
            if let Some(missing) = descriptor
                .dependencies()
                .iter()
                .find(|dep| !self.descriptors.contains_key(dep.as_str()))
            {
                return Err(ConfigurationError::UnknownDependency {
                    factory: name.clone(),
                    dependency: missing.clone(),
                });
            }
        }
        Ok(())
    }
}
