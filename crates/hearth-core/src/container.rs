//! The dependency-injection container.
//!
//! [`ContainerBuilder`] collects factories during application setup;
//! [`ContainerBuilder::build`] validates every declared dependency name and
//! freezes the registry into a [`Container`], which is then shared by all
//! requests.
//!
//! # Resolution
//!
//! `resolve(name)` returns the cached singleton when one exists and otherwise
//! creates the instance:
//!
//! 1. unknown name → [`ConfigurationError::DependencyNotFound`]
//! 2. name already on the current resolution chain →
//!    [`ConfigurationError::CircularDependency`]
//! 3. dependencies are resolved depth-first, left to right, in declared order
//! 4. the factory is invoked with them; singletons are cached under `name`
//!
//! The resolution chain belongs to one top-level call. Each entry is pushed
//! by an `InProgress` guard and popped when the guard drops, so success,
//! failure and cancellation all leave it clean.
//!
//! # Concurrency
//!
//! Every singleton has its own `OnceCell`. Dependencies are resolved before
//! the cell is entered, so no cell is ever held while waiting for another
//! name; concurrent first-time callers for the same name await one factory
//! invocation instead of racing.
//!
//! ```rust,ignore
//! let mut builder = ContainerBuilder::new();
//! builder.singleton("config", [], |_| async { Ok(Config::from_env()) })?;
//! builder.singleton("db", ["config"], |deps| async move {
//!     Database::connect(&*deps.get::<Config>("config")?).await
//! })?;
//! let container = builder.build()?;
//! let db: Arc<Database> = container.resolve_as("db").await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::component::Component;
use crate::error::{
    BoxError, ConfigurationError, ConfigurationResult, ContainerError, ContainerResult,
};
use crate::registry::{
    Dependencies, FactoryDescriptor, FactoryFn, Instance, Registry, Strategy, downcast,
};

// =============================================================================
// ContainerBuilder
// =============================================================================

/// Collects factories before the container is frozen.
#[derive(Debug, Default)]
pub struct ContainerBuilder {
    registry: Registry,
}

impl ContainerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name`.
    ///
    /// `dependencies` lists the names whose instances are passed to the
    /// factory, in order. Fails immediately if `name` is already taken;
    /// unknown dependency names are reported by [`build`](Self::build).
    pub fn register<T, F, Fut, I, S>(
        &mut self,
        name: impl Into<String>,
        strategy: Strategy,
        dependencies: I,
        factory: F,
    ) -> ConfigurationResult<&mut Self>
    where
        T: Send + Sync + 'static,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let erased: FactoryFn = Arc::new(
            move |deps: Dependencies| -> BoxFuture<'static, Result<Instance, BoxError>> {
                let fut = factory(deps);
                Box::pin(async move { fut.await.map(|value| Arc::new(value) as Instance) })
            },
        );
        let descriptor = FactoryDescriptor::new(
            name,
            strategy,
            dependencies.into_iter().map(Into::into).collect(),
            erased,
        );
        debug!(
            name = descriptor.name(),
            strategy = %descriptor.strategy(),
            dependencies = ?descriptor.dependencies(),
            "Factory registered"
        );
        self.registry.insert(descriptor)?;
        Ok(self)
    }

    /// Registers a [`Strategy::Singleton`] factory.
    pub fn singleton<T, F, Fut, I, S>(
        &mut self,
        name: impl Into<String>,
        dependencies: I,
        factory: F,
    ) -> ConfigurationResult<&mut Self>
    where
        T: Send + Sync + 'static,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.register(name, Strategy::Singleton, dependencies, factory)
    }

    /// Registers a [`Strategy::Prototype`] factory.
    pub fn prototype<T, F, Fut, I, S>(
        &mut self,
        name: impl Into<String>,
        dependencies: I,
        factory: F,
    ) -> ConfigurationResult<&mut Self>
    where
        T: Send + Sync + 'static,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.register(name, Strategy::Prototype, dependencies, factory)
    }

    /// Registers a [`Component`] under its own declared name.
    pub fn provide<C: Component>(&mut self) -> ConfigurationResult<&mut Self> {
        self.register(
            C::NAME,
            C::STRATEGY,
            C::DEPENDENCIES.iter().copied(),
            |deps| C::create(deps),
        )
    }

    /// Validates all declared dependencies and freezes the registry.
    pub fn build(self) -> ConfigurationResult<Container> {
        self.registry.validate()?;
        debug!(factories = self.registry.len(), "Container built");
        Ok(Container::new(self.registry))
    }
}

// =============================================================================
// InstanceCache
// =============================================================================

/// Singleton instances, one `OnceCell` per singleton name.
#[derive(Debug, Default)]
struct InstanceCache {
    cells: RwLock<HashMap<String, Arc<OnceCell<Instance>>>>,
}

impl InstanceCache {
    fn for_registry(registry: &Registry) -> Self {
        let cells = registry
            .names()
            .iter()
            .filter(|name| {
                registry
                    .get(name)
                    .is_some_and(|d| d.strategy() == Strategy::Singleton)
            })
            .map(|name| (name.clone(), Arc::new(OnceCell::new())))
            .collect();
        Self {
            cells: RwLock::new(cells),
        }
    }

    fn get(&self, name: &str) -> Option<Instance> {
        self.cells
            .read()
            .get(name)
            .and_then(|cell| cell.get().cloned())
    }

    fn cell(&self, name: &str) -> Arc<OnceCell<Instance>> {
        if let Some(cell) = self.cells.read().get(name) {
            return Arc::clone(cell);
        }
        Arc::clone(self.cells.write().entry(name.to_string()).or_default())
    }

    fn initialized(&self) -> usize {
        self.cells
            .read()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    fn clear(&self) {
        for cell in self.cells.write().values_mut() {
            *cell = Arc::new(OnceCell::new());
        }
    }
}

// =============================================================================
// InProgress guard
// =============================================================================

/// Marks a name as mid-resolution for as long as the guard lives.
struct InProgress<'a> {
    chain: &'a mut Vec<String>,
}

impl<'a> InProgress<'a> {
    fn enter(chain: &'a mut Vec<String>, name: &str) -> ConfigurationResult<Self> {
        if chain.iter().any(|n| n == name) {
            return Err(ConfigurationError::circular(
                chain.iter().map(String::as_str),
                name,
            ));
        }
        chain.push(name.to_string());
        Ok(Self { chain })
    }

    fn chain(&mut self) -> &mut Vec<String> {
        &mut *self.chain
    }
}

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.chain.pop();
    }
}

// =============================================================================
// Container
// =============================================================================

/// A frozen registry plus the process-lifetime singleton cache.
#[derive(Debug)]
pub struct Container {
    registry: Registry,
    cache: InstanceCache,
}

impl Container {
    fn new(registry: Registry) -> Self {
        let cache = InstanceCache::for_registry(&registry);
        Self { registry, cache }
    }

    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// All registered names, in registration order.
    pub fn names(&self) -> &[String] {
        self.registry.names()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Number of singletons created so far.
    pub fn cached_count(&self) -> usize {
        self.cache.initialized()
    }

    /// Drops every cached singleton. Later resolutions create them again.
    pub fn reset(&self) {
        self.cache.clear();
        debug!("Singleton cache cleared");
    }

    /// Returns the instance registered under `name`.
    pub async fn resolve(&self, name: &str) -> ContainerResult<Instance> {
        let mut chain = Vec::new();
        self.resolve_in(name, &mut chain).await
    }

    /// Resolves `name` and downcasts the instance to `T`.
    pub async fn resolve_as<T: Send + Sync + 'static>(&self, name: &str) -> ContainerResult<Arc<T>> {
        let instance = self.resolve(name).await?;
        downcast(name, &instance)
    }

    /// Builds `name` without consulting the cache first.
    ///
    /// A singleton that already exists is returned as-is; neither its factory
    /// nor its dependencies run again.
    pub async fn create(&self, name: &str) -> ContainerResult<Instance> {
        let mut chain = Vec::new();
        self.create_in(name, &mut chain).await
    }

    fn resolve_in<'a>(
        &'a self,
        name: &'a str,
        chain: &'a mut Vec<String>,
    ) -> BoxFuture<'a, ContainerResult<Instance>> {
        Box::pin(async move {
            if let Some(instance) = self.cache.get(name) {
                trace!(name, "Singleton cache hit");
                return Ok(instance);
            }
            self.create_in(name, chain).await
        })
    }

    async fn create_in(&self, name: &str, chain: &mut Vec<String>) -> ContainerResult<Instance> {
        let descriptor = self
            .registry
            .get(name)
            .ok_or_else(|| ConfigurationError::DependencyNotFound(name.to_string()))?;

        if descriptor.strategy() == Strategy::Singleton {
            if let Some(instance) = self.cache.get(name) {
                return Ok(instance);
            }
        }

        let mut guard = InProgress::enter(chain, name)?;

        let mut resolved = Vec::with_capacity(descriptor.dependencies().len());
        for dep in descriptor.dependencies() {
            let instance = self.resolve_in(dep, guard.chain()).await?;
            resolved.push((dep.clone(), instance));
        }
        let deps = Dependencies::new(resolved);

        let instance = match descriptor.strategy() {
            Strategy::Singleton => {
                let cell = self.cache.cell(name);
                let instance = cell.get_or_try_init(|| invoke(descriptor, deps)).await?;
                Arc::clone(instance)
            }
            Strategy::Prototype => invoke(descriptor, deps).await?,
        };

        drop(guard);
        Ok(instance)
    }
}

async fn invoke(descriptor: &FactoryDescriptor, deps: Dependencies) -> ContainerResult<Instance> {
    debug!(
        name = descriptor.name(),
        strategy = %descriptor.strategy(),
        "Invoking factory"
    );
    descriptor
        .invoke(deps)
        .await
        .map_err(|source| ContainerError::Factory {
            name: descriptor.name().to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct A;

    #[derive(Debug)]
    struct B {
        a: Arc<A>,
    }

    fn counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    #[tokio::test]
    async fn test_singleton_chain_is_built_once() {
        let a_calls = counter();
        let b_calls = counter();

        let mut builder = ContainerBuilder::new();
        let calls = Arc::clone(&a_calls);
        builder
            .singleton("a", Vec::<String>::new(), move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(A) }
            })
            .unwrap();
        let calls = Arc::clone(&b_calls);
        builder
            .singleton("b", ["a"], move |deps| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(B { a: deps.get::<A>("a")? }) }
            })
            .unwrap();
        let container = builder.build().unwrap();

        let first: Arc<B> = container.resolve_as("b").await.unwrap();
        let second: Arc<B> = container.resolve_as("b").await.unwrap();
        let a: Arc<A> = container.resolve_as("a").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first.a, &a));
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(container.cached_count(), 2);
    }

    #[tokio::test]
    async fn test_prototype_rebuilt_but_shares_singleton_dependency() {
        let proto_calls = counter();

        let mut builder = ContainerBuilder::new();
        builder
            .singleton("a", Vec::<String>::new(), |_| async { Ok(A) })
            .unwrap();
        let calls = Arc::clone(&proto_calls);
        builder
            .prototype("b", ["a"], move |deps| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(B { a: deps.get::<A>("a")? }) }
            })
            .unwrap();
        let container = builder.build().unwrap();

        let first: Arc<B> = container.resolve_as("b").await.unwrap();
        let second: Arc<B> = container.resolve_as("b").await.unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first.a, &second.a));
        assert_eq!(proto_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_prototype_rebuilt_for_each_sibling() {
        let proto_calls = counter();

        let mut builder = ContainerBuilder::new();
        let calls = Arc::clone(&proto_calls);
        builder
            .prototype("id", Vec::<String>::new(), move |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(n) }
            })
            .unwrap();
        builder
            .singleton("pair", ["id", "id"], |deps| async move {
                Ok((*deps.at::<usize>(0)?, *deps.at::<usize>(1)?))
            })
            .unwrap();
        let container = builder.build().unwrap();

        let pair: Arc<(usize, usize)> = container.resolve_as("pair").await.unwrap();
        assert_eq!(*pair, (0, 1));
        assert_eq!(proto_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_create_on_cached_singleton_skips_dependencies() {
        let proto_calls = counter();

        let mut builder = ContainerBuilder::new();
        let calls = Arc::clone(&proto_calls);
        builder
            .prototype("id", Vec::<String>::new(), move |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(n) }
            })
            .unwrap();
        builder
            .singleton("holder", ["id"], |deps| async move { Ok(*deps.at::<usize>(0)?) })
            .unwrap();
        let container = builder.build().unwrap();

        let first = container.resolve("holder").await.unwrap();
        let again = container.create("holder").await.unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(proto_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dependencies_resolved_in_declared_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut builder = ContainerBuilder::new();
        for name in ["x", "y", "z"] {
            let order = Arc::clone(&order);
            builder
                .prototype(name, Vec::<String>::new(), move |_| {
                    order.lock().push(name);
                    async move { Ok(name) }
                })
                .unwrap();
        }
        builder
            .singleton("root", ["z", "x", "y"], |deps| async move {
                let names: Vec<&str> = (0..deps.len())
                    .map(|i| deps.at::<&'static str>(i).map(|s| *s))
                    .collect::<Result<_, _>>()?;
                Ok(names.join(""))
            })
            .unwrap();
        let container = builder.build().unwrap();

        let root: Arc<String> = container.resolve_as("root").await.unwrap();
        assert_eq!(root.as_str(), "zxy");
        assert_eq!(*order.lock(), vec!["z", "x", "y"]);
    }

    #[tokio::test]
    async fn test_self_dependency_is_circular() {
        let mut builder = ContainerBuilder::new();
        builder
            .singleton("C", ["C"], |_| async { Ok(()) })
            .unwrap();
        let container = builder.build().unwrap();

        let err = container.resolve("C").await.unwrap_err();
        match err {
            ContainerError::Configuration(ConfigurationError::CircularDependency { chain }) => {
                assert!(chain.contains('C'));
                assert_eq!(chain, "C -> C");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_transitive_cycle_names_full_chain() {
        let mut builder = ContainerBuilder::new();
        builder.singleton("a", ["b"], |_| async { Ok(()) }).unwrap();
        builder.prototype("b", ["c"], |_| async { Ok(()) }).unwrap();
        builder.singleton("c", ["a"], |_| async { Ok(()) }).unwrap();
        let container = builder.build().unwrap();

        let err = container.resolve("a").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "circular reference detected: a -> b -> c -> a"
        );
        // A failed resolution leaves no residue behind.
        let err = container.resolve("b").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "circular reference detected: b -> c -> a -> b"
        );
    }

    #[tokio::test]
    async fn test_unregistered_name_not_found() {
        let container = ContainerBuilder::new().build().unwrap();
        let err = container.resolve("ghost").await.unwrap_err();
        assert!(matches!(
            err,
            ContainerError::Configuration(ConfigurationError::DependencyNotFound(ref n)) if n == "ghost"
        ));
    }

    #[test]
    fn test_build_rejects_unknown_dependency() {
        let mut builder = ContainerBuilder::new();
        builder
            .singleton("service", ["missing"], |_| async { Ok(()) })
            .unwrap();
        let err = builder.build().unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnknownDependency {
                factory: "service".into(),
                dependency: "missing".into(),
            }
        );
    }

    #[test]
    fn test_register_rejects_duplicate() {
        let mut builder = ContainerBuilder::new();
        builder
            .singleton("db", Vec::<String>::new(), |_| async { Ok(()) })
            .unwrap();
        let err = builder
            .prototype("db", Vec::<String>::new(), |_| async { Ok(()) })
            .unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateName("db".into()));
    }

    #[tokio::test]
    async fn test_failed_factory_is_not_cached_and_can_retry() {
        let calls = counter();

        let mut builder = ContainerBuilder::new();
        let c = Arc::clone(&calls);
        builder
            .singleton("flaky", Vec::<String>::new(), move |_| {
                let attempt = c.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err::<u32, BoxError>("connection refused".into())
                    } else {
                        Ok(7)
                    }
                }
            })
            .unwrap();
        let container = builder.build().unwrap();

        let err = container.resolve("flaky").await.unwrap_err();
        assert!(matches!(err, ContainerError::Factory { ref name, .. } if name == "flaky"));
        assert_eq!(container.cached_count(), 0);

        let value: Arc<u32> = container.resolve_as("flaky").await.unwrap();
        assert_eq!(*value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancelled_resolution_leaves_no_marker() {
        let calls = counter();

        let mut builder = ContainerBuilder::new();
        let c = Arc::clone(&calls);
        builder
            .singleton("slow", Vec::<String>::new(), move |_| {
                let attempt = c.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                    Ok(attempt)
                }
            })
            .unwrap();
        builder
            .singleton("outer", ["slow"], |deps| async move {
                Ok(*deps.get::<usize>("slow")?)
            })
            .unwrap();
        let container = builder.build().unwrap();

        let cancelled =
            tokio::time::timeout(Duration::from_millis(20), container.resolve("outer")).await;
        assert!(cancelled.is_err());

        let outer: Arc<usize> = container.resolve_as("outer").await.unwrap();
        assert_eq!(*outer, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_invokes_factory_once() {
        let calls = counter();

        let mut builder = ContainerBuilder::new();
        let c = Arc::clone(&calls);
        builder
            .singleton("pool", Vec::<String>::new(), move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(String::from("pool"))
                }
            })
            .unwrap();
        let container = Arc::new(builder.build().unwrap());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let container = Arc::clone(&container);
                tokio::spawn(async move { container.resolve_as::<String>("pool").await })
            })
            .collect();

        let mut instances = Vec::new();
        for task in tasks {
            instances.push(task.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_reset_recreates_singletons() {
        let calls = counter();

        let mut builder = ContainerBuilder::new();
        let c = Arc::clone(&calls);
        builder
            .singleton("a", Vec::<String>::new(), move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Ok(A) }
            })
            .unwrap();
        let container = builder.build().unwrap();

        let before: Arc<A> = container.resolve_as("a").await.unwrap();
        container.reset();
        assert_eq!(container.cached_count(), 0);
        let after: Arc<A> = container.resolve_as("a").await.unwrap();

        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    struct Greeter {
        greeting: Arc<String>,
    }

    #[async_trait::async_trait]
    impl Component for Greeter {
        const NAME: &'static str = "greeter";
        const STRATEGY: Strategy = Strategy::Prototype;
        const DEPENDENCIES: &'static [&'static str] = &["greeting"];

        async fn create(deps: Dependencies) -> Result<Self, BoxError> {
            Ok(Self {
                greeting: deps.get("greeting")?,
            })
        }
    }

    #[tokio::test]
    async fn test_component_registers_under_declared_name() {
        let mut builder = ContainerBuilder::new();
        builder
            .singleton("greeting", Vec::<String>::new(), |_| async {
                Ok(String::from("hello"))
            })
            .unwrap();
        builder.provide::<Greeter>().unwrap();
        let container = builder.build().unwrap();

        assert_eq!(
            container.registry().get("greeter").map(|d| d.strategy()),
            Some(Strategy::Prototype)
        );
        let greeter: Arc<Greeter> = container.resolve_as("greeter").await.unwrap();
        assert_eq!(greeter.greeting.as_str(), "hello");
    }

    #[tokio::test]
    async fn test_resolve_as_wrong_type() {
        let mut builder = ContainerBuilder::new();
        builder
            .singleton("n", Vec::<String>::new(), |_| async { Ok(1u8) })
            .unwrap();
        let container = builder.build().unwrap();

        let err = container.resolve_as::<String>("n").await.unwrap_err();
        assert!(matches!(err, ContainerError::TypeMismatch { .. }));
    }
}
