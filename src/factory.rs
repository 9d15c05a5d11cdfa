//! Service descriptors and the factories they carry
//!
//! A [`ServiceDescriptor`] is the declarative registration unit: a unique
//! name, the ordered names of the services it depends on, a lifecycle, and
//! a factory that turns the resolved dependencies into an instance.
//!
//! Factories are type-erased at construction time so the resolver only ever
//! deals with [`Instance`] handles.

use crate::provider::{downcast_instance, Dispose, Injectable, Instance, Lifecycle};
use crate::{BoxError, DiError, Result};
use ahash::AHashSet;
use std::sync::Arc;

#[cfg(feature = "async")]
use std::future::Future;
#[cfg(feature = "async")]
use std::pin::Pin;

/// Type-erased synchronous factory function
pub(crate) type SyncFactoryFn =
    Arc<dyn Fn(&Dependencies) -> std::result::Result<Instance, BoxError> + Send + Sync>;

/// Boxed future returned by async factories
#[cfg(feature = "async")]
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased asynchronous factory function
#[cfg(feature = "async")]
pub(crate) type AsyncFactoryFn = Arc<
    dyn Fn(Dependencies) -> BoxFuture<'static, std::result::Result<Instance, BoxError>>
        + Send
        + Sync,
>;

/// Type-erased release hook
pub(crate) type ReleaseFn = Arc<dyn Fn(&Instance) + Send + Sync>;

/// How a descriptor builds its instance.
#[derive(Clone)]
pub(crate) enum Factory {
    /// Runs inline on the resolving thread
    Sync(SyncFactoryFn),
    /// Must be awaited; only reachable through `resolve_async`
    #[cfg(feature = "async")]
    Async(AsyncFactoryFn),
}

impl Factory {
    #[inline]
    fn is_async(&self) -> bool {
        match self {
            Factory::Sync(_) => false,
            #[cfg(feature = "async")]
            Factory::Async(_) => true,
        }
    }
}

// =============================================================================
// Dependencies
// =============================================================================

/// Resolved dependency instances, in the order the descriptor declared them.
///
/// This is the argument list a factory receives. Slots are read back with
/// a type check, so a provider of the wrong shape is reported as
/// [`DiError::TypeMismatch`] instead of being silently accepted.
#[derive(Clone, Default)]
pub struct Dependencies {
    entries: Vec<(Arc<str>, Instance)>,
}

impl Dependencies {
    #[inline]
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub(crate) fn push(&mut self, name: Arc<str>, instance: Instance) {
        self.entries.push((name, instance));
    }

    /// Number of resolved dependencies
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the service declared no dependencies
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Name of the dependency at `index`
    #[inline]
    pub fn name(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|(name, _)| &**name)
    }

    /// Raw instance at `index`
    #[inline]
    pub fn instance(&self, index: usize) -> Option<&Instance> {
        self.entries.get(index).map(|(_, instance)| instance)
    }

    /// Typed access to the dependency at `index`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use service_container::{Container, ServiceDescriptor};
    /// use std::sync::Arc;
    ///
    /// struct Config { url: String }
    /// struct Database { url: String }
    ///
    /// let container = Container::new();
    /// container.instance("config", Config { url: "postgres://localhost".into() }).unwrap();
    /// container
    ///     .register(
    ///         ServiceDescriptor::singleton("db", |deps| {
    ///             let config = deps.get::<Config>(0)?;
    ///             Ok(Database { url: config.url.clone() })
    ///         })
    ///         .depends_on(["config"]),
    ///     )
    ///     .unwrap();
    ///
    /// let db = container.get::<Database>("db").unwrap();
    /// assert_eq!(db.url, "postgres://localhost");
    /// ```
    pub fn get<T: Injectable>(&self, index: usize) -> Result<Arc<T>> {
        let (name, instance) = self.entries.get(index).ok_or(DiError::ArgumentOutOfRange {
            index,
            len: self.entries.len(),
        })?;
        downcast_instance(name, Arc::clone(instance))
    }

    /// Typed access to a dependency by its registered name
    pub fn by_name<T: Injectable>(&self, name: &str) -> Result<Arc<T>> {
        let (name, instance) = self
            .entries
            .iter()
            .find(|(candidate, _)| &**candidate == name)
            .ok_or_else(|| DiError::not_found(name))?;
        downcast_instance(name, Arc::clone(instance))
    }

    /// Iterate over `(name, instance)` pairs in declared order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Instance)> {
        self.entries
            .iter()
            .map(|(name, instance)| (&**name, instance))
    }
}

impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(name, _)| name))
            .finish()
    }
}

// =============================================================================
// ServiceDescriptor
// =============================================================================

/// Declarative definition of a registrable service.
///
/// # Examples
///
/// ```rust
/// use service_container::{Lifecycle, ServiceDescriptor};
///
/// struct Logger;
/// struct UserService;
///
/// let logger = ServiceDescriptor::singleton("logger", |_| Ok(Logger));
/// let users = ServiceDescriptor::transient("users", |_| Ok(UserService))
///     .depends_on(["db", "logger"]);
///
/// assert_eq!(logger.lifecycle(), Lifecycle::Singleton);
/// assert_eq!(users.dependency_names().collect::<Vec<_>>(), ["db", "logger"]);
/// ```
#[derive(Clone)]
pub struct ServiceDescriptor {
    name: Arc<str>,
    factory: Factory,
    dependencies: Vec<Arc<str>>,
    lifecycle: Lifecycle,
    release: Option<ReleaseFn>,
    /// Registration order, stamped by the registry; later wins on the same name
    generation: u64,
}

impl ServiceDescriptor {
    /// Create a descriptor from a fallible factory.
    pub fn new<T, F>(name: impl Into<Arc<str>>, lifecycle: Lifecycle, factory: F) -> Self
    where
        T: Injectable,
        F: Fn(&Dependencies) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::from_erased(
            name,
            lifecycle,
            Arc::new(move |deps: &Dependencies| {
                factory(deps).map(|value| Arc::new(value) as Instance)
            }),
        )
    }

    /// Create a singleton descriptor
    #[inline]
    pub fn singleton<T, F>(name: impl Into<Arc<str>>, factory: F) -> Self
    where
        T: Injectable,
        F: Fn(&Dependencies) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::new(name, Lifecycle::Singleton, factory)
    }

    /// Create a transient descriptor
    #[inline]
    pub fn transient<T, F>(name: impl Into<Arc<str>>, factory: F) -> Self
    where
        T: Injectable,
        F: Fn(&Dependencies) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        Self::new(name, Lifecycle::Transient, factory)
    }

    /// Create a descriptor whose factory already produces type-erased instances.
    ///
    /// Useful when a factory must hand back an existing `Arc` rather than
    /// wrapping a fresh value.
    pub fn from_instance_fn<F>(name: impl Into<Arc<str>>, lifecycle: Lifecycle, factory: F) -> Self
    where
        F: Fn(&Dependencies) -> std::result::Result<Instance, BoxError> + Send + Sync + 'static,
    {
        Self::from_erased(name, lifecycle, Arc::new(factory))
    }

    fn from_erased(name: impl Into<Arc<str>>, lifecycle: Lifecycle, factory: SyncFactoryFn) -> Self {
        Self {
            name: name.into(),
            factory: Factory::Sync(factory),
            dependencies: Vec::new(),
            lifecycle,
            release: None,
            generation: 0,
        }
    }

    /// Create a descriptor from an async factory.
    ///
    /// Services built this way (and everything that depends on them) must be
    /// resolved with [`Container::resolve_async`](crate::Container::resolve_async).
    #[cfg(feature = "async")]
    pub fn new_async<T, F, Fut>(name: impl Into<Arc<str>>, lifecycle: Lifecycle, factory: F) -> Self
    where
        T: Injectable,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, BoxError>> + Send + 'static,
    {
        let erased: AsyncFactoryFn = Arc::new(move |deps: Dependencies| {
            let pending = factory(deps);
            Box::pin(async move { pending.await.map(|value| Arc::new(value) as Instance) })
        });

        Self {
            name: name.into(),
            factory: Factory::Async(erased),
            dependencies: Vec::new(),
            lifecycle,
            release: None,
            generation: 0,
        }
    }

    /// Create a singleton descriptor from an async factory
    #[cfg(feature = "async")]
    #[inline]
    pub fn singleton_async<T, F, Fut>(name: impl Into<Arc<str>>, factory: F) -> Self
    where
        T: Injectable,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, BoxError>> + Send + 'static,
    {
        Self::new_async(name, Lifecycle::Singleton, factory)
    }

    /// Create a transient descriptor from an async factory
    #[cfg(feature = "async")]
    #[inline]
    pub fn transient_async<T, F, Fut>(name: impl Into<Arc<str>>, factory: F) -> Self
    where
        T: Injectable,
        F: Fn(Dependencies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, BoxError>> + Send + 'static,
    {
        Self::new_async(name, Lifecycle::Transient, factory)
    }

    /// Append dependency names; their order is the factory's argument order.
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Run `release` when a cached instance of this service is torn down.
    ///
    /// Ignored for transient services, whose instances belong to the caller.
    pub fn on_release<T, F>(mut self, release: F) -> Self
    where
        T: Injectable,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.release = Some(Arc::new(move |instance: &Instance| {
            if let Some(value) = (**instance).downcast_ref::<T>() {
                release(value);
            }
        }));
        self
    }

    /// Use the [`Dispose`] implementation of `T` as the release hook
    #[inline]
    pub fn disposable<T: Injectable + Dispose>(self) -> Self {
        self.on_release(|value: &T| value.dispose())
    }

    /// Unique service name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub(crate) fn shared_name(&self) -> &Arc<str> {
        &self.name
    }

    /// Declared dependencies in argument order
    #[inline]
    pub fn dependencies(&self) -> &[Arc<str>] {
        &self.dependencies
    }

    /// Declared dependency names in argument order
    pub fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.iter().map(|name| &**name)
    }

    /// Service lifecycle
    #[inline]
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Check if the factory must be awaited
    #[inline]
    pub fn is_async(&self) -> bool {
        self.factory.is_async()
    }

    /// Check if a release hook is attached
    #[inline]
    pub fn has_release(&self) -> bool {
        self.release.is_some()
    }

    #[inline]
    pub(crate) fn factory(&self) -> &Factory {
        &self.factory
    }

    #[inline]
    pub(crate) fn release(&self) -> Option<&ReleaseFn> {
        self.release.as_ref()
    }

    #[inline]
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    /// Reject descriptors the registry cannot hold.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(DiError::invalid_descriptor("", "service name must not be empty"));
        }

        let mut seen = AHashSet::with_capacity(self.dependencies.len());
        for dependency in &self.dependencies {
            if dependency.is_empty() {
                return Err(DiError::invalid_descriptor(
                    &*self.name,
                    "dependency names must not be empty",
                ));
            }
            if !seen.insert(dependency) {
                return Err(DiError::invalid_descriptor(
                    &*self.name,
                    format!("dependency '{dependency}' is declared more than once"),
                ));
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("lifecycle", &self.lifecycle)
            .field("is_async", &self.is_async())
            .field("has_release", &self.has_release())
            .finish()
    }
}
