//! Name-keyed dependency injection container
//!
//! The `Container` owns the registry of service descriptors and the cache
//! of constructed singletons, and resolves a requested name into a fully
//! built instance by recursing through the declared dependencies.

use crate::context::ResolutionContext;
use crate::factory::{Dependencies, Factory, ServiceDescriptor};
use crate::lifecycle::LifecycleManager;
use crate::provider::{downcast_instance, Injectable, Instance, Lifecycle};
use crate::registry::{shard_amount_for, Registry};
use crate::{BoxError, DiError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

#[cfg(feature = "async")]
use crate::factory::BoxFuture;
#[cfg(feature = "async")]
use std::time::Duration;

/// Inversion-of-control container keyed by service name.
///
/// Cloning is cheap and yields a handle to the same registry and cache.
/// Independent containers share nothing, so tests can each build their own.
///
/// # Examples
///
/// ```rust
/// use service_container::{Container, ServiceDescriptor};
/// use std::sync::Arc;
///
/// struct Logger;
/// struct Database { logger: Arc<Logger> }
/// struct UserService { db: Arc<Database>, logger: Arc<Logger> }
///
/// let container = Container::new();
/// container.register(ServiceDescriptor::singleton("logger", |_| Ok(Logger))).unwrap();
/// container
///     .register(
///         ServiceDescriptor::singleton("db", |deps| Ok(Database { logger: deps.get(0)? }))
///             .depends_on(["logger"]),
///     )
///     .unwrap();
/// container
///     .register(
///         ServiceDescriptor::transient("users", |deps| {
///             Ok(UserService { db: deps.get(0)?, logger: deps.get(1)? })
///         })
///         .depends_on(["db", "logger"]),
///     )
///     .unwrap();
///
/// let a = container.get::<UserService>("users").unwrap();
/// let b = container.get::<UserService>("users").unwrap();
/// assert!(!Arc::ptr_eq(&a, &b));
/// assert!(Arc::ptr_eq(&a.db, &b.db));
/// assert!(Arc::ptr_eq(&a.logger, &b.logger));
/// ```
#[derive(Clone)]
pub struct Container {
    /// Service descriptors (lock-free reads)
    registry: Arc<Registry>,
    /// Cached singletons and their construction gates
    lifecycle: Arc<LifecycleManager>,
    /// Lock state - uses AtomicBool for fast lock checking (no contention)
    locked: Arc<AtomicBool>,
}

impl Container {
    /// Create a new empty container.
    #[inline]
    pub fn new() -> Self {
        #[cfg(feature = "logging")]
        debug!(
            target: "service_container",
            "Creating new DI container"
        );

        Self::with_capacity(0)
    }

    /// Create a container with pre-allocated capacity.
    ///
    /// Use this when you know approximately how many services will be registered.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry::with_capacity(capacity)),
            lifecycle: Arc::new(LifecycleManager::with_shards(
                capacity,
                shard_amount_for(capacity),
            )),
            locked: Arc::new(AtomicBool::new(false)),
        }
    }

    // =========================================================================
    // Registration Methods
    // =========================================================================

    /// Register a descriptor.
    ///
    /// Fails with [`DiError::AlreadyRegistered`] if the name is taken; use
    /// [`replace`](Self::replace) to overwrite deliberately.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use service_container::{Container, DiError, ServiceDescriptor};
    ///
    /// let container = Container::new();
    /// container.register(ServiceDescriptor::singleton("port", |_| Ok(8080u16))).unwrap();
    ///
    /// let err = container
    ///     .register(ServiceDescriptor::singleton("port", |_| Ok(9090u16)))
    ///     .unwrap_err();
    /// assert!(matches!(err, DiError::AlreadyRegistered { .. }));
    /// ```
    pub fn register(&self, descriptor: ServiceDescriptor) -> Result<()> {
        self.check_not_locked()?;

        #[cfg(feature = "logging")]
        let (name, lifecycle, dependency_count) = (
            Arc::clone(descriptor.shared_name()),
            descriptor.lifecycle(),
            descriptor.dependencies().len(),
        );

        self.registry.insert(descriptor, false)?;

        #[cfg(feature = "logging")]
        debug!(
            target: "service_container",
            service = &*name,
            lifecycle = lifecycle.as_str(),
            dependencies = dependency_count,
            service_count = self.registry.len(),
            "Registered service"
        );

        Ok(())
    }

    /// Register a descriptor, overwriting any existing one with the same name.
    ///
    /// A singleton already constructed for the old descriptor is evicted
    /// (and released), so later resolutions build from the new factory.
    /// Returns `true` if a descriptor was replaced.
    pub fn replace(&self, descriptor: ServiceDescriptor) -> Result<bool> {
        self.check_not_locked()?;

        #[cfg(feature = "logging")]
        let name = Arc::clone(descriptor.shared_name());
        let previous = self.registry.insert(descriptor, true)?;
        let replaced = previous.is_some();
        // Only the slot built from the old descriptor goes; a slot the new
        // descriptor already filled stays cached.
        if let Some(previous) = &previous {
            self.lifecycle.evict(previous);
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "service_container",
            service = &*name,
            replaced = replaced,
            "Registered service with replace"
        );

        Ok(replaced)
    }

    /// Register a lazily constructed singleton.
    pub fn singleton<T, F>(&self, name: &str, dependencies: &[&str], factory: F) -> Result<()>
    where
        T: Injectable,
        F: Fn(&Dependencies) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        self.register(
            ServiceDescriptor::singleton(name, factory).depends_on(dependencies.iter().copied()),
        )
    }

    /// Register a transient service (new instance on every resolve).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use service_container::Container;
    /// use std::sync::atomic::{AtomicU64, Ordering};
    ///
    /// static COUNTER: AtomicU64 = AtomicU64::new(0);
    ///
    /// struct RequestId(u64);
    ///
    /// let container = Container::new();
    /// container
    ///     .transient("request_id", &[], |_| {
    ///         Ok(RequestId(COUNTER.fetch_add(1, Ordering::SeqCst)))
    ///     })
    ///     .unwrap();
    ///
    /// let id1 = container.get::<RequestId>("request_id").unwrap();
    /// let id2 = container.get::<RequestId>("request_id").unwrap();
    /// assert_ne!(id1.0, id2.0);
    /// ```
    pub fn transient<T, F>(&self, name: &str, dependencies: &[&str], factory: F) -> Result<()>
    where
        T: Injectable,
        F: Fn(&Dependencies) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        self.register(
            ServiceDescriptor::transient(name, factory).depends_on(dependencies.iter().copied()),
        )
    }

    /// Register an already-built value as a singleton.
    ///
    /// Every resolution returns the same `Arc` wrapping `value`.
    pub fn instance<T: Injectable>(&self, name: &str, value: T) -> Result<()> {
        let shared: Instance = Arc::new(value);
        self.register(ServiceDescriptor::from_instance_fn(
            name,
            Lifecycle::Singleton,
            move |_| Ok(Arc::clone(&shared)),
        ))
    }

    /// Remove a registration and evict its cached singleton.
    ///
    /// Absent names are ignored. Returns `true` if a registration was removed.
    pub fn unregister(&self, name: &str) -> Result<bool> {
        self.check_not_locked()?;

        let removed = self.registry.remove(name);
        #[cfg_attr(not(feature = "logging"), allow(unused_variables))]
        let evicted = removed
            .as_ref()
            .is_some_and(|descriptor| self.lifecycle.evict(descriptor));

        #[cfg(feature = "logging")]
        debug!(
            target: "service_container",
            service = name,
            removed = removed.is_some(),
            evicted = evicted,
            "Unregistered service"
        );

        Ok(removed.is_some())
    }

    // =========================================================================
    // Resolution Methods
    // =========================================================================

    /// Resolve a service by name into a type-erased instance.
    ///
    /// Each call gets its own [`ResolutionContext`], so concurrent callers
    /// never trip over each other's in-progress names.
    pub fn resolve(&self, name: &str) -> Result<Instance> {
        let mut context = ResolutionContext::new();
        self.resolve_with(name, &mut context)
    }

    /// Resolve as part of an existing resolution chain.
    ///
    /// `name` is checked against the names already in `context`, so a
    /// dependency that leads back to an in-progress service fails with
    /// [`DiError::CircularDependency`] instead of recursing forever.
    pub fn resolve_with(&self, name: &str, context: &mut ResolutionContext) -> Result<Instance> {
        let descriptor = self.registry.get(name)?;
        let mut frame = context.enter(descriptor.shared_name())?;

        if descriptor.lifecycle().is_singleton() {
            if let Some(cached) = self.lifecycle.get_cached(&descriptor) {
                #[cfg(feature = "logging")]
                trace!(
                    target: "service_container",
                    service = name,
                    depth = frame.depth(),
                    location = "cache",
                    "Service resolved from singleton cache"
                );
                return Ok(cached);
            }
        }

        let factory = match descriptor.factory() {
            Factory::Sync(factory) => Arc::clone(factory),
            #[cfg(feature = "async")]
            Factory::Async(_) => {
                return Err(DiError::AsyncFactory {
                    name: name.to_owned(),
                });
            }
        };

        #[cfg(feature = "logging")]
        trace!(
            target: "service_container",
            service = name,
            depth = frame.depth(),
            dependencies = descriptor.dependencies().len(),
            "Resolving service (cache miss)"
        );

        let mut dependencies = Dependencies::with_capacity(descriptor.dependencies().len());
        for dependency in descriptor.dependencies() {
            let instance = self.resolve_with(dependency, &mut frame)?;
            dependencies.push(Arc::clone(dependency), instance);
        }

        self.lifecycle.construct(&descriptor, || {
            factory(&dependencies).map_err(|cause| DiError::creation_failed(name, cause))
        })
    }

    /// Resolve a service and downcast it to `T`.
    ///
    /// Fails with [`DiError::TypeMismatch`] if the registered factory
    /// produces a different type.
    #[inline]
    pub fn get<T: Injectable>(&self, name: &str) -> Result<Arc<T>> {
        downcast_instance(name, self.resolve(name)?)
    }

    /// Try to resolve, returning None on any failure.
    #[inline]
    pub fn try_get<T: Injectable>(&self, name: &str) -> Option<Arc<T>> {
        self.get::<T>(name).ok()
    }

    /// Resolve a service whose construction chain may contain async factories.
    ///
    /// Synchronous factories along the chain run inline; async ones are
    /// awaited. Async singletons are still built at most once.
    #[cfg(feature = "async")]
    pub async fn resolve_async(&self, name: &str) -> Result<Instance> {
        let mut context = ResolutionContext::new();
        self.resolve_async_with(name, &mut context).await
    }

    /// Async counterpart of [`resolve_with`](Self::resolve_with).
    #[cfg(feature = "async")]
    pub fn resolve_async_with<'a>(
        &'a self,
        name: &'a str,
        context: &'a mut ResolutionContext,
    ) -> BoxFuture<'a, Result<Instance>> {
        Box::pin(async move {
            let descriptor = self.registry.get(name)?;
            let mut frame = context.enter(descriptor.shared_name())?;

            if descriptor.lifecycle().is_singleton() {
                if let Some(cached) = self.lifecycle.get_cached(&descriptor) {
                    #[cfg(feature = "logging")]
                    trace!(
                        target: "service_container",
                        service = name,
                        depth = frame.depth(),
                        location = "cache",
                        "Service resolved from singleton cache"
                    );
                    return Ok(cached);
                }
            }

            let mut dependencies = Dependencies::with_capacity(descriptor.dependencies().len());
            for dependency in descriptor.dependencies() {
                let instance = self.resolve_async_with(dependency, &mut frame).await?;
                dependencies.push(Arc::clone(dependency), instance);
            }

            match descriptor.factory() {
                Factory::Sync(factory) => self.lifecycle.construct(&descriptor, || {
                    factory(&dependencies).map_err(|cause| DiError::creation_failed(name, cause))
                }),
                Factory::Async(factory) => {
                    self.lifecycle
                        .construct_async(&descriptor, || async move {
                            factory(dependencies)
                                .await
                                .map_err(|cause| DiError::creation_failed(name, cause))
                        })
                        .await
                }
            }
        })
    }

    /// Async counterpart of [`get`](Self::get).
    #[cfg(feature = "async")]
    pub async fn get_async<T: Injectable>(&self, name: &str) -> Result<Arc<T>> {
        downcast_instance(name, self.resolve_async(name).await?)
    }

    /// Resolve with a caller-supplied deadline.
    ///
    /// The resolution runs on a spawned tokio task. On expiry the caller
    /// gets [`DiError::Timeout`] while the task keeps running, so a singleton
    /// construction already under way still completes and is cached; the
    /// waiter never starts a second construction.
    ///
    /// Must be called from within a tokio runtime.
    #[cfg(feature = "async")]
    pub async fn resolve_timeout(&self, name: &str, timeout: Duration) -> Result<Instance> {
        let container = self.clone();
        let owned = name.to_owned();
        let task = tokio::spawn(async move { container.resolve_async(&owned).await });

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(DiError::Internal(format!(
                "resolution task for {name} failed: {join_error}"
            ))),
            Err(_) => {
                #[cfg(feature = "logging")]
                debug!(
                    target: "service_container",
                    service = name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Stopped waiting for service resolution"
                );

                Err(DiError::Timeout {
                    name: name.to_owned(),
                    timeout,
                })
            }
        }
    }

    /// Check every registered dependency graph without constructing anything.
    ///
    /// Reports the first missing dependency ([`DiError::NotFound`]) or cycle
    /// ([`DiError::CircularDependency`]) found, visiting services in name order.
    pub fn validate(&self) -> Result<()> {
        let mut verified = ahash::AHashSet::new();
        for name in self.registry.names() {
            let mut context = ResolutionContext::new();
            self.validate_with(&name, &mut context, &mut verified)?;
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "service_container",
            service_count = verified.len(),
            "Dependency graph validated"
        );

        Ok(())
    }

    fn validate_with(
        &self,
        name: &str,
        context: &mut ResolutionContext,
        verified: &mut ahash::AHashSet<Arc<str>>,
    ) -> Result<()> {
        let descriptor = self.registry.get(name)?;
        let mut frame = context.enter(descriptor.shared_name())?;
        if verified.contains(name) {
            return Ok(());
        }

        for dependency in descriptor.dependencies() {
            self.validate_with(dependency, &mut frame, verified)?;
        }

        verified.insert(Arc::clone(descriptor.shared_name()));
        Ok(())
    }

    // =========================================================================
    // Query Methods
    // =========================================================================

    /// Check if a service is registered.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    /// Look up the descriptor registered under `name`.
    #[inline]
    pub fn descriptor(&self, name: &str) -> Result<Arc<ServiceDescriptor>> {
        self.registry.get(name)
    }

    /// Get the number of registered services.
    #[inline]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Check if no services are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// All registered service names, sorted.
    pub fn service_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Check if a singleton has been constructed and cached under `name`.
    #[inline]
    pub fn is_cached(&self, name: &str) -> bool {
        self.lifecycle.is_cached(name)
    }

    /// Number of cached singletons.
    #[inline]
    pub fn cached_count(&self) -> usize {
        self.lifecycle.cached_count()
    }

    // =========================================================================
    // Lifecycle Methods
    // =========================================================================

    /// Lock the container to prevent further registry changes.
    ///
    /// Useful for ensuring no services are registered after app initialization.
    /// Resolution and [`dispose`](Self::dispose) keep working.
    #[inline]
    pub fn lock(&self) {
        self.locked.store(true, Ordering::Release);

        #[cfg(feature = "logging")]
        debug!(
            target: "service_container",
            service_count = self.registry.len(),
            "Container locked - no further registrations allowed"
        );
    }

    /// Check if the container is locked.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Tear down every cached singleton.
    ///
    /// Release hooks run in reverse construction order: the last instance
    /// constructed is released first. Registrations are kept, so a later
    /// resolution constructs fresh instances. Returns the number of cached
    /// instances that were dropped.
    pub fn dispose(&self) -> usize {
        let released = self.lifecycle.clear();

        #[cfg(feature = "logging")]
        debug!(
            target: "service_container",
            released = released,
            service_count = self.registry.len(),
            "Container disposed - singleton cache cleared"
        );

        released
    }

    #[inline]
    fn check_not_locked(&self) -> Result<()> {
        if self.locked.load(Ordering::Relaxed) {
            return Err(DiError::Locked);
        }
        Ok(())
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("service_count", &self.len())
            .field("cached_count", &self.cached_count())
            .field("locked", &self.is_locked())
            .finish()
    }
}
