//! Provider traits for dependency injection
//!
//! These traits define what types can be injected and how long they live.

use std::any::Any;
use std::sync::Arc;

/// Type-erased handle to a constructed service.
///
/// Singleton resolutions hand out clones of the cached `Arc`, so identity
/// can be checked with [`Arc::ptr_eq`]. Transient resolutions return a
/// fresh `Arc` owned by the caller.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Marker trait for types that can be injected via the DI container.
///
/// This is automatically implemented for all types that are `Send + Sync + 'static`.
/// You never need to implement this manually.
///
/// Trait objects are injected by registering the `Arc<dyn Trait>` itself as
/// the service value and resolving `Arc<dyn Trait>` on the consumer side.
pub trait Injectable: Send + Sync + 'static {
    /// Returns the type name for debugging
    #[inline]
    fn type_name_of() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

// Blanket implementation - everything that's Send + Sync + 'static is Injectable
impl<T: Send + Sync + 'static> Injectable for T {}

/// How long a constructed service instance lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Lifecycle {
    /// Constructed on first resolution, then shared by every resolver
    #[default]
    Singleton,

    /// New instance created on every resolve
    Transient,
}

impl Lifecycle {
    /// Check if instances of this lifecycle are cached
    #[inline]
    pub fn is_singleton(self) -> bool {
        matches!(self, Lifecycle::Singleton)
    }

    /// Lowercase label used in log fields
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Lifecycle::Singleton => "singleton",
            Lifecycle::Transient => "transient",
        }
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Release contract for cached singletons.
///
/// Attach it to a descriptor with
/// [`ServiceDescriptor::disposable`](crate::ServiceDescriptor::disposable);
/// the container calls `dispose` when the cached instance is evicted or the
/// container is disposed, last constructed first.
///
/// # Examples
///
/// ```rust
/// use service_container::{Container, Dispose, ServiceDescriptor};
/// use std::sync::atomic::{AtomicBool, Ordering};
///
/// #[derive(Default)]
/// struct Pool { closed: AtomicBool }
///
/// impl Dispose for Pool {
///     fn dispose(&self) {
///         self.closed.store(true, Ordering::SeqCst);
///     }
/// }
///
/// let container = Container::new();
/// container
///     .register(ServiceDescriptor::singleton("pool", |_| Ok(Pool::default())).disposable::<Pool>())
///     .unwrap();
///
/// let pool = container.get::<Pool>("pool").unwrap();
/// container.dispose();
/// assert!(pool.closed.load(Ordering::SeqCst));
/// ```
pub trait Dispose {
    /// Release resources held by the instance
    fn dispose(&self);
}

/// Downcast a resolved instance to the type a consumer expects.
///
/// Fails with [`DiError::TypeMismatch`](crate::DiError::TypeMismatch) naming
/// the service when the instance has a different concrete type.
#[inline]
pub fn downcast_instance<T: Injectable>(name: &str, instance: Instance) -> crate::Result<Arc<T>> {
    instance
        .downcast::<T>()
        .map_err(|_| crate::DiError::type_mismatch::<T>(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_default_is_singleton() {
        assert_eq!(Lifecycle::default(), Lifecycle::Singleton);
        assert!(Lifecycle::Singleton.is_singleton());
        assert!(!Lifecycle::Transient.is_singleton());
        assert_eq!(Lifecycle::Transient.to_string(), "transient");
    }

    #[test]
    fn test_downcast_instance() {
        let instance: Instance = Arc::new(42u32);

        let value = downcast_instance::<u32>("answer", Arc::clone(&instance)).unwrap();
        assert_eq!(*value, 42);

        let err = downcast_instance::<String>("answer", instance).unwrap_err();
        assert!(matches!(err, crate::DiError::TypeMismatch { .. }));
    }
}
