//! Self-describing components
//!
//! A thin convenience layer over explicit descriptors: a type declares its
//! service name, lifecycle and dependency names next to its constructor,
//! and [`Container::provide`] turns that into an ordinary
//! [`ServiceDescriptor`]. Nothing is inferred; the dependency list is still
//! written out by hand.
//!
//! # Example
//!
//! ```rust
//! use service_container::{BoxError, Component, Container, Dependencies, Lifecycle};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! impl Component for Database {
//!     const NAME: &'static str = "db";
//!
//!     fn create(_: &Dependencies) -> Result<Self, BoxError> {
//!         Ok(Database { url: "postgres://localhost".into() })
//!     }
//! }
//!
//! struct UserRepository {
//!     db: Arc<Database>,
//! }
//!
//! impl Component for UserRepository {
//!     const NAME: &'static str = "users";
//!     const LIFECYCLE: Lifecycle = Lifecycle::Transient;
//!     const DEPENDENCIES: &'static [&'static str] = &["db"];
//!
//!     fn create(deps: &Dependencies) -> Result<Self, BoxError> {
//!         Ok(UserRepository { db: deps.get(0)? })
//!     }
//! }
//!
//! let container = Container::new();
//! container.provide::<Database>().unwrap();
//! container.provide::<UserRepository>().unwrap();
//!
//! let repo = container.get_component::<UserRepository>().unwrap();
//! assert_eq!(repo.db.url, "postgres://localhost");
//! ```

use crate::factory::{Dependencies, ServiceDescriptor};
use crate::provider::{Injectable, Lifecycle};
use crate::{BoxError, Container, Result};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

/// A service that declares its own registration.
pub trait Component: Injectable + Sized {
    /// Service name the component is registered under
    const NAME: &'static str;

    /// Lifecycle of the registration
    const LIFECYCLE: Lifecycle = Lifecycle::Singleton;

    /// Dependency names, in the order `create` reads them
    const DEPENDENCIES: &'static [&'static str] = &[];

    /// Build the component from its resolved dependencies.
    fn create(deps: &Dependencies) -> std::result::Result<Self, BoxError>;

    /// Descriptor equivalent to this component's declaration
    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::new(Self::NAME, Self::LIFECYCLE, Self::create)
            .depends_on(Self::DEPENDENCIES.iter().copied())
    }
}

/// A group of related registrations installed together.
///
/// This is the in-code form of a startup configuration: it only issues
/// `register` calls and never constructs anything.
///
/// # Example
///
/// ```rust
/// use service_container::{Container, Result, ServiceModule};
///
/// struct Cache;
/// struct Metrics;
///
/// struct InfraModule;
///
/// impl ServiceModule for InfraModule {
///     fn register(container: &Container) -> Result<()> {
///         container.singleton("cache", &[], |_| Ok(Cache))?;
///         container.singleton("metrics", &["cache"], |_| Ok(Metrics))?;
///         Ok(())
///     }
/// }
///
/// let container = Container::new();
/// container.install::<InfraModule>().unwrap();
///
/// assert!(container.contains("cache"));
/// assert!(container.contains("metrics"));
/// ```
pub trait ServiceModule {
    /// Register all services in this module.
    fn register(container: &Container) -> Result<()>;
}

impl Container {
    /// Register a [`Component`] under its declared name.
    #[inline]
    pub fn provide<C: Component>(&self) -> Result<()> {
        self.register(C::descriptor())
    }

    /// Resolve a [`Component`] by its declared name.
    #[inline]
    pub fn get_component<C: Component>(&self) -> Result<Arc<C>> {
        self.get::<C>(C::NAME)
    }

    /// Install every registration of a [`ServiceModule`].
    ///
    /// Stops at the first failing registration; earlier ones stay registered.
    pub fn install<M: ServiceModule>(&self) -> Result<()> {
        #[cfg(feature = "logging")]
        let start_count = self.len();

        M::register(self)?;

        #[cfg(feature = "logging")]
        debug!(
            target: "service_container",
            module = std::any::type_name::<M>(),
            services_registered = self.len().saturating_sub(start_count),
            "Service module installed"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DiError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Config {
        debug: bool,
    }

    impl Component for Config {
        const NAME: &'static str = "config";

        fn create(_: &Dependencies) -> std::result::Result<Self, BoxError> {
            Ok(Config { debug: true })
        }
    }

    #[derive(Debug)]
    struct Logger {
        config: Arc<Config>,
    }

    impl Component for Logger {
        const NAME: &'static str = "logger";
        const DEPENDENCIES: &'static [&'static str] = &["config"];

        fn create(deps: &Dependencies) -> std::result::Result<Self, BoxError> {
            Ok(Logger {
                config: deps.get(0)?,
            })
        }
    }

    #[test]
    fn test_component_no_deps() {
        let container = Container::new();
        container.provide::<Config>().unwrap();

        let config = container.get_component::<Config>().unwrap();
        assert!(config.debug);
    }

    #[test]
    fn test_component_single_dep() {
        let container = Container::new();
        container.provide::<Config>().unwrap();
        container.provide::<Logger>().unwrap();

        let logger = container.get_component::<Logger>().unwrap();
        let config = container.get_component::<Config>().unwrap();
        assert!(Arc::ptr_eq(&logger.config, &config));
    }

    #[test]
    fn test_component_missing_dep() {
        let container = Container::new();
        container.provide::<Logger>().unwrap();

        let err = container.get_component::<Logger>().unwrap_err();
        assert!(matches!(err, DiError::NotFound { ref name } if name == "config"));
    }

    #[test]
    fn test_component_transient() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        struct Ticket(u32);

        impl Component for Ticket {
            const NAME: &'static str = "ticket";
            const LIFECYCLE: Lifecycle = Lifecycle::Transient;

            fn create(_: &Dependencies) -> std::result::Result<Self, BoxError> {
                Ok(Ticket(COUNTER.fetch_add(1, Ordering::SeqCst)))
            }
        }

        let container = Container::new();
        container.provide::<Ticket>().unwrap();

        let a = container.get_component::<Ticket>().unwrap();
        let b = container.get_component::<Ticket>().unwrap();
        assert_ne!(a.0, b.0);
    }

    #[test]
    fn test_descriptor_matches_declaration() {
        let descriptor = Logger::descriptor();
        assert_eq!(descriptor.name(), "logger");
        assert_eq!(descriptor.lifecycle(), Lifecycle::Singleton);
        assert_eq!(descriptor.dependency_names().collect::<Vec<_>>(), ["config"]);
    }

    #[test]
    fn test_service_module() {
        struct DataModule;

        impl ServiceModule for DataModule {
            fn register(container: &Container) -> Result<()> {
                container.provide::<Config>()?;
                container.provide::<Logger>()?;
                Ok(())
            }
        }

        let container = Container::new();
        container.install::<DataModule>().unwrap();

        assert!(container.contains("config"));
        assert!(container.contains("logger"));

        // Installing twice trips the duplicate check
        let err = container.install::<DataModule>().unwrap_err();
        assert!(matches!(err, DiError::AlreadyRegistered { .. }));
    }
}
