//! # Service Container - Name-Keyed Inversion of Control for Rust
//!
//! A thread-safe container that maps service names to factories, builds
//! each service's declared dependencies before the service itself, and
//! caches singletons so that every resolver shares one instance.
//!
//! ## Features
//!
//! - **Name-keyed registry** - Services are registered and resolved by string name
//! - **Explicit dependencies** - A descriptor lists the names its factory needs, in order
//! - **Cycle detection** - `a -> b -> a` fails with the full path instead of overflowing the stack
//! - **At-most-once singletons** - Racing resolvers never run a singleton factory twice
//! - **Transient services** - Fresh instance on every resolve
//! - **Ordered teardown** - Release hooks run last constructed first
//! - **Async factories** - Optional `async` feature with awaitable resolution and timeouts
//! - **Observable** - Optional tracing integration with JSON or pretty output
//!
//! ## Quick Start
//!
//! ```rust
//! use service_container::{Container, ServiceDescriptor};
//! use std::sync::Arc;
//!
//! struct Config {
//!     url: String,
//! }
//!
//! struct Database {
//!     config: Arc<Config>,
//! }
//!
//! let container = Container::new();
//!
//! container
//!     .instance("config", Config { url: "postgres://localhost".into() })
//!     .unwrap();
//! container
//!     .register(
//!         ServiceDescriptor::singleton("db", |deps| Ok(Database { config: deps.get(0)? }))
//!             .depends_on(["config"]),
//!     )
//!     .unwrap();
//!
//! let db = container.get::<Database>("db").unwrap();
//! assert_eq!(db.config.url, "postgres://localhost");
//! ```
//!
//! ## Cycle Detection
//!
//! ```rust
//! use service_container::{Container, DiError};
//!
//! let container = Container::new();
//! container.singleton("a", &["b"], |_| Ok(())).unwrap();
//! container.singleton("b", &["a"], |_| Ok(())).unwrap();
//!
//! let err = container.resolve("a").unwrap_err();
//! assert!(matches!(err, DiError::CircularDependency { ref path } if path == &["a", "b", "a"]));
//! assert_eq!(err.to_string(), "Circular dependency detected: a -> b -> a");
//! ```
//!
//! ## Teardown
//!
//! ```rust
//! use service_container::{Container, ServiceDescriptor};
//!
//! struct Pool;
//!
//! let container = Container::new();
//! container
//!     .register(
//!         ServiceDescriptor::singleton("pool", |_| Ok(Pool))
//!             .on_release(|_: &Pool| println!("closing pool")),
//!     )
//!     .unwrap();
//!
//! container.resolve("pool").unwrap();
//! assert_eq!(container.dispose(), 1);
//! assert!(!container.is_cached("pool"));
//! ```

mod component;
mod container;
mod context;
mod error;
mod factory;
mod lifecycle;
#[cfg(feature = "logging")]
pub mod logging;
mod provider;
mod registry;

pub use component::{Component, ServiceModule};
pub use container::Container;
pub use context::{ResolutionContext, ResolutionFrame};
pub use error::{BoxError, DiError, Result};
#[cfg(feature = "async")]
pub use factory::BoxFuture;
pub use factory::{Dependencies, ServiceDescriptor};
pub use provider::{downcast_instance, Dispose, Injectable, Instance, Lifecycle};

// Re-export tracing macros for convenience when logging feature is enabled
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

// Re-export for convenience
pub use std::sync::Arc;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        BoxError, Component, Container, Dependencies, DiError, Dispose, Injectable, Instance,
        Lifecycle, Result, ServiceDescriptor, ServiceModule,
    };
    pub use std::sync::Arc;
}


#[cfg(all(test, feature = "async"))]
mod async_tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Connection {
        id: u32,
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_async_singleton_constructed_once() {
        static CONNECTS: AtomicU32 = AtomicU32::new(0);

        let container = Container::new();
        container
            .register(ServiceDescriptor::singleton_async("conn", |_| async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(Connection {
                    id: CONNECTS.fetch_add(1, Ordering::SeqCst),
                })
            }))
            .unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let container = container.clone();
                tokio::spawn(async move { container.get_async::<Connection>("conn").await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap().id, 0);
        }
        assert_eq!(CONNECTS.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_async_chain_with_sync_dependencies() {
        struct Config {
            host: &'static str,
        }

        let container = Container::new();
        container.instance("config", Config { host: "db.internal" }).unwrap();
        container
            .register(
                ServiceDescriptor::transient_async("client", |deps| async move {
                    let config = deps.get::<Config>(0)?;
                    Ok::<_, BoxError>(format!("client for {}", config.host))
                })
                .depends_on(["config"]),
            )
            .unwrap();

        let a = container.get_async::<String>("client").await.unwrap();
        let b = container.get_async::<String>("client").await.unwrap();
        assert_eq!(*a, "client for db.internal");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_async_cycle_detected() {
        let container = Container::new();
        container
            .register(ServiceDescriptor::singleton_async("a", |_| async { Ok(()) }).depends_on(["b"]))
            .unwrap();
        container.singleton("b", &["a"], |_| Ok(())).unwrap();

        let err = container.resolve_async("a").await.unwrap_err();
        assert!(matches!(err, DiError::CircularDependency { ref path } if path == &["a", "b", "a"]));
    }

    #[tokio::test]
    async fn test_async_failure_is_retried() {
        static ATTEMPTS: AtomicU32 = AtomicU32::new(0);

        let container = Container::new();
        container
            .register(ServiceDescriptor::singleton_async("flaky", |_| async {
                if ATTEMPTS.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(BoxError::from("timeout talking to upstream"))
                } else {
                    Ok(7u8)
                }
            }))
            .unwrap();

        let err = container.resolve_async("flaky").await.unwrap_err();
        assert!(matches!(err, DiError::CreationFailed { .. }));
        assert_eq!(*container.get_async::<u8>("flaky").await.unwrap(), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_timeout_keeps_construction_running() {
        static CONNECTS: AtomicU32 = AtomicU32::new(0);

        let container = Container::new();
        container
            .register(ServiceDescriptor::singleton_async("slow", |_| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(Connection {
                    id: CONNECTS.fetch_add(1, Ordering::SeqCst),
                })
            }))
            .unwrap();

        let err = container
            .resolve_timeout("slow", Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, DiError::Timeout { ref name, .. } if name == "slow"));

        // The abandoned construction finishes and is reused
        let conn = container
            .resolve_timeout("slow", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(conn.downcast_ref::<Connection>().is_some());
        assert_eq!(CONNECTS.load(Ordering::SeqCst), 1);
        assert!(container.is_cached("slow"));
    }

    #[tokio::test]
    async fn test_timeout_fast_path() {
        let container = Container::new();
        container.instance("ready", 5u8).unwrap();

        let value = container
            .resolve_timeout("ready", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(*downcast_instance::<u8>("ready", value).unwrap(), 5);
    }
}
