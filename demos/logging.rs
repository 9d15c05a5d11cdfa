//! Example demonstrating logging capabilities
//!
//! Only the container's own events are shown, at trace level:
//! ```bash
//! cargo run --example logging --features logging-pretty
//! ```
//!
//! Switch to JSON output with `--features logging-json` and `.json()`.

use service_container::{Container, DiError, ServiceDescriptor};
use std::sync::Arc;

// Example services
#[allow(dead_code)]
struct Config {
    url: String,
}

#[allow(dead_code)]
struct Database {
    config: Arc<Config>,
}

#[allow(dead_code)]
struct UserService {
    db: Arc<Database>,
}

fn main() {
    // Container events only, every resolution step
    service_container::logging::builder()
        .pretty()
        .trace()
        .container_only()
        .with_thread_names()
        .init();

    println!("=== Service Container Logging Demo ===\n");

    let container = Container::new();

    // Registration (logs: "Registered service")
    container
        .instance(
            "config",
            Config {
                url: "postgres://localhost/mydb".into(),
            },
        )
        .unwrap();

    container
        .register(
            ServiceDescriptor::singleton("db", |deps| {
                Ok(Database {
                    config: deps.get(0)?,
                })
            })
            .depends_on(["config"])
            .on_release(|_: &Database| println!("  [App] Closing database pool")),
        )
        .unwrap();

    container
        .transient("users", &["db"], |deps| {
            Ok(UserService {
                db: deps.get(0)?,
            })
        })
        .unwrap();

    // Resolution (logs: "Singleton initializing on first resolution", then trace steps)
    let _users = container.get::<UserService>("users").unwrap();
    let _again = container.get::<UserService>("users").unwrap();

    // Missing service (logs the failed lookup)
    assert!(container.try_get::<UserService>("missing").is_none());

    // A cycle is reported with the full path
    container.singleton("a", &["b"], |_| Ok(())).unwrap();
    container.singleton("b", &["a"], |_| Ok(())).unwrap();
    match container.resolve("a") {
        Err(DiError::CircularDependency { path }) => {
            println!("  [App] Cycle detected: {}", path.join(" -> "));
        }
        other => println!("  [App] Unexpected result: {other:?}"),
    }

    // Lock, then tear down cached singletons (logs: "Container disposed")
    container.lock();
    let released = container.dispose();

    println!("\n=== Demo Complete ===");
    println!("Released {released} cached singleton(s)");
    println!("\nTip: Use --features logging-json for production (JSON output)");
}
