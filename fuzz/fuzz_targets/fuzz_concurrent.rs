#![no_main]

//! Fuzz target for concurrent container operations
//!
//! Tests that singletons are constructed at most once while several
//! threads resolve, unregister and re-register overlapping names.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use service_container::{Container, ServiceDescriptor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

const NAMES: [&str; 4] = ["config", "db", "cache", "api"];

/// Thread operation
#[derive(Debug, Clone, Arbitrary)]
enum ThreadOp {
    Resolve(u8),
    TryGet(u8),
    Contains(u8),
    Register(u8),
}

/// Concurrent test scenario
#[derive(Debug, Arbitrary)]
struct ConcurrentScenario {
    // Number of threads (clamped to 1-8)
    thread_count: u8,
    // Operations per thread (clamped)
    ops_per_thread: Vec<ThreadOp>,
}

fn pick(index: u8) -> &'static str {
    NAMES[index as usize % NAMES.len()]
}

fuzz_target!(|scenario: ConcurrentScenario| {
    let container = Container::new();
    let constructed = Arc::new(AtomicUsize::new(0));

    // config <- db <- api, cache standalone
    for (name, dependencies) in [
        ("config", &[][..]),
        ("db", &["config"][..]),
        ("cache", &[][..]),
        ("api", &["db", "cache"][..]),
    ] {
        let counter = Arc::clone(&constructed);
        container
            .register(
                ServiceDescriptor::singleton(name, move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(name)
                })
                .depends_on(dependencies.iter().copied()),
            )
            .unwrap();
    }

    // Clamp thread count
    let thread_count = (scenario.thread_count % 8).max(1) as usize;
    let ops = scenario.ops_per_thread;

    thread::scope(|scope| {
        for _ in 0..thread_count {
            let container = container.clone();
            let ops = ops.clone();

            scope.spawn(move || {
                for op in ops.into_iter().take(50) {
                    match op {
                        ThreadOp::Resolve(index) => {
                            let _ = container.resolve(pick(index));
                        }
                        ThreadOp::TryGet(index) => {
                            let _ = container.try_get::<&str>(pick(index));
                        }
                        ThreadOp::Contains(index) => {
                            let _ = container.contains(pick(index));
                        }
                        ThreadOp::Register(index) => {
                            // Duplicate registration must be rejected, never overwrite
                            let name = pick(index);
                            assert!(
                                container
                                    .register(ServiceDescriptor::singleton(name, |_| Ok(())))
                                    .is_err()
                            );
                        }
                    }
                }
            });
        }
    });

    // Each of the four singletons built at most once
    assert!(constructed.load(Ordering::SeqCst) <= NAMES.len());
    assert!(container.resolve("api").is_ok());
    assert_eq!(constructed.load(Ordering::SeqCst), NAMES.len());
});
