#![no_main]

//! Fuzz target for registry and resolution operations
//!
//! Builds arbitrary dependency graphs over a small name alphabet, so that
//! missing names, self-loops and longer cycles all show up quickly.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use service_container::{BoxError, Container, Dependencies, DiError, ServiceDescriptor};
use std::sync::Arc;

const NAMES: [&str; 6] = ["a", "b", "c", "d", "e", "f"];

fn name(index: u8) -> &'static str {
    NAMES[index as usize % NAMES.len()]
}

/// Descriptor shape chosen by the fuzzer
#[derive(Debug, Arbitrary)]
struct Shape {
    name: u8,
    dependencies: Vec<u8>,
    transient: bool,
    fails: bool,
}

impl Shape {
    fn descriptor(&self) -> ServiceDescriptor {
        let service = name(self.name);
        let fails = self.fails;
        let build = move |_: &Dependencies| -> Result<&'static str, BoxError> {
            if fails {
                Err("factory failed".into())
            } else {
                Ok(service)
            }
        };

        let descriptor = if self.transient {
            ServiceDescriptor::transient(service, build)
        } else {
            ServiceDescriptor::singleton(service, build)
        };

        let mut dependencies: Vec<&str> = self.dependencies.iter().take(4).map(|&d| name(d)).collect();
        dependencies.sort_unstable();
        dependencies.dedup();
        descriptor.depends_on(dependencies)
    }
}

/// Operations to perform on the container
#[derive(Debug, Arbitrary)]
enum ContainerOp {
    Register(Shape),
    Replace(Shape),
    Unregister(u8),
    Resolve(u8),
    ResolveTwice(u8),
    Validate,
    Dispose,
    Lock,
}

fuzz_target!(|ops: Vec<ContainerOp>| {
    let container = Container::new();

    for op in ops.into_iter().take(64) {
        match op {
            ContainerOp::Register(shape) => match container.register(shape.descriptor()) {
                Ok(()) | Err(DiError::AlreadyRegistered { .. }) | Err(DiError::Locked) => {}
                Err(other) => panic!("unexpected register error: {other}"),
            },
            ContainerOp::Replace(shape) => {
                let _ = container.replace(shape.descriptor());
            }
            ContainerOp::Unregister(index) => {
                let _ = container.unregister(name(index));
            }
            ContainerOp::Resolve(index) => match container.resolve(name(index)) {
                Ok(instance) => {
                    assert_eq!(*instance.downcast_ref::<&str>().unwrap(), name(index));
                }
                Err(DiError::CircularDependency { path }) => {
                    // Path starts and ends at the re-entered name
                    assert!(path.len() >= 2);
                    assert_eq!(path.first(), path.last());
                }
                Err(DiError::NotFound { .. }) | Err(DiError::CreationFailed { .. }) => {}
                Err(other) => panic!("unexpected resolve error: {other}"),
            },
            ContainerOp::ResolveTwice(index) => {
                let name = name(index);
                if let (Ok(first), Ok(second)) = (container.resolve(name), container.resolve(name)) {
                    let singleton = container
                        .descriptor(name)
                        .is_ok_and(|descriptor| descriptor.lifecycle().is_singleton());
                    assert_eq!(Arc::ptr_eq(&first, &second), singleton);
                }
            }
            ContainerOp::Validate => {
                // A graph that validates must resolve without cycles or missing names
                if container.validate().is_ok() {
                    for name in container.service_names() {
                        match container.resolve(&name) {
                            Ok(_) | Err(DiError::CreationFailed { .. }) => {}
                            Err(other) => panic!("validated graph failed to resolve: {other}"),
                        }
                    }
                }
            }
            ContainerOp::Dispose => {
                container.dispose();
                assert_eq!(container.cached_count(), 0);
            }
            ContainerOp::Lock => container.lock(),
        }
    }
});
