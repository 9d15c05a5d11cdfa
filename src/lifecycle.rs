//! Singleton caching and construction gating
//!
//! Each singleton gets its own slot holding a `OnceCell`. The first caller
//! to reach an empty cell runs the factory while racing callers block on
//! the same cell and then share the stored instance. A failing factory
//! leaves the cell empty, so the next resolution retries.
//!
//! A slot that leaves the map is marked detached under the shard lock.
//! Whoever fills a detached slot releases it, so every built singleton is
//! released exactly once even when eviction races its construction.

use crate::factory::ServiceDescriptor;
use crate::provider::Instance;
use crate::Result;
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// A constructed singleton and its place in construction order
struct Constructed {
    instance: Instance,
    sequence: u64,
}

/// Cache cell for one registered singleton descriptor
struct SingletonSlot {
    /// Descriptor this slot was created for; a replaced descriptor gets a new slot
    descriptor: Arc<ServiceDescriptor>,
    cell: OnceCell<Constructed>,
    /// Set once the release hook has run
    released: AtomicBool,
    /// Set under the shard lock when the slot leaves the map
    detached: AtomicBool,
    /// Serializes async construction (OnceCell cannot await inside its init)
    #[cfg(feature = "async")]
    gate: tokio::sync::Mutex<()>,
}

impl SingletonSlot {
    fn new(descriptor: Arc<ServiceDescriptor>) -> Self {
        Self {
            descriptor,
            cell: OnceCell::new(),
            released: AtomicBool::new(false),
            detached: AtomicBool::new(false),
            #[cfg(feature = "async")]
            gate: tokio::sync::Mutex::new(()),
        }
    }

    #[inline]
    fn serves(&self, descriptor: &Arc<ServiceDescriptor>) -> bool {
        Arc::ptr_eq(&self.descriptor, descriptor)
    }

    /// Mark the slot as removed from the map; call with its shard locked
    #[inline]
    fn detach(&self) -> bool {
        self.detached.store(true, Ordering::Release);
        true
    }

    /// Run the release hook on the cached instance, at most once.
    ///
    /// An empty cell is left releasable, so a construction still in flight
    /// is released by whoever notices it finished.
    fn release(&self) -> bool {
        let Some(constructed) = self.cell.get() else {
            return false;
        };
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(release) = self.descriptor.release() {
            release(&constructed.instance);
        }
        true
    }
}

/// Owns every cached singleton of a container.
pub(crate) struct LifecycleManager {
    slots: DashMap<Arc<str>, Arc<SingletonSlot>, RandomState>,
    sequence: AtomicU64,
}

impl LifecycleManager {
    pub fn with_shards(capacity: usize, shard_amount: usize) -> Self {
        Self {
            slots: DashMap::with_capacity_and_hasher_and_shard_amount(
                capacity,
                RandomState::new(),
                shard_amount,
            ),
            sequence: AtomicU64::new(0),
        }
    }

    /// Cached instance for `descriptor`, or `None` on a miss.
    #[inline]
    pub fn get_cached(&self, descriptor: &Arc<ServiceDescriptor>) -> Option<Instance> {
        let slot = self.slots.get(descriptor.name())?;
        if !slot.serves(descriptor) {
            return None;
        }
        slot.cell
            .get()
            .map(|constructed| Arc::clone(&constructed.instance))
    }

    /// Build an instance for `descriptor`.
    ///
    /// Transient services always call `build`. Singletons call it at most
    /// once per registration even when several threads race here; every
    /// racer receives the instance that ends up cached.
    pub fn construct<F>(&self, descriptor: &Arc<ServiceDescriptor>, build: F) -> Result<Instance>
    where
        F: FnOnce() -> Result<Instance>,
    {
        if !descriptor.lifecycle().is_singleton() {
            #[cfg(feature = "logging")]
            trace!(
                target: "service_container",
                service = descriptor.name(),
                "Creating new transient instance"
            );

            return build();
        }

        let slot = self.slot_for(descriptor);
        let constructed = slot.cell.get_or_try_init(|| {
            #[cfg(feature = "logging")]
            debug!(
                target: "service_container",
                service = descriptor.name(),
                "Singleton initializing on first resolution"
            );

            build().map(|instance| self.stamp(instance))
        })?;
        let instance = Arc::clone(&constructed.instance);

        self.settle(&slot);
        Ok(instance)
    }

    /// Async counterpart of [`construct`](Self::construct).
    ///
    /// The per-slot gate makes the first awaiting caller the only builder;
    /// callers queued behind it find the cell filled and reuse the instance.
    /// If the builder fails or is dropped, the next caller in line builds.
    #[cfg(feature = "async")]
    pub async fn construct_async<F, Fut>(
        &self,
        descriptor: &Arc<ServiceDescriptor>,
        build: F,
    ) -> Result<Instance>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Instance>>,
    {
        if !descriptor.lifecycle().is_singleton() {
            #[cfg(feature = "logging")]
            trace!(
                target: "service_container",
                service = descriptor.name(),
                "Creating new transient instance (async)"
            );

            return build().await;
        }

        let slot = self.slot_for(descriptor);
        if let Some(constructed) = slot.cell.get() {
            return Ok(Arc::clone(&constructed.instance));
        }

        let _gate = slot.gate.lock().await;
        if let Some(constructed) = slot.cell.get() {
            return Ok(Arc::clone(&constructed.instance));
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "service_container",
            service = descriptor.name(),
            "Singleton initializing on first resolution (async)"
        );

        let instance = build().await?;
        let constructed = slot.cell.get_or_init(|| self.stamp(instance));
        let instance = Arc::clone(&constructed.instance);

        self.settle(&slot);
        Ok(instance)
    }

    /// Drop the cached instance built for `descriptor`, running its release hook.
    ///
    /// A slot that already belongs to a newer registration of the same name
    /// is left alone. Returns `true` if a constructed instance was evicted.
    pub fn evict(&self, descriptor: &Arc<ServiceDescriptor>) -> bool {
        let Some((_, slot)) = self
            .slots
            .remove_if(descriptor.name(), |_, slot| slot.serves(descriptor) && slot.detach())
        else {
            return false;
        };
        let evicted = slot.release();

        #[cfg(feature = "logging")]
        if evicted {
            debug!(
                target: "service_container",
                service = descriptor.name(),
                "Evicted cached singleton"
            );
        }

        evicted
    }

    /// Remove every cached instance, releasing them last constructed first.
    ///
    /// Slots whose factory is still running stay in place and are cached
    /// when it finishes. Returns the number of instances that were cached.
    pub fn clear(&self) -> usize {
        let names: Vec<Arc<str>> = self.slots.iter().map(|entry| Arc::clone(entry.key())).collect();

        let mut drained: Vec<Arc<SingletonSlot>> = names
            .iter()
            .filter_map(|name| {
                self.slots
                    .remove_if(name, |_, slot| slot.cell.get().is_some() && slot.detach())
                    .map(|(_, slot)| slot)
            })
            .collect();

        drained.sort_by_key(|slot| {
            std::cmp::Reverse(slot.cell.get().map_or(0, |constructed| constructed.sequence))
        });

        for slot in &drained {
            #[cfg(feature = "logging")]
            trace!(
                target: "service_container",
                service = slot.descriptor.name(),
                has_release = slot.descriptor.has_release(),
                "Releasing cached singleton"
            );

            slot.release();
        }

        drained.len()
    }

    /// Check if a constructed instance is cached under `name`
    #[inline]
    pub fn is_cached(&self, name: &str) -> bool {
        self.slots
            .get(name)
            .is_some_and(|slot| slot.cell.get().is_some())
    }

    /// Number of constructed singletons
    pub fn cached_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| entry.value().cell.get().is_some())
            .count()
    }

    /// Slot for `descriptor`.
    ///
    /// A slot left over from an older registration of the name is replaced
    /// and released. If the map already holds a newer registration, the
    /// caller gets a detached slot that is released as soon as it is built.
    /// The map guard is dropped before returning so no shard lock is held
    /// while a factory runs.
    fn slot_for(&self, descriptor: &Arc<ServiceDescriptor>) -> Arc<SingletonSlot> {
        let fresh = || Arc::new(SingletonSlot::new(Arc::clone(descriptor)));

        let (slot, superseded) = match self.slots.entry(Arc::clone(descriptor.shared_name())) {
            Entry::Vacant(vacant) => {
                let slot = fresh();
                vacant.insert(Arc::clone(&slot));
                (slot, None)
            }
            Entry::Occupied(occupied) if occupied.get().serves(descriptor) => {
                (Arc::clone(occupied.get()), None)
            }
            Entry::Occupied(occupied)
                if occupied.get().descriptor.generation() > descriptor.generation() =>
            {
                let slot = fresh();
                slot.detach();
                (slot, None)
            }
            Entry::Occupied(mut occupied) => {
                let slot = fresh();
                let superseded = occupied.insert(Arc::clone(&slot));
                superseded.detach();
                (slot, Some(superseded))
            }
        };

        if let Some(superseded) = superseded {
            superseded.release();
        }
        slot
    }

    /// Release a freshly built slot that left the map while its factory ran.
    ///
    /// The detached flag is read under the shard lock, so either the
    /// remover sees the filled cell or this call sees the flag.
    fn settle(&self, slot: &Arc<SingletonSlot>) {
        let detached = {
            let _shard = self.slots.entry(Arc::clone(slot.descriptor.shared_name()));
            slot.detached.load(Ordering::Acquire)
        };

        if detached && slot.release() {
            #[cfg(feature = "logging")]
            debug!(
                target: "service_container",
                service = slot.descriptor.name(),
                "Released singleton evicted during construction"
            );
        }
    }

    #[inline]
    fn stamp(&self, instance: Instance) -> Constructed {
        Constructed {
            instance,
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::with_shards(0, 8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DiError, Lifecycle};
    use std::sync::atomic::AtomicU32;
    use std::sync::{Barrier, Mutex};

    fn descriptor(name: &str, lifecycle: Lifecycle) -> Arc<ServiceDescriptor> {
        Arc::new(ServiceDescriptor::new(name, lifecycle, |_| Ok(())))
    }

    fn value(v: u32) -> Result<Instance> {
        Ok(Arc::new(v) as Instance)
    }

    fn counted(name: &str, generation: u64, released: &Arc<AtomicU32>) -> Arc<ServiceDescriptor> {
        let counter = Arc::clone(released);
        let mut descriptor = ServiceDescriptor::singleton(name, |_| Ok(0u32)).on_release(
            move |_: &u32| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );
        descriptor.set_generation(generation);
        Arc::new(descriptor)
    }

    #[test]
    fn test_singleton_built_once() {
        let manager = LifecycleManager::default();
        let desc = descriptor("svc", Lifecycle::Singleton);
        let calls = AtomicU32::new(0);

        let a = manager
            .construct(&desc, || {
                calls.fetch_add(1, Ordering::SeqCst);
                value(1)
            })
            .unwrap();
        let b = manager
            .construct(&desc, || {
                calls.fetch_add(1, Ordering::SeqCst);
                value(2)
            })
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(manager.get_cached(&desc).is_some());
    }

    #[test]
    fn test_transient_never_cached() {
        let manager = LifecycleManager::default();
        let desc = descriptor("svc", Lifecycle::Transient);

        let a = manager.construct(&desc, || value(1)).unwrap();
        let b = manager.construct(&desc, || value(1)).unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert!(manager.get_cached(&desc).is_none());
        assert_eq!(manager.cached_count(), 0);
    }

    #[test]
    fn test_failure_is_not_cached() {
        let manager = LifecycleManager::default();
        let desc = descriptor("svc", Lifecycle::Singleton);

        let err = manager
            .construct(&desc, || Err(DiError::creation_failed("svc", "boom".into())))
            .unwrap_err();
        assert!(matches!(err, DiError::CreationFailed { .. }));
        assert!(!manager.is_cached("svc"));

        let retried = manager.construct(&desc, || value(9)).unwrap();
        assert_eq!(*retried.downcast::<u32>().unwrap(), 9);
    }

    #[test]
    fn test_concurrent_construct_single_invocation() {
        const THREADS: usize = 16;

        let manager = LifecycleManager::default();
        let desc = descriptor("svc", Lifecycle::Singleton);
        let calls = AtomicU32::new(0);
        let barrier = Barrier::new(THREADS);

        let instances: Vec<Instance> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        manager
                            .construct(&desc, || {
                                calls.fetch_add(1, Ordering::SeqCst);
                                std::thread::sleep(std::time::Duration::from_millis(5));
                                value(1)
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_replaced_descriptor_does_not_see_old_instance() {
        let manager = LifecycleManager::default();
        let old = descriptor("svc", Lifecycle::Singleton);
        let new = descriptor("svc", Lifecycle::Singleton);

        let first = manager.construct(&old, || value(1)).unwrap();
        assert!(manager.get_cached(&new).is_none());

        let second = manager.construct(&new, || value(2)).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(manager.get_cached(&old).is_none());
    }

    #[test]
    fn test_clear_releases_in_reverse_construction_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let manager = LifecycleManager::default();

        let names = ["first", "second", "third"];

        let descriptors: Vec<_> = names
            .iter()
            .map(|&name| {
                let order = Arc::clone(&order);
                Arc::new(
                    ServiceDescriptor::singleton(name, move |_| Ok(name))
                        .on_release(move |n: &&'static str| order.lock().unwrap().push(*n)),
                )
            })
            .collect();

        for (desc, &name) in descriptors.iter().zip(names.iter()) {
            manager
                .construct(desc, || Ok(Arc::new(name) as Instance))
                .unwrap();
        }

        assert_eq!(manager.clear(), 3);
        assert_eq!(*order.lock().unwrap(), ["third", "second", "first"]);
        assert_eq!(manager.cached_count(), 0);
    }

    #[test]
    fn test_evict_runs_release() {
        let released = Arc::new(AtomicU32::new(0));
        let manager = LifecycleManager::default();
        let counter = Arc::clone(&released);
        let desc = Arc::new(
            ServiceDescriptor::singleton("svc", |_| Ok(5u32))
                .on_release(move |v: &u32| {
                    counter.fetch_add(*v, Ordering::SeqCst);
                }),
        );

        assert!(!manager.evict(&desc));
        manager.construct(&desc, || value(5)).unwrap();
        assert!(manager.evict(&desc));
        assert!(!manager.evict(&desc));
        assert_eq!(released.load(Ordering::SeqCst), 5);
        assert!(!manager.is_cached("svc"));
    }

    #[test]
    fn test_superseded_slot_is_released() {
        let old_released = Arc::new(AtomicU32::new(0));
        let new_released = Arc::new(AtomicU32::new(0));
        let manager = LifecycleManager::default();
        let old = counted("svc", 1, &old_released);
        let new = counted("svc", 2, &new_released);

        manager.construct(&old, || value(1)).unwrap();
        manager.construct(&new, || value(2)).unwrap();

        assert_eq!(old_released.load(Ordering::SeqCst), 1);
        assert_eq!(new_released.load(Ordering::SeqCst), 0);

        // Evicting the old registration leaves the new slot alone
        assert!(!manager.evict(&old));
        assert!(manager.get_cached(&new).is_some());
    }

    #[test]
    fn test_stale_descriptor_never_displaces_newer_slot() {
        let old_released = Arc::new(AtomicU32::new(0));
        let new_released = Arc::new(AtomicU32::new(0));
        let manager = LifecycleManager::default();
        let old = counted("svc", 1, &old_released);
        let new = counted("svc", 2, &new_released);

        let current = manager.construct(&new, || value(2)).unwrap();
        let stale = manager.construct(&old, || value(1)).unwrap();

        assert!(!Arc::ptr_eq(&current, &stale));
        assert_eq!(old_released.load(Ordering::SeqCst), 1);
        assert_eq!(new_released.load(Ordering::SeqCst), 0);
        assert!(Arc::ptr_eq(&manager.get_cached(&new).unwrap(), &current));
        assert_eq!(manager.cached_count(), 1);
    }

    #[test]
    fn test_clear_during_construction_keeps_instance() {
        let released = Arc::new(AtomicU32::new(0));
        let manager = LifecycleManager::default();
        let desc = counted("svc", 1, &released);
        let started = Barrier::new(2);
        let resume = Barrier::new(2);

        let built = std::thread::scope(|s| {
            let handle = s.spawn(|| {
                manager
                    .construct(&desc, || {
                        started.wait();
                        resume.wait();
                        value(1)
                    })
                    .unwrap()
            });

            started.wait();
            assert_eq!(manager.clear(), 0);
            resume.wait();
            handle.join().unwrap()
        });

        let cached = manager.get_cached(&desc).unwrap();
        assert!(Arc::ptr_eq(&built, &cached));

        assert_eq!(manager.clear(), 1);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_evict_during_construction_releases_once_built() {
        let released = Arc::new(AtomicU32::new(0));
        let manager = LifecycleManager::default();
        let desc = counted("svc", 1, &released);
        let started = Barrier::new(2);
        let resume = Barrier::new(2);

        std::thread::scope(|s| {
            let handle = s.spawn(|| {
                manager
                    .construct(&desc, || {
                        started.wait();
                        resume.wait();
                        value(1)
                    })
                    .unwrap()
            });

            started.wait();
            assert!(!manager.evict(&desc));
            resume.wait();
            handle.join().unwrap();
        });

        assert!(!manager.is_cached("svc"));
        assert_eq!(released.load(Ordering::SeqCst), 1);

        assert_eq!(manager.clear(), 0);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
