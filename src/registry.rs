//! Descriptor storage for the container
//!
//! Uses DashMap for lock-free concurrent reads; writers only contend on
//! the shard that owns the name they touch.

use crate::factory::ServiceDescriptor;
use crate::{DiError, Result};
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Pick a shard count for the expected number of services.
///
/// Default DashMap uses num_cpus * 4 shards which is overkill for
/// typical containers with <50 services.
#[inline]
pub(crate) fn shard_amount_for(capacity: usize) -> usize {
    if capacity <= 16 {
        8
    } else if capacity <= 64 {
        16
    } else {
        32
    }
}

/// Thread-safe map from service name to descriptor
pub(crate) struct Registry {
    descriptors: DashMap<Arc<str>, Arc<ServiceDescriptor>, RandomState>,
    /// Source of descriptor generations
    generation: AtomicU64,
}

impl Registry {
    /// Create with pre-allocated capacity and a matching shard count.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            descriptors: DashMap::with_capacity_and_hasher_and_shard_amount(
                capacity,
                RandomState::new(),
                shard_amount_for(capacity),
            ),
            generation: AtomicU64::new(1),
        }
    }

    /// Insert a descriptor.
    ///
    /// With `replace == false` an existing name fails with
    /// [`DiError::AlreadyRegistered`]; otherwise the old descriptor is
    /// returned. The check and the insert happen under one shard lock.
    /// Each stored descriptor gets a generation higher than every earlier one.
    pub fn insert(
        &self,
        mut descriptor: ServiceDescriptor,
        replace: bool,
    ) -> Result<Option<Arc<ServiceDescriptor>>> {
        descriptor.validate()?;

        match self.descriptors.entry(Arc::clone(descriptor.shared_name())) {
            Entry::Occupied(mut occupied) => {
                if !replace {
                    return Err(DiError::already_registered(descriptor.name()));
                }
                descriptor.set_generation(self.generation.fetch_add(1, Ordering::Relaxed));
                Ok(Some(occupied.insert(Arc::new(descriptor))))
            }
            Entry::Vacant(vacant) => {
                descriptor.set_generation(self.generation.fetch_add(1, Ordering::Relaxed));
                vacant.insert(Arc::new(descriptor));
                Ok(None)
            }
        }
    }

    /// Look up a descriptor, failing with [`DiError::NotFound`] naming `name`
    #[inline]
    pub fn get(&self, name: &str) -> Result<Arc<ServiceDescriptor>> {
        self.descriptors
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| DiError::not_found(name))
    }

    /// Remove a descriptor; absent names are ignored
    #[inline]
    pub fn remove(&self, name: &str) -> Option<Arc<ServiceDescriptor>> {
        self.descriptors.remove(name).map(|(_, descriptor)| descriptor)
    }

    /// Check if a name is registered
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Get number of registered services
    #[inline]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Get all registered names, sorted for stable output
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .descriptors
            .iter()
            .map(|entry| entry.key().to_string())
            .collect();
        names.sort_unstable();
        names
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> ServiceDescriptor {
        ServiceDescriptor::singleton(name, |_| Ok(0u8))
    }

    #[test]
    fn test_registry_insert_and_get() {
        let registry = Registry::default();
        registry.insert(descriptor("db"), false).unwrap();

        let found = registry.get("db").unwrap();
        assert_eq!(found.name(), "db");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_rejects_duplicate() {
        let registry = Registry::default();
        registry.insert(descriptor("db"), false).unwrap();

        let err = registry.insert(descriptor("db"), false).unwrap_err();
        assert!(matches!(err, DiError::AlreadyRegistered { ref name } if name == "db"));
    }

    #[test]
    fn test_registry_replace_returns_previous() {
        let registry = Registry::default();
        registry.insert(descriptor("db"), false).unwrap();
        let original = registry.get("db").unwrap();

        let previous = registry.insert(descriptor("db"), true).unwrap().unwrap();
        let current = registry.get("db").unwrap();
        assert!(Arc::ptr_eq(&previous, &original));
        assert!(!Arc::ptr_eq(&current, &original));
        assert!(current.generation() > original.generation());
    }

    #[test]
    fn test_registry_missing_name() {
        let registry = Registry::default();
        let err = registry.get("nope").unwrap_err();
        assert!(matches!(err, DiError::NotFound { ref name } if name == "nope"));
    }

    #[test]
    fn test_registry_remove_is_idempotent() {
        let registry = Registry::default();
        registry.insert(descriptor("db"), false).unwrap();

        assert!(registry.remove("db").is_some());
        assert!(registry.remove("db").is_none());
        assert!(!registry.contains("db"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_names_sorted() {
        let registry = Registry::with_capacity(100);
        for name in ["c", "a", "b"] {
            registry.insert(descriptor(name), false).unwrap();
        }
        assert_eq!(registry.names(), ["a", "b", "c"]);
        assert_eq!(registry.len(), 3);
    }
}
