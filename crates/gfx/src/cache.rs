//! Content-addressed caches of derived backend objects.
//!
//! Render passes and pipelines are keyed by their full creation
//! description. Two descriptions built independently but structurally
//! equal always map to the same backend object, and the backend is asked
//! to create it once. Entries are never evicted: the number of distinct
//! material/attachment combinations is bounded for the process lifetime.
//! The owning device destroys every entry at teardown.

use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::backend::BackendResource;
use crate::error::GfxResult;

/// Memoizes backend objects by creation description.
pub struct ObjectCache<K> {
    kind: &'static str,
    entries: Mutex<FxHashMap<K, BackendResource>>,
}

impl<K: Eq + Hash + Clone> ObjectCache<K> {
    /// Creates an empty cache. `kind` names the cached objects in logs.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FxHashMap<K, BackendResource>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the object cached for `key`, creating it on a miss.
    ///
    /// The lock is held across `create`, so concurrent misses on the same
    /// key still create a single object.
    ///
    /// # Errors
    ///
    /// Returns the error of `create`; nothing is cached in that case.
    pub fn get_or_create(
        &self,
        key: &K,
        create: impl FnOnce(&K) -> GfxResult<BackendResource>,
    ) -> GfxResult<BackendResource> {
        let mut entries = self.lock();
        if let Some(&object) = entries.get(key) {
            return Ok(object);
        }

        let object = create(key)?;
        entries.insert(key.clone(), object);
        debug!("Cached new {} ({} total)", self.kind, entries.len());
        Ok(object)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Empties the cache, returning every cached object.
    pub fn drain(&self) -> Vec<BackendResource> {
        self.lock().drain().map(|(_, object)| object).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::error::GfxError;

    #[test]
    fn test_equal_keys_create_once() {
        let cache = ObjectCache::new("test object");
        let created = Cell::new(0);
        let create = |_: &String| {
            created.set(created.get() + 1);
            Ok(BackendResource::new(42))
        };

        let a = cache.get_or_create(&String::from("key"), create).unwrap();
        let b = cache.get_or_create(&String::from("key"), create).unwrap();

        assert_eq!(a, b);
        assert_eq!(created.get(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failed_create_is_not_cached() {
        let cache = ObjectCache::new("test object");
        let result = cache.get_or_create(&1u32, |_| Err(GfxError::OutOfDeviceMemory));
        assert_eq!(result, Err(GfxError::OutOfDeviceMemory));
        assert_eq!(cache.len(), 0);

        let object = cache
            .get_or_create(&1u32, |_| Ok(BackendResource::new(3)))
            .unwrap();
        assert_eq!(object, BackendResource::new(3));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_drain_empties_cache() {
        let cache = ObjectCache::new("test object");
        cache.get_or_create(&1u8, |_| Ok(BackendResource::new(1))).unwrap();
        cache.get_or_create(&2u8, |_| Ok(BackendResource::new(2))).unwrap();

        let mut drained = cache.drain();
        drained.sort();
        assert_eq!(drained, vec![BackendResource::new(1), BackendResource::new(2)]);
        assert_eq!(cache.len(), 0);
    }
}
