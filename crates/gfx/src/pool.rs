//! Generation-checked resource pools.
//!
//! This module provides the arena every resource kind is stored in:
//! - [`Pool`] is a slot map: a vector of slots plus a free list, handing
//!   out [`Handle`]s that stay valid while storage grows
//! - [`SyncPool`] serializes a `Pool` behind one lock per instance, so
//!   pools for different resource kinds never contend with each other
//!
//! # Overview
//!
//! Allocation always reuses the lowest free slot, keeping live records
//! packed toward the front. Freeing bumps the slot's generation, so any
//! handle still referring to the old record fails lookups instead of
//! aliasing the new one. Freeing an invalid or already-freed handle is a
//! programmer error and panics.
//!
//! # Example
//!
//! ```
//! use cobalt_gfx::pool::Pool;
//!
//! let mut pool = Pool::new();
//! let a = pool.allocate("first");
//! assert_eq!(*pool.at(a), "first");
//!
//! assert_eq!(pool.free(a), "first");
//! assert!(pool.get(a).is_none());
//!
//! // The slot is reused, but the stale handle stays stale.
//! let b = pool.allocate("second");
//! assert_eq!(a.index(), b.index());
//! assert_ne!(a, b);
//! ```

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::backend::{BackendResource, DeviceResource};
use crate::handle::Handle;

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

impl<T> Slot<T> {
    fn generation(&self) -> u32 {
        match self {
            Slot::Occupied { generation, .. } | Slot::Vacant { generation } => *generation,
        }
    }
}

/// Slot map keyed by [`Handle<T>`].
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    /// Min-heap of vacant slot indices.
    free: BinaryHeap<Reverse<u32>>,
    len: usize,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Pool<T> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: BinaryHeap::new(),
            len: 0,
        }
    }

    /// Stores `value` and returns its handle.
    ///
    /// Reuses the lowest vacant slot if there is one, otherwise grows the
    /// backing storage. Existing handles stay valid across growth.
    pub fn allocate(&mut self, value: T) -> Handle<T> {
        self.len += 1;

        if let Some(Reverse(index)) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            let generation = slot.generation();
            *slot = Slot::Occupied { generation, value };
            return Handle::new(index, generation);
        }

        let index = u32::try_from(self.slots.len())
            .ok()
            .filter(|&index| index != u32::MAX)
            .unwrap_or_else(|| panic!("pool exhausted its handle space"));
        self.slots.push(Slot::Occupied {
            generation: 0,
            value,
        });
        Handle::new(index, 0)
    }

    /// Removes and returns the record named by `handle`.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is null, stale, or out of range.
    pub fn free(&mut self, handle: Handle<T>) -> T {
        let slot = self
            .slots
            .get_mut(handle.index() as usize)
            .filter(|slot| matches!(slot, Slot::Occupied { generation, .. } if *generation == handle.generation()))
            .unwrap_or_else(|| panic!("freeing invalid or already freed {handle:?}"));

        let vacant = Slot::Vacant {
            generation: handle.generation().wrapping_add(1),
        };
        let Slot::Occupied { value, .. } = std::mem::replace(slot, vacant) else {
            unreachable!("slot was checked to be occupied");
        };

        self.free.push(Reverse(handle.index()));
        self.len -= 1;
        value
    }

    /// Returns the record named by `handle`, or `None` if it is stale.
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        match self.slots.get(handle.index() as usize)? {
            Slot::Occupied { generation, value } if *generation == handle.generation() => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Mutable variant of [`Pool::get`].
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        match self.slots.get_mut(handle.index() as usize)? {
            Slot::Occupied { generation, value } if *generation == handle.generation() => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Returns the record named by `handle`.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is null, stale, or out of range.
    pub fn at(&self, handle: Handle<T>) -> &T {
        self.get(handle)
            .unwrap_or_else(|| panic!("lookup of invalid or freed {handle:?}"))
    }

    /// Mutable variant of [`Pool::at`].
    pub fn at_mut(&mut self, handle: Handle<T>) -> &mut T {
        self.get_mut(handle)
            .unwrap_or_else(|| panic!("lookup of invalid or freed {handle:?}"))
    }

    /// Returns true if `handle` names a live record.
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live records.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates over live records in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, value } => {
                    Some((Handle::new(index as u32, *generation), value))
                }
                Slot::Vacant { .. } => None,
            })
    }

    /// Iterates mutably over live records in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| match slot {
                Slot::Occupied { generation, value } => {
                    Some((Handle::new(index as u32, *generation), value))
                }
                Slot::Vacant { .. } => None,
            })
    }

    /// Frees every live record, returning them in slot order.
    ///
    /// All outstanding handles become stale.
    pub fn clear(&mut self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.len);
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Occupied { generation, .. } = slot {
                let vacant = Slot::Vacant {
                    generation: generation.wrapping_add(1),
                };
                if let Slot::Occupied { value, .. } = std::mem::replace(slot, vacant) {
                    values.push(value);
                    self.free.push(Reverse(index as u32));
                }
            }
        }
        self.len = 0;
        values
    }
}

/// A [`Pool`] behind a mutex.
///
/// Records are only reachable through closures so that no reference
/// outlives the lock. Do not touch the same pool again from inside one of
/// those closures; the lock is not re-entrant.
pub struct SyncPool<T> {
    inner: Mutex<Pool<T>>,
}

impl<T> Default for SyncPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncPool<T> {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Pool::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pool<T>> {
        // A panic while holding the lock cannot leave a slot half-written.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// See [`Pool::allocate`].
    pub fn allocate(&self, value: T) -> Handle<T> {
        self.lock().allocate(value)
    }

    /// See [`Pool::free`].
    pub fn free(&self, handle: Handle<T>) -> T {
        self.lock().free(handle)
    }

    /// Runs `f` on the record named by `handle`.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is null, stale, or out of range.
    pub fn with<R>(&self, handle: Handle<T>, f: impl FnOnce(&T) -> R) -> R {
        f(self.lock().at(handle))
    }

    /// Runs `f` on the record named by `handle`, mutably.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is null, stale, or out of range.
    pub fn with_mut<R>(&self, handle: Handle<T>, f: impl FnOnce(&mut T) -> R) -> R {
        f(self.lock().at_mut(handle))
    }

    /// Runs `f` on the record if `handle` is live.
    pub fn try_with<R>(&self, handle: Handle<T>, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.lock().get(handle).map(f)
    }

    /// Runs `f` on every live record.
    pub fn for_each_mut(&self, mut f: impl FnMut(Handle<T>, &mut T)) {
        for (handle, value) in self.lock().iter_mut() {
            f(handle, value);
        }
    }

    /// See [`Pool::contains`].
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.lock().contains(handle)
    }

    /// See [`Pool::len`].
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// See [`Pool::clear`].
    pub fn clear(&self) -> Vec<T> {
        self.lock().clear()
    }
}

impl<T: DeviceResource> SyncPool<T> {
    /// Returns the backend object behind `handle`.
    ///
    /// # Panics
    ///
    /// Panics if `handle` is null, stale, or out of range.
    pub fn resource(&self, handle: Handle<T>) -> BackendResource {
        self.with(handle, DeviceResource::resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_and_lookup() {
        let mut pool = Pool::new();
        let a = pool.allocate(10);
        let b = pool.allocate(20);
        assert_eq!(*pool.at(a), 10);
        assert_eq!(*pool.at(b), 20);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_free_makes_handle_stale() {
        let mut pool = Pool::new();
        let a = pool.allocate(String::from("a"));
        assert_eq!(pool.free(a), "a");
        assert!(pool.get(a).is_none());
        assert!(!pool.contains(a));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_reused_slot_holds_new_content() {
        let mut pool = Pool::new();
        let old = pool.allocate(1);
        pool.free(old);
        let new = pool.allocate(2);

        assert_eq!(old.index(), new.index());
        assert!(pool.get(old).is_none());
        assert_eq!(*pool.at(new), 2);
    }

    #[test]
    fn test_lowest_free_slot_is_reused() {
        let mut pool = Pool::new();
        let handles: Vec<_> = (0..5).map(|i| pool.allocate(i)).collect();
        pool.free(handles[3]);
        pool.free(handles[1]);

        assert_eq!(pool.allocate(10).index(), 1);
        assert_eq!(pool.allocate(11).index(), 3);
        assert_eq!(pool.allocate(12).index(), 5);
    }

    #[test]
    fn test_growth_preserves_existing_handles() {
        let mut pool = Pool::new();
        let first = pool.allocate(0usize);
        for i in 1..1000 {
            pool.allocate(i);
        }
        assert_eq!(*pool.at(first), 0);
    }

    #[test]
    #[should_panic(expected = "already freed")]
    fn test_double_free_panics() {
        let mut pool = Pool::new();
        let a = pool.allocate(1);
        pool.free(a);
        pool.free(a);
    }

    #[test]
    #[should_panic(expected = "lookup of invalid")]
    fn test_null_lookup_panics() {
        let pool = Pool::<u32>::new();
        pool.at(Handle::NULL);
    }

    #[test]
    fn test_clear_stales_everything() {
        let mut pool = Pool::new();
        let a = pool.allocate('a');
        let b = pool.allocate('b');
        assert_eq!(pool.clear(), vec!['a', 'b']);
        assert!(pool.get(a).is_none());
        assert!(pool.get(b).is_none());
        assert_eq!(pool.allocate('c').index(), 0);
    }

    #[test]
    fn test_iter_skips_vacant_slots() {
        let mut pool = Pool::new();
        let a = pool.allocate(1);
        let b = pool.allocate(2);
        let c = pool.allocate(3);
        pool.free(b);

        let live: Vec<_> = pool.iter().map(|(h, v)| (h, *v)).collect();
        assert_eq!(live, vec![(a, 1), (c, 3)]);
    }

    #[test]
    fn test_sync_pool_concurrent_allocation() {
        let pool = SyncPool::new();
        std::thread::scope(|scope| {
            for t in 0..4 {
                let pool = &pool;
                scope.spawn(move || {
                    for i in 0..100 {
                        let handle = pool.allocate(t * 1000 + i);
                        assert_eq!(pool.with(handle, |v| *v), t * 1000 + i);
                    }
                });
            }
        });
        assert_eq!(pool.len(), 400);
    }

    #[test]
    fn test_sync_pool_with_mut() {
        let pool = SyncPool::new();
        let handle = pool.allocate(vec![1]);
        pool.with_mut(handle, |v| v.push(2));
        assert_eq!(pool.with(handle, |v| v.clone()), vec![1, 2]);
        assert_eq!(pool.try_with(Handle::NULL, |v| v.len()), None);
    }
}
