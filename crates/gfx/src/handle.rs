//! Typed resource handles.
//!
//! A [`Handle<T>`] names a record stored in a [`Pool<T>`](crate::pool::Pool)
//! without exposing a pointer. The record type is part of the handle's
//! type, so a buffer handle can never be passed where a texture handle is
//! expected, even when both carry the same slot index.
//!
//! Handles carry the generation of the slot they were issued from. Once
//! the slot is freed its generation is bumped, which turns any copy of
//! the old handle into a detectable stale reference instead of a silent
//! alias of whatever is allocated next.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Opaque, kind-typed identifier for a pooled resource.
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    /// The unbound handle. Never returned by a pool allocation.
    pub const NULL: Self = Self {
        index: u32::MAX,
        generation: 0,
        _marker: PhantomData,
    };

    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// Returns the unbound handle.
    #[inline]
    pub const fn null() -> Self {
        Self::NULL
    }

    /// Returns true if this handle is unbound.
    #[inline]
    pub const fn is_null(&self) -> bool {
        self.index == u32::MAX
    }

    /// Slot index inside the owning pool.
    #[inline]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot at the time the handle was issued.
    #[inline]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Packs the handle into a single integer payload.
    #[inline]
    pub const fn to_raw(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    /// Rebuilds a handle from [`Handle::to_raw`] output.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self::new(raw as u32, (raw >> 32) as u32)
    }
}

// Manual impls: deriving would put bounds on `T`, and records are neither
// `Copy` nor `Eq`.

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_raw().hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::NULL
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = std::any::type_name::<T>()
            .rsplit("::")
            .next()
            .unwrap_or("Resource");
        if self.is_null() {
            write!(f, "Handle<{kind}>(NULL)")
        } else {
            write!(f, "Handle<{kind}>({}v{})", self.index, self.generation)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Alpha;
    struct Beta;

    #[test]
    fn test_null_handle() {
        let handle = Handle::<Alpha>::null();
        assert!(handle.is_null());
        assert_eq!(handle, Handle::<Alpha>::default());
        assert!(!Handle::<Alpha>::new(0, 0).is_null());
    }

    #[test]
    fn test_raw_round_trip() {
        let handle = Handle::<Alpha>::new(42, 7);
        let raw = handle.to_raw();
        assert_eq!(Handle::<Alpha>::from_raw(raw), handle);
        assert_eq!(raw, (7u64 << 32) | 42);
    }

    #[test]
    fn test_generation_distinguishes_handles() {
        assert_ne!(Handle::<Alpha>::new(3, 0), Handle::<Alpha>::new(3, 1));
    }

    #[test]
    fn test_debug_names_kind() {
        let text = format!("{:?}", Handle::<Beta>::new(1, 2));
        assert_eq!(text, "Handle<Beta>(1v2)");
        assert_eq!(format!("{:?}", Handle::<Beta>::NULL), "Handle<Beta>(NULL)");
    }

    #[test]
    fn test_handle_is_send_sync() {
        // PhantomData<fn() -> T> keeps handles Send + Sync for any T
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Handle<std::rc::Rc<u8>>>();
    }
}
