//! Descriptor bindings and the descriptor set allocator.
//!
//! This module provides:
//! - [`Descriptor`] - one resource bound at one binding of a set
//! - [`DescriptorSetAllocator`] - content-addressed, frame-aged cache of
//!   backend descriptor sets for one set layout
//!
//! # Overview
//!
//! Writing a descriptor set is one of the most expensive per-draw backend
//! operations, while the bindings a material uses rarely change between
//! frames. The allocator therefore keys every set it hands out by the full
//! list of bound resources: a request with identical bindings returns the
//! cached set untouched, without a backend write.
//!
//! Every [`DescriptorSetAllocator::new_frame`] ages all cached sets. A set
//! that goes more than `max_unused_frames` frames without being requested
//! is evicted and recycled. As long as that threshold is at least the
//! number of frames in flight, no in-flight frame can still reference an
//! evicted set. The device warns about a smaller threshold but accepts it;
//! rewriting a recycled set is then only safe once the frames that used it
//! completed.
//!
//! Backend sets come from descriptor pools of a fixed number of sets; a new
//! pool is created whenever no recycled set is available.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::backend::{Backend, BackendResource};
use crate::error::{GfxError, GfxResult};
use crate::texture::TextureLayout;

/// Maximum number of descriptor sets in a pipeline layout.
pub const MAX_DESCRIPTOR_SETS: usize = 4;

/// Maximum number of bindings in one descriptor set.
pub const MAX_BINDINGS: usize = 16;

/// Kind of resource a binding holds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DescriptorType {
    #[default]
    UniformBuffer,
    StorageBuffer,
    Sampler,
    SampledTexture,
    InputAttachment,
}

/// Resource bound at a binding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DescriptorInfo {
    /// Nothing bound.
    #[default]
    None,
    Buffer {
        buffer: BackendResource,
        offset: u64,
        range: u64,
    },
    Texture {
        view: BackendResource,
        layout: TextureLayout,
    },
    Sampler {
        sampler: BackendResource,
    },
}

/// One binding of a descriptor set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Descriptor {
    pub binding: u32,
    pub ty: DescriptorType,
    pub info: DescriptorInfo,
}

impl Descriptor {
    /// Binds a buffer range.
    pub fn buffer(
        ty: DescriptorType,
        binding: u32,
        buffer: BackendResource,
        offset: u64,
        range: u64,
    ) -> Self {
        Self {
            binding,
            ty,
            info: DescriptorInfo::Buffer {
                buffer,
                offset,
                range,
            },
        }
    }

    /// Binds a texture view sampled in shader-read-only layout.
    pub fn texture_view(binding: u32, view: BackendResource) -> Self {
        Self {
            binding,
            ty: DescriptorType::SampledTexture,
            info: DescriptorInfo::Texture {
                view,
                layout: TextureLayout::ShaderReadOnly,
            },
        }
    }

    pub fn sampler(binding: u32, sampler: BackendResource) -> Self {
        Self {
            binding,
            ty: DescriptorType::Sampler,
            info: DescriptorInfo::Sampler { sampler },
        }
    }

    /// Returns true if nothing is bound.
    #[inline]
    pub fn is_none(&self) -> bool {
        self.info == DescriptorInfo::None
    }
}

/// Bindings of one set, indexed by binding number.
pub type DescriptorSetBindings = [Descriptor; MAX_BINDINGS];

struct Node {
    set: BackendResource,
    unused_frames: u32,
}

#[derive(Default)]
struct AllocatorState {
    pools: Vec<BackendResource>,
    /// Recycled sets sit at the front and are reissued first.
    free_sets: VecDeque<BackendResource>,
    cache: FxHashMap<DescriptorSetBindings, Node>,
}

/// Descriptor set cache for one set layout of one pipeline layout.
pub struct DescriptorSetAllocator {
    set_layout: BackendResource,
    sets_per_pool: u32,
    max_unused_frames: u32,
    state: Mutex<AllocatorState>,
}

impl DescriptorSetAllocator {
    /// Creates an allocator for sets of `set_layout`.
    ///
    /// # Arguments
    ///
    /// * `set_layout` - Backend descriptor set layout the sets are allocated with
    /// * `sets_per_pool` - Number of sets allocated per backend pool
    /// * `max_unused_frames` - Frames a cached set survives without being requested
    pub fn new(set_layout: BackendResource, sets_per_pool: u32, max_unused_frames: u32) -> Self {
        Self {
            set_layout,
            sets_per_pool: sets_per_pool.max(1),
            max_unused_frames,
            state: Mutex::new(AllocatorState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AllocatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a descriptor set holding exactly `descriptors`.
    ///
    /// A cache hit resets the set's age and returns it without touching
    /// the backend. A miss takes a free set (creating a new pool if none
    /// is left), writes the bound descriptors into it and caches it.
    ///
    /// # Errors
    ///
    /// Returns the backend error if a new pool or its sets cannot be
    /// allocated.
    pub fn allocate(
        &self,
        backend: &dyn Backend,
        descriptors: &DescriptorSetBindings,
    ) -> GfxResult<BackendResource> {
        let mut state = self.lock();

        if let Some(node) = state.cache.get_mut(descriptors) {
            node.unused_frames = 0;
            return Ok(node.set);
        }

        if state.free_sets.is_empty() {
            self.allocate_pool(backend, &mut state)?;
        }
        let Some(set) = state.free_sets.pop_front() else {
            return Err(GfxError::OutOfDeviceMemory);
        };

        let writes: Vec<Descriptor> = descriptors
            .iter()
            .filter(|descriptor| !descriptor.is_none())
            .copied()
            .collect();
        backend.update_descriptor_set(set, &writes);

        state.cache.insert(
            *descriptors,
            Node {
                set,
                unused_frames: 0,
            },
        );
        Ok(set)
    }

    fn allocate_pool(&self, backend: &dyn Backend, state: &mut AllocatorState) -> GfxResult<()> {
        let pool = backend.create_descriptor_pool(self.set_layout, self.sets_per_pool)?;
        let sets = match backend.allocate_descriptor_sets(pool, self.set_layout, self.sets_per_pool) {
            Ok(sets) => sets,
            Err(err) => {
                backend.destroy_descriptor_pool(pool);
                return Err(err);
            }
        };

        debug!(
            "Allocated descriptor pool #{} ({} sets)",
            state.pools.len(),
            sets.len()
        );
        state.pools.push(pool);
        state.free_sets.extend(sets);
        Ok(())
    }

    /// Ages every cached set and recycles those unused for too long.
    pub fn new_frame(&self) {
        let max_unused_frames = self.max_unused_frames;
        let mut state = self.lock();
        let AllocatorState {
            free_sets, cache, ..
        } = &mut *state;

        cache.retain(|_, node| {
            node.unused_frames += 1;
            if node.unused_frames > max_unused_frames {
                free_sets.push_front(node.set);
                false
            } else {
                true
            }
        });
    }

    /// Destroys every backend pool. Sets are freed with their pools.
    pub fn destroy(&self, backend: &dyn Backend) {
        let mut state = self.lock();
        state.cache.clear();
        state.free_sets.clear();
        for pool in state.pools.drain(..) {
            backend.destroy_descriptor_pool(pool);
        }
    }

    /// Number of sets currently cached.
    pub fn cached_count(&self) -> usize {
        self.lock().cache.len()
    }

    /// Number of sets ready to be reissued.
    pub fn free_count(&self) -> usize {
        self.lock().free_sets.len()
    }

    /// Number of backend pools allocated so far.
    pub fn pool_count(&self) -> usize {
        self.lock().pools.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::null::{NullBackend, NullOp};

    fn bindings(buffer: u64) -> DescriptorSetBindings {
        let mut bindings = [Descriptor::default(); MAX_BINDINGS];
        bindings[0] = Descriptor::buffer(
            DescriptorType::UniformBuffer,
            0,
            BackendResource::new(buffer),
            0,
            64,
        );
        bindings
    }

    #[test]
    fn test_identical_bindings_hit_cache() {
        let backend = NullBackend::new();
        let allocator = DescriptorSetAllocator::new(BackendResource::new(1), 4, 10);

        let first = allocator.allocate(&backend, &bindings(7)).unwrap();
        allocator.new_frame();
        let second = allocator.allocate(&backend, &bindings(7)).unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.count(NullOp::UpdateDescriptorSet), 1);
    }

    #[test]
    fn test_distinct_bindings_get_distinct_sets() {
        let backend = NullBackend::new();
        let allocator = DescriptorSetAllocator::new(BackendResource::new(1), 4, 10);

        let a = allocator.allocate(&backend, &bindings(7)).unwrap();
        let b = allocator.allocate(&backend, &bindings(8)).unwrap();
        assert_ne!(a, b);
        assert_eq!(allocator.cached_count(), 2);
        assert_eq!(backend.count(NullOp::UpdateDescriptorSet), 2);
    }

    #[test]
    fn test_set_evicted_after_threshold_and_reissued() {
        let backend = NullBackend::new();
        let allocator = DescriptorSetAllocator::new(BackendResource::new(1), 4, 10);

        let set = allocator.allocate(&backend, &bindings(7)).unwrap();
        for _ in 0..10 {
            allocator.new_frame();
        }
        assert_eq!(allocator.cached_count(), 1, "still cached at the threshold");

        allocator.new_frame();
        assert_eq!(allocator.cached_count(), 0);

        let reissued = allocator.allocate(&backend, &bindings(9)).unwrap();
        assert_eq!(reissued, set);
        assert_eq!(allocator.pool_count(), 1);
    }

    #[test]
    fn test_touch_resets_age() {
        let backend = NullBackend::new();
        let allocator = DescriptorSetAllocator::new(BackendResource::new(1), 4, 2);

        allocator.allocate(&backend, &bindings(7)).unwrap();
        for _ in 0..5 {
            allocator.new_frame();
            allocator.allocate(&backend, &bindings(7)).unwrap();
        }
        assert_eq!(allocator.cached_count(), 1);
        assert_eq!(backend.count(NullOp::UpdateDescriptorSet), 1);
    }

    #[test]
    fn test_new_pool_when_exhausted() {
        let backend = NullBackend::new();
        let allocator = DescriptorSetAllocator::new(BackendResource::new(1), 2, 10);

        for buffer in 0..5 {
            allocator.allocate(&backend, &bindings(100 + buffer)).unwrap();
        }
        assert_eq!(allocator.pool_count(), 3);
        assert_eq!(allocator.free_count(), 1);

        allocator.destroy(&backend);
        assert_eq!(backend.count(NullOp::DestroyDescriptorPool), 3);
    }
}
