//! Command lists and the threaded command pool.
//!
//! This module provides:
//! - [`CommandList`] - a recording command buffer plus the retained
//!   pipeline/descriptor state resolved at draw time
//! - [`CommandListHandle`] - the copyable name of a list for the frame it
//!   was allocated in
//! - [`ThreadedCommandPool`] - one backend command pool per recording
//!   thread, for one queue type
//!
//! # Overview
//!
//! Backend command pools are not thread-safe, so every thread that records
//! gets its own sub-pool, created on first use. Obtaining a list only takes
//! a shared read lock on the thread map plus the calling thread's own
//! (uncontended) sub-pool lock.
//!
//! [`ThreadedCommandPool::reset`] recycles every list of every thread at
//! once. It must only run at a frame boundary, when no thread is still
//! recording; this is a convention of the frame loop, not enforced by a
//! lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, ThreadId};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::backend::{Backend, BackendResource, DeviceResource};
use crate::descriptor::{Descriptor, DescriptorSetBindings, MAX_BINDINGS, MAX_DESCRIPTOR_SETS};
use crate::error::GfxResult;
use crate::handle::Handle;
use crate::pipeline::{PipelineLayoutHandle, PipelineMaterialState, PipelineRenderPassState};
use crate::pool::Pool;

/// Queue a command list is submitted to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum QueueType {
    #[default]
    Gfx,
    Compute,
    Transfer,
    Present,
}

/// State set on a command list and resolved lazily at draw time.
#[derive(Clone, Debug)]
pub(crate) struct PendingState {
    /// Render pass currently begun, or null outside of a pass.
    pub render_pass: BackendResource,
    pub subpass: u32,
    pub render_pass_state: PipelineRenderPassState,
    pub material_state: PipelineMaterialState,
    pub pipeline_layout: PipelineLayoutHandle,
    pub descriptors: [DescriptorSetBindings; MAX_DESCRIPTOR_SETS],
    /// Bit `i` set when set `i` must be re-resolved before the next draw.
    pub dirty_sets: u32,
    pub pipeline_dirty: bool,
}

impl Default for PendingState {
    fn default() -> Self {
        Self {
            render_pass: BackendResource::NULL,
            subpass: 0,
            render_pass_state: PipelineRenderPassState::default(),
            material_state: PipelineMaterialState::default(),
            pipeline_layout: PipelineLayoutHandle::NULL,
            descriptors: [[Descriptor::default(); MAX_BINDINGS]; MAX_DESCRIPTOR_SETS],
            dirty_sets: 0,
            pipeline_dirty: true,
        }
    }
}

impl PendingState {
    /// Binds `descriptor` and flags its set dirty if the binding changed.
    pub fn set_descriptor(&mut self, set: usize, binding: usize, descriptor: Descriptor) {
        let slot = &mut self.descriptors[set][binding];
        if *slot != descriptor {
            *slot = descriptor;
            self.dirty_sets |= 1 << set;
        }
    }

    /// Flags every set holding at least one binding dirty.
    pub fn mark_bound_sets_dirty(&mut self) {
        for (set, bindings) in self.descriptors.iter().enumerate() {
            if bindings.iter().any(|descriptor| !descriptor.is_none()) {
                self.dirty_sets |= 1 << set;
            }
        }
    }
}

/// Pooled command list record.
pub struct CommandList {
    pub(crate) resource: BackendResource,
    pub(crate) queue: QueueType,
    pub(crate) state: PendingState,
    /// True once the list was ended and queued for submission.
    pub(crate) submitted: bool,
}

impl CommandList {
    #[inline]
    pub fn queue(&self) -> QueueType {
        self.queue
    }
}

impl DeviceResource for CommandList {
    fn resource(&self) -> BackendResource {
        self.resource
    }

    fn debug_name(&self) -> &str {
        "command list"
    }
}

/// Names a command list allocated during one frame.
///
/// Only valid until the frame slot it was allocated from is recycled;
/// using it afterwards panics as a stale lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommandListHandle {
    pub(crate) frame: u32,
    pub(crate) queue: QueueType,
    pub(crate) thread_pool: u32,
    pub(crate) list: Handle<CommandList>,
}

impl CommandListHandle {
    /// Queue the list will be submitted to.
    #[inline]
    pub fn queue(&self) -> QueueType {
        self.queue
    }

    /// Frame ring slot the list belongs to.
    #[inline]
    pub fn frame(&self) -> u32 {
        self.frame
    }
}

/// Command pool and list records owned by one recording thread.
struct ThreadCommandPool {
    resource: BackendResource,
    lists: Pool<CommandList>,
    /// Backend lists left over by the last reset, reused before allocating.
    recycled: Vec<BackendResource>,
}

#[derive(Default)]
struct ThreadPools {
    by_thread: FxHashMap<ThreadId, u32>,
    pools: Vec<Arc<Mutex<ThreadCommandPool>>>,
}

fn lock_pool(pool: &Mutex<ThreadCommandPool>) -> MutexGuard<'_, ThreadCommandPool> {
    pool.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-thread command list allocator for one queue type.
pub struct ThreadedCommandPool {
    queue: QueueType,
    inner: RwLock<ThreadPools>,
}

impl ThreadedCommandPool {
    /// Creates a pool for `queue`. Backend pools are created lazily, one
    /// per recording thread.
    pub fn new(queue: QueueType) -> Self {
        Self {
            queue,
            inner: RwLock::new(ThreadPools::default()),
        }
    }

    #[inline]
    pub fn queue(&self) -> QueueType {
        self.queue
    }

    /// Returns the calling thread's sub-pool, creating it on first use.
    fn thread_pool(&self, backend: &dyn Backend) -> GfxResult<(u32, Arc<Mutex<ThreadCommandPool>>)> {
        let id = thread::current().id();
        {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(&index) = inner.by_thread.get(&id) {
                return Ok((index, Arc::clone(&inner.pools[index as usize])));
            }
        }

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        // Only the calling thread inserts its own id, so no re-check is needed.
        let resource = backend.create_command_pool(self.queue)?;
        let index = inner.pools.len() as u32;
        let pool = Arc::new(Mutex::new(ThreadCommandPool {
            resource,
            lists: Pool::new(),
            recycled: Vec::new(),
        }));
        inner.pools.push(Arc::clone(&pool));
        inner.by_thread.insert(id, index);

        debug!(
            "Created {:?} command pool #{} for thread {:?}",
            self.queue, index, id
        );
        Ok((index, pool))
    }

    /// Allocates a command list from the calling thread's sub-pool.
    ///
    /// The list is not begun; the caller starts recording.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the sub-pool or list cannot be created.
    pub(crate) fn allocate(
        &self,
        backend: &dyn Backend,
    ) -> GfxResult<(u32, Handle<CommandList>, BackendResource)> {
        let (index, pool) = self.thread_pool(backend)?;
        let mut pool = lock_pool(&pool);

        let resource = match pool.recycled.pop() {
            Some(resource) => resource,
            None => backend.allocate_command_list(pool.resource)?,
        };
        let list = pool.lists.allocate(CommandList {
            resource,
            queue: self.queue,
            state: PendingState::default(),
            submitted: false,
        });
        Ok((index, list, resource))
    }

    /// Runs `f` on a list of this pool.
    ///
    /// # Panics
    ///
    /// Panics if the list was recycled by a reset since it was allocated.
    pub(crate) fn with_list<R>(
        &self,
        thread_pool: u32,
        list: Handle<CommandList>,
        f: impl FnOnce(&mut CommandList) -> R,
    ) -> R {
        let pool = {
            let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            inner
                .pools
                .get(thread_pool as usize)
                .map(Arc::clone)
                .unwrap_or_else(|| panic!("unknown command pool #{thread_pool}"))
        };
        let mut pool = lock_pool(&pool);
        f(pool.lists.at_mut(list))
    }

    /// Resets every thread's backend pool and recycles all lists.
    ///
    /// # Errors
    ///
    /// Returns the first backend reset error; remaining pools are still
    /// reset.
    pub fn reset(&self, backend: &dyn Backend) -> GfxResult<()> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut result = Ok(());
        for pool in &inner.pools {
            let mut pool = lock_pool(pool);
            if let Err(err) = backend.reset_command_pool(pool.resource) {
                result = result.and(Err(err));
            }
            let ThreadCommandPool {
                lists, recycled, ..
            } = &mut *pool;
            recycled.extend(lists.clear().into_iter().map(|list| list.resource));
        }
        result
    }

    /// Destroys every backend pool; their lists go with them.
    pub fn destroy(&self, backend: &dyn Backend) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for pool in inner.pools.drain(..) {
            let mut pool = lock_pool(&pool);
            pool.lists.clear();
            pool.recycled.clear();
            backend.destroy_command_pool(pool.resource);
        }
        inner.by_thread.clear();
    }

    /// Number of threads that have recorded from this pool.
    pub fn thread_pool_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .pools
            .len()
    }

    /// Number of lists allocated since the last reset, across threads.
    pub fn live_list_count(&self) -> usize {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.pools.iter().map(|pool| lock_pool(pool).lists.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::null::{NullBackend, NullOp};

    #[test]
    fn test_one_sub_pool_per_thread() {
        let backend = NullBackend::new();
        let pool = ThreadedCommandPool::new(QueueType::Gfx);

        pool.allocate(&backend).unwrap();
        pool.allocate(&backend).unwrap();
        assert_eq!(pool.thread_pool_count(), 1);

        std::thread::scope(|scope| {
            for _ in 0..3 {
                scope.spawn(|| {
                    pool.allocate(&backend).unwrap();
                });
            }
        });
        assert_eq!(pool.thread_pool_count(), 4);
        assert_eq!(pool.live_list_count(), 5);
        assert_eq!(backend.count(NullOp::CreateCommandPool), 4);
    }

    #[test]
    fn test_reset_recycles_lists() {
        let backend = NullBackend::new();
        let pool = ThreadedCommandPool::new(QueueType::Gfx);

        let (_, _, first) = pool.allocate(&backend).unwrap();
        pool.reset(&backend).unwrap();
        assert_eq!(pool.live_list_count(), 0);

        let (_, _, second) = pool.allocate(&backend).unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.count(NullOp::AllocateCommandList), 1);
        assert_eq!(backend.count(NullOp::ResetCommandPool), 1);
    }

    #[test]
    #[should_panic(expected = "lookup of invalid")]
    fn test_list_is_stale_after_reset() {
        let backend = NullBackend::new();
        let pool = ThreadedCommandPool::new(QueueType::Gfx);

        let (thread_pool, list, _) = pool.allocate(&backend).unwrap();
        pool.reset(&backend).unwrap();
        pool.with_list(thread_pool, list, |_| ());
    }

    #[test]
    fn test_descriptor_change_marks_set_dirty() {
        let mut state = PendingState::default();
        let descriptor = Descriptor::sampler(1, BackendResource::new(5));

        state.set_descriptor(2, 1, descriptor);
        assert_eq!(state.dirty_sets, 1 << 2);

        state.dirty_sets = 0;
        state.set_descriptor(2, 1, descriptor);
        assert_eq!(state.dirty_sets, 0, "rebinding the same resource is a no-op");
    }
}
