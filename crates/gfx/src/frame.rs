//! Frame ring slots.
//!
//! A [`Frame`] is one slot of the device's ring. It owns a threaded
//! command pool and a completion fence per queue, plus the lists of
//! everything queued for submission and everything destroyed while it was
//! current. Expired resources are only freed once the slot's fences were
//! observed signaled, when the ring wraps back around to it.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::backend::{Backend, BackendResource};
use crate::buffer::BufferHandle;
use crate::command::{QueueType, ThreadedCommandPool};
use crate::error::GfxResult;
use crate::pipeline::PipelineLayoutHandle;
use crate::sampler::SamplerHandle;
use crate::shader::ShaderHandle;
use crate::swapchain::SwapchainHandle;
use crate::sync::{FenceHandle, PipelineStageFlags, SemaphoreHandle};
use crate::texture::{TextureHandle, TextureViewHandle};

/// Handles logically destroyed during a frame, per kind.
#[derive(Default)]
pub(crate) struct ExpiredResources {
    pub buffers: Vec<BufferHandle>,
    pub textures: Vec<TextureHandle>,
    pub texture_views: Vec<TextureViewHandle>,
    pub shaders: Vec<ShaderHandle>,
    pub samplers: Vec<SamplerHandle>,
    pub swapchains: Vec<SwapchainHandle>,
    pub pipeline_layouts: Vec<PipelineLayoutHandle>,
    pub fences: Vec<FenceHandle>,
    pub semaphores: Vec<SemaphoreHandle>,
}

impl ExpiredResources {
    pub fn len(&self) -> usize {
        self.buffers.len()
            + self.textures.len()
            + self.texture_views.len()
            + self.shaders.len()
            + self.samplers.len()
            + self.swapchains.len()
            + self.pipeline_layouts.len()
            + self.fences.len()
            + self.semaphores.len()
    }
}

/// Lists queued for one queue during a frame, in submission order.
#[derive(Default)]
pub(crate) struct QueueSubmission {
    pub lists: Vec<BackendResource>,
    pub wait_semaphores: Vec<BackendResource>,
    pub wait_stages: Vec<PipelineStageFlags>,
    pub signal_semaphores: Vec<BackendResource>,
}

impl QueueSubmission {
    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

#[derive(Default)]
pub(crate) struct FrameState {
    pub expired: ExpiredResources,
    pub gfx: QueueSubmission,
    pub compute: QueueSubmission,
    /// Nothing more may be queued on the frame.
    pub ended: bool,
    /// The backend accepted a submission carrying the gfx fence.
    pub gfx_submitted: bool,
    /// The backend accepted a submission carrying the compute fence.
    pub compute_submitted: bool,
}

/// One slot of the frame ring.
pub(crate) struct Frame {
    pub index: u32,
    pub gfx_pool: ThreadedCommandPool,
    pub compute_pool: ThreadedCommandPool,
    pub gfx_fence: BackendResource,
    pub compute_fence: BackendResource,
    state: Mutex<FrameState>,
}

impl Frame {
    /// Creates the slot's fences, already signaled so the first wait on an
    /// unused slot returns at once.
    pub fn new(backend: &dyn Backend, index: u32) -> GfxResult<Self> {
        let gfx_fence = backend.create_fence(true)?;
        let compute_fence = match backend.create_fence(true) {
            Ok(fence) => fence,
            Err(err) => {
                backend.destroy_fence(gfx_fence);
                return Err(err);
            }
        };

        Ok(Self {
            index,
            gfx_pool: ThreadedCommandPool::new(QueueType::Gfx),
            compute_pool: ThreadedCommandPool::new(QueueType::Compute),
            gfx_fence,
            compute_fence,
            state: Mutex::new(FrameState::default()),
        })
    }

    pub fn state(&self) -> MutexGuard<'_, FrameState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Command pool for `queue`, if the frame records for it.
    pub fn command_pool(&self, queue: QueueType) -> Option<&ThreadedCommandPool> {
        match queue {
            QueueType::Gfx => Some(&self.gfx_pool),
            QueueType::Compute => Some(&self.compute_pool),
            QueueType::Transfer | QueueType::Present => None,
        }
    }

    /// Fences of every submission the backend accepted this frame.
    ///
    /// A fence that was reset for a submission the backend then rejected
    /// is never signaled, so it is left out.
    pub fn wait_fences(&self) -> Vec<BackendResource> {
        let state = self.state();
        let mut fences = Vec::with_capacity(2);
        if state.gfx_submitted {
            fences.push(self.gfx_fence);
        }
        if state.compute_submitted {
            fences.push(self.compute_fence);
        }
        fences
    }

    /// Destroys the slot's command pools and fences.
    pub fn destroy(&self, backend: &dyn Backend) {
        self.gfx_pool.destroy(backend);
        self.compute_pool.destroy(backend);
        backend.destroy_fence(self.gfx_fence);
        backend.destroy_fence(self.compute_fence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::null::{NullBackend, NullOp};

    #[test]
    fn test_new_frame_fences_start_signaled() {
        let backend = NullBackend::new();
        let frame = Frame::new(&backend, 0).unwrap();
        assert!(backend.fence_signaled(frame.gfx_fence));
        assert!(backend.fence_signaled(frame.compute_fence));
        assert!(frame.wait_fences().is_empty());

        frame.destroy(&backend);
        assert_eq!(backend.count(NullOp::DestroyFence), 2);
    }

    #[test]
    fn test_only_accepted_submissions_are_waited() {
        let backend = NullBackend::new();
        let frame = Frame::new(&backend, 0).unwrap();
        frame.state().compute_submitted = true;
        assert_eq!(frame.wait_fences(), vec![frame.compute_fence]);

        frame.state().gfx_submitted = true;
        assert_eq!(frame.wait_fences(), vec![frame.gfx_fence, frame.compute_fence]);
    }

    #[test]
    fn test_no_pool_for_transfer_queue() {
        let backend = NullBackend::new();
        let frame = Frame::new(&backend, 0).unwrap();
        assert!(frame.command_pool(QueueType::Gfx).is_some());
        assert!(frame.command_pool(QueueType::Transfer).is_none());
        assert!(frame.command_pool(QueueType::Present).is_none());
    }
}
