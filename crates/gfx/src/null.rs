//! In-memory backend for tests and headless runs.
//!
//! [`NullBackend`] implements the whole [`Backend`] contract without a
//! GPU. Buffers and textures own real host memory, so uploads and copies
//! can be checked byte for byte. Every call is appended to a log that
//! tests inspect through [`NullBackend::count`], [`NullBackend::position`]
//! and [`NullBackend::calls`].
//!
//! # GPU Simulation
//!
//! Submissions complete instantly: recorded copies are applied and the
//! submission fence is signaled inside `queue_submit`. Calling
//! [`NullBackend::set_gpu_stalled`] simulates a busy GPU; fences submitted
//! while stalled stay unsignaled and waiting on them times out, until the
//! stall is lifted.
//!
//! Failures are injected one call at a time with
//! [`NullBackend::fail_next`].
//!
//! # Example
//!
//! ```
//! use cobalt_gfx::null::{NullBackend, NullOp};
//! use cobalt_gfx::{Backend, BufferCreateInfo, BufferUsageFlags, GfxError, MemoryUsage};
//!
//! let backend = NullBackend::new();
//! let info = BufferCreateInfo {
//!     size: 16,
//!     mem_usage: MemoryUsage::CpuOnly,
//!     usage: BufferUsageFlags::UNIFORM_BUFFER,
//! };
//!
//! backend.fail_next(NullOp::CreateBuffer, GfxError::OutOfDeviceMemory);
//! assert_eq!(backend.create_buffer(&info), Err(GfxError::OutOfDeviceMemory));
//! assert!(backend.create_buffer(&info).is_ok());
//! assert_eq!(backend.count(NullOp::CreateBuffer), 2);
//! ```

use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::backend::{Backend, BackendResource, SubmitInfo};
use crate::buffer::{BufferCopyRegion, BufferCreateInfo, IndexType, MemoryUsage};
use crate::command::QueueType;
use crate::descriptor::Descriptor;
use crate::error::{GfxError, GfxResult};
use crate::format::Format;
use crate::pipeline::{
    GfxPipelineCreateInfo, PipelineBindPoint, PipelineLayoutCreateInfo, PipelineLayoutObjects,
};
use crate::render_pass::{ClearValue, Framebuffer, Rect2D, RenderPassCreateInfo, Viewport};
use crate::sampler::SamplerCreateInfo;
use crate::shader::ShaderCreateInfo;
use crate::swapchain::SwapchainCreateInfo;
use crate::sync::PipelineStageFlags;
use crate::texture::{
    BufferTextureCopyRegion, TextureCreateInfo, TextureLayout, TextureMemoryBarrier,
    TextureViewCreateInfo,
};

/// Format of every swapchain backbuffer.
pub const SWAPCHAIN_FORMAT: Format = Format::B8G8R8A8Unorm;

/// Backend entry point, as recorded in the call log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NullOp {
    CreateBuffer,
    DestroyBuffer,
    MapBuffer,
    UnmapBuffer,
    CreateTexture,
    DestroyTexture,
    CreateTextureView,
    DestroyTextureView,
    CreateShader,
    DestroyShader,
    CreateSampler,
    DestroySampler,
    CreateSwapchain,
    DestroySwapchain,
    AcquireImage,
    Present,
    CreateRenderPass,
    DestroyRenderPass,
    CreatePipeline,
    DestroyPipeline,
    CreatePipelineLayout,
    DestroyPipelineLayout,
    CreateDescriptorPool,
    DestroyDescriptorPool,
    AllocateDescriptorSets,
    UpdateDescriptorSet,
    CreateCommandPool,
    DestroyCommandPool,
    ResetCommandPool,
    AllocateCommandList,
    BeginCommandList,
    EndCommandList,
    CreateFence,
    DestroyFence,
    CreateSemaphore,
    DestroySemaphore,
    WaitForFences,
    ResetFences,
    QueueSubmit,
    WaitIdle,
    CmdBindPipeline,
    CmdBindDescriptorSets,
    CmdBeginRenderPass,
    CmdEndRenderPass,
    CmdSetViewport,
    CmdSetScissor,
    CmdBindVertexBuffers,
    CmdBindIndexBuffer,
    CmdDraw,
    CmdDrawIndexed,
    CmdCopyBuffer,
    CmdCopyBufferToTexture,
    CmdPipelineBarrier,
}

/// One entry of the call log.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackendCall {
    pub op: NullOp,
    /// Object created, destroyed or bound by the call. For fence waits and
    /// submissions, the first fence involved.
    pub resource: BackendResource,
    /// Command list a `Cmd*` call recorded into, null otherwise.
    pub list: BackendResource,
}

/// One recorded queue submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NullSubmit {
    pub queue: QueueType,
    pub lists: Vec<BackendResource>,
    pub wait_semaphores: Vec<BackendResource>,
    pub signal_semaphores: Vec<BackendResource>,
    pub fence: BackendResource,
}

enum PendingCopy {
    Buffer {
        src: BackendResource,
        dst: BackendResource,
        regions: Vec<BufferCopyRegion>,
    },
    BufferToTexture {
        src: BackendResource,
        dst: BackendResource,
        regions: Vec<BufferTextureCopyRegion>,
    },
}

enum Object {
    Buffer {
        data: Box<[u8]>,
        mem_usage: MemoryUsage,
    },
    Texture {
        data: Vec<u8>,
        width: u32,
        height: u32,
        texel_size: u64,
    },
    TextureView,
    Shader,
    Sampler,
    Swapchain {
        images: Vec<BackendResource>,
        views: Vec<BackendResource>,
        next_image: u32,
    },
    RenderPass(RenderPassCreateInfo),
    Pipeline(GfxPipelineCreateInfo),
    PipelineLayout,
    SetLayout,
    DescriptorPool {
        sets: Vec<BackendResource>,
    },
    DescriptorSet {
        writes: Vec<Descriptor>,
    },
    CommandPool {
        lists: Vec<BackendResource>,
    },
    CommandList {
        recording: bool,
        copies: Vec<PendingCopy>,
    },
    Fence {
        signaled: bool,
    },
    Semaphore,
}

#[derive(Default)]
struct NullState {
    next_id: u64,
    objects: FxHashMap<u64, Object>,
    calls: Vec<BackendCall>,
    submits: Vec<NullSubmit>,
    failures: FxHashMap<NullOp, GfxError>,
    gpu_stalled: bool,
    stalled_fences: Vec<BackendResource>,
}

impl NullState {
    fn log(&mut self, op: NullOp, resource: BackendResource) {
        self.log_cmd(op, resource, BackendResource::NULL);
    }

    fn log_cmd(&mut self, op: NullOp, resource: BackendResource, list: BackendResource) {
        self.calls.push(BackendCall { op, resource, list });
    }

    /// Consumes an injected failure for `op`, logging the failed call.
    fn check_failure(&mut self, op: NullOp) -> GfxResult<()> {
        match self.failures.remove(&op) {
            Some(err) => {
                self.log(op, BackendResource::NULL);
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn insert(&mut self, object: Object) -> BackendResource {
        self.next_id += 1;
        self.objects.insert(self.next_id, object);
        BackendResource::new(self.next_id)
    }

    fn remove(&mut self, resource: BackendResource, kind: &str) -> Object {
        self.objects
            .remove(&resource.raw())
            .unwrap_or_else(|| panic!("destroying unknown {kind} {resource:?}"))
    }

    fn list_copies(&mut self, list: BackendResource) -> &mut Vec<PendingCopy> {
        match self.objects.get_mut(&list.raw()) {
            Some(Object::CommandList { copies, .. }) => copies,
            _ => panic!("recording into unknown command list {list:?}"),
        }
    }

    fn buffer_bytes(&self, buffer: BackendResource) -> &[u8] {
        match self.objects.get(&buffer.raw()) {
            Some(Object::Buffer { data, .. }) => data,
            _ => panic!("copy from unknown buffer {buffer:?}"),
        }
    }

    fn apply_copy(&mut self, copy: &PendingCopy) {
        match copy {
            PendingCopy::Buffer { src, dst, regions } => {
                for region in regions {
                    let src_range = region.src_offset as usize..(region.src_offset + region.size) as usize;
                    let bytes = self.buffer_bytes(*src)[src_range].to_vec();
                    if let Some(Object::Buffer { data, .. }) = self.objects.get_mut(&dst.raw()) {
                        let start = region.dst_offset as usize;
                        data[start..start + bytes.len()].copy_from_slice(&bytes);
                    }
                }
            }
            PendingCopy::BufferToTexture { src, dst, regions } => {
                for region in regions {
                    let source = self.buffer_bytes(*src).to_vec();
                    if let Some(Object::Texture {
                        data,
                        width,
                        height,
                        texel_size,
                    }) = self.objects.get_mut(&dst.raw())
                    {
                        let offset = region.texture_offset;
                        let texel = (offset.z as u64 * *height as u64 * *width as u64
                            + offset.y as u64 * *width as u64
                            + offset.x as u64)
                            * *texel_size;
                        let len = (region.texture_extent.texel_count() * *texel_size) as usize;
                        let start = region.buffer_offset as usize;
                        let len = len.min(source.len() - start).min(data.len() - texel as usize);
                        data[texel as usize..texel as usize + len]
                            .copy_from_slice(&source[start..start + len]);
                    }
                }
            }
        }
    }

    fn fence_signaled(&self, fence: BackendResource) -> bool {
        match self.objects.get(&fence.raw()) {
            Some(Object::Fence { signaled }) => *signaled,
            _ => panic!("unknown fence {fence:?}"),
        }
    }

    fn set_fence(&mut self, fence: BackendResource, value: bool) {
        match self.objects.get_mut(&fence.raw()) {
            Some(Object::Fence { signaled }) => *signaled = value,
            _ => panic!("unknown fence {fence:?}"),
        }
    }
}

/// Backend that simulates a GPU in host memory.
#[derive(Default)]
pub struct NullBackend {
    state: Mutex<NullState>,
}

impl NullBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, NullState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next call of `op` fail with `err`.
    pub fn fail_next(&self, op: NullOp, err: GfxError) {
        self.lock().failures.insert(op, err);
    }

    /// Simulates a busy GPU.
    ///
    /// While stalled, submitted fences stay unsignaled. Lifting the stall
    /// signals every fence submitted in the meantime.
    pub fn set_gpu_stalled(&self, stalled: bool) {
        let mut state = self.lock();
        state.gpu_stalled = stalled;
        if !stalled {
            for fence in std::mem::take(&mut state.stalled_fences) {
                if state.objects.contains_key(&fence.raw()) {
                    state.set_fence(fence, true);
                }
            }
        }
    }

    /// Number of logged calls of `op`, failed ones included.
    pub fn count(&self, op: NullOp) -> usize {
        self.lock().calls.iter().filter(|call| call.op == op).count()
    }

    /// Number of logged calls of `op` on `resource`.
    pub fn count_for(&self, op: NullOp, resource: BackendResource) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.op == op && call.resource == resource)
            .count()
    }

    /// Index in the call log of the first call of `op` on `resource`.
    pub fn position(&self, op: NullOp, resource: BackendResource) -> Option<usize> {
        self.lock()
            .calls
            .iter()
            .position(|call| call.op == op && call.resource == resource)
    }

    /// Index in the call log of the last call of `op`.
    pub fn last_position(&self, op: NullOp) -> Option<usize> {
        self.lock().calls.iter().rposition(|call| call.op == op)
    }

    /// Snapshot of the call log.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.lock().calls.clone()
    }

    /// `Cmd*` calls recorded into `list`, in order.
    pub fn list_ops(&self, list: BackendResource) -> Vec<NullOp> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.list == list)
            .map(|call| call.op)
            .collect()
    }

    /// Snapshot of every queue submission.
    pub fn submits(&self) -> Vec<NullSubmit> {
        self.lock().submits.clone()
    }

    /// Current content of a buffer.
    pub fn buffer_contents(&self, buffer: BackendResource) -> Option<Vec<u8>> {
        match self.lock().objects.get(&buffer.raw()) {
            Some(Object::Buffer { data, .. }) => Some(data.to_vec()),
            _ => None,
        }
    }

    /// Current content of a texture, rows tightly packed.
    pub fn texture_contents(&self, texture: BackendResource) -> Option<Vec<u8>> {
        match self.lock().objects.get(&texture.raw()) {
            Some(Object::Texture { data, .. }) => Some(data.clone()),
            _ => None,
        }
    }

    /// Description a render pass was created with.
    pub fn render_pass_info(&self, render_pass: BackendResource) -> Option<RenderPassCreateInfo> {
        match self.lock().objects.get(&render_pass.raw()) {
            Some(Object::RenderPass(info)) => Some(info.clone()),
            _ => None,
        }
    }

    /// Description a pipeline was created with.
    pub fn pipeline_info(&self, pipeline: BackendResource) -> Option<GfxPipelineCreateInfo> {
        match self.lock().objects.get(&pipeline.raw()) {
            Some(Object::Pipeline(info)) => Some(info.clone()),
            _ => None,
        }
    }

    /// Descriptors last written into a set.
    pub fn descriptor_writes(&self, set: BackendResource) -> Option<Vec<Descriptor>> {
        match self.lock().objects.get(&set.raw()) {
            Some(Object::DescriptorSet { writes }) => Some(writes.clone()),
            _ => None,
        }
    }

    pub fn fence_signaled(&self, fence: BackendResource) -> bool {
        self.lock().fence_signaled(fence)
    }

    /// Returns true if `resource` was created and not destroyed yet.
    pub fn is_live(&self, resource: BackendResource) -> bool {
        self.lock().objects.contains_key(&resource.raw())
    }

    /// Number of live backend objects of every kind.
    pub fn live_count(&self) -> usize {
        self.lock().objects.len()
    }

    fn create(&self, op: NullOp, object: Object) -> GfxResult<BackendResource> {
        let mut state = self.lock();
        state.check_failure(op)?;
        let resource = state.insert(object);
        state.log(op, resource);
        Ok(resource)
    }

    fn destroy(&self, op: NullOp, resource: BackendResource, kind: &str) -> Object {
        let mut state = self.lock();
        let object = state.remove(resource, kind);
        state.log(op, resource);
        object
    }

    fn record(&self, op: NullOp, list: BackendResource, resource: BackendResource) {
        let mut state = self.lock();
        match state.objects.get(&list.raw()) {
            Some(Object::CommandList { recording: true, .. }) => {}
            _ => panic!("{op:?} recorded into {list:?}, which is not recording"),
        }
        state.log_cmd(op, resource, list);
    }
}

impl Backend for NullBackend {
    fn create_buffer(&self, info: &BufferCreateInfo) -> GfxResult<BackendResource> {
        if info.size == 0 {
            return Err(GfxError::InvalidParameter);
        }
        self.create(
            NullOp::CreateBuffer,
            Object::Buffer {
                data: vec![0; info.size as usize].into_boxed_slice(),
                mem_usage: info.mem_usage,
            },
        )
    }

    fn destroy_buffer(&self, buffer: BackendResource) {
        self.destroy(NullOp::DestroyBuffer, buffer, "buffer");
    }

    fn map_buffer(&self, buffer: BackendResource) -> GfxResult<NonNull<u8>> {
        let mut state = self.lock();
        state.check_failure(NullOp::MapBuffer)?;
        state.log(NullOp::MapBuffer, buffer);
        match state.objects.get_mut(&buffer.raw()) {
            Some(Object::Buffer { data, mem_usage }) if mem_usage.is_host_visible() => {
                NonNull::new(data.as_mut_ptr()).ok_or(GfxError::Unknown)
            }
            _ => Err(GfxError::InvalidParameter),
        }
    }

    fn unmap_buffer(&self, buffer: BackendResource) {
        self.lock().log(NullOp::UnmapBuffer, buffer);
    }

    fn create_texture(&self, info: &TextureCreateInfo) -> GfxResult<BackendResource> {
        let texel_size = info.format.texel_size();
        if texel_size == 0 || info.extent.texel_count() == 0 {
            return Err(GfxError::InvalidParameter);
        }
        let layers = info.array_layers.max(1) as u64;
        self.create(
            NullOp::CreateTexture,
            Object::Texture {
                data: vec![0; (info.extent.texel_count() * layers * texel_size) as usize],
                width: info.extent.width,
                height: info.extent.height,
                texel_size,
            },
        )
    }

    fn destroy_texture(&self, texture: BackendResource) {
        self.destroy(NullOp::DestroyTexture, texture, "texture");
    }

    fn create_texture_view(
        &self,
        texture: BackendResource,
        _info: &TextureViewCreateInfo,
    ) -> GfxResult<BackendResource> {
        if !self.is_live(texture) {
            return Err(GfxError::InvalidParameter);
        }
        self.create(NullOp::CreateTextureView, Object::TextureView)
    }

    fn destroy_texture_view(&self, view: BackendResource) {
        self.destroy(NullOp::DestroyTextureView, view, "texture view");
    }

    fn create_shader(&self, info: &ShaderCreateInfo<'_>) -> GfxResult<BackendResource> {
        if info.bytecode.is_empty() {
            return Err(GfxError::InvalidParameter);
        }
        self.create(NullOp::CreateShader, Object::Shader)
    }

    fn destroy_shader(&self, shader: BackendResource) {
        self.destroy(NullOp::DestroyShader, shader, "shader");
    }

    fn create_sampler(&self, _info: &SamplerCreateInfo) -> GfxResult<BackendResource> {
        self.create(NullOp::CreateSampler, Object::Sampler)
    }

    fn destroy_sampler(&self, sampler: BackendResource) {
        self.destroy(NullOp::DestroySampler, sampler, "sampler");
    }

    fn create_swapchain(&self, info: &SwapchainCreateInfo) -> GfxResult<BackendResource> {
        let mut state = self.lock();
        state.check_failure(NullOp::CreateSwapchain)?;
        if info.width == 0 || info.height == 0 {
            return Err(GfxError::InvalidParameter);
        }

        let texel_size = SWAPCHAIN_FORMAT.texel_size();
        let image_count = info.image_count.max(2);
        let mut images = Vec::with_capacity(image_count as usize);
        let mut views = Vec::with_capacity(image_count as usize);
        for _ in 0..image_count {
            images.push(state.insert(Object::Texture {
                data: vec![0; (info.width as u64 * info.height as u64 * texel_size) as usize],
                width: info.width,
                height: info.height,
                texel_size,
            }));
            views.push(state.insert(Object::TextureView));
        }

        let swapchain = state.insert(Object::Swapchain {
            images,
            views,
            next_image: 0,
        });
        state.log(NullOp::CreateSwapchain, swapchain);
        debug!(
            "Null swapchain {:?}: {}x{}, {} images",
            swapchain, info.width, info.height, image_count
        );
        Ok(swapchain)
    }

    fn destroy_swapchain(&self, swapchain: BackendResource) {
        let mut state = self.lock();
        let Object::Swapchain { images, views, .. } = state.remove(swapchain, "swapchain") else {
            panic!("{swapchain:?} is not a swapchain");
        };
        for resource in views.into_iter().chain(images) {
            state.objects.remove(&resource.raw());
        }
        state.log(NullOp::DestroySwapchain, swapchain);
    }

    fn get_swapchain_backbuffers(
        &self,
        swapchain: BackendResource,
    ) -> GfxResult<Vec<BackendResource>> {
        match self.lock().objects.get(&swapchain.raw()) {
            Some(Object::Swapchain { images, .. }) => Ok(images.clone()),
            _ => Err(GfxError::InvalidParameter),
        }
    }

    fn get_swapchain_backbuffer_views(
        &self,
        swapchain: BackendResource,
    ) -> GfxResult<Vec<BackendResource>> {
        match self.lock().objects.get(&swapchain.raw()) {
            Some(Object::Swapchain { views, .. }) => Ok(views.clone()),
            _ => Err(GfxError::InvalidParameter),
        }
    }

    fn get_swapchain_format(&self, _swapchain: BackendResource) -> Format {
        SWAPCHAIN_FORMAT
    }

    fn acquire_swapchain_image(
        &self,
        swapchain: BackendResource,
        _semaphore: BackendResource,
        _timeout: u64,
    ) -> GfxResult<u32> {
        let mut state = self.lock();
        state.check_failure(NullOp::AcquireImage)?;
        let image = match state.objects.get_mut(&swapchain.raw()) {
            Some(Object::Swapchain {
                images, next_image, ..
            }) => {
                let image = *next_image;
                *next_image = (image + 1) % images.len() as u32;
                image
            }
            _ => return Err(GfxError::InvalidParameter),
        };
        state.log(NullOp::AcquireImage, swapchain);
        Ok(image)
    }

    fn present(
        &self,
        swapchain: BackendResource,
        image_index: u32,
        _wait_semaphores: &[BackendResource],
    ) -> GfxResult<()> {
        let mut state = self.lock();
        state.check_failure(NullOp::Present)?;
        match state.objects.get(&swapchain.raw()) {
            Some(Object::Swapchain { images, .. }) if (image_index as usize) < images.len() => {}
            _ => return Err(GfxError::InvalidParameter),
        }
        state.log(NullOp::Present, swapchain);
        Ok(())
    }

    fn create_render_pass(&self, info: &RenderPassCreateInfo) -> GfxResult<BackendResource> {
        self.create(NullOp::CreateRenderPass, Object::RenderPass(info.clone()))
    }

    fn destroy_render_pass(&self, render_pass: BackendResource) {
        self.destroy(NullOp::DestroyRenderPass, render_pass, "render pass");
    }

    fn create_gfx_pipeline(&self, info: &GfxPipelineCreateInfo) -> GfxResult<BackendResource> {
        self.create(NullOp::CreatePipeline, Object::Pipeline(info.clone()))
    }

    fn destroy_pipeline(&self, pipeline: BackendResource) {
        self.destroy(NullOp::DestroyPipeline, pipeline, "pipeline");
    }

    fn create_pipeline_layout(
        &self,
        info: &PipelineLayoutCreateInfo,
    ) -> GfxResult<PipelineLayoutObjects> {
        let mut state = self.lock();
        state.check_failure(NullOp::CreatePipelineLayout)?;
        let set_layouts = info
            .set_layouts
            .iter()
            .map(|_| state.insert(Object::SetLayout))
            .collect();
        let layout = state.insert(Object::PipelineLayout);
        state.log(NullOp::CreatePipelineLayout, layout);
        Ok(PipelineLayoutObjects {
            layout,
            set_layouts,
        })
    }

    fn destroy_pipeline_layout(&self, objects: &PipelineLayoutObjects) {
        let mut state = self.lock();
        for set_layout in &objects.set_layouts {
            state.remove(*set_layout, "descriptor set layout");
        }
        state.remove(objects.layout, "pipeline layout");
        state.log(NullOp::DestroyPipelineLayout, objects.layout);
    }

    fn create_descriptor_pool(
        &self,
        _set_layout: BackendResource,
        _max_sets: u32,
    ) -> GfxResult<BackendResource> {
        self.create(
            NullOp::CreateDescriptorPool,
            Object::DescriptorPool { sets: Vec::new() },
        )
    }

    fn destroy_descriptor_pool(&self, pool: BackendResource) {
        let mut state = self.lock();
        let Object::DescriptorPool { sets } = state.remove(pool, "descriptor pool") else {
            panic!("{pool:?} is not a descriptor pool");
        };
        for set in sets {
            state.objects.remove(&set.raw());
        }
        state.log(NullOp::DestroyDescriptorPool, pool);
    }

    fn allocate_descriptor_sets(
        &self,
        pool: BackendResource,
        _set_layout: BackendResource,
        count: u32,
    ) -> GfxResult<Vec<BackendResource>> {
        let mut state = self.lock();
        state.check_failure(NullOp::AllocateDescriptorSets)?;
        let sets: Vec<_> = (0..count)
            .map(|_| state.insert(Object::DescriptorSet { writes: Vec::new() }))
            .collect();
        match state.objects.get_mut(&pool.raw()) {
            Some(Object::DescriptorPool { sets: owned }) => owned.extend(sets.iter().copied()),
            _ => return Err(GfxError::InvalidParameter),
        }
        state.log(NullOp::AllocateDescriptorSets, pool);
        Ok(sets)
    }

    fn update_descriptor_set(&self, set: BackendResource, descriptors: &[Descriptor]) {
        let mut state = self.lock();
        match state.objects.get_mut(&set.raw()) {
            Some(Object::DescriptorSet { writes }) => {
                writes.retain(|old| descriptors.iter().all(|new| new.binding != old.binding));
                writes.extend_from_slice(descriptors);
            }
            _ => panic!("updating unknown descriptor set {set:?}"),
        }
        state.log(NullOp::UpdateDescriptorSet, set);
    }

    fn create_command_pool(&self, _queue: QueueType) -> GfxResult<BackendResource> {
        self.create(
            NullOp::CreateCommandPool,
            Object::CommandPool { lists: Vec::new() },
        )
    }

    fn destroy_command_pool(&self, pool: BackendResource) {
        let mut state = self.lock();
        let Object::CommandPool { lists } = state.remove(pool, "command pool") else {
            panic!("{pool:?} is not a command pool");
        };
        for list in lists {
            state.objects.remove(&list.raw());
        }
        state.log(NullOp::DestroyCommandPool, pool);
    }

    fn reset_command_pool(&self, pool: BackendResource) -> GfxResult<()> {
        let mut state = self.lock();
        state.check_failure(NullOp::ResetCommandPool)?;
        let lists = match state.objects.get(&pool.raw()) {
            Some(Object::CommandPool { lists }) => lists.clone(),
            _ => return Err(GfxError::InvalidParameter),
        };
        for list in lists {
            if let Some(Object::CommandList { recording, copies }) =
                state.objects.get_mut(&list.raw())
            {
                *recording = false;
                copies.clear();
            }
        }
        state.log(NullOp::ResetCommandPool, pool);
        Ok(())
    }

    fn allocate_command_list(&self, pool: BackendResource) -> GfxResult<BackendResource> {
        let mut state = self.lock();
        state.check_failure(NullOp::AllocateCommandList)?;
        let list = state.insert(Object::CommandList {
            recording: false,
            copies: Vec::new(),
        });
        match state.objects.get_mut(&pool.raw()) {
            Some(Object::CommandPool { lists }) => lists.push(list),
            _ => return Err(GfxError::InvalidParameter),
        }
        state.log(NullOp::AllocateCommandList, list);
        Ok(list)
    }

    fn begin_command_list(&self, list: BackendResource) -> GfxResult<()> {
        let mut state = self.lock();
        state.check_failure(NullOp::BeginCommandList)?;
        match state.objects.get_mut(&list.raw()) {
            Some(Object::CommandList { recording, copies }) => {
                *recording = true;
                copies.clear();
            }
            _ => return Err(GfxError::InvalidParameter),
        }
        state.log(NullOp::BeginCommandList, list);
        Ok(())
    }

    fn end_command_list(&self, list: BackendResource) -> GfxResult<()> {
        let mut state = self.lock();
        state.check_failure(NullOp::EndCommandList)?;
        match state.objects.get_mut(&list.raw()) {
            Some(Object::CommandList { recording, .. }) if *recording => *recording = false,
            _ => return Err(GfxError::InvalidParameter),
        }
        state.log(NullOp::EndCommandList, list);
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> GfxResult<BackendResource> {
        self.create(NullOp::CreateFence, Object::Fence { signaled })
    }

    fn destroy_fence(&self, fence: BackendResource) {
        self.destroy(NullOp::DestroyFence, fence, "fence");
    }

    fn create_semaphore(&self) -> GfxResult<BackendResource> {
        self.create(NullOp::CreateSemaphore, Object::Semaphore)
    }

    fn destroy_semaphore(&self, semaphore: BackendResource) {
        self.destroy(NullOp::DestroySemaphore, semaphore, "semaphore");
    }

    fn wait_for_fences(
        &self,
        fences: &[BackendResource],
        wait_all: bool,
        _timeout: u64,
    ) -> GfxResult<()> {
        let mut state = self.lock();
        state.check_failure(NullOp::WaitForFences)?;
        state.log(
            NullOp::WaitForFences,
            fences.first().copied().unwrap_or_default(),
        );

        let mut signaled = fences.iter().map(|&fence| state.fence_signaled(fence));
        let done = if wait_all {
            signaled.all(|s| s)
        } else {
            signaled.any(|s| s)
        };
        // Nothing can signal a fence while this call blocks, so an
        // unsignaled fence is reported as an expired wait.
        if done { Ok(()) } else { Err(GfxError::Timeout) }
    }

    fn reset_fences(&self, fences: &[BackendResource]) -> GfxResult<()> {
        let mut state = self.lock();
        state.check_failure(NullOp::ResetFences)?;
        for &fence in fences {
            state.set_fence(fence, false);
        }
        state.log(
            NullOp::ResetFences,
            fences.first().copied().unwrap_or_default(),
        );
        Ok(())
    }

    fn queue_submit(&self, queue: QueueType, submit: &SubmitInfo<'_>) -> GfxResult<()> {
        let mut state = self.lock();
        state.check_failure(NullOp::QueueSubmit)?;

        for &list in submit.command_lists {
            let copies = match state.objects.get_mut(&list.raw()) {
                Some(Object::CommandList {
                    recording: false,
                    copies,
                }) => std::mem::take(copies),
                _ => return Err(GfxError::InvalidParameter),
            };
            for copy in &copies {
                state.apply_copy(copy);
            }
        }

        if !submit.fence.is_null() {
            if state.gpu_stalled {
                state.stalled_fences.push(submit.fence);
            } else {
                state.set_fence(submit.fence, true);
            }
        }

        state.submits.push(NullSubmit {
            queue,
            lists: submit.command_lists.to_vec(),
            wait_semaphores: submit.wait_semaphores.to_vec(),
            signal_semaphores: submit.signal_semaphores.to_vec(),
            fence: submit.fence,
        });
        state.log(NullOp::QueueSubmit, submit.fence);
        Ok(())
    }

    fn wait_idle(&self) -> GfxResult<()> {
        let mut state = self.lock();
        state.check_failure(NullOp::WaitIdle)?;
        state.log(NullOp::WaitIdle, BackendResource::NULL);
        if state.gpu_stalled {
            return Err(GfxError::Timeout);
        }
        Ok(())
    }

    fn cmd_bind_pipeline(
        &self,
        list: BackendResource,
        _bind_point: PipelineBindPoint,
        pipeline: BackendResource,
    ) {
        self.record(NullOp::CmdBindPipeline, list, pipeline);
    }

    fn cmd_bind_descriptor_sets(
        &self,
        list: BackendResource,
        _bind_point: PipelineBindPoint,
        _layout: BackendResource,
        _first_set: u32,
        sets: &[BackendResource],
    ) {
        for &set in sets {
            self.record(NullOp::CmdBindDescriptorSets, list, set);
        }
    }

    fn cmd_begin_render_pass(
        &self,
        list: BackendResource,
        render_pass: BackendResource,
        _framebuffer: &Framebuffer,
        _render_area: Rect2D,
        _clear_values: &[ClearValue],
    ) {
        self.record(NullOp::CmdBeginRenderPass, list, render_pass);
    }

    fn cmd_end_render_pass(&self, list: BackendResource) {
        self.record(NullOp::CmdEndRenderPass, list, BackendResource::NULL);
    }

    fn cmd_set_viewports(&self, list: BackendResource, _first: u32, _viewports: &[Viewport]) {
        self.record(NullOp::CmdSetViewport, list, BackendResource::NULL);
    }

    fn cmd_set_scissors(&self, list: BackendResource, _first: u32, _scissors: &[Rect2D]) {
        self.record(NullOp::CmdSetScissor, list, BackendResource::NULL);
    }

    fn cmd_bind_vertex_buffers(
        &self,
        list: BackendResource,
        _first_binding: u32,
        buffers: &[BackendResource],
        _offsets: &[u64],
    ) {
        for &buffer in buffers {
            self.record(NullOp::CmdBindVertexBuffers, list, buffer);
        }
    }

    fn cmd_bind_index_buffer(
        &self,
        list: BackendResource,
        buffer: BackendResource,
        _offset: u64,
        _index_type: IndexType,
    ) {
        self.record(NullOp::CmdBindIndexBuffer, list, buffer);
    }

    fn cmd_draw(
        &self,
        list: BackendResource,
        _vertex_count: u32,
        _instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) {
        self.record(NullOp::CmdDraw, list, BackendResource::NULL);
    }

    fn cmd_draw_indexed(
        &self,
        list: BackendResource,
        _index_count: u32,
        _instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.record(NullOp::CmdDrawIndexed, list, BackendResource::NULL);
    }

    fn cmd_copy_buffer(
        &self,
        list: BackendResource,
        src: BackendResource,
        dst: BackendResource,
        regions: &[BufferCopyRegion],
    ) {
        self.record(NullOp::CmdCopyBuffer, list, dst);
        self.lock().list_copies(list).push(PendingCopy::Buffer {
            src,
            dst,
            regions: regions.to_vec(),
        });
    }

    fn cmd_copy_buffer_to_texture(
        &self,
        list: BackendResource,
        src: BackendResource,
        dst: BackendResource,
        _dst_layout: TextureLayout,
        regions: &[BufferTextureCopyRegion],
    ) {
        self.record(NullOp::CmdCopyBufferToTexture, list, dst);
        self.lock().list_copies(list).push(PendingCopy::BufferToTexture {
            src,
            dst,
            regions: regions.to_vec(),
        });
    }

    fn cmd_pipeline_barrier(
        &self,
        list: BackendResource,
        _src_stage: PipelineStageFlags,
        _dst_stage: PipelineStageFlags,
        texture_barriers: &[TextureMemoryBarrier],
    ) {
        for barrier in texture_barriers {
            self.record(NullOp::CmdPipelineBarrier, list, barrier.texture);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferUsageFlags;

    fn host_buffer(backend: &NullBackend, size: u64) -> BackendResource {
        backend
            .create_buffer(&BufferCreateInfo {
                size,
                mem_usage: MemoryUsage::CpuOnly,
                usage: BufferUsageFlags::TRANSFER_SRC | BufferUsageFlags::TRANSFER_DST,
            })
            .unwrap()
    }

    #[test]
    fn test_copy_applied_at_submit() {
        let backend = NullBackend::new();
        let src = host_buffer(&backend, 4);
        let dst = host_buffer(&backend, 4);
        let ptr = backend.map_buffer(src).unwrap();
        unsafe { std::ptr::copy_nonoverlapping([1u8, 2, 3, 4].as_ptr(), ptr.as_ptr(), 4) };
        backend.unmap_buffer(src);

        let pool = backend.create_command_pool(QueueType::Gfx).unwrap();
        let list = backend.allocate_command_list(pool).unwrap();
        backend.begin_command_list(list).unwrap();
        backend.cmd_copy_buffer(
            list,
            src,
            dst,
            &[BufferCopyRegion {
                src_offset: 0,
                dst_offset: 0,
                size: 4,
            }],
        );
        backend.end_command_list(list).unwrap();
        assert_eq!(backend.buffer_contents(dst), Some(vec![0; 4]));

        backend
            .queue_submit(
                QueueType::Gfx,
                &SubmitInfo {
                    command_lists: &[list],
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(backend.buffer_contents(dst), Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_stalled_gpu_times_out_until_released() {
        let backend = NullBackend::new();
        let fence = backend.create_fence(false).unwrap();
        backend.set_gpu_stalled(true);
        backend
            .queue_submit(
                QueueType::Gfx,
                &SubmitInfo {
                    fence,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(
            backend.wait_for_fences(&[fence], true, 0),
            Err(GfxError::Timeout)
        );

        backend.set_gpu_stalled(false);
        assert_eq!(backend.wait_for_fences(&[fence], true, 0), Ok(()));
    }

    #[test]
    fn test_gpu_only_buffer_cannot_be_mapped() {
        let backend = NullBackend::new();
        let buffer = backend
            .create_buffer(&BufferCreateInfo {
                size: 8,
                mem_usage: MemoryUsage::GpuOnly,
                usage: BufferUsageFlags::VERTEX_BUFFER,
            })
            .unwrap();
        assert_eq!(backend.map_buffer(buffer), Err(GfxError::InvalidParameter));
    }

    #[test]
    fn test_destroying_swapchain_frees_backbuffers() {
        let backend = NullBackend::new();
        let swapchain = backend
            .create_swapchain(&SwapchainCreateInfo::headless(4, 4))
            .unwrap();
        let images = backend.get_swapchain_backbuffers(swapchain).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(backend.live_count(), 5);

        backend.destroy_swapchain(swapchain);
        assert_eq!(backend.live_count(), 0);
    }

    #[test]
    fn test_acquire_cycles_images() {
        let backend = NullBackend::new();
        let swapchain = backend
            .create_swapchain(&SwapchainCreateInfo::headless(4, 4))
            .unwrap();
        let indices: Vec<_> = (0..3)
            .map(|_| {
                backend
                    .acquire_swapchain_image(swapchain, BackendResource::NULL, u64::MAX)
                    .unwrap()
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 0]);
    }
}
