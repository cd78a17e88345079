//! The contract a GPU driver backend implements for the device.
//!
//! The device never talks to a driver directly. Every backend object it
//! owns is an opaque [`BackendResource`] created and destroyed through the
//! [`Backend`] trait, and every command it records goes through the
//! `cmd_*` primitives here.
//!
//! # Thread Safety
//!
//! Backends must be `Send + Sync`. The device serializes access to
//! command lists and command pools by itself: a list is only ever
//! recorded by the thread that allocated it, and a command pool is only
//! reset at a frame boundary. Everything else may be called from any
//! thread concurrently.

use std::ptr::NonNull;

use crate::buffer::{BufferCopyRegion, BufferCreateInfo, IndexType};
use crate::command::QueueType;
use crate::descriptor::Descriptor;
use crate::error::GfxResult;
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

/// Opaque reference to a backend object.
///
/// Zero is reserved for "no object".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendResource(u64);

impl BackendResource {
    pub const NULL: Self = Self(0);

    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Capability shared by every pooled resource record.
pub trait DeviceResource {
    /// Backend object backing the record.
    fn resource(&self) -> BackendResource;

    /// Name given at creation, empty if none.
    fn debug_name(&self) -> &str;
}

/// One queue submission.
#[derive(Clone, Copy, Debug, Default)]
pub struct SubmitInfo<'a> {
    pub command_lists: &'a [BackendResource],
    pub wait_semaphores: &'a [BackendResource],
    /// One stage mask per wait semaphore.
    pub wait_stages: &'a [PipelineStageFlags],
    pub signal_semaphores: &'a [BackendResource],
    /// Fence signaled once every list completed, or null.
    pub fence: BackendResource,
}

/// GPU driver backend.
///
/// Creation methods return the backend error unchanged on failure and
/// leave nothing behind. Destruction methods are infallible; the device
/// only calls them once the GPU is done with the object.
pub trait Backend: Send + Sync {
    // Resources

    fn create_buffer(&self, info: &BufferCreateInfo) -> GfxResult<BackendResource>;
    fn destroy_buffer(&self, buffer: BackendResource);

    /// Maps a host-visible buffer and returns a pointer to its first byte.
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::InvalidParameter`](crate::GfxError::InvalidParameter)
    /// if the buffer's memory is not host-visible.
    fn map_buffer(&self, buffer: BackendResource) -> GfxResult<NonNull<u8>>;
    fn unmap_buffer(&self, buffer: BackendResource);

    fn create_texture(&self, info: &TextureCreateInfo) -> GfxResult<BackendResource>;
    fn destroy_texture(&self, texture: BackendResource);

    fn create_texture_view(
        &self,
        texture: BackendResource,
        info: &TextureViewCreateInfo,
    ) -> GfxResult<BackendResource>;
    fn destroy_texture_view(&self, view: BackendResource);

    fn create_shader(&self, info: &ShaderCreateInfo<'_>) -> GfxResult<BackendResource>;
    fn destroy_shader(&self, shader: BackendResource);

    fn create_sampler(&self, info: &SamplerCreateInfo) -> GfxResult<BackendResource>;
    fn destroy_sampler(&self, sampler: BackendResource);

    // Swapchains

    fn create_swapchain(&self, info: &SwapchainCreateInfo) -> GfxResult<BackendResource>;

    /// Destroys the swapchain together with its backbuffers and their views.
    fn destroy_swapchain(&self, swapchain: BackendResource);

    /// Backbuffer images, in image index order. Owned by the swapchain.
    fn get_swapchain_backbuffers(&self, swapchain: BackendResource)
    -> GfxResult<Vec<BackendResource>>;

    /// One color view per backbuffer, in image index order. Owned by the
    /// swapchain.
    fn get_swapchain_backbuffer_views(
        &self,
        swapchain: BackendResource,
    ) -> GfxResult<Vec<BackendResource>>;

    fn get_swapchain_format(&self, swapchain: BackendResource) -> Format;

    /// Acquires the next backbuffer, signaling `semaphore` once it can be
    /// rendered to.
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::Timeout`](crate::GfxError::Timeout) if no image
    /// became available within `timeout` nanoseconds.
    fn acquire_swapchain_image(
        &self,
        swapchain: BackendResource,
        semaphore: BackendResource,
        timeout: u64,
    ) -> GfxResult<u32>;

    fn present(
        &self,
        swapchain: BackendResource,
        image_index: u32,
        wait_semaphores: &[BackendResource],
    ) -> GfxResult<()>;

    // Pipelines

    fn create_render_pass(&self, info: &RenderPassCreateInfo) -> GfxResult<BackendResource>;
    fn destroy_render_pass(&self, render_pass: BackendResource);

    fn create_gfx_pipeline(&self, info: &GfxPipelineCreateInfo) -> GfxResult<BackendResource>;
    fn destroy_pipeline(&self, pipeline: BackendResource);

    /// Creates a pipeline layout and one descriptor set layout per set.
    fn create_pipeline_layout(
        &self,
        info: &PipelineLayoutCreateInfo,
    ) -> GfxResult<PipelineLayoutObjects>;
    fn destroy_pipeline_layout(&self, objects: &PipelineLayoutObjects);

    // Descriptors

    fn create_descriptor_pool(
        &self,
        set_layout: BackendResource,
        max_sets: u32,
    ) -> GfxResult<BackendResource>;

    /// Destroys the pool and every set allocated from it.
    fn destroy_descriptor_pool(&self, pool: BackendResource);

    fn allocate_descriptor_sets(
        &self,
        pool: BackendResource,
        set_layout: BackendResource,
        count: u32,
    ) -> GfxResult<Vec<BackendResource>>;

    /// Writes `descriptors` into `set`. Bindings not listed keep their
    /// previous content.
    fn update_descriptor_set(&self, set: BackendResource, descriptors: &[Descriptor]);

    // Command pools

    fn create_command_pool(&self, queue: QueueType) -> GfxResult<BackendResource>;

    /// Destroys the pool and every list allocated from it.
    fn destroy_command_pool(&self, pool: BackendResource);

    /// Returns every list of the pool to the initial state.
    fn reset_command_pool(&self, pool: BackendResource) -> GfxResult<()>;

    fn allocate_command_list(&self, pool: BackendResource) -> GfxResult<BackendResource>;
    fn begin_command_list(&self, list: BackendResource) -> GfxResult<()>;
    fn end_command_list(&self, list: BackendResource) -> GfxResult<()>;

    // Synchronization

    fn create_fence(&self, signaled: bool) -> GfxResult<BackendResource>;
    fn destroy_fence(&self, fence: BackendResource);

    fn create_semaphore(&self) -> GfxResult<BackendResource>;
    fn destroy_semaphore(&self, semaphore: BackendResource);

    /// Blocks until one (or all, with `wait_all`) of `fences` is signaled.
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::Timeout`](crate::GfxError::Timeout) if `timeout`
    /// nanoseconds elapse first.
    fn wait_for_fences(
        &self,
        fences: &[BackendResource],
        wait_all: bool,
        timeout: u64,
    ) -> GfxResult<()>;

    fn reset_fences(&self, fences: &[BackendResource]) -> GfxResult<()>;

    fn queue_submit(&self, queue: QueueType, submit: &SubmitInfo<'_>) -> GfxResult<()>;

    /// Blocks until the device is idle.
    fn wait_idle(&self) -> GfxResult<()>;

    // Recording

    fn cmd_bind_pipeline(
        &self,
        list: BackendResource,
        bind_point: PipelineBindPoint,
        pipeline: BackendResource,
    );

    fn cmd_bind_descriptor_sets(
        &self,
        list: BackendResource,
        bind_point: PipelineBindPoint,
        layout: BackendResource,
        first_set: u32,
        sets: &[BackendResource],
    );

    fn cmd_begin_render_pass(
        &self,
        list: BackendResource,
        render_pass: BackendResource,
        framebuffer: &Framebuffer,
        render_area: Rect2D,
        clear_values: &[ClearValue],
    );
    fn cmd_end_render_pass(&self, list: BackendResource);

    fn cmd_set_viewports(&self, list: BackendResource, first: u32, viewports: &[Viewport]);
    fn cmd_set_scissors(&self, list: BackendResource, first: u32, scissors: &[Rect2D]);

    fn cmd_bind_vertex_buffers(
        &self,
        list: BackendResource,
        first_binding: u32,
        buffers: &[BackendResource],
        offsets: &[u64],
    );
    fn cmd_bind_index_buffer(
        &self,
        list: BackendResource,
        buffer: BackendResource,
        offset: u64,
        index_type: IndexType,
    );

    fn cmd_draw(
        &self,
        list: BackendResource,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );
    fn cmd_draw_indexed(
        &self,
        list: BackendResource,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    fn cmd_copy_buffer(
        &self,
        list: BackendResource,
        src: BackendResource,
        dst: BackendResource,
        regions: &[BufferCopyRegion],
    );
    fn cmd_copy_buffer_to_texture(
        &self,
        list: BackendResource,
        src: BackendResource,
        dst: BackendResource,
        dst_layout: TextureLayout,
        regions: &[BufferTextureCopyRegion],
    );

    fn cmd_pipeline_barrier(
        &self,
        list: BackendResource,
        src_stage: PipelineStageFlags,
        dst_stage: PipelineStageFlags,
        texture_barriers: &[TextureMemoryBarrier],
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_resource() {
        assert!(BackendResource::NULL.is_null());
        assert!(BackendResource::default().is_null());
        assert!(!BackendResource::new(1).is_null());
        assert_eq!(BackendResource::new(7).raw(), 7);
    }
}
