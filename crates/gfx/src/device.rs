//! The device: resource pools, frame ring and deferred destruction.
//!
//! This module handles resource creation and destruction, the frame
//! lifecycle and command list submission. Command recording lives in
//! [`recording`](crate::recording).
//!
//! # Overview
//!
//! The [`Device`] owns one pool per resource kind and hands out typed
//! handles. Destroying a resource never reaches the backend right away:
//! the handle is appended to the current frame's expiry list, and the
//! backend object is only destroyed once the ring wraps back around to
//! that frame and its fences were observed signaled. A frame's resources
//! can therefore never be freed while the GPU may still use them.
//!
//! ```text
//! frame 0: destroy(b) -> expired[0] = [b]   end_frame: submit, fence[0]
//! frame 1: ...                              end_frame: submit, fence[1]
//! frame 2 (slot 0): wait fence[0], destroy b on the backend
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use cobalt_gfx::null::NullBackend;
//! use cobalt_gfx::{BufferInfo, BufferUsageFlags, Device, MemoryUsage};
//!
//! let device = Device::new(Arc::new(NullBackend::new())).unwrap();
//! let buffer = device
//!     .create_buffer(&BufferInfo::new(256, MemoryUsage::CpuOnly, BufferUsageFlags::VERTEX_BUFFER))
//!     .unwrap();
//!
//! device.destroy_buffer(buffer);
//! device.new_frame().unwrap();
//! device.new_frame().unwrap();
//! assert_eq!(device.stats().buffers, 0);
//! ```

use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use cobalt_core::check;
use tracing::{debug, error, info, warn};

use crate::backend::{Backend, BackendResource, SubmitInfo};
use crate::buffer::{Buffer, BufferCopyRegion, BufferHandle, BufferInfo, BufferUsageFlags, MemoryUsage};
use crate::cache::ObjectCache;
use crate::command::{CommandList, CommandListHandle, QueueType};
use crate::config::DeviceConfig;
use crate::descriptor::{DescriptorSetAllocator, MAX_BINDINGS, MAX_DESCRIPTOR_SETS};
use crate::error::{GfxError, GfxResult};
use crate::format::{SampleCount, TextureAspectFlags};
use crate::frame::{ExpiredResources, Frame, QueueSubmission};
use crate::handle::Handle;
use crate::pipeline::{GfxPipelineCreateInfo, PipelineLayout, PipelineLayoutHandle, PipelineLayoutInfo};
use crate::pool::SyncPool;
use crate::render_pass::RenderPassCreateInfo;
use crate::sampler::{Sampler, SamplerHandle, SamplerInfo};
use crate::shader::{Shader, ShaderHandle, ShaderInfo};
use crate::swapchain::{Swapchain, SwapchainHandle, SwapchainInfo};
use crate::sync::{
    AccessFlags, Fence, FenceHandle, FenceInfo, PipelineStageFlags, Semaphore, SemaphoreHandle,
    SemaphoreInfo,
};
use crate::texture::{
    BufferTextureCopyRegion, Extent3D, Offset3D, Texture, TextureCreateInfo, TextureHandle,
    TextureInfo, TextureLayout, TextureMemoryBarrier, TextureSubresourceLayers, TextureType,
    TextureUsageFlags, TextureView, TextureViewCreateInfo, TextureViewHandle, TextureViewInfo,
    TextureViewType,
};

/// Live record counts, for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub buffers: usize,
    pub textures: usize,
    pub texture_views: usize,
    pub shaders: usize,
    pub samplers: usize,
    pub swapchains: usize,
    pub pipeline_layouts: usize,
    pub fences: usize,
    pub semaphores: usize,
    pub render_passes: usize,
    pub pipelines: usize,
    /// Handles destroyed but not yet freed, across every frame.
    pub pending_destroys: usize,
}

/// Handle-based GPU device.
///
/// Every method takes `&self`; the device is meant to be shared across
/// recording threads, typically behind an `Arc`.
///
/// # Thread Safety
///
/// Each resource pool sits behind its own lock, so creating two textures
/// on two threads only contends on the texture pool. Command lists are
/// allocated from per-thread command pools. [`Device::new_frame`] and
/// [`Device::end_frame`] are frame boundaries: no other thread may be
/// recording while they run.
pub struct Device {
    backend: Arc<dyn Backend>,
    config: DeviceConfig,

    pub(crate) buffers: SyncPool<Buffer>,
    pub(crate) textures: SyncPool<Texture>,
    pub(crate) texture_views: SyncPool<TextureView>,
    pub(crate) shaders: SyncPool<Shader>,
    pub(crate) samplers: SyncPool<Sampler>,
    pub(crate) swapchains: SyncPool<Swapchain>,
    pub(crate) pipeline_layouts: SyncPool<PipelineLayout>,
    pub(crate) fences: SyncPool<Fence>,
    pub(crate) semaphores: SyncPool<Semaphore>,

    render_passes: ObjectCache<RenderPassCreateInfo>,
    pipelines: ObjectCache<GfxPipelineCreateInfo>,

    frames: Vec<Frame>,
    current_frame: AtomicUsize,
    frame_number: AtomicU64,
}

/// Where a one-shot upload list went.
enum Upload {
    /// Queued on the current frame's gfx submission.
    Queued,
    /// Submitted on its own and waited for.
    Completed,
}

impl Device {
    /// Creates a device with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the frame fences cannot be created.
    pub fn new(backend: Arc<dyn Backend>) -> GfxResult<Self> {
        Self::with_config(backend, DeviceConfig::default())
    }

    /// Creates a device.
    ///
    /// # Arguments
    ///
    /// * `backend` - Backend every GPU object is created through
    /// * `config` - Frame ring and descriptor cache tunables
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::InvalidParameter`] if `config.frames_in_flight`
    /// is zero, or the backend error if the frame fences cannot be created.
    pub fn with_config(backend: Arc<dyn Backend>, config: DeviceConfig) -> GfxResult<Self> {
        if !check!(
            config.frames_in_flight >= 1,
            "device needs at least one frame in flight"
        ) {
            return Err(GfxError::InvalidParameter);
        }
        if config.descriptor_set_max_unused_frames < config.frames_in_flight {
            warn!(
                "Descriptor sets unused for {} frames are recycled with {} frames in flight",
                config.descriptor_set_max_unused_frames, config.frames_in_flight
            );
        }

        let mut frames = Vec::with_capacity(config.frames_in_flight as usize);
        for index in 0..config.frames_in_flight {
            match Frame::new(backend.as_ref(), index) {
                Ok(frame) => frames.push(frame),
                Err(err) => {
                    for frame in &frames {
                        frame.destroy(backend.as_ref());
                    }
                    return Err(err);
                }
            }
        }

        info!(
            "Device created: {} frames in flight, fence timeout {} ns",
            config.frames_in_flight, config.fence_timeout
        );

        Ok(Self {
            backend,
            config,
            buffers: SyncPool::new(),
            textures: SyncPool::new(),
            texture_views: SyncPool::new(),
            shaders: SyncPool::new(),
            samplers: SyncPool::new(),
            swapchains: SyncPool::new(),
            pipeline_layouts: SyncPool::new(),
            fences: SyncPool::new(),
            semaphores: SyncPool::new(),
            render_passes: ObjectCache::new("render pass"),
            pipelines: ObjectCache::new("pipeline"),
            frames,
            current_frame: AtomicUsize::new(0),
            frame_number: AtomicU64::new(0),
        })
    }

    /// Returns the backend.
    #[inline]
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    #[inline]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Index of the current frame ring slot.
    #[inline]
    pub fn frame_index(&self) -> u32 {
        self.current_frame.load(Ordering::Acquire) as u32
    }

    /// Number of completed `new_frame` calls.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number.load(Ordering::Acquire)
    }

    pub(crate) fn current_frame(&self) -> &Frame {
        &self.frames[self.current_frame.load(Ordering::Acquire)]
    }

    pub(crate) fn frame(&self, index: u32) -> &Frame {
        &self.frames[index as usize]
    }

    // ------------------------------------------------------------------
    // Buffers
    // ------------------------------------------------------------------

    /// Creates a buffer, optionally filled with initial data.
    ///
    /// `TRANSFER_SRC` and `TRANSFER_DST` are always added to the usage.
    /// Host-visible buffers are filled through a mapping. GPU-only buffers
    /// are filled from a staging buffer by a copy list queued on the
    /// current frame, so their content is only visible to work submitted
    /// after it. Between `end_frame` and `new_frame` the copy runs on its
    /// own submission and is complete when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::InvalidParameter`] for a zero size or initial
    /// data larger than the buffer, otherwise the backend error. Nothing
    /// is left behind on failure.
    pub fn create_buffer(&self, info: &BufferInfo<'_>) -> GfxResult<BufferHandle> {
        let mut create_info = info.info;
        if create_info.size == 0 {
            warn!("Rejected zero-sized buffer '{}'", info.debug_name);
            return Err(GfxError::InvalidParameter);
        }
        if !check!(
            info.initial_data.len() as u64 <= create_info.size,
            "{} bytes of initial data for a {} byte buffer",
            info.initial_data.len(),
            create_info.size
        ) {
            return Err(GfxError::InvalidParameter);
        }
        create_info.usage |= BufferUsageFlags::TRANSFER_SRC | BufferUsageFlags::TRANSFER_DST;

        let resource = self.backend.create_buffer(&create_info)?;
        if !info.initial_data.is_empty()
            && let Err(err) = self.upload_buffer(resource, create_info.mem_usage, info.initial_data)
        {
            self.backend.destroy_buffer(resource);
            return Err(err);
        }

        let handle = self.buffers.allocate(Buffer {
            resource,
            info: create_info,
            debug_name: info.debug_name.to_owned(),
        });
        debug!(
            "Created buffer '{}' {:?}: {} bytes, {:?}",
            info.debug_name, handle, create_info.size, create_info.mem_usage
        );
        Ok(handle)
    }

    fn upload_buffer(
        &self,
        dst: BackendResource,
        mem_usage: MemoryUsage,
        data: &[u8],
    ) -> GfxResult<()> {
        if mem_usage.is_host_visible() {
            return self.write_mapped(dst, 0, data);
        }

        self.with_staging(data, |list, staging| {
            self.backend.cmd_copy_buffer(
                list,
                staging,
                dst,
                &[BufferCopyRegion {
                    src_offset: 0,
                    dst_offset: 0,
                    size: data.len() as u64,
                }],
            );
        })
    }

    /// Creates a staging buffer holding `data` and records `record` into a
    /// one-shot gfx list.
    ///
    /// The list is queued on the current frame, and the staging buffer is
    /// then destroyed deferred like any other buffer. Once the frame has
    /// ended the list runs on its own submission instead and the staging
    /// buffer is freed as soon as it completed. On failure it is freed at
    /// once.
    fn with_staging(
        &self,
        data: &[u8],
        record: impl FnOnce(BackendResource, BackendResource),
    ) -> GfxResult<()> {
        let staging = self.create_buffer(&BufferInfo::staging(data).with_debug_name("staging"))?;
        let staging_resource = self.buffers.resource(staging);

        let result = self.allocate_cmd_list(QueueType::Gfx).and_then(|cmd| {
            record(self.cmd_resource(cmd), staging_resource);
            self.submit_upload(cmd)
        });

        match result {
            Ok(Upload::Queued) => {
                self.destroy_buffer(staging);
                Ok(())
            }
            other => {
                let buffer = self.buffers.free(staging);
                self.backend.destroy_buffer(buffer.resource);
                other.map(|_| ())
            }
        }
    }

    /// Ends an upload list and queues it on its frame, or runs it to
    /// completion when that frame already ended.
    fn submit_upload(&self, cmd: CommandListHandle) -> GfxResult<Upload> {
        let resource = self.with_cmd(cmd, |list| {
            list.submitted = true;
            list.resource
        });
        self.backend.end_command_list(resource)?;

        {
            let mut state = self.frame(cmd.frame).state();
            if !state.ended {
                state.gfx.lists.push(resource);
                return Ok(Upload::Queued);
            }
        }

        debug!("Frame {} already ended, running upload on its own", cmd.frame);
        let fence = self.backend.create_fence(false)?;
        let result = self
            .backend
            .queue_submit(
                QueueType::Gfx,
                &SubmitInfo {
                    command_lists: &[resource],
                    wait_semaphores: &[],
                    wait_stages: &[],
                    signal_semaphores: &[],
                    fence,
                },
            )
            .and_then(|()| {
                self.backend
                    .wait_for_fences(&[fence], true, self.config.fence_timeout)
                    .or_else(|err| {
                        error!("Waiting for upload failed ({}), waiting for the device", err);
                        self.backend.wait_idle()
                    })
            });
        self.backend.destroy_fence(fence);
        result.map(|()| Upload::Completed)
    }

    /// Copies `data` into host-visible memory at `offset`.
    fn write_mapped(&self, buffer: BackendResource, offset: u64, data: &[u8]) -> GfxResult<()> {
        let ptr = self.backend.map_buffer(buffer)?;
        // SAFETY: the backend maps the whole buffer and callers checked
        // that `offset + data.len()` lies within it.
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                ptr.as_ptr().add(offset as usize),
                data.len(),
            );
        }
        self.backend.unmap_buffer(buffer);
        Ok(())
    }

    /// Writes `data` into a host-visible buffer at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::InvalidParameter`] if the buffer is GPU-only or
    /// the write exceeds its size.
    pub fn write_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]) -> GfxResult<()> {
        let (resource, info) = self.buffers.with(buffer, |b| (b.resource, b.info));

        if !check!(
            info.mem_usage.is_host_visible(),
            "writing GPU-only buffer {:?}",
            buffer
        ) {
            return Err(GfxError::InvalidParameter);
        }
        let end = offset.checked_add(data.len() as u64);
        if !check!(
            end.is_some_and(|end| end <= info.size),
            "write of {} bytes at offset {} exceeds buffer size {}",
            data.len(),
            offset,
            info.size
        ) {
            return Err(GfxError::InvalidParameter);
        }

        self.write_mapped(resource, offset, data)
    }

    /// Maps a host-visible buffer.
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::InvalidParameter`] if the buffer is GPU-only,
    /// otherwise the backend error.
    pub fn map_buffer(&self, buffer: BufferHandle) -> GfxResult<NonNull<u8>> {
        let (resource, mem_usage) = self.buffers.with(buffer, |b| (b.resource, b.info.mem_usage));
        if !check!(mem_usage.is_host_visible(), "mapping GPU-only buffer {:?}", buffer) {
            return Err(GfxError::InvalidParameter);
        }
        self.backend.map_buffer(resource)
    }

    pub fn unmap_buffer(&self, buffer: BufferHandle) {
        self.backend.unmap_buffer(self.buffers.resource(buffer));
    }

    /// Returns the creation description of a buffer.
    pub fn buffer_info(&self, buffer: BufferHandle) -> crate::buffer::BufferCreateInfo {
        self.buffers.with(buffer, |b| b.info)
    }

    /// Returns the backend object behind a buffer.
    pub fn buffer_resource(&self, buffer: BufferHandle) -> BackendResource {
        self.buffers.resource(buffer)
    }

    // ------------------------------------------------------------------
    // Textures
    // ------------------------------------------------------------------

    /// Creates a texture, optionally filled with initial data for mip 0,
    /// layer 0.
    ///
    /// `TRANSFER_SRC` and `TRANSFER_DST` are always added to the usage.
    /// Initial data is uploaded through a staging buffer and leaves the
    /// texture in [`TextureLayout::ShaderReadOnly`]; only color formats
    /// accept it.
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::InvalidParameter`] for an empty extent, no mip
    /// levels or layers, an undefined format or unusable initial data,
    /// otherwise the backend error. Nothing is left behind on failure.
    pub fn create_texture(&self, info: &TextureInfo<'_>) -> GfxResult<TextureHandle> {
        let mut create_info = info.info;
        if create_info.extent.texel_count() == 0
            || create_info.mip_levels == 0
            || create_info.array_layers == 0
            || create_info.format.texel_size() == 0
        {
            warn!(
                "Rejected texture '{}': {:?} {:?}, {} mips, {} layers",
                info.debug_name,
                create_info.format,
                create_info.extent,
                create_info.mip_levels,
                create_info.array_layers
            );
            return Err(GfxError::InvalidParameter);
        }

        if !info.initial_data.is_empty() {
            if !check!(
                create_info.format.is_color(),
                "initial data for {:?} texture '{}'",
                create_info.format,
                info.debug_name
            ) {
                return Err(GfxError::InvalidParameter);
            }
            let capacity = create_info.extent.texel_count() * create_info.format.texel_size();
            if !check!(
                info.initial_data.len() as u64 <= capacity,
                "{} bytes of initial data for a {} byte texture level",
                info.initial_data.len(),
                capacity
            ) {
                return Err(GfxError::InvalidParameter);
            }
        }
        create_info.usage |= TextureUsageFlags::TRANSFER_SRC | TextureUsageFlags::TRANSFER_DST;

        let resource = self.backend.create_texture(&create_info)?;
        if !info.initial_data.is_empty()
            && let Err(err) = self.upload_texture(resource, &create_info, info.initial_data)
        {
            self.backend.destroy_texture(resource);
            return Err(err);
        }

        let handle = self.textures.allocate(Texture {
            resource,
            info: create_info,
            from_swapchain: false,
            debug_name: info.debug_name.to_owned(),
        });
        debug!(
            "Created texture '{}' {:?}: {:?} {}x{}x{}",
            info.debug_name,
            handle,
            create_info.format,
            create_info.extent.width,
            create_info.extent.height,
            create_info.extent.depth
        );
        Ok(handle)
    }

    fn upload_texture(
        &self,
        texture: BackendResource,
        info: &TextureCreateInfo,
        data: &[u8],
    ) -> GfxResult<()> {
        let range = info.full_range();
        self.with_staging(data, |list, staging| {
            self.backend.cmd_pipeline_barrier(
                list,
                PipelineStageFlags::TOP_OF_PIPE,
                PipelineStageFlags::TRANSFER,
                &[TextureMemoryBarrier {
                    texture,
                    src_access: AccessFlags::empty(),
                    dst_access: AccessFlags::TRANSFER_WRITE,
                    old_layout: TextureLayout::Undefined,
                    new_layout: TextureLayout::TransferDst,
                    subresource_range: range,
                }],
            );
            self.backend.cmd_copy_buffer_to_texture(
                list,
                staging,
                texture,
                TextureLayout::TransferDst,
                &[BufferTextureCopyRegion {
                    buffer_offset: 0,
                    texture_subresource: TextureSubresourceLayers {
                        aspect: TextureAspectFlags::COLOR,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: 1,
                    },
                    texture_offset: Offset3D::default(),
                    texture_extent: info.extent,
                }],
            );
            self.backend.cmd_pipeline_barrier(
                list,
                PipelineStageFlags::TRANSFER,
                PipelineStageFlags::FRAGMENT_SHADER,
                &[TextureMemoryBarrier {
                    texture,
                    src_access: AccessFlags::TRANSFER_WRITE,
                    dst_access: AccessFlags::SHADER_READ,
                    old_layout: TextureLayout::TransferDst,
                    new_layout: TextureLayout::ShaderReadOnly,
                    subresource_range: range,
                }],
            );
        })
    }

    /// Returns the creation description of a texture.
    pub fn texture_info(&self, texture: TextureHandle) -> TextureCreateInfo {
        self.textures.with(texture, |t| t.info)
    }

    /// Returns the backend object behind a texture.
    pub fn texture_resource(&self, texture: TextureHandle) -> BackendResource {
        self.textures.resource(texture)
    }

    /// Creates a view on a texture.
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::InvalidParameter`] if the texture is not live or
    /// the range exceeds its mip levels or layers, otherwise the backend
    /// error.
    pub fn create_texture_view(&self, info: &TextureViewInfo<'_>) -> GfxResult<TextureViewHandle> {
        let Some((texture, texture_info)) = self
            .textures
            .try_with(info.texture, |t| (t.resource, t.info))
        else {
            check!(false, "view on invalid texture {:?}", info.texture);
            return Err(GfxError::InvalidParameter);
        };

        let range = info.info.subresource_range;
        if range.level_count == 0
            || range.layer_count == 0
            || range.base_mip_level + range.level_count > texture_info.mip_levels
            || range.base_array_layer + range.layer_count > texture_info.array_layers
        {
            warn!(
                "Rejected view '{}': {:?} outside of {} mips, {} layers",
                info.debug_name, range, texture_info.mip_levels, texture_info.array_layers
            );
            return Err(GfxError::InvalidParameter);
        }

        let resource = self.backend.create_texture_view(texture, &info.info)?;
        let handle = self.texture_views.allocate(TextureView {
            resource,
            info: info.info,
            texture: info.texture,
            from_swapchain: false,
            debug_name: info.debug_name.to_owned(),
        });
        debug!(
            "Created texture view '{}' {:?} on {:?}",
            info.debug_name, handle, info.texture
        );
        Ok(handle)
    }

    /// Returns the backend object behind a texture view.
    pub fn texture_view_resource(&self, view: TextureViewHandle) -> BackendResource {
        self.texture_views.resource(view)
    }

    // ------------------------------------------------------------------
    // Shaders, samplers, sync objects
    // ------------------------------------------------------------------

    /// Creates a shader module from compiled bytecode.
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::InvalidParameter`] if the bytecode is empty or
    /// not a whole number of 32-bit words, otherwise the backend error.
    pub fn create_shader(&self, info: &ShaderInfo<'_>) -> GfxResult<ShaderHandle> {
        let bytecode = info.info.bytecode;
        if bytecode.is_empty() || bytecode.len() % 4 != 0 {
            warn!(
                "Rejected {} shader '{}': {} bytes of bytecode",
                info.info.stage,
                info.debug_name,
                bytecode.len()
            );
            return Err(GfxError::InvalidParameter);
        }

        let resource = self.backend.create_shader(&info.info)?;
        let handle = self.shaders.allocate(Shader {
            resource,
            stage: info.info.stage,
            debug_name: info.debug_name.to_owned(),
        });
        debug!(
            "Created {} shader '{}' {:?}: {} bytes",
            info.info.stage,
            info.debug_name,
            handle,
            bytecode.len()
        );
        Ok(handle)
    }

    /// Creates a sampler.
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::InvalidParameter`] if `min_lod > max_lod` or the
    /// anisotropy is below 1, otherwise the backend error.
    pub fn create_sampler(&self, info: &SamplerInfo<'_>) -> GfxResult<SamplerHandle> {
        let sampler = &info.info;
        if sampler.min_lod > sampler.max_lod || sampler.max_anisotropy.is_some_and(|a| a < 1.0) {
            warn!("Rejected sampler '{}': {:?}", info.debug_name, sampler);
            return Err(GfxError::InvalidParameter);
        }

        let resource = self.backend.create_sampler(sampler)?;
        let handle = self.samplers.allocate(Sampler {
            resource,
            debug_name: info.debug_name.to_owned(),
        });
        debug!("Created sampler '{}' {:?}", info.debug_name, handle);
        Ok(handle)
    }

    pub fn create_fence(&self, info: &FenceInfo<'_>) -> GfxResult<FenceHandle> {
        let resource = self.backend.create_fence(info.signaled)?;
        let handle = self.fences.allocate(Fence {
            resource,
            debug_name: info.debug_name.to_owned(),
        });
        debug!("Created fence '{}' {:?}", info.debug_name, handle);
        Ok(handle)
    }

    pub fn create_semaphore(&self, info: &SemaphoreInfo<'_>) -> GfxResult<SemaphoreHandle> {
        let resource = self.backend.create_semaphore()?;
        let handle = self.semaphores.allocate(Semaphore {
            resource,
            debug_name: info.debug_name.to_owned(),
        });
        debug!("Created semaphore '{}' {:?}", info.debug_name, handle);
        Ok(handle)
    }

    /// Waits until one (or all, with `wait_all`) of `fences` is signaled.
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::Timeout`] if `timeout` nanoseconds elapse first.
    pub fn wait_for_fences(
        &self,
        fences: &[FenceHandle],
        wait_all: bool,
        timeout: u64,
    ) -> GfxResult<()> {
        let resources: Vec<_> = fences.iter().map(|&f| self.fences.resource(f)).collect();
        self.backend.wait_for_fences(&resources, wait_all, timeout)
    }

    pub fn reset_fences(&self, fences: &[FenceHandle]) -> GfxResult<()> {
        let resources: Vec<_> = fences.iter().map(|&f| self.fences.resource(f)).collect();
        self.backend.reset_fences(&resources)
    }

    /// Blocks until the GPU is idle.
    pub fn wait_idle(&self) -> GfxResult<()> {
        self.backend.wait_idle()
    }

    // ------------------------------------------------------------------
    // Swapchains
    // ------------------------------------------------------------------

    /// Creates a swapchain and registers a texture and a view per
    /// backbuffer.
    ///
    /// The backbuffer records belong to the swapchain: they are freed with
    /// it and must not be destroyed on their own.
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::InvalidParameter`] for an empty size or zero
    /// images, otherwise the backend error.
    pub fn create_swapchain(&self, info: &SwapchainInfo<'_>) -> GfxResult<SwapchainHandle> {
        let create_info = &info.info;
        if create_info.width == 0 || create_info.height == 0 || create_info.image_count == 0 {
            warn!(
                "Rejected swapchain '{}': {}x{}, {} images",
                info.debug_name, create_info.width, create_info.height, create_info.image_count
            );
            return Err(GfxError::InvalidParameter);
        }

        let resource = self.backend.create_swapchain(create_info)?;
        let backbuffers = self
            .backend
            .get_swapchain_backbuffers(resource)
            .and_then(|images| {
                let views = self.backend.get_swapchain_backbuffer_views(resource)?;
                Ok((images, views))
            });
        let (images, views) = match backbuffers {
            Ok((images, views)) if images.len() == views.len() => (images, views),
            Ok(_) => {
                self.backend.destroy_swapchain(resource);
                return Err(GfxError::InitializationFailed);
            }
            Err(err) => {
                self.backend.destroy_swapchain(resource);
                return Err(err);
            }
        };

        let format = self.backend.get_swapchain_format(resource);
        let extent = Extent3D::new_2d(create_info.width, create_info.height);
        let texture_info = TextureCreateInfo {
            texture_type: TextureType::Tex2D,
            mem_usage: MemoryUsage::GpuOnly,
            format,
            extent,
            mip_levels: 1,
            array_layers: 1,
            samples: SampleCount::X1,
            usage: TextureUsageFlags::COLOR_ATTACHMENT | TextureUsageFlags::TRANSFER_DST,
        };
        let view_info = TextureViewCreateInfo {
            view_type: TextureViewType::Tex2D,
            format,
            subresource_range: texture_info.full_range(),
        };

        let mut textures = Vec::with_capacity(images.len());
        let mut texture_views = Vec::with_capacity(views.len());
        for (image, view) in images.into_iter().zip(views) {
            let texture = self.textures.allocate(Texture {
                resource: image,
                info: texture_info,
                from_swapchain: true,
                debug_name: format!("{} backbuffer", info.debug_name),
            });
            textures.push(texture);
            texture_views.push(self.texture_views.allocate(TextureView {
                resource: view,
                info: view_info,
                texture,
                from_swapchain: true,
                debug_name: format!("{} backbuffer view", info.debug_name),
            }));
        }

        let image_count = textures.len();
        let handle = self.swapchains.allocate(Swapchain {
            resource,
            format,
            extent,
            textures,
            views: texture_views,
            current_image: 0,
            acquired: false,
            debug_name: info.debug_name.to_owned(),
        });
        info!(
            "Swapchain '{}' created: {}x{}, {:?}, {} images, {:?}",
            info.debug_name,
            create_info.width,
            create_info.height,
            format,
            image_count,
            create_info.present_mode
        );
        Ok(handle)
    }

    /// Acquires the next backbuffer of a swapchain.
    ///
    /// `semaphore` is signaled once the image can be rendered to; pass it
    /// as a wait semaphore of the first submission touching the image.
    /// Waits at most the configured fence timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::Timeout`] if no image became available; the
    /// caller should skip rendering to the swapchain this frame.
    pub fn acquire_swapchain_texture(
        &self,
        swapchain: SwapchainHandle,
        semaphore: SemaphoreHandle,
    ) -> GfxResult<u32> {
        let (resource, acquired) = self.swapchains.with(swapchain, |s| (s.resource, s.acquired));
        if !check!(
            !acquired,
            "swapchain {:?} acquired twice without present",
            swapchain
        ) {
            return Err(GfxError::InvalidParameter);
        }

        let semaphore = if semaphore.is_null() {
            BackendResource::NULL
        } else {
            self.semaphores.resource(semaphore)
        };
        match self
            .backend
            .acquire_swapchain_image(resource, semaphore, self.config.fence_timeout)
        {
            Ok(image) => {
                self.swapchains.with_mut(swapchain, |s| {
                    s.current_image = image;
                    s.acquired = true;
                });
                Ok(image)
            }
            Err(err) => {
                if err.is_timeout() {
                    warn!("Timed out acquiring an image of swapchain {:?}", swapchain);
                }
                Err(err)
            }
        }
    }

    /// Presents the acquired backbuffer once `wait_semaphores` are signaled.
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::InvalidParameter`] if no image is acquired,
    /// otherwise the backend error.
    pub fn present(
        &self,
        swapchain: SwapchainHandle,
        wait_semaphores: &[SemaphoreHandle],
    ) -> GfxResult<()> {
        let (resource, image, acquired) = self
            .swapchains
            .with(swapchain, |s| (s.resource, s.current_image, s.acquired));
        if !check!(
            acquired,
            "presenting swapchain {:?} without an acquired image",
            swapchain
        ) {
            return Err(GfxError::InvalidParameter);
        }

        let waits: Vec<_> = wait_semaphores
            .iter()
            .map(|&s| self.semaphores.resource(s))
            .collect();
        let result = self.backend.present(resource, image, &waits);
        self.swapchains.with_mut(swapchain, |s| s.acquired = false);
        result
    }

    /// View of the currently acquired backbuffer.
    pub fn get_swapchain_backbuffer_view(&self, swapchain: SwapchainHandle) -> TextureViewHandle {
        self.swapchains.with(swapchain, Swapchain::backbuffer_view)
    }

    pub fn get_swapchain_format(&self, swapchain: SwapchainHandle) -> crate::format::Format {
        self.swapchains.with(swapchain, Swapchain::format)
    }

    pub fn get_swapchain_extent(&self, swapchain: SwapchainHandle) -> Extent3D {
        self.swapchains.with(swapchain, Swapchain::extent)
    }

    // ------------------------------------------------------------------
    // Pipeline layouts and caches
    // ------------------------------------------------------------------

    /// Creates a pipeline layout with a descriptor set allocator per set.
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::InvalidParameter`] if the layout has more sets
    /// than [`MAX_DESCRIPTOR_SETS`] or a binding number of at least
    /// [`MAX_BINDINGS`], otherwise the backend error.
    pub fn create_pipeline_layout(
        &self,
        info: &PipelineLayoutInfo<'_>,
    ) -> GfxResult<PipelineLayoutHandle> {
        let layout_info = info.info;
        let bindings_valid = layout_info.set_layouts.iter().all(|set| {
            set.bindings.len() <= MAX_BINDINGS
                && set
                    .bindings
                    .iter()
                    .all(|binding| (binding.binding as usize) < MAX_BINDINGS)
        });
        if layout_info.set_layouts.len() > MAX_DESCRIPTOR_SETS || !bindings_valid {
            warn!(
                "Rejected pipeline layout '{}': {} sets, limits are {} sets of {} bindings",
                info.debug_name,
                layout_info.set_layouts.len(),
                MAX_DESCRIPTOR_SETS,
                MAX_BINDINGS
            );
            return Err(GfxError::InvalidParameter);
        }

        let objects = self.backend.create_pipeline_layout(layout_info)?;
        if objects.set_layouts.len() != layout_info.set_layouts.len() {
            self.backend.destroy_pipeline_layout(&objects);
            return Err(GfxError::InitializationFailed);
        }

        let allocators = objects
            .set_layouts
            .iter()
            .map(|&set_layout| {
                Arc::new(DescriptorSetAllocator::new(
                    set_layout,
                    self.config.descriptor_sets_per_pool,
                    self.config.descriptor_set_max_unused_frames,
                ))
            })
            .collect();
        let set_count = objects.set_layouts.len();
        let handle = self.pipeline_layouts.allocate(PipelineLayout {
            objects,
            allocators,
            debug_name: info.debug_name.to_owned(),
        });
        debug!(
            "Created pipeline layout '{}' {:?}: {} sets",
            info.debug_name, handle, set_count
        );
        Ok(handle)
    }

    /// Returns the render pass for `info`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns the backend error on a failed creation; nothing is cached.
    pub fn get_or_create_render_pass(
        &self,
        info: &RenderPassCreateInfo,
    ) -> GfxResult<BackendResource> {
        self.render_passes
            .get_or_create(info, |info| self.backend.create_render_pass(info))
    }

    /// Returns the pipeline for `info`, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns the backend error on a failed creation; nothing is cached.
    pub fn get_or_create_pipeline(&self, info: &GfxPipelineCreateInfo) -> GfxResult<BackendResource> {
        self.pipelines
            .get_or_create(info, |info| self.backend.create_gfx_pipeline(info))
    }

    // ------------------------------------------------------------------
    // Destruction
    // ------------------------------------------------------------------

    /// Queues `handle` on the current frame's expiry list.
    fn expire<T>(
        &self,
        pool: &SyncPool<T>,
        handle: Handle<T>,
        kind: &str,
        push: impl FnOnce(&mut ExpiredResources, Handle<T>),
    ) {
        if !check!(
            pool.contains(handle),
            "destroying invalid or freed {} {:?}",
            kind,
            handle
        ) {
            return;
        }
        push(&mut self.current_frame().state().expired, handle);
    }

    /// Destroys a buffer once the GPU is done with the current frame.
    pub fn destroy_buffer(&self, buffer: BufferHandle) {
        self.expire(&self.buffers, buffer, "buffer", |e, h| e.buffers.push(h));
    }

    /// Destroys a texture once the GPU is done with the current frame.
    ///
    /// Every view on it must be destroyed no later than the texture.
    /// Swapchain backbuffers are destroyed with their swapchain only.
    pub fn destroy_texture(&self, texture: TextureHandle) {
        let from_swapchain = self.textures.try_with(texture, |t| t.from_swapchain);
        if !check!(
            from_swapchain != Some(true),
            "destroying swapchain backbuffer {:?}",
            texture
        ) {
            return;
        }
        self.expire(&self.textures, texture, "texture", |e, h| e.textures.push(h));
    }

    pub fn destroy_texture_view(&self, view: TextureViewHandle) {
        let from_swapchain = self.texture_views.try_with(view, |v| v.from_swapchain);
        if !check!(
            from_swapchain != Some(true),
            "destroying swapchain backbuffer view {:?}",
            view
        ) {
            return;
        }
        self.expire(&self.texture_views, view, "texture view", |e, h| {
            e.texture_views.push(h)
        });
    }

    pub fn destroy_shader(&self, shader: ShaderHandle) {
        self.expire(&self.shaders, shader, "shader", |e, h| e.shaders.push(h));
    }

    pub fn destroy_sampler(&self, sampler: SamplerHandle) {
        self.expire(&self.samplers, sampler, "sampler", |e, h| e.samplers.push(h));
    }

    /// Destroys a swapchain together with its backbuffer records.
    pub fn destroy_swapchain(&self, swapchain: SwapchainHandle) {
        self.expire(&self.swapchains, swapchain, "swapchain", |e, h| {
            e.swapchains.push(h)
        });
    }

    /// Destroys a pipeline layout and its descriptor set allocators.
    pub fn destroy_pipeline_layout(&self, layout: PipelineLayoutHandle) {
        self.expire(&self.pipeline_layouts, layout, "pipeline layout", |e, h| {
            e.pipeline_layouts.push(h)
        });
    }

    pub fn destroy_fence(&self, fence: FenceHandle) {
        self.expire(&self.fences, fence, "fence", |e, h| e.fences.push(h));
    }

    pub fn destroy_semaphore(&self, semaphore: SemaphoreHandle) {
        self.expire(&self.semaphores, semaphore, "semaphore", |e, h| {
            e.semaphores.push(h)
        });
    }

    /// Frees expired records and destroys their backend objects.
    ///
    /// Views go before textures and textures before swapchains, so no
    /// backend object outlives what it was created from.
    fn free_expired(&self, expired: ExpiredResources) {
        let count = expired.len();
        if count == 0 {
            return;
        }
        let backend = self.backend.as_ref();

        for view in expired.texture_views {
            backend.destroy_texture_view(self.texture_views.free(view).resource);
        }
        for texture in expired.textures {
            backend.destroy_texture(self.textures.free(texture).resource);
        }
        for swapchain in expired.swapchains {
            let swapchain = self.swapchains.free(swapchain);
            for view in swapchain.views {
                self.texture_views.free(view);
            }
            for texture in swapchain.textures {
                self.textures.free(texture);
            }
            backend.destroy_swapchain(swapchain.resource);
            info!("Swapchain '{}' destroyed", swapchain.debug_name);
        }
        for buffer in expired.buffers {
            backend.destroy_buffer(self.buffers.free(buffer).resource);
        }
        for shader in expired.shaders {
            backend.destroy_shader(self.shaders.free(shader).resource);
        }
        for sampler in expired.samplers {
            backend.destroy_sampler(self.samplers.free(sampler).resource);
        }
        for layout in expired.pipeline_layouts {
            let layout = self.pipeline_layouts.free(layout);
            for allocator in &layout.allocators {
                allocator.destroy(backend);
            }
            backend.destroy_pipeline_layout(&layout.objects);
        }
        for fence in expired.fences {
            backend.destroy_fence(self.fences.free(fence).resource);
        }
        for semaphore in expired.semaphores {
            backend.destroy_semaphore(self.semaphores.free(semaphore).resource);
        }

        debug!("Freed {} expired resources", count);
    }

    // ------------------------------------------------------------------
    // Frame lifecycle and submission
    // ------------------------------------------------------------------

    /// Advances to the next frame ring slot.
    ///
    /// Ends the current frame first if it has queued lists that were never
    /// submitted. Then waits for the next slot's fences, frees everything
    /// destroyed during that slot's previous frame, resets its command
    /// pools and ages every descriptor set cache.
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::Timeout`] if the slot's fences are not signaled
    /// within the configured timeout, or the first command pool reset
    /// error. Both pools are reset either way. The device stays on the
    /// current frame and the call can be retried.
    pub fn new_frame(&self) -> GfxResult<()> {
        let current = self.current_frame();
        let needs_end = {
            let state = current.state();
            !state.ended && !(state.gfx.is_empty() && state.compute.is_empty())
        };
        if needs_end {
            debug!("Frame {} was not ended, submitting its lists", current.index);
            self.end_frame()?;
        }

        let next_index = (current.index as usize + 1) % self.frames.len();
        let next = &self.frames[next_index];
        let fences = next.wait_fences();
        if !fences.is_empty() {
            if let Err(err) = self
                .backend
                .wait_for_fences(&fences, true, self.config.fence_timeout)
            {
                if err.is_timeout() {
                    warn!(
                        "Timed out waiting for frame slot {} after {} ns",
                        next_index, self.config.fence_timeout
                    );
                } else {
                    error!("Waiting for frame slot {} failed: {}", next_index, err);
                }
                return Err(err);
            }
        }

        let state = std::mem::take(&mut *next.state());
        self.free_expired(state.expired);
        let gfx_reset = next.gfx_pool.reset(self.backend());
        let compute_reset = next.compute_pool.reset(self.backend());
        if let Err(err) = gfx_reset.and(compute_reset) {
            error!("Resetting command pools of frame slot {} failed: {}", next_index, err);
            return Err(err);
        }

        self.pipeline_layouts.for_each_mut(|_, layout| {
            for allocator in &layout.allocators {
                allocator.new_frame();
            }
        });

        self.current_frame.store(next_index, Ordering::Release);
        self.frame_number.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Submits every list queued during the current frame.
    ///
    /// Compute lists go first, signaling the frame's compute fence; the
    /// gfx submission follows and signals the gfx fence, even when it is
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns the backend error of a failed fence reset or submission.
    /// The frame still counts as ended and the lists that were not
    /// accepted are dropped. A rejected submission's fence is not waited
    /// on when the ring comes back to this slot.
    pub fn end_frame(&self) -> GfxResult<()> {
        let frame = self.current_frame();
        let mut state = frame.state();
        if !check!(!state.ended, "frame {} ended twice", frame.index) {
            return Ok(());
        }
        state.ended = true;
        let compute = std::mem::take(&mut state.compute);
        let gfx = std::mem::take(&mut state.gfx);

        if !compute.is_empty() {
            self.backend.reset_fences(&[frame.compute_fence])?;
            self.queue_submit(QueueType::Compute, &compute, frame.compute_fence)?;
            state.compute_submitted = true;
        }

        self.backend.reset_fences(&[frame.gfx_fence])?;
        self.queue_submit(QueueType::Gfx, &gfx, frame.gfx_fence)?;
        state.gfx_submitted = true;
        Ok(())
    }

    fn queue_submit(
        &self,
        queue: QueueType,
        submission: &QueueSubmission,
        fence: BackendResource,
    ) -> GfxResult<()> {
        debug!(
            "Submitting {} {:?} lists ({} waits, {} signals)",
            submission.lists.len(),
            queue,
            submission.wait_semaphores.len(),
            submission.signal_semaphores.len()
        );
        self.backend.queue_submit(
            queue,
            &SubmitInfo {
                command_lists: &submission.lists,
                wait_semaphores: &submission.wait_semaphores,
                wait_stages: &submission.wait_stages,
                signal_semaphores: &submission.signal_semaphores,
                fence,
            },
        )
    }

    /// Allocates a command list for `queue` and begins recording.
    ///
    /// The list belongs to the current frame and to the calling thread's
    /// command pool. It must be submitted during the current frame.
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::InvalidParameter`] for a queue type without
    /// command pools, otherwise the backend error.
    pub fn allocate_cmd_list(&self, queue: QueueType) -> GfxResult<CommandListHandle> {
        let frame = self.current_frame();
        let Some(pool) = frame.command_pool(queue) else {
            check!(false, "no command pool for the {:?} queue", queue);
            return Err(GfxError::InvalidParameter);
        };

        let (thread_pool, list, resource) = pool.allocate(self.backend())?;
        self.backend.begin_command_list(resource)?;
        Ok(CommandListHandle {
            frame: frame.index,
            queue,
            thread_pool,
            list,
        })
    }

    /// Runs `f` on the record of a command list.
    ///
    /// # Panics
    ///
    /// Panics if the list's frame slot was recycled since it was allocated.
    pub(crate) fn with_cmd<R>(
        &self,
        cmd: CommandListHandle,
        f: impl FnOnce(&mut CommandList) -> R,
    ) -> R {
        let pool = self
            .frame(cmd.frame)
            .command_pool(cmd.queue)
            .unwrap_or_else(|| panic!("command list {cmd:?} has no command pool"));
        pool.with_list(cmd.thread_pool, cmd.list, f)
    }

    pub(crate) fn cmd_resource(&self, cmd: CommandListHandle) -> BackendResource {
        self.with_cmd(cmd, |list| list.resource)
    }

    /// Ends a command list and queues it on the current frame.
    ///
    /// The lists of a frame are submitted in the order they were queued,
    /// by [`Device::end_frame`]. Every wait semaphore blocks all commands
    /// of the submission.
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::InvalidParameter`] if the list does not belong
    /// to the current frame, was already submitted, or the frame already
    /// ended; otherwise the backend error of ending the list.
    pub fn submit(
        &self,
        cmd: CommandListHandle,
        wait_semaphores: &[SemaphoreHandle],
        signal_semaphores: &[SemaphoreHandle],
    ) -> GfxResult<()> {
        let frame = self.current_frame();
        if !check!(
            cmd.frame == frame.index,
            "submitting a list of frame slot {} during slot {}",
            cmd.frame,
            frame.index
        ) {
            return Err(GfxError::InvalidParameter);
        }

        let (resource, first_submit, in_pass) = self.with_cmd(cmd, |list| {
            let first_submit = !list.submitted;
            list.submitted = true;
            (list.resource, first_submit, !list.state.render_pass.is_null())
        });
        if !check!(first_submit, "command list {:?} submitted twice", cmd) {
            return Err(GfxError::InvalidParameter);
        }
        if in_pass {
            warn!("Submitting {:?} inside a render pass, ending it", cmd);
            self.cmd_end_render_pass(cmd);
        }
        self.backend.end_command_list(resource)?;

        let waits: Vec<_> = wait_semaphores
            .iter()
            .map(|&s| self.semaphores.resource(s))
            .collect();
        let signals: Vec<_> = signal_semaphores
            .iter()
            .map(|&s| self.semaphores.resource(s))
            .collect();

        let mut state = frame.state();
        if !check!(
            !state.ended,
            "submitting to frame {} after it ended",
            frame.index
        ) {
            return Err(GfxError::InvalidParameter);
        }
        let queue = match cmd.queue {
            QueueType::Compute => &mut state.compute,
            _ => &mut state.gfx,
        };
        queue.lists.push(resource);
        queue
            .wait_stages
            .extend(std::iter::repeat_n(PipelineStageFlags::ALL_COMMANDS, waits.len()));
        queue.wait_semaphores.extend(waits);
        queue.signal_semaphores.extend(signals);
        Ok(())
    }

    /// Live record counts.
    pub fn stats(&self) -> DeviceStats {
        DeviceStats {
            buffers: self.buffers.len(),
            textures: self.textures.len(),
            texture_views: self.texture_views.len(),
            shaders: self.shaders.len(),
            samplers: self.samplers.len(),
            swapchains: self.swapchains.len(),
            pipeline_layouts: self.pipeline_layouts.len(),
            fences: self.fences.len(),
            semaphores: self.semaphores.len(),
            render_passes: self.render_passes.len(),
            pipelines: self.pipelines.len(),
            pending_destroys: self
                .frames
                .iter()
                .map(|frame| frame.state().expired.len())
                .sum(),
        }
    }

    /// Destroys every record still alive at teardown, logging each kind.
    fn release_leaks(&self) {
        let backend = self.backend.as_ref();
        let report = |kind: &str, count: usize| {
            if count > 0 {
                error!("{} {}(s) leaked at device teardown", count, kind);
            }
        };

        let views = self.texture_views.clear();
        report(
            "texture view",
            views.iter().filter(|v| !v.from_swapchain).count(),
        );
        for view in views.into_iter().filter(|v| !v.from_swapchain) {
            backend.destroy_texture_view(view.resource);
        }

        let textures = self.textures.clear();
        report(
            "texture",
            textures.iter().filter(|t| !t.from_swapchain).count(),
        );
        for texture in textures.into_iter().filter(|t| !t.from_swapchain) {
            backend.destroy_texture(texture.resource);
        }

        let swapchains = self.swapchains.clear();
        report("swapchain", swapchains.len());
        for swapchain in swapchains {
            backend.destroy_swapchain(swapchain.resource);
        }

        let buffers = self.buffers.clear();
        report("buffer", buffers.len());
        for buffer in buffers {
            backend.destroy_buffer(buffer.resource);
        }

        let shaders = self.shaders.clear();
        report("shader", shaders.len());
        for shader in shaders {
            backend.destroy_shader(shader.resource);
        }

        let samplers = self.samplers.clear();
        report("sampler", samplers.len());
        for sampler in samplers {
            backend.destroy_sampler(sampler.resource);
        }

        let layouts = self.pipeline_layouts.clear();
        report("pipeline layout", layouts.len());
        for layout in layouts {
            for allocator in &layout.allocators {
                allocator.destroy(backend);
            }
            backend.destroy_pipeline_layout(&layout.objects);
        }

        let fences = self.fences.clear();
        report("fence", fences.len());
        for fence in fences {
            backend.destroy_fence(fence.resource);
        }

        let semaphores = self.semaphores.clear();
        report("semaphore", semaphores.len());
        for semaphore in semaphores {
            backend.destroy_semaphore(semaphore.resource);
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        let fences: Vec<_> = self.frames.iter().flat_map(Frame::wait_fences).collect();
        if !fences.is_empty() {
            if let Err(err) = self
                .backend
                .wait_for_fences(&fences, true, self.config.fence_timeout)
            {
                error!("Failed to wait for in-flight frames during drop: {:?}", err);
            }
        }

        for frame in &self.frames {
            let state = std::mem::take(&mut *frame.state());
            self.free_expired(state.expired);
        }
        for frame in &self.frames {
            frame.destroy(self.backend.as_ref());
        }

        for pipeline in self.pipelines.drain() {
            self.backend.destroy_pipeline(pipeline);
        }
        for render_pass in self.render_passes.drain() {
            self.backend.destroy_render_pass(render_pass);
        }

        self.release_leaks();
        info!(
            "Device destroyed after {} frames",
            self.frame_number.load(Ordering::Acquire)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::null::{NullBackend, NullOp};

    fn device() -> (Arc<NullBackend>, Device) {
        let backend = Arc::new(NullBackend::new());
        let device = Device::new(backend.clone()).unwrap();
        (backend, device)
    }

    #[test]
    fn test_create_buffer_adds_transfer_usage() {
        let (_, device) = device();
        let buffer = device
            .create_buffer(&BufferInfo::new(
                64,
                MemoryUsage::GpuOnly,
                BufferUsageFlags::VERTEX_BUFFER,
            ))
            .unwrap();
        let usage = device.buffer_info(buffer).usage;
        assert!(usage.contains(
            BufferUsageFlags::VERTEX_BUFFER
                | BufferUsageFlags::TRANSFER_SRC
                | BufferUsageFlags::TRANSFER_DST
        ));
        device.destroy_buffer(buffer);
    }

    #[test]
    fn test_zero_sized_buffer_rejected() {
        let (backend, device) = device();
        let result = device.create_buffer(&BufferInfo::new(
            0,
            MemoryUsage::CpuOnly,
            BufferUsageFlags::UNIFORM_BUFFER,
        ));
        assert_eq!(result, Err(GfxError::InvalidParameter));
        assert_eq!(backend.count(NullOp::CreateBuffer), 0);
    }

    #[test]
    fn test_invalid_shader_bytecode_rejected() {
        let (backend, device) = device();
        let stage = crate::shader::ShaderStage::Vertex;
        assert_eq!(
            device.create_shader(&ShaderInfo::new(stage, &[])),
            Err(GfxError::InvalidParameter)
        );
        assert_eq!(
            device.create_shader(&ShaderInfo::new(stage, &[1, 2, 3])),
            Err(GfxError::InvalidParameter)
        );
        assert_eq!(backend.count(NullOp::CreateShader), 0);
    }

    #[test]
    fn test_zero_frames_in_flight_rejected() {
        let backend = Arc::new(NullBackend::new());
        let config = DeviceConfig::default().with_frames_in_flight(0);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            Device::with_config(backend, config).err()
        }));
        // Debug builds halt on the failed check; release builds return an error.
        if let Ok(err) = result {
            assert_eq!(err, Some(GfxError::InvalidParameter));
        }
    }

    #[test]
    fn test_frame_index_wraps_around() {
        let backend = Arc::new(NullBackend::new());
        let device =
            Device::with_config(backend, DeviceConfig::default().with_frames_in_flight(3)).unwrap();
        let indices: Vec<_> = (0..4)
            .map(|_| {
                device.new_frame().unwrap();
                device.frame_index()
            })
            .collect();
        assert_eq!(indices, vec![1, 2, 0, 1]);
        assert_eq!(device.frame_number(), 4);
    }

    #[test]
    fn test_drop_releases_everything() {
        let backend = Arc::new(NullBackend::new());
        {
            let device = Device::new(backend.clone()).unwrap();
            device
                .create_buffer(&BufferInfo::new(
                    16,
                    MemoryUsage::CpuOnly,
                    BufferUsageFlags::UNIFORM_BUFFER,
                ))
                .unwrap();
            device.create_fence(&FenceInfo::default()).unwrap();
            device.allocate_cmd_list(QueueType::Gfx).unwrap();
        }
        assert_eq!(backend.live_count(), 0);
    }

    #[test]
    fn test_short_descriptor_set_lifetime_is_accepted() {
        let config = DeviceConfig::default()
            .with_frames_in_flight(3)
            .with_descriptor_set_max_unused_frames(1);
        let device = Device::with_config(Arc::new(NullBackend::new()), config).unwrap();
        assert_eq!(device.config().descriptor_set_max_unused_frames, 1);
        device.new_frame().unwrap();
    }
}
