//! Command recording on [`Device`].
//!
//! State-setting calls only update the command list's pending state and
//! raise dirty flags. The backend sees that state at the next draw, which
//! resolves the pipeline through the pipeline cache and every dirty
//! descriptor set through the layout's set allocators, binding only what
//! changed.

use tracing::warn;

use cobalt_core::check;

use crate::backend::BackendResource;
use crate::buffer::{BufferCopyRegion, BufferHandle, IndexType};
use crate::command::{CommandListHandle, PendingState};
use crate::descriptor::{Descriptor, DescriptorType, MAX_BINDINGS, MAX_DESCRIPTOR_SETS};
use crate::device::Device;
use crate::error::{GfxError, GfxResult};
use crate::pipeline::{
    BackendShaderStage, GfxPipelineCreateInfo, PipelineBindPoint, PipelineLayoutHandle,
    PipelineMaterialState, PipelineRenderPassState,
};
use crate::render_pass::{
    AttachmentDescription, AttachmentLoadOp, AttachmentReference, AttachmentStoreOp,
    DepthStencilMode, Framebuffer, MAX_ATTACHMENTS, Rect2D, RenderPassCreateInfo, RenderPassInfo,
    SubpassDescription, Viewport,
};
use crate::sampler::SamplerHandle;
use crate::texture::{
    BufferTextureCopyRegion, TextureBarrier, TextureHandle, TextureLayout, TextureMemoryBarrier,
    TextureViewHandle,
};

/// One attachment view resolved to what the render pass needs from it.
struct ResolvedAttachment {
    view: BackendResource,
    description: AttachmentDescription,
    width: u32,
    height: u32,
}

impl Device {
    fn resolve_attachment(
        &self,
        view: TextureViewHandle,
        load_op: AttachmentLoadOp,
        store_op: AttachmentStoreOp,
        depth: bool,
    ) -> Option<ResolvedAttachment> {
        let (resource, format, texture, from_swapchain) = self
            .texture_views
            .try_with(view, |v| (v.resource, v.info.format, v.texture, v.from_swapchain))?;
        let texture_info = self.textures.try_with(texture, |t| t.info)?;

        let (initial_layout, final_layout) = if depth {
            (TextureLayout::Undefined, TextureLayout::DepthStencilAttachment)
        } else {
            let initial = if load_op == AttachmentLoadOp::Load {
                TextureLayout::ColorAttachment
            } else {
                TextureLayout::Undefined
            };
            let last = if from_swapchain {
                TextureLayout::Present
            } else {
                TextureLayout::ColorAttachment
            };
            (initial, last)
        };

        Some(ResolvedAttachment {
            view: resource,
            description: AttachmentDescription {
                format,
                samples: texture_info.samples,
                load_op,
                store_op,
                stencil_load_op: AttachmentLoadOp::DontCare,
                stencil_store_op: AttachmentStoreOp::DontCare,
                initial_layout,
                final_layout,
            },
            width: texture_info.extent.width,
            height: texture_info.extent.height,
        })
    }

    /// Derives the render pass cache key and the framebuffer of `info`.
    ///
    /// Color attachments come first, in order, then the depth/stencil
    /// attachment. Returns `None` if a view is not live.
    pub(crate) fn derive_render_pass(
        &self,
        info: &RenderPassInfo,
    ) -> Option<(RenderPassCreateInfo, Framebuffer)> {
        let mut attachments = Vec::with_capacity(info.color_attachments.len() + 1);
        for (i, &view) in info.color_attachments.iter().enumerate() {
            let bit = 1 << i;
            let load_op = if info.clear_attachment_flags & bit != 0 {
                AttachmentLoadOp::Clear
            } else if info.load_attachment_flags & bit != 0 {
                AttachmentLoadOp::Load
            } else {
                AttachmentLoadOp::DontCare
            };
            let store_op = if info.store_attachment_flags & bit != 0 {
                AttachmentStoreOp::Store
            } else {
                AttachmentStoreOp::DontCare
            };
            attachments.push(self.resolve_attachment(view, load_op, store_op, false)?);
        }

        let has_depth = !info.depth_stencil_attachment.is_null();
        if has_depth {
            attachments.push(self.resolve_attachment(
                info.depth_stencil_attachment,
                AttachmentLoadOp::Clear,
                AttachmentStoreOp::Store,
                true,
            )?);
        }

        let first = attachments.first()?;
        let (width, height) = (first.width, first.height);
        let depth_index = attachments.len() as u32 - 1;
        let subpasses = info
            .effective_subpasses()
            .into_iter()
            .map(|subpass| {
                let refs = |indices: &[u32], layout: TextureLayout| -> Vec<AttachmentReference> {
                    indices
                        .iter()
                        .map(|&attachment| AttachmentReference { attachment, layout })
                        .collect()
                };
                let depth_layout = match subpass.depth_stencil_mode {
                    DepthStencilMode::ReadWrite => TextureLayout::DepthStencilAttachment,
                    DepthStencilMode::ReadOnly => TextureLayout::DepthReadOnly,
                };
                SubpassDescription {
                    input_attachments: refs(&subpass.input_attachments, TextureLayout::ShaderReadOnly),
                    color_attachments: refs(&subpass.color_attachments, TextureLayout::ColorAttachment),
                    resolve_attachments: refs(
                        &subpass.resolve_attachments,
                        TextureLayout::ColorAttachment,
                    ),
                    depth_stencil_attachment: has_depth.then_some(AttachmentReference {
                        attachment: depth_index,
                        layout: depth_layout,
                    }),
                    preserve_attachments: Vec::new(),
                }
            })
            .collect();

        let framebuffer = Framebuffer {
            attachments: attachments.iter().map(|a| a.view).collect(),
            width,
            height,
            layers: 1,
        };
        let create_info = RenderPassCreateInfo {
            attachments: attachments.into_iter().map(|a| a.description).collect(),
            subpasses,
        };
        Some((create_info, framebuffer))
    }

    /// Begins a render pass on a command list.
    ///
    /// The backend render pass is derived from the attachments and fetched
    /// through the render pass cache. Viewport and scissor are set to the
    /// render area; an empty render area covers the whole framebuffer.
    ///
    /// # Errors
    ///
    /// Returns [`GfxError::InvalidParameter`] if a pass is already active,
    /// there are no or too many attachments, or an attachment is not live.
    /// Otherwise returns the backend error of a failed render pass
    /// creation.
    pub fn cmd_begin_render_pass(
        &self,
        cmd: CommandListHandle,
        info: &RenderPassInfo,
    ) -> GfxResult<()> {
        let attachment_count = info.color_attachments.len()
            + usize::from(!info.depth_stencil_attachment.is_null());
        if !check!(
            attachment_count > 0 && info.color_attachments.len() <= MAX_ATTACHMENTS,
            "render pass with {} color attachments",
            info.color_attachments.len()
        ) {
            return Err(GfxError::InvalidParameter);
        }
        let Some((create_info, framebuffer)) = self.derive_render_pass(info) else {
            check!(false, "render pass attachment is not a live texture view");
            return Err(GfxError::InvalidParameter);
        };
        let render_pass = self.get_or_create_render_pass(&create_info)?;

        let mut render_area = info.render_area;
        if render_area.width == 0 || render_area.height == 0 {
            render_area = Rect2D::from_size(framebuffer.width, framebuffer.height);
        }

        self.with_cmd(cmd, |list| {
            if !check!(
                list.state.render_pass.is_null(),
                "render pass begun inside another one"
            ) {
                return Err(GfxError::InvalidParameter);
            }

            let backend = self.backend();
            backend.cmd_begin_render_pass(
                list.resource,
                render_pass,
                &framebuffer,
                render_area,
                &info.clear_values,
            );
            backend.cmd_set_viewports(
                list.resource,
                0,
                &[Viewport {
                    x: render_area.x as f32,
                    y: render_area.y as f32,
                    width: render_area.width as f32,
                    height: render_area.height as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                }],
            );
            backend.cmd_set_scissors(list.resource, 0, &[render_area]);

            list.state.render_pass = render_pass;
            list.state.subpass = 0;
            list.state.pipeline_dirty = true;
            Ok(())
        })
    }

    /// Ends the active render pass.
    pub fn cmd_end_render_pass(&self, cmd: CommandListHandle) {
        self.with_cmd(cmd, |list| {
            if !check!(
                !list.state.render_pass.is_null(),
                "ending a render pass that was never begun"
            ) {
                return;
            }
            self.backend().cmd_end_render_pass(list.resource);
            list.state.render_pass = BackendResource::NULL;
            list.state.pipeline_dirty = true;
        });
    }

    pub fn cmd_set_viewport(&self, cmd: CommandListHandle, viewport: Viewport) {
        self.with_cmd(cmd, |list| {
            self.backend()
                .cmd_set_viewports(list.resource, 0, &[viewport])
        });
    }

    pub fn cmd_set_scissor(&self, cmd: CommandListHandle, scissor: Rect2D) {
        self.with_cmd(cmd, |list| {
            self.backend().cmd_set_scissors(list.resource, 0, &[scissor])
        });
    }

    // ------------------------------------------------------------------
    // Pipeline state
    // ------------------------------------------------------------------

    /// Sets the render-pass-dependent half of the pipeline state.
    pub fn cmd_set_render_pass_state(&self, cmd: CommandListHandle, state: &PipelineRenderPassState) {
        self.with_cmd(cmd, |list| {
            if list.state.render_pass_state != *state {
                list.state.render_pass_state = *state;
                list.state.pipeline_dirty = true;
            }
        });
    }

    /// Sets the material half of the pipeline state.
    pub fn cmd_set_material_state(&self, cmd: CommandListHandle, state: &PipelineMaterialState) {
        self.with_cmd(cmd, |list| {
            if list.state.material_state != *state {
                list.state.material_state = state.clone();
                list.state.pipeline_dirty = true;
            }
        });
    }

    /// Binds a pipeline layout. Every set holding bindings is re-resolved
    /// at the next draw.
    pub fn cmd_bind_pipeline_layout(&self, cmd: CommandListHandle, layout: PipelineLayoutHandle) {
        self.with_cmd(cmd, |list| {
            if list.state.pipeline_layout == layout {
                return;
            }
            list.state.pipeline_layout = layout;
            list.state.pipeline_dirty = true;
            list.state.mark_bound_sets_dirty();
        });
    }

    fn bind_descriptor(
        &self,
        cmd: CommandListHandle,
        set: u32,
        binding: u32,
        descriptor: Descriptor,
    ) {
        if !check!(
            (set as usize) < MAX_DESCRIPTOR_SETS && (binding as usize) < MAX_BINDINGS,
            "descriptor binding {}.{} out of range",
            set,
            binding
        ) {
            return;
        }
        self.with_cmd(cmd, |list| {
            list.state
                .set_descriptor(set as usize, binding as usize, descriptor)
        });
    }

    /// Binds a whole buffer as uniform buffer at `set`, `binding`.
    pub fn cmd_bind_ubo(&self, cmd: CommandListHandle, set: u32, binding: u32, buffer: BufferHandle) {
        let Some((resource, size)) = self.buffers.try_with(buffer, |b| (b.resource, b.info.size))
        else {
            check!(false, "binding invalid buffer {:?}", buffer);
            return;
        };
        self.bind_descriptor(
            cmd,
            set,
            binding,
            Descriptor::buffer(DescriptorType::UniformBuffer, binding, resource, 0, size),
        );
    }

    /// Binds a texture view, sampled in shader-read-only layout.
    pub fn cmd_bind_texture_view(
        &self,
        cmd: CommandListHandle,
        set: u32,
        binding: u32,
        view: TextureViewHandle,
    ) {
        let Some(resource) = self.texture_views.try_with(view, |v| v.resource) else {
            check!(false, "binding invalid texture view {:?}", view);
            return;
        };
        self.bind_descriptor(cmd, set, binding, Descriptor::texture_view(binding, resource));
    }

    pub fn cmd_bind_sampler(
        &self,
        cmd: CommandListHandle,
        set: u32,
        binding: u32,
        sampler: SamplerHandle,
    ) {
        let Some(resource) = self.samplers.try_with(sampler, |s| s.resource) else {
            check!(false, "binding invalid sampler {:?}", sampler);
            return;
        };
        self.bind_descriptor(cmd, set, binding, Descriptor::sampler(binding, resource));
    }

    // ------------------------------------------------------------------
    // Draws
    // ------------------------------------------------------------------

    fn pipeline_key(
        &self,
        state: &PendingState,
        layout: BackendResource,
    ) -> Option<GfxPipelineCreateInfo> {
        let material = &state.material_state;
        let shader_stages = material
            .stages
            .iter()
            .map(|stage| {
                let shader = self.shaders.try_with(stage.shader, |s| s.resource)?;
                Some(BackendShaderStage {
                    stage: stage.stage,
                    shader,
                    entry_point: stage.entry_point.clone(),
                })
            })
            .collect::<Option<Vec<_>>>()?;

        Some(GfxPipelineCreateInfo {
            shader_stages,
            vertex_input: material.vertex_input.clone(),
            input_assembly: material.input_assembly,
            rasterization: material.rasterizer,
            multisampling: state.render_pass_state.multisampling,
            depth_stencil: state.render_pass_state.depth_stencil,
            color_blend: state.render_pass_state.color_blend,
            layout,
            render_pass: state.render_pass,
            subpass: state.subpass,
        })
    }

    /// Resolves pending state before a draw.
    ///
    /// Binds the pipeline if any of its state changed, then allocates and
    /// binds every dirty descriptor set. Returns `Ok(false)` when the draw
    /// must be skipped because the state is incomplete.
    fn prepare_draw(&self, cmd: CommandListHandle) -> GfxResult<bool> {
        self.with_cmd(cmd, |list| {
            let resource = list.resource;
            let state = &mut list.state;

            if !check!(!state.render_pass.is_null(), "draw outside of a render pass") {
                return Ok(false);
            }
            let stages = &state.material_state.stages;
            if !check!(
                !stages.is_empty() && stages.iter().all(|s| s.stage.is_graphics()),
                "draw with shader stages {:?}",
                stages.iter().map(|s| s.stage).collect::<Vec<_>>()
            ) {
                return Ok(false);
            }
            let Some((layout, allocators)) = self
                .pipeline_layouts
                .try_with(state.pipeline_layout, |l| (l.objects.layout, l.allocators.clone()))
            else {
                check!(false, "draw without a valid pipeline layout");
                return Ok(false);
            };

            let backend = self.backend();
            if state.pipeline_dirty {
                let Some(key) = self.pipeline_key(state, layout) else {
                    check!(false, "draw with an invalid shader");
                    return Ok(false);
                };
                let pipeline = self.get_or_create_pipeline(&key)?;
                backend.cmd_bind_pipeline(resource, PipelineBindPoint::Gfx, pipeline);
                state.pipeline_dirty = false;
            }

            for (set, allocator) in allocators.iter().enumerate() {
                if state.dirty_sets & (1 << set) == 0 {
                    continue;
                }
                let descriptor_set = allocator.allocate(backend, &state.descriptors[set])?;
                backend.cmd_bind_descriptor_sets(
                    resource,
                    PipelineBindPoint::Gfx,
                    layout,
                    set as u32,
                    &[descriptor_set],
                );
                state.dirty_sets &= !(1 << set);
            }
            if state.dirty_sets != 0 {
                warn!(
                    "Descriptor sets {:#b} bound outside of the pipeline layout",
                    state.dirty_sets
                );
                state.dirty_sets = 0;
            }
            Ok(true)
        })
    }

    /// Draws non-indexed primitives with the pending state.
    ///
    /// # Errors
    ///
    /// Returns the backend error of a failed pipeline creation or
    /// descriptor set allocation. A draw with incomplete state is skipped.
    pub fn cmd_draw(
        &self,
        cmd: CommandListHandle,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> GfxResult<()> {
        if self.prepare_draw(cmd)? {
            let list = self.cmd_resource(cmd);
            self.backend()
                .cmd_draw(list, vertex_count, instance_count, first_vertex, first_instance);
        }
        Ok(())
    }

    /// Draws indexed primitives with the pending state.
    ///
    /// # Errors
    ///
    /// See [`Device::cmd_draw`].
    pub fn cmd_draw_indexed(
        &self,
        cmd: CommandListHandle,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> GfxResult<()> {
        if self.prepare_draw(cmd)? {
            let list = self.cmd_resource(cmd);
            self.backend().cmd_draw_indexed(
                list,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Buffers, copies and barriers
    // ------------------------------------------------------------------

    pub fn cmd_bind_vertex_buffer(
        &self,
        cmd: CommandListHandle,
        binding: u32,
        buffer: BufferHandle,
        offset: u64,
    ) {
        let resource = self.buffers.resource(buffer);
        self.with_cmd(cmd, |list| {
            self.backend()
                .cmd_bind_vertex_buffers(list.resource, binding, &[resource], &[offset])
        });
    }

    pub fn cmd_bind_index_buffer(
        &self,
        cmd: CommandListHandle,
        buffer: BufferHandle,
        offset: u64,
        index_type: IndexType,
    ) {
        let resource = self.buffers.resource(buffer);
        self.with_cmd(cmd, |list| {
            self.backend()
                .cmd_bind_index_buffer(list.resource, resource, offset, index_type)
        });
    }

    /// Copies regions between two buffers.
    ///
    /// Regions must be non-empty and lie within both buffers.
    pub fn cmd_copy_buffer(
        &self,
        cmd: CommandListHandle,
        src: BufferHandle,
        dst: BufferHandle,
        regions: &[BufferCopyRegion],
    ) {
        let (src_resource, src_size) = self.buffers.with(src, |b| (b.resource, b.info.size));
        let (dst_resource, dst_size) = self.buffers.with(dst, |b| (b.resource, b.info.size));
        let in_bounds = regions.iter().all(|r| {
            r.size > 0
                && r.src_offset.checked_add(r.size).is_some_and(|end| end <= src_size)
                && r.dst_offset.checked_add(r.size).is_some_and(|end| end <= dst_size)
        });
        if !check!(
            !regions.is_empty() && in_bounds,
            "buffer copy regions out of bounds: {:?}",
            regions
        ) {
            return;
        }

        self.with_cmd(cmd, |list| {
            self.backend()
                .cmd_copy_buffer(list.resource, src_resource, dst_resource, regions)
        });
    }

    /// Copies buffer regions into a texture in `dst_layout`.
    pub fn cmd_copy_buffer_to_texture(
        &self,
        cmd: CommandListHandle,
        src: BufferHandle,
        dst: TextureHandle,
        dst_layout: TextureLayout,
        regions: &[BufferTextureCopyRegion],
    ) {
        if !check!(!regions.is_empty(), "buffer to texture copy without regions") {
            return;
        }
        let src = self.buffers.resource(src);
        let dst = self.textures.resource(dst);
        self.with_cmd(cmd, |list| {
            self.backend()
                .cmd_copy_buffer_to_texture(list.resource, src, dst, dst_layout, regions)
        });
    }

    /// Transitions every mip level and layer of a texture.
    pub fn cmd_texture_barrier(&self, cmd: CommandListHandle, barrier: &TextureBarrier) {
        let (texture, range) = self
            .textures
            .with(barrier.texture, |t| (t.resource, t.info.full_range()));
        let memory_barrier = TextureMemoryBarrier {
            texture,
            src_access: barrier.src_access,
            dst_access: barrier.dst_access,
            old_layout: barrier.old_layout,
            new_layout: barrier.new_layout,
            subresource_range: range,
        };
        self.with_cmd(cmd, |list| {
            self.backend().cmd_pipeline_barrier(
                list.resource,
                barrier.src_stage,
                barrier.dst_stage,
                &[memory_barrier],
            )
        });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::command::QueueType;
    use crate::format::Format;
    use crate::null::{NullBackend, NullOp};
    use crate::texture::{TextureCreateInfo, TextureInfo, TextureUsageFlags, TextureViewInfo};

    fn color_view(device: &Device, format: Format) -> TextureViewHandle {
        let texture = device
            .create_texture(&TextureInfo::new(TextureCreateInfo::new_2d(
                format,
                64,
                32,
                TextureUsageFlags::COLOR_ATTACHMENT | TextureUsageFlags::SAMPLED,
            )))
            .unwrap();
        let info = device.texture_info(texture);
        device
            .create_texture_view(&TextureViewInfo::new(
                texture,
                crate::texture::TextureViewCreateInfo {
                    view_type: crate::texture::TextureViewType::Tex2D,
                    format,
                    subresource_range: info.full_range(),
                },
            ))
            .unwrap()
    }

    #[test]
    fn test_derived_render_pass_puts_depth_last() {
        let device = Device::new(Arc::new(NullBackend::new())).unwrap();
        let color = color_view(&device, Format::R8G8B8A8Unorm);
        let depth = color_view(&device, Format::D32Sfloat);
        let info = RenderPassInfo::single_color(color, Rect2D::from_size(64, 32), [0.0; 4])
            .with_depth(depth, 1.0);

        let (create_info, framebuffer) = device.derive_render_pass(&info).unwrap();
        assert_eq!(create_info.attachments.len(), 2);
        assert_eq!(create_info.attachments[0].load_op, AttachmentLoadOp::Clear);
        assert_eq!(create_info.attachments[0].store_op, AttachmentStoreOp::Store);
        assert_eq!(
            create_info.attachments[0].final_layout,
            TextureLayout::ColorAttachment
        );
        assert_eq!(create_info.attachments[1].format, Format::D32Sfloat);
        assert_eq!(
            create_info.attachments[1].final_layout,
            TextureLayout::DepthStencilAttachment
        );
        assert_eq!(
            create_info.subpasses[0].depth_stencil_attachment,
            Some(AttachmentReference {
                attachment: 1,
                layout: TextureLayout::DepthStencilAttachment,
            })
        );
        assert_eq!((framebuffer.width, framebuffer.height), (64, 32));
    }

    #[test]
    fn test_unflagged_color_attachment_is_dont_care() {
        let device = Device::new(Arc::new(NullBackend::new())).unwrap();
        let color = color_view(&device, Format::R8G8B8A8Unorm);
        let info = RenderPassInfo {
            color_attachments: vec![color],
            ..Default::default()
        };
        let (create_info, _) = device.derive_render_pass(&info).unwrap();
        assert_eq!(create_info.attachments[0].load_op, AttachmentLoadOp::DontCare);
        assert_eq!(create_info.attachments[0].store_op, AttachmentStoreOp::DontCare);
        assert_eq!(create_info.attachments[0].initial_layout, TextureLayout::Undefined);
    }

    #[test]
    fn test_begin_render_pass_sets_viewport_and_scissor() {
        let backend = Arc::new(NullBackend::new());
        let device = Device::new(backend.clone()).unwrap();
        let color = color_view(&device, Format::R8G8B8A8Unorm);

        let cmd = device.allocate_cmd_list(QueueType::Gfx).unwrap();
        device
            .cmd_begin_render_pass(
                cmd,
                &RenderPassInfo::single_color(color, Rect2D::default(), [0.0; 4]),
            )
            .unwrap();
        device.cmd_end_render_pass(cmd);

        let ops = backend.list_ops(device.cmd_resource(cmd));
        assert_eq!(
            ops,
            vec![
                NullOp::CmdBeginRenderPass,
                NullOp::CmdSetViewport,
                NullOp::CmdSetScissor,
                NullOp::CmdEndRenderPass,
            ]
        );
        device.submit(cmd, &[], &[]).unwrap();
    }

    #[test]
    fn test_state_setters_do_not_touch_backend() {
        let backend = Arc::new(NullBackend::new());
        let device = Device::new(backend.clone()).unwrap();
        let cmd = device.allocate_cmd_list(QueueType::Gfx).unwrap();

        device.cmd_set_render_pass_state(cmd, &PipelineRenderPassState::default());
        device.cmd_set_material_state(cmd, &PipelineMaterialState::default());
        device.cmd_bind_pipeline_layout(cmd, PipelineLayoutHandle::NULL);

        assert!(backend.list_ops(device.cmd_resource(cmd)).is_empty());
        device.submit(cmd, &[], &[]).unwrap();
    }
}
