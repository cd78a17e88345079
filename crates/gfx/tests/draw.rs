//! Integration tests for draw recording, the state caches and threaded
//! command recording.

use std::sync::Arc;

use cobalt_gfx::descriptor::DescriptorType;
use cobalt_gfx::null::{NullBackend, NullOp};
use cobalt_gfx::pipeline::{
    CompareOp, DescriptorSetLayoutBinding, DescriptorSetLayoutCreateInfo,
    PipelineDepthStencilState, PipelineLayoutCreateInfo, PipelineMaterialState,
    PipelineRenderPassState, PipelineShaderStage,
};
use cobalt_gfx::shader::ShaderStageFlags;
use cobalt_gfx::texture::{TextureCreateInfo, TextureUsageFlags, TextureViewCreateInfo, TextureViewType};
use cobalt_gfx::{
    BufferHandle, BufferInfo, BufferUsageFlags, CommandListHandle, Device, DeviceConfig, Format,
    MemoryUsage, PipelineLayoutHandle, PipelineLayoutInfo, QueueType, Rect2D, RenderPassInfo,
    ShaderInfo, ShaderStage, TextureInfo, TextureViewHandle, TextureViewInfo,
};

/// Four-byte aligned stand-in for SPIR-V.
const BYTECODE: [u8; 8] = [0x03, 0x02, 0x23, 0x07, 0, 0, 0, 0];

/// Objects shared by every draw of a test.
struct Scene {
    material: PipelineMaterialState,
    layout: PipelineLayoutHandle,
    target: TextureViewHandle,
    ubo: BufferHandle,
}

fn device_with_config(config: DeviceConfig) -> (Arc<NullBackend>, Device) {
    let backend = Arc::new(NullBackend::new());
    let device = Device::with_config(backend.clone(), config).expect("Failed to create device");
    (backend, device)
}

fn create_scene(device: &Device) -> Scene {
    let vs = device
        .create_shader(&ShaderInfo::new(ShaderStage::Vertex, &BYTECODE))
        .expect("Failed to create vertex shader");
    let fs = device
        .create_shader(&ShaderInfo::new(ShaderStage::Fragment, &BYTECODE))
        .expect("Failed to create fragment shader");
    let material = PipelineMaterialState {
        stages: vec![
            PipelineShaderStage::new(ShaderStage::Vertex, vs),
            PipelineShaderStage::new(ShaderStage::Fragment, fs),
        ],
        ..Default::default()
    };

    let layout = device
        .create_pipeline_layout(&PipelineLayoutInfo::new(&PipelineLayoutCreateInfo {
            set_layouts: vec![DescriptorSetLayoutCreateInfo {
                bindings: vec![DescriptorSetLayoutBinding::new(
                    0,
                    DescriptorType::UniformBuffer,
                    ShaderStageFlags::VERTEX,
                )],
            }],
            push_constant_ranges: vec![],
        }))
        .expect("Failed to create pipeline layout");

    let info = TextureCreateInfo::new_2d(
        Format::R8G8B8A8Unorm,
        128,
        64,
        TextureUsageFlags::COLOR_ATTACHMENT,
    );
    let texture = device
        .create_texture(&TextureInfo::new(info))
        .expect("Failed to create render target");
    let target = device
        .create_texture_view(&TextureViewInfo::new(
            texture,
            TextureViewCreateInfo {
                view_type: TextureViewType::Tex2D,
                format: Format::R8G8B8A8Unorm,
                subresource_range: info.full_range(),
            },
        ))
        .expect("Failed to create render target view");

    let ubo = device
        .create_buffer(&BufferInfo::new(
            64,
            MemoryUsage::CpuToGpu,
            BufferUsageFlags::UNIFORM_BUFFER,
        ))
        .expect("Failed to create uniform buffer");

    Scene {
        material,
        layout,
        target,
        ubo,
    }
}

/// Records a full-screen triangle into a new gfx list.
fn record_draw(device: &Device, scene: &Scene) -> CommandListHandle {
    let cmd = device
        .allocate_cmd_list(QueueType::Gfx)
        .expect("Failed to allocate command list");
    device
        .cmd_begin_render_pass(
            cmd,
            &RenderPassInfo::single_color(scene.target, Rect2D::default(), [0.0, 0.0, 0.0, 1.0]),
        )
        .expect("Failed to begin render pass");
    device.cmd_set_material_state(cmd, &scene.material);
    device.cmd_set_render_pass_state(cmd, &PipelineRenderPassState::default());
    device.cmd_bind_pipeline_layout(cmd, scene.layout);
    device.cmd_bind_ubo(cmd, 0, 0, scene.ubo);
    device.cmd_draw(cmd, 3, 1, 0, 0).expect("Failed to draw");
    device.cmd_end_render_pass(cmd);
    cmd
}

#[test]
fn test_draw_binds_pipeline_and_descriptors() {
    let (backend, device) = device_with_config(DeviceConfig::default());
    let scene = create_scene(&device);

    let cmd = record_draw(&device, &scene);
    device.submit(cmd, &[], &[]).unwrap();
    device.end_frame().unwrap();

    let submits = backend.submits();
    assert_eq!(submits.len(), 1);
    let ops = backend.list_ops(submits[0].lists[0]);
    assert_eq!(
        ops,
        vec![
            NullOp::CmdBeginRenderPass,
            NullOp::CmdSetViewport,
            NullOp::CmdSetScissor,
            NullOp::CmdBindPipeline,
            NullOp::CmdBindDescriptorSets,
            NullOp::CmdDraw,
            NullOp::CmdEndRenderPass,
        ]
    );

    let pipeline_call = backend
        .calls()
        .into_iter()
        .find(|call| call.op == NullOp::CreatePipeline)
        .expect("Pipeline should have been created");
    let pipeline = backend.pipeline_info(pipeline_call.resource).unwrap();
    assert_eq!(pipeline.shader_stages.len(), 2);
    assert_eq!(pipeline.shader_stages[0].entry_point, "main");
    assert_eq!(pipeline.subpass, 0);

    let set_call = backend
        .calls()
        .into_iter()
        .find(|call| call.op == NullOp::UpdateDescriptorSet)
        .expect("Descriptor set should have been written");
    let writes = backend.descriptor_writes(set_call.resource).unwrap();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].binding, 0);
}

#[test]
fn test_render_pass_derived_from_target() {
    let (backend, device) = device_with_config(DeviceConfig::default());
    let scene = create_scene(&device);
    record_draw(&device, &scene);

    let render_pass = backend
        .calls()
        .into_iter()
        .find(|call| call.op == NullOp::CreateRenderPass)
        .expect("Render pass should have been created");
    let info = backend.render_pass_info(render_pass.resource).unwrap();
    assert_eq!(info.attachments.len(), 1);
    assert_eq!(info.attachments[0].format, Format::R8G8B8A8Unorm);
    assert_eq!(info.subpasses.len(), 1);
    assert!(info.subpasses[0].depth_stencil_attachment.is_none());
}

#[test]
fn test_pipeline_and_render_pass_cached_across_frames() {
    let (backend, device) = device_with_config(DeviceConfig::default());
    let scene = create_scene(&device);

    for _ in 0..4 {
        let cmd = record_draw(&device, &scene);
        device.submit(cmd, &[], &[]).unwrap();
        device.end_frame().unwrap();
        device.new_frame().unwrap();
    }

    assert_eq!(backend.count(NullOp::CreatePipeline), 1);
    assert_eq!(backend.count(NullOp::CreateRenderPass), 1);
    assert_eq!(backend.count(NullOp::CmdBindPipeline), 4);
    let stats = device.stats();
    assert_eq!(stats.pipelines, 1);
    assert_eq!(stats.render_passes, 1);
}

#[test]
fn test_changed_state_creates_new_pipeline() {
    let (backend, device) = device_with_config(DeviceConfig::default());
    let scene = create_scene(&device);

    let cmd = record_draw(&device, &scene);
    device
        .cmd_begin_render_pass(
            cmd,
            &RenderPassInfo::single_color(scene.target, Rect2D::from_size(32, 32), [0.0; 4]),
        )
        .unwrap();
    device.cmd_set_render_pass_state(
        cmd,
        &PipelineRenderPassState {
            depth_stencil: PipelineDepthStencilState::depth(CompareOp::Less),
            ..Default::default()
        },
    );
    device.cmd_draw(cmd, 3, 1, 0, 0).unwrap();
    // Unchanged state: no rebind.
    device.cmd_draw(cmd, 3, 1, 0, 0).unwrap();
    device.cmd_end_render_pass(cmd);
    device.submit(cmd, &[], &[]).unwrap();

    assert_eq!(backend.count(NullOp::CreatePipeline), 2);
    assert_eq!(backend.count(NullOp::CmdBindPipeline), 2);
    assert_eq!(backend.count(NullOp::CmdDraw), 3);
}

#[test]
fn test_descriptor_sets_reused_then_evicted() {
    let config = DeviceConfig::default()
        .with_frames_in_flight(2)
        .with_descriptor_set_max_unused_frames(1);
    let (backend, device) = device_with_config(config);
    let scene = create_scene(&device);

    let frame = || {
        let cmd = record_draw(&device, &scene);
        device.submit(cmd, &[], &[]).unwrap();
        device.end_frame().unwrap();
        device.new_frame().unwrap();
    };

    frame();
    frame();
    assert_eq!(
        backend.count(NullOp::UpdateDescriptorSet),
        1,
        "Identical bindings should hit the cache"
    );

    // Two frames without a draw age the set past the limit.
    device.end_frame().unwrap();
    device.new_frame().unwrap();
    device.end_frame().unwrap();
    device.new_frame().unwrap();

    let frame = || {
        let cmd = record_draw(&device, &scene);
        device.submit(cmd, &[], &[]).unwrap();
        device.end_frame().unwrap();
    };
    frame();
    assert_eq!(backend.count(NullOp::UpdateDescriptorSet), 2);
    assert_eq!(
        backend.count(NullOp::CreateDescriptorPool),
        1,
        "The evicted set should be recycled"
    );
}

#[test]
fn test_new_bindings_write_new_set() {
    let (backend, device) = device_with_config(DeviceConfig::default());
    let scene = create_scene(&device);
    let other = device
        .create_buffer(&BufferInfo::new(
            64,
            MemoryUsage::CpuToGpu,
            BufferUsageFlags::UNIFORM_BUFFER,
        ))
        .unwrap();

    let cmd = record_draw(&device, &scene);
    device
        .cmd_begin_render_pass(
            cmd,
            &RenderPassInfo::single_color(scene.target, Rect2D::default(), [0.0; 4]),
        )
        .unwrap();
    device.cmd_bind_ubo(cmd, 0, 0, other);
    device.cmd_draw(cmd, 3, 1, 0, 0).unwrap();
    device.cmd_end_render_pass(cmd);
    device.submit(cmd, &[], &[]).unwrap();

    assert_eq!(backend.count(NullOp::UpdateDescriptorSet), 2);
    assert_eq!(backend.count(NullOp::CmdBindDescriptorSets), 2);
}

#[test]
fn test_threaded_recording_into_one_submission() {
    const THREADS: usize = 4;

    let (backend, device) = device_with_config(DeviceConfig::default());
    let scene = create_scene(&device);

    let lists: Vec<CommandListHandle> = std::thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    let cmd = record_draw(&device, &scene);
                    device.submit(cmd, &[], &[]).expect("Failed to submit");
                    cmd
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("Recording thread panicked"))
            .collect()
    });
    device.end_frame().unwrap();

    assert_eq!(lists.len(), THREADS);
    let submits = backend.submits();
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].lists.len(), THREADS);
    assert_eq!(backend.count(NullOp::CreatePipeline), 1);
    assert_eq!(backend.count(NullOp::CmdDraw), THREADS);
}

#[test]
fn test_indexed_draw_with_bound_buffers() {
    let (backend, device) = device_with_config(DeviceConfig::default());
    let scene = create_scene(&device);
    let vertices = device
        .create_buffer(
            &BufferInfo::new(36, MemoryUsage::CpuToGpu, BufferUsageFlags::VERTEX_BUFFER)
                .with_pod_data(&[0.0f32; 9]),
        )
        .unwrap();
    let indices = device
        .create_buffer(
            &BufferInfo::new(6, MemoryUsage::CpuToGpu, BufferUsageFlags::INDEX_BUFFER)
                .with_pod_data(&[0u16, 1, 2]),
        )
        .unwrap();

    let cmd = device.allocate_cmd_list(QueueType::Gfx).unwrap();
    device
        .cmd_begin_render_pass(
            cmd,
            &RenderPassInfo::single_color(scene.target, Rect2D::default(), [0.0; 4]),
        )
        .unwrap();
    device.cmd_set_material_state(cmd, &scene.material);
    device.cmd_bind_pipeline_layout(cmd, scene.layout);
    device.cmd_bind_ubo(cmd, 0, 0, scene.ubo);
    device.cmd_bind_vertex_buffer(cmd, 0, vertices, 0);
    device.cmd_bind_index_buffer(cmd, indices, 0, cobalt_gfx::buffer::IndexType::Uint16);
    device.cmd_draw_indexed(cmd, 3, 1, 0, 0, 0).unwrap();
    device.submit(cmd, &[], &[]).unwrap();

    assert_eq!(backend.count(NullOp::CmdBindVertexBuffers), 1);
    assert_eq!(backend.count(NullOp::CmdBindIndexBuffer), 1);
    assert_eq!(backend.count(NullOp::CmdDrawIndexed), 1);
    // Submitting inside the pass ends it.
    assert_eq!(backend.count(NullOp::CmdEndRenderPass), 1);
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "draw outside of a render pass")]
fn test_draw_outside_render_pass_is_rejected() {
    let (_backend, device) = device_with_config(DeviceConfig::default());
    let scene = create_scene(&device);

    let cmd = device.allocate_cmd_list(QueueType::Gfx).unwrap();
    device.cmd_set_material_state(cmd, &scene.material);
    device.cmd_bind_pipeline_layout(cmd, scene.layout);
    let _ = device.cmd_draw(cmd, 3, 1, 0, 0);
}
