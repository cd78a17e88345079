//! Cobalt - headless driver
//!
//! Renders a few frames of a triangle against the null backend, going
//! through the same acquire, record, submit and present sequence a
//! windowed renderer would use.

use std::sync::Arc;

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use tracing::{info, warn};

use cobalt_gfx::descriptor::DescriptorType;
use cobalt_gfx::null::NullBackend;
use cobalt_gfx::pipeline::{
    DescriptorSetLayoutBinding, DescriptorSetLayoutCreateInfo, PipelineLayoutCreateInfo,
    PipelineMaterialState, PipelineRenderPassState, PipelineShaderStage, PipelineVertexInputState,
    VertexInputAttributeDescription, VertexInputBindingDescription, VertexInputRate,
};
use cobalt_gfx::shader::ShaderStageFlags;
use cobalt_gfx::swapchain::SwapchainCreateInfo;
use cobalt_gfx::{
    BufferHandle, BufferInfo, BufferUsageFlags, Device, DeviceConfig, Format, GfxError,
    MemoryUsage, PipelineLayoutHandle, PipelineLayoutInfo, QueueType, Rect2D, RenderPassInfo,
    SemaphoreHandle, SemaphoreInfo, ShaderHandle, ShaderInfo, ShaderStage, SwapchainHandle,
    SwapchainInfo,
};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const FRAME_COUNT: u32 = 8;

/// Placeholder module words; the null backend never inspects them.
const SHADER_WORDS: [u32; 2] = [0x0723_0203, 0x0001_0000];

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct Vertex {
    position: [f32; 2],
    color: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct FrameUniforms {
    tint: [f32; 4],
    time: f32,
    _pad: [f32; 3],
}

const TRIANGLE: [Vertex; 3] = [
    Vertex {
        position: [0.0, -0.5],
        color: [1.0, 0.0, 0.0],
    },
    Vertex {
        position: [0.5, 0.5],
        color: [0.0, 1.0, 0.0],
    },
    Vertex {
        position: [-0.5, 0.5],
        color: [0.0, 0.0, 1.0],
    },
];

/// Semaphores of one frame slot.
struct FrameSync {
    image_ready: SemaphoreHandle,
    render_done: SemaphoreHandle,
}

struct App {
    device: Device,
    swapchain: SwapchainHandle,
    sync: Vec<FrameSync>,
    shaders: [ShaderHandle; 2],
    layout: PipelineLayoutHandle,
    material: PipelineMaterialState,
    vertices: BufferHandle,
    uniforms: BufferHandle,
}

impl App {
    fn new() -> Result<Self> {
        let config = DeviceConfig::default().with_frames_in_flight(2);
        let device = Device::with_config(Arc::new(NullBackend::new()), config)
            .context("Failed to create device")?;

        let swapchain = device
            .create_swapchain(
                &SwapchainInfo::new(SwapchainCreateInfo::headless(WIDTH, HEIGHT))
                    .with_debug_name("main"),
            )
            .context("Failed to create swapchain")?;

        let sync = (0..device.config().frames_in_flight)
            .map(|_| {
                Ok(FrameSync {
                    image_ready: device.create_semaphore(&SemaphoreInfo::default())?,
                    render_done: device.create_semaphore(&SemaphoreInfo::default())?,
                })
            })
            .collect::<Result<Vec<_>, GfxError>>()?;

        let bytecode: &[u8] = bytemuck::cast_slice(&SHADER_WORDS);
        let vs = device.create_shader(
            &ShaderInfo::new(ShaderStage::Vertex, bytecode).with_debug_name("triangle.vert"),
        )?;
        let fs = device.create_shader(
            &ShaderInfo::new(ShaderStage::Fragment, bytecode).with_debug_name("triangle.frag"),
        )?;

        let layout = device.create_pipeline_layout(
            &PipelineLayoutInfo::new(&PipelineLayoutCreateInfo {
                set_layouts: vec![DescriptorSetLayoutCreateInfo {
                    bindings: vec![DescriptorSetLayoutBinding::new(
                        0,
                        DescriptorType::UniformBuffer,
                        ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT,
                    )],
                }],
                push_constant_ranges: vec![],
            })
            .with_debug_name("triangle"),
        )?;

        let material = PipelineMaterialState {
            stages: vec![
                PipelineShaderStage::new(ShaderStage::Vertex, vs),
                PipelineShaderStage::new(ShaderStage::Fragment, fs),
            ],
            vertex_input: PipelineVertexInputState {
                bindings: vec![VertexInputBindingDescription {
                    binding: 0,
                    stride: size_of::<Vertex>() as u32,
                    input_rate: VertexInputRate::Vertex,
                }],
                attributes: vec![
                    VertexInputAttributeDescription {
                        location: 0,
                        binding: 0,
                        format: Format::R32G32Sfloat,
                        offset: 0,
                    },
                    VertexInputAttributeDescription {
                        location: 1,
                        binding: 0,
                        format: Format::R32G32B32Sfloat,
                        offset: size_of::<[f32; 2]>() as u32,
                    },
                ],
            },
            ..Default::default()
        };

        let vertices = device
            .create_buffer(
                &BufferInfo::new(
                    size_of_val(&TRIANGLE) as u64,
                    MemoryUsage::GpuOnly,
                    BufferUsageFlags::VERTEX_BUFFER,
                )
                .with_pod_data(&TRIANGLE)
                .with_debug_name("triangle vertices"),
            )
            .context("Failed to upload vertices")?;
        let uniforms = device.create_buffer(
            &BufferInfo::new(
                size_of::<FrameUniforms>() as u64,
                MemoryUsage::CpuToGpu,
                BufferUsageFlags::UNIFORM_BUFFER,
            )
            .with_debug_name("frame uniforms"),
        )?;

        info!("Initialization complete");
        Ok(Self {
            device,
            swapchain,
            sync,
            shaders: [vs, fs],
            layout,
            material,
            vertices,
            uniforms,
        })
    }

    fn render_frame(&self, frame: u32) -> Result<()> {
        let device = &self.device;
        let sync = &self.sync[device.frame_index() as usize];

        let uniforms = FrameUniforms {
            tint: [1.0, 1.0, 1.0, 1.0],
            time: frame as f32 / 60.0,
            _pad: [0.0; 3],
        };
        device.write_buffer(self.uniforms, 0, bytemuck::bytes_of(&uniforms))?;

        let image = match device.acquire_swapchain_texture(self.swapchain, sync.image_ready) {
            Ok(image) => image,
            Err(err) if err.is_timeout() => {
                warn!("Skipping frame {}: no backbuffer available", frame);
                device.end_frame()?;
                device.new_frame()?;
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        let cmd = device.allocate_cmd_list(QueueType::Gfx)?;
        device.cmd_begin_render_pass(
            cmd,
            &RenderPassInfo::single_color(
                device.get_swapchain_backbuffer_view(self.swapchain),
                Rect2D::from_size(WIDTH, HEIGHT),
                [0.1, 0.1, 0.12, 1.0],
            ),
        )?;
        device.cmd_set_render_pass_state(cmd, &PipelineRenderPassState::default());
        device.cmd_set_material_state(cmd, &self.material);
        device.cmd_bind_pipeline_layout(cmd, self.layout);
        device.cmd_bind_ubo(cmd, 0, 0, self.uniforms);
        device.cmd_bind_vertex_buffer(cmd, 0, self.vertices, 0);
        device.cmd_draw(cmd, TRIANGLE.len() as u32, 1, 0, 0)?;
        device.cmd_end_render_pass(cmd);
        device.submit(cmd, &[sync.image_ready], &[sync.render_done])?;

        device.end_frame()?;
        device.present(self.swapchain, &[sync.render_done])?;
        info!("Presented frame {} (image {})", frame, image);

        device.new_frame()?;
        Ok(())
    }

    fn shutdown(self) -> Result<()> {
        let device = &self.device;
        device.wait_idle()?;

        let stats = device.stats();
        info!(
            "Shutting down: {} pipeline(s), {} render pass(es) cached",
            stats.pipelines, stats.render_passes
        );

        for sync in &self.sync {
            device.destroy_semaphore(sync.image_ready);
            device.destroy_semaphore(sync.render_done);
        }
        for shader in self.shaders {
            device.destroy_shader(shader);
        }
        device.destroy_pipeline_layout(self.layout);
        device.destroy_buffer(self.vertices);
        device.destroy_buffer(self.uniforms);
        device.destroy_swapchain(self.swapchain);
        Ok(())
    }
}

fn main() -> Result<()> {
    cobalt_core::init_logging();
    info!("Starting cobalt ({} frames)", FRAME_COUNT);

    let app = App::new()?;
    for frame in 0..FRAME_COUNT {
        app.render_frame(frame)?;
    }
    app.shutdown()
}
