//! Graphics pipeline state and pipeline layouts.
//!
//! Client code sets pipeline state incrementally on a command list, split
//! in two halves:
//! - [`PipelineMaterialState`]: shaders, vertex layout, topology and
//!   rasterizer, usually owned by a material
//! - [`PipelineRenderPassState`]: multisampling, depth/stencil and blending,
//!   usually owned by the pass being rendered
//!
//! At draw time the two halves are merged with the bound layout and the
//! active render pass into a [`GfxPipelineCreateInfo`], which is the key of
//! the device's pipeline cache. Every type that ends up in that key
//! implements structural `Eq` and `Hash`; float fields compare by bit
//! pattern.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bitflags::bitflags;

use crate::backend::{BackendResource, DeviceResource};
use crate::descriptor::{DescriptorSetAllocator, DescriptorType};
use crate::format::{Format, SampleCount};
use crate::handle::Handle;
use crate::render_pass::MAX_ATTACHMENTS;
use crate::shader::{ShaderHandle, ShaderStage, ShaderStageFlags};

/// How vertices are grouped into primitives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    TriangleFan,
    /// Tessellation input; requires control and evaluation stages.
    PatchList,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PolygonMode {
    #[default]
    Fill,
    /// Wireframe.
    Line,
    Point,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
    FrontAndBack,
}

/// Winding that counts as front-facing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

/// Test applied by depth, stencil and comparison samplers. The incoming
/// value is on the left: `Less` passes when `incoming < stored`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Never,
    #[default]
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

/// Action applied to the stencil buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    IncrementAndClamp,
    DecrementAndClamp,
    Invert,
    IncrementAndWrap,
    DecrementAndWrap,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    #[default]
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
    SrcAlphaSaturate,
}

/// Blend operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

/// Framebuffer logic operation, replacing blending when enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogicOp {
    Clear,
    And,
    AndReverse,
    Copy,
    AndInverted,
    NoOp,
    Xor,
    Or,
    Nor,
    Equivalent,
    Invert,
    OrReverse,
    CopyInverted,
    OrInverted,
    Nand,
    Set,
}

bitflags! {
    /// Color channels written by a blend attachment.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ColorComponentFlags: u32 {
        const R = 1 << 0;
        const G = 1 << 1;
        const B = 1 << 2;
        const A = 1 << 3;
        const RGBA = Self::R.bits() | Self::G.bits() | Self::B.bits() | Self::A.bits();
    }
}

/// Rate at which a vertex buffer binding advances.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum VertexInputRate {
    #[default]
    Vertex,
    Instance,
}

/// One vertex buffer binding slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexInputBindingDescription {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

/// One vertex attribute read from a binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexInputAttributeDescription {
    pub location: u32,
    pub binding: u32,
    pub format: Format,
    pub offset: u32,
}

/// Vertex buffer layout.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PipelineVertexInputState {
    pub bindings: Vec<VertexInputBindingDescription>,
    pub attributes: Vec<VertexInputAttributeDescription>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PipelineInputAssemblyState {
    pub topology: PrimitiveTopology,
    pub primitive_restart: bool,
}

/// Rasterizer configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineRasterizationState {
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub enable_depth_clamp: bool,
    pub enable_depth_bias: bool,
    pub depth_bias_constant_factor: f32,
    pub depth_bias_clamp: f32,
    pub depth_bias_slope_factor: f32,
}

impl PipelineRasterizationState {
    fn float_bits(&self) -> [u32; 3] {
        [
            self.depth_bias_constant_factor.to_bits(),
            self.depth_bias_clamp.to_bits(),
            self.depth_bias_slope_factor.to_bits(),
        ]
    }
}

impl PartialEq for PipelineRasterizationState {
    fn eq(&self, other: &Self) -> bool {
        self.polygon_mode == other.polygon_mode
            && self.cull_mode == other.cull_mode
            && self.front_face == other.front_face
            && self.enable_depth_clamp == other.enable_depth_clamp
            && self.enable_depth_bias == other.enable_depth_bias
            && self.float_bits() == other.float_bits()
    }
}

impl Eq for PipelineRasterizationState {}

impl Hash for PipelineRasterizationState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.polygon_mode.hash(state);
        self.cull_mode.hash(state);
        self.front_face.hash(state);
        self.enable_depth_clamp.hash(state);
        self.enable_depth_bias.hash(state);
        self.float_bits().hash(state);
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PipelineMultisamplingState {
    pub samples: SampleCount,
}

/// Stencil test configuration for one face orientation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StencilOpState {
    pub fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub compare_op: CompareOp,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

impl Default for StencilOpState {
    fn default() -> Self {
        Self {
            fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            compare_op: CompareOp::Always,
            compare_mask: 0xff,
            write_mask: 0xff,
            reference: 0,
        }
    }
}

/// Depth and stencil test configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PipelineDepthStencilState {
    pub enable_depth_test: bool,
    pub enable_depth_write: bool,
    pub depth_compare_op: CompareOp,
    pub enable_depth_bounds_test: bool,
    pub enable_stencil_test: bool,
    pub front: StencilOpState,
    pub back: StencilOpState,
}

impl PipelineDepthStencilState {
    /// Depth test and write enabled with the given comparison.
    pub fn depth(compare_op: CompareOp) -> Self {
        Self {
            enable_depth_test: true,
            enable_depth_write: true,
            depth_compare_op: compare_op,
            ..Self::default()
        }
    }
}

/// Blend equation of one color attachment, applied separately to the
/// color channels and to alpha.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ColorBlendAttachment {
    pub enabled: bool,
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub color_op: BlendOp,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub alpha_op: BlendOp,
    pub write_mask: ColorComponentFlags,
}

impl Default for ColorBlendAttachment {
    /// Blending off, all channels written.
    fn default() -> Self {
        Self {
            enabled: false,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::Zero,
            color_op: BlendOp::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            alpha_op: BlendOp::Add,
            write_mask: ColorComponentFlags::RGBA,
        }
    }
}

impl ColorBlendAttachment {
    /// Non-premultiplied "over" compositing; destination alpha takes the
    /// source alpha unchanged.
    pub fn alpha_blend() -> Self {
        Self {
            enabled: true,
            src_color: BlendFactor::SrcAlpha,
            dst_color: BlendFactor::OneMinusSrcAlpha,
            ..Self::default()
        }
    }

    /// Additive blending, as used for particles and light accumulation.
    pub fn additive() -> Self {
        Self {
            enabled: true,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::One,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::One,
            ..Self::default()
        }
    }
}

/// Blending for every color attachment of a subpass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PipelineColorBlendState {
    /// Logic operation replacing blending, if any.
    pub logic_op: Option<LogicOp>,
    pub attachments: [ColorBlendAttachment; MAX_ATTACHMENTS],
}

/// One shader stage as set by client code.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PipelineShaderStage {
    pub stage: ShaderStage,
    pub shader: ShaderHandle,
    pub entry_point: String,
}

impl PipelineShaderStage {
    /// Stage using the conventional `main` entry point.
    pub fn new(stage: ShaderStage, shader: ShaderHandle) -> Self {
        Self {
            stage,
            shader,
            entry_point: String::from("main"),
        }
    }
}

/// Shader stage resolved to its backend module.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BackendShaderStage {
    pub stage: ShaderStage,
    pub shader: BackendResource,
    pub entry_point: String,
}

/// Pipeline state owned by a material.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PipelineMaterialState {
    pub stages: Vec<PipelineShaderStage>,
    pub vertex_input: PipelineVertexInputState,
    pub input_assembly: PipelineInputAssemblyState,
    pub rasterizer: PipelineRasterizationState,
}

/// Pipeline state owned by the pass being rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PipelineRenderPassState {
    pub multisampling: PipelineMultisamplingState,
    pub depth_stencil: PipelineDepthStencilState,
    pub color_blend: PipelineColorBlendState,
}

/// Complete graphics pipeline description and pipeline cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GfxPipelineCreateInfo {
    pub shader_stages: Vec<BackendShaderStage>,
    pub vertex_input: PipelineVertexInputState,
    pub input_assembly: PipelineInputAssemblyState,
    pub rasterization: PipelineRasterizationState,
    pub multisampling: PipelineMultisamplingState,
    pub depth_stencil: PipelineDepthStencilState,
    pub color_blend: PipelineColorBlendState,
    pub layout: BackendResource,
    pub render_pass: BackendResource,
    /// Subpass of `render_pass` the pipeline is used in.
    pub subpass: u32,
}

/// Which pipeline slot a bind call targets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PipelineBindPoint {
    #[default]
    Gfx,
    Compute,
}

/// One binding of a descriptor set layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutBinding {
    pub binding: u32,
    pub ty: DescriptorType,
    pub count: u32,
    pub stages: ShaderStageFlags,
}

impl DescriptorSetLayoutBinding {
    pub fn new(binding: u32, ty: DescriptorType, stages: ShaderStageFlags) -> Self {
        Self {
            binding,
            ty,
            count: 1,
            stages,
        }
    }
}

/// Bindings of one descriptor set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DescriptorSetLayoutCreateInfo {
    pub bindings: Vec<DescriptorSetLayoutBinding>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PushConstantRange {
    pub stages: ShaderStageFlags,
    pub offset: u32,
    pub size: u32,
}

/// Backend-level pipeline layout description.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PipelineLayoutCreateInfo {
    /// One entry per set index, at most
    /// [`MAX_DESCRIPTOR_SETS`](crate::descriptor::MAX_DESCRIPTOR_SETS).
    pub set_layouts: Vec<DescriptorSetLayoutCreateInfo>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

/// Client-level pipeline layout creation request.
#[derive(Clone, Copy, Debug)]
pub struct PipelineLayoutInfo<'a> {
    pub info: &'a PipelineLayoutCreateInfo,
    pub debug_name: &'a str,
}

impl<'a> PipelineLayoutInfo<'a> {
    pub fn new(info: &'a PipelineLayoutCreateInfo) -> Self {
        Self {
            info,
            debug_name: "",
        }
    }

    pub fn with_debug_name(mut self, name: &'a str) -> Self {
        self.debug_name = name;
        self
    }
}

/// Backend objects making up a pipeline layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineLayoutObjects {
    pub layout: BackendResource,
    /// One descriptor set layout per set index.
    pub set_layouts: Vec<BackendResource>,
}

/// Pooled pipeline layout record.
///
/// Owns one descriptor set allocator per set index.
pub struct PipelineLayout {
    pub(crate) objects: PipelineLayoutObjects,
    pub(crate) allocators: Vec<Arc<DescriptorSetAllocator>>,
    pub(crate) debug_name: String,
}

impl PipelineLayout {
    /// Number of descriptor sets in the layout.
    #[inline]
    pub fn set_count(&self) -> usize {
        self.allocators.len()
    }
}

impl DeviceResource for PipelineLayout {
    fn resource(&self) -> BackendResource {
        self.objects.layout
    }

    fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

pub type PipelineLayoutHandle = Handle<PipelineLayout>;

#[cfg(test)]
mod tests {
    use std::hash::BuildHasher;

    use rustc_hash::FxBuildHasher;

    use super::*;

    fn hash_of<T: Hash>(value: &T) -> u64 {
        FxBuildHasher.hash_one(value)
    }

    #[test]
    fn test_rasterization_compares_floats_by_bits() {
        let a = PipelineRasterizationState {
            depth_bias_constant_factor: 1.25,
            ..Default::default()
        };
        let b = a;
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let c = PipelineRasterizationState {
            depth_bias_constant_factor: 1.5,
            ..a
        };
        assert_ne!(a, c);
    }

    #[test]
    fn test_independently_built_states_are_equal() {
        let build = || PipelineRenderPassState {
            depth_stencil: PipelineDepthStencilState::depth(CompareOp::LessOrEqual),
            ..Default::default()
        };
        assert_eq!(build(), build());
        assert_eq!(hash_of(&build()), hash_of(&build()));
    }

    #[test]
    fn test_blend_presets_change_the_key() {
        let mut blended = PipelineRenderPassState::default();
        blended.color_blend.attachments[0] = ColorBlendAttachment::alpha_blend();
        assert_ne!(blended, PipelineRenderPassState::default());

        let mut additive = blended;
        additive.color_blend.attachments[0] = ColorBlendAttachment::additive();
        assert_ne!(additive, blended);
        assert_eq!(
            additive.color_blend.attachments[0].write_mask,
            ColorComponentFlags::RGBA
        );
    }

    #[test]
    fn test_default_stage_entry_point() {
        let stage = PipelineShaderStage::new(ShaderStage::Vertex, ShaderHandle::NULL);
        assert_eq!(stage.entry_point, "main");
    }
}
