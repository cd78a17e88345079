//! Conversions to and from Vulkan types, for backends built on `ash`.
//!
//! Only compiled with the `vulkan` feature.

use ash::vk;

use crate::buffer::{BufferUsageFlags, IndexType};
use crate::error::GfxError;
use crate::format::{Format, SampleCount, TextureAspectFlags};
use crate::pipeline::{CompareOp, CullMode, FrontFace, PolygonMode, PrimitiveTopology};
use crate::render_pass::{AttachmentLoadOp, AttachmentStoreOp};
use crate::shader::ShaderStage;
use crate::sync::{AccessFlags, PipelineStageFlags};
use crate::texture::{TextureLayout, TextureUsageFlags};

impl From<vk::Result> for GfxError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::TIMEOUT | vk::Result::NOT_READY => GfxError::Timeout,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => GfxError::OutOfDeviceMemory,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => GfxError::OutOfHostMemory,
            vk::Result::ERROR_INITIALIZATION_FAILED => GfxError::InitializationFailed,
            vk::Result::ERROR_FORMAT_NOT_SUPPORTED | vk::Result::ERROR_FEATURE_NOT_PRESENT => {
                GfxError::InvalidParameter
            }
            _ => GfxError::Unknown,
        }
    }
}

/// Maps each set bit of `flags` through `table`.
fn map_bits<F: Copy + PartialEq, V: Default + std::ops::BitOr<Output = V> + Copy>(
    contains: impl Fn(F) -> bool,
    table: &[(F, V)],
) -> V {
    table
        .iter()
        .filter(|(flag, _)| contains(*flag))
        .fold(V::default(), |acc, &(_, vk_flag)| acc | vk_flag)
}

impl Format {
    /// Converts to a Vulkan format.
    pub fn to_vk(self) -> vk::Format {
        match self {
            Format::Undefined => vk::Format::UNDEFINED,
            Format::R8Unorm => vk::Format::R8_UNORM,
            Format::R8G8Unorm => vk::Format::R8G8_UNORM,
            Format::R8G8B8A8Unorm => vk::Format::R8G8B8A8_UNORM,
            Format::R8G8B8A8Srgb => vk::Format::R8G8B8A8_SRGB,
            Format::B8G8R8A8Unorm => vk::Format::B8G8R8A8_UNORM,
            Format::B8G8R8A8Srgb => vk::Format::B8G8R8A8_SRGB,
            Format::R16G16B16A16Sfloat => vk::Format::R16G16B16A16_SFLOAT,
            Format::R32Sfloat => vk::Format::R32_SFLOAT,
            Format::R32G32Sfloat => vk::Format::R32G32_SFLOAT,
            Format::R32G32B32Sfloat => vk::Format::R32G32B32_SFLOAT,
            Format::R32G32B32A32Sfloat => vk::Format::R32G32B32A32_SFLOAT,
            Format::D16Unorm => vk::Format::D16_UNORM,
            Format::D32Sfloat => vk::Format::D32_SFLOAT,
            Format::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
            Format::D32SfloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
        }
    }

    /// Converts from a Vulkan format. Formats without a counterpart map
    /// to [`Format::Undefined`].
    pub fn from_vk(format: vk::Format) -> Self {
        match format {
            vk::Format::R8_UNORM => Format::R8Unorm,
            vk::Format::R8G8_UNORM => Format::R8G8Unorm,
            vk::Format::R8G8B8A8_UNORM => Format::R8G8B8A8Unorm,
            vk::Format::R8G8B8A8_SRGB => Format::R8G8B8A8Srgb,
            vk::Format::B8G8R8A8_UNORM => Format::B8G8R8A8Unorm,
            vk::Format::B8G8R8A8_SRGB => Format::B8G8R8A8Srgb,
            vk::Format::R16G16B16A16_SFLOAT => Format::R16G16B16A16Sfloat,
            vk::Format::R32_SFLOAT => Format::R32Sfloat,
            vk::Format::R32G32_SFLOAT => Format::R32G32Sfloat,
            vk::Format::R32G32B32_SFLOAT => Format::R32G32B32Sfloat,
            vk::Format::R32G32B32A32_SFLOAT => Format::R32G32B32A32Sfloat,
            vk::Format::D16_UNORM => Format::D16Unorm,
            vk::Format::D32_SFLOAT => Format::D32Sfloat,
            vk::Format::D24_UNORM_S8_UINT => Format::D24UnormS8Uint,
            vk::Format::D32_SFLOAT_S8_UINT => Format::D32SfloatS8Uint,
            _ => Format::Undefined,
        }
    }
}

impl SampleCount {
    pub fn to_vk(self) -> vk::SampleCountFlags {
        match self {
            SampleCount::X1 => vk::SampleCountFlags::TYPE_1,
            SampleCount::X2 => vk::SampleCountFlags::TYPE_2,
            SampleCount::X4 => vk::SampleCountFlags::TYPE_4,
            SampleCount::X8 => vk::SampleCountFlags::TYPE_8,
            SampleCount::X16 => vk::SampleCountFlags::TYPE_16,
            SampleCount::X32 => vk::SampleCountFlags::TYPE_32,
            SampleCount::X64 => vk::SampleCountFlags::TYPE_64,
        }
    }
}

impl TextureAspectFlags {
    pub fn to_vk(self) -> vk::ImageAspectFlags {
        map_bits(
            |flag| self.contains(flag),
            &[
                (TextureAspectFlags::COLOR, vk::ImageAspectFlags::COLOR),
                (TextureAspectFlags::DEPTH, vk::ImageAspectFlags::DEPTH),
                (TextureAspectFlags::STENCIL, vk::ImageAspectFlags::STENCIL),
            ],
        )
    }
}

impl TextureLayout {
    /// Converts to a Vulkan image layout.
    pub fn to_vk(self) -> vk::ImageLayout {
        match self {
            TextureLayout::Undefined => vk::ImageLayout::UNDEFINED,
            TextureLayout::General => vk::ImageLayout::GENERAL,
            TextureLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            TextureLayout::DepthStencilAttachment => {
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            }
            TextureLayout::DepthReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            TextureLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            TextureLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            TextureLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            TextureLayout::Present => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }
}

impl ShaderStage {
    /// Converts the shader stage to Vulkan shader stage flags.
    pub fn to_vk(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
            ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
            ShaderStage::TessControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            ShaderStage::TessEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
        }
    }
}

impl BufferUsageFlags {
    pub fn to_vk(self) -> vk::BufferUsageFlags {
        map_bits(
            |flag| self.contains(flag),
            &[
                (BufferUsageFlags::VERTEX_BUFFER, vk::BufferUsageFlags::VERTEX_BUFFER),
                (BufferUsageFlags::INDEX_BUFFER, vk::BufferUsageFlags::INDEX_BUFFER),
                (BufferUsageFlags::UNIFORM_BUFFER, vk::BufferUsageFlags::UNIFORM_BUFFER),
                (BufferUsageFlags::STORAGE_BUFFER, vk::BufferUsageFlags::STORAGE_BUFFER),
                (BufferUsageFlags::TRANSFER_SRC, vk::BufferUsageFlags::TRANSFER_SRC),
                (BufferUsageFlags::TRANSFER_DST, vk::BufferUsageFlags::TRANSFER_DST),
            ],
        )
    }
}

impl TextureUsageFlags {
    pub fn to_vk(self) -> vk::ImageUsageFlags {
        map_bits(
            |flag| self.contains(flag),
            &[
                (TextureUsageFlags::SAMPLED, vk::ImageUsageFlags::SAMPLED),
                (TextureUsageFlags::STORAGE, vk::ImageUsageFlags::STORAGE),
                (
                    TextureUsageFlags::COLOR_ATTACHMENT,
                    vk::ImageUsageFlags::COLOR_ATTACHMENT,
                ),
                (
                    TextureUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                    vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                ),
                (TextureUsageFlags::TRANSFER_SRC, vk::ImageUsageFlags::TRANSFER_SRC),
                (TextureUsageFlags::TRANSFER_DST, vk::ImageUsageFlags::TRANSFER_DST),
            ],
        )
    }
}

impl PipelineStageFlags {
    pub fn to_vk(self) -> vk::PipelineStageFlags {
        map_bits(
            |flag| self.contains(flag),
            &[
                (PipelineStageFlags::TOP_OF_PIPE, vk::PipelineStageFlags::TOP_OF_PIPE),
                (
                    PipelineStageFlags::INPUT_ASSEMBLER,
                    vk::PipelineStageFlags::VERTEX_INPUT,
                ),
                (
                    PipelineStageFlags::VERTEX_SHADER,
                    vk::PipelineStageFlags::VERTEX_SHADER,
                ),
                (
                    PipelineStageFlags::TESSELLATION_CONTROL_SHADER,
                    vk::PipelineStageFlags::TESSELLATION_CONTROL_SHADER,
                ),
                (
                    PipelineStageFlags::TESSELLATION_EVALUATION_SHADER,
                    vk::PipelineStageFlags::TESSELLATION_EVALUATION_SHADER,
                ),
                (
                    PipelineStageFlags::GEOMETRY_SHADER,
                    vk::PipelineStageFlags::GEOMETRY_SHADER,
                ),
                (
                    PipelineStageFlags::FRAGMENT_SHADER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                ),
                (
                    PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                    vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                ),
                (
                    PipelineStageFlags::LATE_FRAGMENT_TESTS,
                    vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
                ),
                (
                    PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                ),
                (
                    PipelineStageFlags::COMPUTE_SHADER,
                    vk::PipelineStageFlags::COMPUTE_SHADER,
                ),
                (PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::TRANSFER),
                (
                    PipelineStageFlags::BOTTOM_OF_PIPE,
                    vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                ),
                (
                    PipelineStageFlags::ALL_COMMANDS,
                    vk::PipelineStageFlags::ALL_COMMANDS,
                ),
            ],
        )
    }
}

impl AccessFlags {
    pub fn to_vk(self) -> vk::AccessFlags {
        map_bits(
            |flag| self.contains(flag),
            &[
                (AccessFlags::INDEX_READ, vk::AccessFlags::INDEX_READ),
                (
                    AccessFlags::VERTEX_ATTRIBUTE_READ,
                    vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
                ),
                (AccessFlags::UNIFORM_READ, vk::AccessFlags::UNIFORM_READ),
                (AccessFlags::SHADER_READ, vk::AccessFlags::SHADER_READ),
                (AccessFlags::SHADER_WRITE, vk::AccessFlags::SHADER_WRITE),
                (
                    AccessFlags::COLOR_ATTACHMENT_READ,
                    vk::AccessFlags::COLOR_ATTACHMENT_READ,
                ),
                (
                    AccessFlags::COLOR_ATTACHMENT_WRITE,
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
                ),
                (
                    AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
                    vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ,
                ),
                (
                    AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                    vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                ),
                (AccessFlags::TRANSFER_READ, vk::AccessFlags::TRANSFER_READ),
                (AccessFlags::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_WRITE),
                (AccessFlags::HOST_READ, vk::AccessFlags::HOST_READ),
                (AccessFlags::HOST_WRITE, vk::AccessFlags::HOST_WRITE),
            ],
        )
    }
}

impl AttachmentLoadOp {
    pub fn to_vk(self) -> vk::AttachmentLoadOp {
        match self {
            AttachmentLoadOp::Load => vk::AttachmentLoadOp::LOAD,
            AttachmentLoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
            AttachmentLoadOp::DontCare => vk::AttachmentLoadOp::DONT_CARE,
        }
    }
}

impl AttachmentStoreOp {
    pub fn to_vk(self) -> vk::AttachmentStoreOp {
        match self {
            AttachmentStoreOp::Store => vk::AttachmentStoreOp::STORE,
            AttachmentStoreOp::DontCare => vk::AttachmentStoreOp::DONT_CARE,
        }
    }
}

impl IndexType {
    pub fn to_vk(self) -> vk::IndexType {
        match self {
            IndexType::Uint16 => vk::IndexType::UINT16,
            IndexType::Uint32 => vk::IndexType::UINT32,
        }
    }
}

impl PrimitiveTopology {
    /// Converts to Vulkan primitive topology.
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
            PrimitiveTopology::TriangleFan => vk::PrimitiveTopology::TRIANGLE_FAN,
            PrimitiveTopology::PatchList => vk::PrimitiveTopology::PATCH_LIST,
        }
    }
}

impl PolygonMode {
    pub fn to_vk(self) -> vk::PolygonMode {
        match self {
            PolygonMode::Fill => vk::PolygonMode::FILL,
            PolygonMode::Line => vk::PolygonMode::LINE,
            PolygonMode::Point => vk::PolygonMode::POINT,
        }
    }
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
            CullMode::FrontAndBack => vk::CullModeFlags::FRONT_AND_BACK,
        }
    }
}

impl FrontFace {
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

impl CompareOp {
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Never => vk::CompareOp::NEVER,
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::Equal => vk::CompareOp::EQUAL,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Greater => vk::CompareOp::GREATER,
            CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
            CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vk_result_conversion() {
        assert_eq!(GfxError::from(vk::Result::TIMEOUT), GfxError::Timeout);
        assert_eq!(
            GfxError::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            GfxError::OutOfDeviceMemory
        );
        assert_eq!(
            GfxError::from(vk::Result::ERROR_DEVICE_LOST),
            GfxError::Unknown
        );
    }

    #[test]
    fn test_format_round_trips_through_vk() {
        for format in [Format::B8G8R8A8Srgb, Format::D24UnormS8Uint, Format::R32Sfloat] {
            assert_eq!(Format::from_vk(format.to_vk()), format);
        }
        assert_eq!(Format::from_vk(vk::Format::BC1_RGB_UNORM_BLOCK), Format::Undefined);
    }

    #[test]
    fn test_flag_conversion_keeps_every_bit() {
        let usage = BufferUsageFlags::VERTEX_BUFFER | BufferUsageFlags::TRANSFER_DST;
        assert_eq!(
            usage.to_vk(),
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
        );
        assert_eq!(
            PipelineStageFlags::ALL_GRAPHICS.to_vk(),
            vk::PipelineStageFlags::VERTEX_INPUT
                | vk::PipelineStageFlags::VERTEX_SHADER
                | vk::PipelineStageFlags::TESSELLATION_CONTROL_SHADER
                | vk::PipelineStageFlags::TESSELLATION_EVALUATION_SHADER
                | vk::PipelineStageFlags::GEOMETRY_SHADER
                | vk::PipelineStageFlags::FRAGMENT_SHADER
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS
                | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(AccessFlags::empty().to_vk(), vk::AccessFlags::empty());
    }
}
