//! Textures, texture views and the layout/copy/barrier vocabulary around
//! them.
//!
//! A [`Texture`] owns GPU image memory (unless it belongs to a swapchain);
//! a [`TextureView`] interprets a subresource range of one texture and is
//! what render passes and descriptors bind. A view refers back to its
//! texture by [`TextureHandle`], never by pointer, so a view outliving its
//! texture shows up as a stale handle rather than a dangling reference.

use bitflags::bitflags;

use crate::backend::{BackendResource, DeviceResource};
use crate::buffer::MemoryUsage;
use crate::format::{Format, SampleCount, TextureAspectFlags};
use crate::handle::Handle;
use crate::sync::{AccessFlags, PipelineStageFlags};

/// Dimensionality of a texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureType {
    Tex1D,
    #[default]
    Tex2D,
    Tex3D,
    /// Six-layer 2D texture addressed as a cube.
    Cube,
}

bitflags! {
    /// Ways a texture may be bound or accessed.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct TextureUsageFlags: u32 {
        const SAMPLED = 1 << 0;
        const STORAGE = 1 << 1;
        const COLOR_ATTACHMENT = 1 << 2;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 3;
        const TRANSFER_SRC = 1 << 4;
        const TRANSFER_DST = 1 << 5;
    }
}

/// Integer offset into a texture, in texels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Offset3D {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// Size of a texture region, in texels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Extent3D {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

impl Extent3D {
    /// Creates a single-slice 2D extent.
    pub const fn new_2d(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            depth: 1,
        }
    }

    /// Number of texels covered.
    pub fn texel_count(&self) -> u64 {
        self.width as u64 * self.height as u64 * self.depth as u64
    }
}

/// Backend-level texture description.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureCreateInfo {
    pub texture_type: TextureType,
    pub mem_usage: MemoryUsage,
    pub format: Format,
    pub extent: Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: SampleCount,
    pub usage: TextureUsageFlags,
}

impl TextureCreateInfo {
    /// Describes a single-mip, single-layer, GPU-only 2D texture.
    pub fn new_2d(format: Format, width: u32, height: u32, usage: TextureUsageFlags) -> Self {
        Self {
            texture_type: TextureType::Tex2D,
            mem_usage: MemoryUsage::GpuOnly,
            format,
            extent: Extent3D::new_2d(width, height),
            mip_levels: 1,
            array_layers: 1,
            samples: SampleCount::X1,
            usage,
        }
    }

    /// Range covering every mip level and layer of the texture.
    pub fn full_range(&self) -> TextureSubresourceRange {
        TextureSubresourceRange {
            aspect: self.format.aspect_flags(),
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }
}

/// Client-level texture creation request.
#[derive(Clone, Copy, Debug)]
pub struct TextureInfo<'a> {
    pub info: TextureCreateInfo,
    /// Texel data for mip 0, layer 0. Only color formats accept it.
    pub initial_data: &'a [u8],
    pub debug_name: &'a str,
}

impl<'a> TextureInfo<'a> {
    pub fn new(info: TextureCreateInfo) -> Self {
        Self {
            info,
            initial_data: &[],
            debug_name: "",
        }
    }

    pub fn with_initial_data(mut self, data: &'a [u8]) -> Self {
        self.initial_data = data;
        self
    }

    pub fn with_debug_name(mut self, name: &'a str) -> Self {
        self.debug_name = name;
        self
    }
}

/// Pooled texture record.
#[derive(Debug)]
pub struct Texture {
    pub(crate) resource: BackendResource,
    pub(crate) info: TextureCreateInfo,
    pub(crate) from_swapchain: bool,
    pub(crate) debug_name: String,
}

impl Texture {
    #[inline]
    pub fn info(&self) -> &TextureCreateInfo {
        &self.info
    }

    /// Returns true for swapchain backbuffers, which the swapchain owns.
    #[inline]
    pub fn is_from_swapchain(&self) -> bool {
        self.from_swapchain
    }
}

impl DeviceResource for Texture {
    fn resource(&self) -> BackendResource {
        self.resource
    }

    fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

pub type TextureHandle = Handle<Texture>;

/// Layout a texture subresource is in when the GPU accesses it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureLayout {
    #[default]
    Undefined,
    General,
    ColorAttachment,
    DepthStencilAttachment,
    DepthReadOnly,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    Present,
}

/// Mip levels and array layers addressed by a view or barrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureSubresourceRange {
    pub aspect: TextureAspectFlags,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

impl TextureSubresourceRange {
    /// First mip level of the first layer.
    pub const fn single(aspect: TextureAspectFlags) -> Self {
        Self {
            aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }
}

/// One mip level of a set of layers, addressed by a copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureSubresourceLayers {
    pub aspect: TextureAspectFlags,
    pub mip_level: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

/// How a view interprets its texture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TextureViewType {
    Tex1D,
    #[default]
    Tex2D,
    Tex3D,
    Cube,
    Tex1DArray,
    Tex2DArray,
    CubeArray,
}

/// Backend-level view description.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureViewCreateInfo {
    pub view_type: TextureViewType,
    pub format: Format,
    pub subresource_range: TextureSubresourceRange,
}

/// Client-level view creation request.
#[derive(Clone, Copy, Debug)]
pub struct TextureViewInfo<'a> {
    /// Texture the view is created on. Must outlive the view.
    pub texture: TextureHandle,
    pub info: TextureViewCreateInfo,
    pub debug_name: &'a str,
}

impl<'a> TextureViewInfo<'a> {
    pub fn new(texture: TextureHandle, info: TextureViewCreateInfo) -> Self {
        Self {
            texture,
            info,
            debug_name: "",
        }
    }

    pub fn with_debug_name(mut self, name: &'a str) -> Self {
        self.debug_name = name;
        self
    }
}

/// Pooled texture view record.
#[derive(Debug)]
pub struct TextureView {
    pub(crate) resource: BackendResource,
    pub(crate) info: TextureViewCreateInfo,
    /// Non-owning reference to the viewed texture.
    pub(crate) texture: TextureHandle,
    pub(crate) from_swapchain: bool,
    pub(crate) debug_name: String,
}

impl TextureView {
    #[inline]
    pub fn info(&self) -> &TextureViewCreateInfo {
        &self.info
    }

    /// Texture this view was created on.
    #[inline]
    pub fn texture(&self) -> TextureHandle {
        self.texture
    }
}

impl DeviceResource for TextureView {
    fn resource(&self) -> BackendResource {
        self.resource
    }

    fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

pub type TextureViewHandle = Handle<TextureView>;

/// Region copied from a buffer into a texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferTextureCopyRegion {
    pub buffer_offset: u64,
    pub texture_subresource: TextureSubresourceLayers,
    pub texture_offset: Offset3D,
    pub texture_extent: Extent3D,
}

/// Layout transition of one texture, as recorded by a pipeline barrier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureMemoryBarrier {
    pub texture: BackendResource,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub old_layout: TextureLayout,
    pub new_layout: TextureLayout,
    pub subresource_range: TextureSubresourceRange,
}

/// Client-level layout transition of a whole texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureBarrier {
    pub texture: TextureHandle,
    pub src_stage: PipelineStageFlags,
    pub dst_stage: PipelineStageFlags,
    pub src_access: AccessFlags,
    pub dst_access: AccessFlags,
    pub old_layout: TextureLayout,
    pub new_layout: TextureLayout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_range_covers_all_levels() {
        let mut info = TextureCreateInfo::new_2d(
            Format::D24UnormS8Uint,
            64,
            64,
            TextureUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        );
        info.mip_levels = 4;
        let range = info.full_range();
        assert_eq!(range.level_count, 4);
        assert_eq!(range.layer_count, 1);
        assert_eq!(
            range.aspect,
            TextureAspectFlags::DEPTH | TextureAspectFlags::STENCIL
        );
    }

    #[test]
    fn test_extent_texel_count() {
        assert_eq!(Extent3D::new_2d(4, 8).texel_count(), 32);
    }
}
