//! Texel formats and sample counts.

use bitflags::bitflags;

/// Texel format of a texture, view, attachment or vertex attribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Format {
    #[default]
    Undefined,
    R8Unorm,
    R8G8Unorm,
    R8G8B8A8Unorm,
    R8G8B8A8Srgb,
    B8G8R8A8Unorm,
    B8G8R8A8Srgb,
    R16G16B16A16Sfloat,
    R32Sfloat,
    R32G32Sfloat,
    R32G32B32Sfloat,
    R32G32B32A32Sfloat,
    D16Unorm,
    D32Sfloat,
    D24UnormS8Uint,
    D32SfloatS8Uint,
}

bitflags! {
    /// Aspects of a texture addressed by a view, copy or barrier.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct TextureAspectFlags: u32 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

impl Format {
    /// Returns the aspects a texture of this format has.
    pub fn aspect_flags(self) -> TextureAspectFlags {
        match self {
            Format::D16Unorm | Format::D32Sfloat => TextureAspectFlags::DEPTH,
            Format::D24UnormS8Uint | Format::D32SfloatS8Uint => {
                TextureAspectFlags::DEPTH | TextureAspectFlags::STENCIL
            }
            _ => TextureAspectFlags::COLOR,
        }
    }

    /// Returns true for depth and depth/stencil formats.
    #[inline]
    pub fn is_depth(self) -> bool {
        self.aspect_flags().contains(TextureAspectFlags::DEPTH)
    }

    /// Returns true for formats carrying a stencil aspect.
    #[inline]
    pub fn has_stencil(self) -> bool {
        self.aspect_flags().contains(TextureAspectFlags::STENCIL)
    }

    /// Returns true for color formats.
    #[inline]
    pub fn is_color(self) -> bool {
        self != Format::Undefined && self.aspect_flags() == TextureAspectFlags::COLOR
    }

    /// Size of one texel in bytes, or 0 for [`Format::Undefined`].
    pub fn texel_size(self) -> u64 {
        match self {
            Format::Undefined => 0,
            Format::R8Unorm => 1,
            Format::R8G8Unorm | Format::D16Unorm => 2,
            Format::R8G8B8A8Unorm
            | Format::R8G8B8A8Srgb
            | Format::B8G8R8A8Unorm
            | Format::B8G8R8A8Srgb
            | Format::R32Sfloat
            | Format::D32Sfloat
            | Format::D24UnormS8Uint => 4,
            Format::R16G16B16A16Sfloat | Format::R32G32Sfloat | Format::D32SfloatS8Uint => 8,
            Format::R32G32B32Sfloat => 12,
            Format::R32G32B32A32Sfloat => 16,
        }
    }
}

/// Number of samples per texel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SampleCount {
    #[default]
    X1,
    X2,
    X4,
    X8,
    X16,
    X32,
    X64,
}

impl SampleCount {
    /// Returns the sample count as a number.
    pub fn count(self) -> u32 {
        1 << self as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_flags() {
        assert_eq!(Format::R8G8B8A8Unorm.aspect_flags(), TextureAspectFlags::COLOR);
        assert_eq!(Format::D32Sfloat.aspect_flags(), TextureAspectFlags::DEPTH);
        assert!(Format::D24UnormS8Uint.has_stencil());
        assert!(Format::D24UnormS8Uint.is_depth());
        assert!(!Format::D16Unorm.has_stencil());
    }

    #[test]
    fn test_undefined_is_not_color() {
        assert!(!Format::Undefined.is_color());
        assert!(Format::B8G8R8A8Srgb.is_color());
        assert!(!Format::D32Sfloat.is_color());
    }

    #[test]
    fn test_texel_size() {
        assert_eq!(Format::R8G8B8A8Unorm.texel_size(), 4);
        assert_eq!(Format::R32G32B32Sfloat.texel_size(), 12);
        assert_eq!(Format::Undefined.texel_size(), 0);
    }

    #[test]
    fn test_sample_count() {
        assert_eq!(SampleCount::X1.count(), 1);
        assert_eq!(SampleCount::X4.count(), 4);
        assert_eq!(SampleCount::X64.count(), 64);
    }
}
