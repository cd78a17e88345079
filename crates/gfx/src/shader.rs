//! Shader modules.
//!
//! Shader bytecode is an opaque blob produced by an external compiler;
//! the device only checks it is non-empty and word-aligned before handing
//! it to the backend.
//!
//! # Overview
//!
//! - [`ShaderStage`] names the pipeline stage a module is used in
//! - [`ShaderInfo`] is what client code passes to
//!   [`Device::create_shader`](crate::device::Device::create_shader)
//! - [`Shader`] is the pooled record behind a [`ShaderHandle`]

use bitflags::bitflags;

use crate::backend::{BackendResource, DeviceResource};
use crate::handle::Handle;

/// Pipeline stage a shader module runs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    TessControl,
    TessEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// Returns the stage as a single-bit stage mask.
    pub fn flags(self) -> ShaderStageFlags {
        match self {
            Self::Vertex => ShaderStageFlags::VERTEX,
            Self::TessControl => ShaderStageFlags::TESSELLATION_CONTROL,
            Self::TessEvaluation => ShaderStageFlags::TESSELLATION_EVALUATION,
            Self::Geometry => ShaderStageFlags::GEOMETRY,
            Self::Fragment => ShaderStageFlags::FRAGMENT,
            Self::Compute => ShaderStageFlags::COMPUTE,
        }
    }

    /// Whether the stage belongs to the graphics pipeline.
    pub fn is_graphics(self) -> bool {
        self != Self::Compute
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Vertex => "vertex",
            Self::TessControl => "tess-control",
            Self::TessEvaluation => "tess-eval",
            Self::Geometry => "geometry",
            Self::Fragment => "fragment",
            Self::Compute => "compute",
        })
    }
}

bitflags! {
    /// Set of shader stages, used for binding visibility.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ShaderStageFlags: u32 {
        const VERTEX = 1 << 0;
        const TESSELLATION_CONTROL = 1 << 1;
        const TESSELLATION_EVALUATION = 1 << 2;
        const GEOMETRY = 1 << 3;
        const FRAGMENT = 1 << 4;
        const COMPUTE = 1 << 5;
        const ALL_GRAPHICS = Self::VERTEX.bits()
            | Self::TESSELLATION_CONTROL.bits()
            | Self::TESSELLATION_EVALUATION.bits()
            | Self::GEOMETRY.bits()
            | Self::FRAGMENT.bits();
    }
}

/// Backend-level shader module description.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShaderCreateInfo<'a> {
    pub stage: ShaderStage,
    /// Compiled bytecode. Must be non-empty and a multiple of 4 bytes.
    pub bytecode: &'a [u8],
}

/// Client-level shader creation request.
#[derive(Clone, Copy, Debug)]
pub struct ShaderInfo<'a> {
    pub info: ShaderCreateInfo<'a>,
    pub debug_name: &'a str,
}

impl<'a> ShaderInfo<'a> {
    pub fn new(stage: ShaderStage, bytecode: &'a [u8]) -> Self {
        Self {
            info: ShaderCreateInfo { stage, bytecode },
            debug_name: "",
        }
    }

    pub fn with_debug_name(mut self, name: &'a str) -> Self {
        self.debug_name = name;
        self
    }
}

/// Pooled shader record.
#[derive(Debug)]
pub struct Shader {
    pub(crate) resource: BackendResource,
    pub(crate) stage: ShaderStage,
    pub(crate) debug_name: String,
}

impl Shader {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }
}

impl DeviceResource for Shader {
    fn resource(&self) -> BackendResource {
        self.resource
    }

    fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

pub type ShaderHandle = Handle<Shader>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_flags_are_single_bits() {
        for stage in [
            ShaderStage::Vertex,
            ShaderStage::Fragment,
            ShaderStage::Compute,
            ShaderStage::Geometry,
            ShaderStage::TessControl,
            ShaderStage::TessEvaluation,
        ] {
            assert_eq!(stage.flags().bits().count_ones(), 1, "{stage}");
        }
    }

    #[test]
    fn test_all_graphics_excludes_compute() {
        assert!(ShaderStageFlags::ALL_GRAPHICS.contains(ShaderStageFlags::FRAGMENT));
        assert!(!ShaderStageFlags::ALL_GRAPHICS.contains(ShaderStageFlags::COMPUTE));
        assert!(ShaderStage::Geometry.is_graphics());
        assert!(!ShaderStage::Compute.is_graphics());
    }
}
