//! Texture samplers.

use crate::backend::{BackendResource, DeviceResource};
use crate::handle::Handle;
use crate::pipeline::CompareOp;

/// Texel filtering.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

/// Filtering between mip levels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SamplerMipmapMode {
    Nearest,
    #[default]
    Linear,
}

/// Behavior for coordinates outside `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SamplerAddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

/// Backend-level sampler description.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplerCreateInfo {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_mode: SamplerMipmapMode,
    pub address_mode_u: SamplerAddressMode,
    pub address_mode_v: SamplerAddressMode,
    pub address_mode_w: SamplerAddressMode,
    pub mip_lod_bias: f32,
    /// Maximum anisotropy, or `None` to disable anisotropic filtering.
    pub max_anisotropy: Option<f32>,
    /// Comparison for shadow samplers.
    pub compare_op: Option<CompareOp>,
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerCreateInfo {
    fn default() -> Self {
        Self {
            mag_filter: Filter::Linear,
            min_filter: Filter::Linear,
            mipmap_mode: SamplerMipmapMode::Linear,
            address_mode_u: SamplerAddressMode::Repeat,
            address_mode_v: SamplerAddressMode::Repeat,
            address_mode_w: SamplerAddressMode::Repeat,
            mip_lod_bias: 0.0,
            max_anisotropy: None,
            compare_op: None,
            min_lod: 0.0,
            max_lod: f32::MAX,
        }
    }
}

/// Client-level sampler creation request.
#[derive(Clone, Copy, Debug, Default)]
pub struct SamplerInfo<'a> {
    pub info: SamplerCreateInfo,
    pub debug_name: &'a str,
}

impl<'a> SamplerInfo<'a> {
    pub fn new(info: SamplerCreateInfo) -> Self {
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

/// Pooled sampler record.
#[derive(Debug)]
pub struct Sampler {
    pub(crate) resource: BackendResource,
    pub(crate) debug_name: String,
}

impl DeviceResource for Sampler {
    fn resource(&self) -> BackendResource {
        self.resource
    }

    fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

pub type SamplerHandle = Handle<Sampler>;
