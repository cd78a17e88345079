//! Handle-based GPU device over an explicit backend.
//!
//! This crate provides the device-resource and frame-synchronization core
//! of a renderer. It handles:
//! - Typed, generation-checked handles to pooled resource records
//! - Deferred destruction through a ring of in-flight frames
//! - Render pass and pipeline caches keyed by their full description
//! - Per-thread command pools and per-frame submission
//! - Descriptor set caching with frame-based eviction
//!
//! Every GPU object is created through a [`Backend`]. [`null::NullBackend`]
//! implements it in host memory for tests and headless runs; the `vulkan`
//! feature adds conversions for backends built on `ash`.

mod cache;
mod config;
mod error;
mod frame;
mod recording;
mod unique;

pub mod backend;
pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod format;
pub mod handle;
pub mod null;
pub mod pipeline;
pub mod pool;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;

#[cfg(feature = "vulkan")]
pub mod vulkan;

pub use backend::{Backend, BackendResource, DeviceResource, SubmitInfo};
pub use buffer::{BufferCreateInfo, BufferHandle, BufferInfo, BufferUsageFlags, MemoryUsage};
pub use command::{CommandListHandle, QueueType};
pub use config::DeviceConfig;
pub use device::{Device, DeviceStats};
pub use error::{GfxError, GfxResult};
pub use format::{Format, SampleCount};
pub use handle::Handle;
pub use pipeline::{PipelineLayoutHandle, PipelineLayoutInfo};
pub use render_pass::{Rect2D, RenderPassInfo};
pub use sampler::{SamplerHandle, SamplerInfo};
pub use shader::{ShaderHandle, ShaderInfo, ShaderStage};
pub use swapchain::{SwapchainHandle, SwapchainInfo};
pub use sync::{FenceHandle, FenceInfo, SemaphoreHandle, SemaphoreInfo};
pub use texture::{TextureHandle, TextureInfo, TextureViewHandle, TextureViewInfo};
pub use unique::{Destroy, Unique};
