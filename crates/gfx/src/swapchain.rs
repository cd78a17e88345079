//! Swapchain records.
//!
//! A swapchain is created from a native window handle supplied by the
//! windowing layer. Its backbuffers are registered as ordinary
//! [`Texture`](crate::texture::Texture) and
//! [`TextureView`](crate::texture::TextureView) records flagged as coming
//! from the swapchain, so render passes can target them like any other
//! attachment. Those records are owned by the swapchain: they are freed
//! with it and never destroyed through the texture destroy path.
//!
//! This layer does not resize swapchains; on a resize notification the
//! application destroys the swapchain and creates a new one.

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::backend::{BackendResource, DeviceResource};
use crate::format::Format;
use crate::handle::Handle;
use crate::texture::{Extent3D, TextureHandle, TextureViewHandle};

/// Presentation mode, in order of preference for tear-free low latency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PresentMode {
    Mailbox,
    /// Always supported; vsync.
    #[default]
    Fifo,
    FifoRelaxed,
    Immediate,
}

/// Backend-level swapchain description.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainCreateInfo {
    /// Native window to present to. `None` for headless backends.
    pub window: Option<RawWindowHandle>,
    pub display: Option<RawDisplayHandle>,
    pub width: u32,
    pub height: u32,
    /// Minimum number of backbuffers requested.
    pub image_count: u32,
    pub present_mode: PresentMode,
}

impl SwapchainCreateInfo {
    /// Describes a double-buffered FIFO swapchain without a window.
    pub fn headless(width: u32, height: u32) -> Self {
        Self {
            window: None,
            display: None,
            width,
            height,
            image_count: 2,
            present_mode: PresentMode::Fifo,
        }
    }
}

/// Client-level swapchain creation request.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainInfo<'a> {
    pub info: SwapchainCreateInfo,
    pub debug_name: &'a str,
}

impl<'a> SwapchainInfo<'a> {
    pub fn new(info: SwapchainCreateInfo) -> Self {
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

/// Pooled swapchain record.
#[derive(Debug)]
pub struct Swapchain {
    pub(crate) resource: BackendResource,
    pub(crate) format: Format,
    pub(crate) extent: Extent3D,
    pub(crate) textures: Vec<TextureHandle>,
    pub(crate) views: Vec<TextureViewHandle>,
    /// Image index returned by the last successful acquire.
    pub(crate) current_image: u32,
    /// True between a successful acquire and the matching present.
    pub(crate) acquired: bool,
    pub(crate) debug_name: String,
}

impl Swapchain {
    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> Extent3D {
        self.extent
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.textures.len()
    }

    #[inline]
    pub fn current_image(&self) -> u32 {
        self.current_image
    }

    /// View of the image most recently acquired.
    pub fn backbuffer_view(&self) -> TextureViewHandle {
        self.views
            .get(self.current_image as usize)
            .copied()
            .unwrap_or_default()
    }
}

impl DeviceResource for Swapchain {
    fn resource(&self) -> BackendResource {
        self.resource
    }

    fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

pub type SwapchainHandle = Handle<Swapchain>;
