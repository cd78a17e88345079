//! Render pass descriptions.
//!
//! Client code describes a pass with [`RenderPassInfo`]: the views to
//! render into, which of them to clear, load or store, and the subpasses.
//! The device derives a backend [`RenderPassCreateInfo`] from it (which is
//! the render pass cache key) and a [`Framebuffer`] naming the backend
//! views.

use crate::backend::BackendResource;
use crate::format::{Format, SampleCount};
use crate::texture::{TextureLayout, TextureViewHandle};

/// Maximum number of color attachments in a framebuffer.
pub const MAX_ATTACHMENTS: usize = 8;

/// What happens to an attachment's content when a pass begins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AttachmentLoadOp {
    Load,
    Clear,
    #[default]
    DontCare,
}

/// What happens to an attachment's content when a pass ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AttachmentStoreOp {
    Store,
    #[default]
    DontCare,
}

/// Description of one attachment of a render pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttachmentDescription {
    pub format: Format,
    pub samples: SampleCount,
    pub load_op: AttachmentLoadOp,
    pub store_op: AttachmentStoreOp,
    pub stencil_load_op: AttachmentLoadOp,
    pub stencil_store_op: AttachmentStoreOp,
    pub initial_layout: TextureLayout,
    pub final_layout: TextureLayout,
}

/// Reference from a subpass to an attachment of its render pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AttachmentReference {
    /// Index into [`RenderPassCreateInfo::attachments`].
    pub attachment: u32,
    /// Layout the attachment is in during the subpass.
    pub layout: TextureLayout,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct SubpassDescription {
    pub input_attachments: Vec<AttachmentReference>,
    pub color_attachments: Vec<AttachmentReference>,
    pub resolve_attachments: Vec<AttachmentReference>,
    pub depth_stencil_attachment: Option<AttachmentReference>,
    pub preserve_attachments: Vec<u32>,
}

/// Backend-level render pass description and render pass cache key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RenderPassCreateInfo {
    pub attachments: Vec<AttachmentDescription>,
    pub subpasses: Vec<SubpassDescription>,
}

/// Integer rectangle, used for render areas and scissors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect2D {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect2D {
    /// Rectangle anchored at the origin.
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

/// Value an attachment is cleared to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

/// Backend views bound as attachments for one render pass instance.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Framebuffer {
    /// Color attachments first, then the depth/stencil attachment if any.
    pub attachments: Vec<BackendResource>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

/// How a subpass accesses the depth/stencil attachment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DepthStencilMode {
    #[default]
    ReadWrite,
    ReadOnly,
}

/// Subpass of a [`RenderPassInfo`], addressing attachments by index.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubpassInfo {
    pub color_attachments: Vec<u32>,
    pub input_attachments: Vec<u32>,
    pub resolve_attachments: Vec<u32>,
    pub depth_stencil_mode: DepthStencilMode,
}

/// Client-level description of a render pass instance.
///
/// Bit `i` of each `*_attachment_flags` mask refers to
/// `color_attachments[i]`. The depth/stencil attachment, when present, is
/// always cleared and stored.
#[derive(Clone, Debug, Default)]
pub struct RenderPassInfo {
    pub render_area: Rect2D,
    pub color_attachments: Vec<TextureViewHandle>,
    /// Null when the pass has no depth/stencil attachment.
    pub depth_stencil_attachment: TextureViewHandle,
    pub clear_attachment_flags: u32,
    pub load_attachment_flags: u32,
    pub store_attachment_flags: u32,
    /// One per attachment, in framebuffer order.
    pub clear_values: Vec<ClearValue>,
    /// Empty means one subpass writing every color attachment.
    pub subpasses: Vec<SubpassInfo>,
}

impl RenderPassInfo {
    /// Renders into `color` over `render_area`, clearing and storing it.
    pub fn single_color(color: TextureViewHandle, render_area: Rect2D, clear: [f32; 4]) -> Self {
        Self {
            render_area,
            color_attachments: vec![color],
            clear_attachment_flags: 1,
            store_attachment_flags: 1,
            clear_values: vec![ClearValue::Color(clear)],
            ..Default::default()
        }
    }

    /// Adds a depth/stencil attachment cleared to `depth`.
    pub fn with_depth(mut self, view: TextureViewHandle, depth: f32) -> Self {
        self.depth_stencil_attachment = view;
        self.clear_values
            .push(ClearValue::DepthStencil { depth, stencil: 0 });
        self
    }

    pub(crate) fn effective_subpasses(&self) -> Vec<SubpassInfo> {
        if !self.subpasses.is_empty() {
            return self.subpasses.clone();
        }
        vec![SubpassInfo {
            color_attachments: (0..self.color_attachments.len() as u32).collect(),
            ..Default::default()
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_subpass_writes_all_colors() {
        let info = RenderPassInfo {
            color_attachments: vec![TextureViewHandle::NULL; 3],
            ..Default::default()
        };
        let subpasses = info.effective_subpasses();
        assert_eq!(subpasses.len(), 1);
        assert_eq!(subpasses[0].color_attachments, vec![0, 1, 2]);
    }

    #[test]
    fn test_single_color_flags() {
        let info =
            RenderPassInfo::single_color(TextureViewHandle::NULL, Rect2D::from_size(4, 4), [0.0; 4]);
        assert_eq!(info.clear_attachment_flags, 1);
        assert_eq!(info.store_attachment_flags, 1);
        assert_eq!(info.load_attachment_flags, 0);
        assert!(info.depth_stencil_attachment.is_null());
    }
}
