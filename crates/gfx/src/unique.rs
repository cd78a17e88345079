//! Move-only ownership of device handles.

use std::ops::Deref;

use crate::buffer::Buffer;
use crate::device::Device;
use crate::handle::Handle;
use crate::pipeline::PipelineLayout;
use crate::sampler::Sampler;
use crate::shader::Shader;
use crate::swapchain::Swapchain;
use crate::sync::{Fence, Semaphore};
use crate::texture::{Texture, TextureView};

/// Resource kinds a [`Unique`] can own.
pub trait Destroy: Sized {
    /// Hands `handle` to the matching deferred `destroy_*` of `device`.
    fn destroy(device: &Device, handle: Handle<Self>);
}

macro_rules! impl_destroy {
    ($($ty:ty => $method:ident),* $(,)?) => {
        $(
            impl Destroy for $ty {
                fn destroy(device: &Device, handle: Handle<Self>) {
                    device.$method(handle);
                }
            }
        )*
    };
}

impl_destroy! {
    Buffer => destroy_buffer,
    Texture => destroy_texture,
    TextureView => destroy_texture_view,
    Shader => destroy_shader,
    Sampler => destroy_sampler,
    Swapchain => destroy_swapchain,
    PipelineLayout => destroy_pipeline_layout,
    Fence => destroy_fence,
    Semaphore => destroy_semaphore,
}

/// Owns a handle and destroys it when dropped.
///
/// Destruction is deferred like any `destroy_*` call: the backend object
/// lives until the current frame's slot comes around again.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use cobalt_gfx::null::NullBackend;
/// use cobalt_gfx::{Device, SemaphoreInfo, Unique};
///
/// let device = Device::new(Arc::new(NullBackend::new())).unwrap();
/// {
///     let semaphore = Unique::new(&device, device.create_semaphore(&SemaphoreInfo::default()).unwrap());
///     assert!(!semaphore.is_null());
/// }
/// assert_eq!(device.stats().pending_destroys, 1);
/// ```
pub struct Unique<'d, T: Destroy> {
    device: &'d Device,
    handle: Handle<T>,
}

impl<'d, T: Destroy> Unique<'d, T> {
    pub fn new(device: &'d Device, handle: Handle<T>) -> Self {
        Self { device, handle }
    }

    #[inline]
    pub fn get(&self) -> Handle<T> {
        self.handle
    }

    /// Releases ownership without destroying the handle.
    pub fn into_inner(mut self) -> Handle<T> {
        std::mem::replace(&mut self.handle, Handle::NULL)
    }
}

impl<T: Destroy> Deref for Unique<'_, T> {
    type Target = Handle<T>;

    fn deref(&self) -> &Handle<T> {
        &self.handle
    }
}

impl<T: Destroy> Drop for Unique<'_, T> {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            T::destroy(self.device, self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::buffer::{BufferInfo, BufferUsageFlags, MemoryUsage};
    use crate::null::NullBackend;

    #[test]
    fn test_drop_queues_destroy() {
        let device = Device::new(Arc::new(NullBackend::new())).unwrap();
        let buffer = device
            .create_buffer(&BufferInfo::new(
                32,
                MemoryUsage::CpuOnly,
                BufferUsageFlags::UNIFORM_BUFFER,
            ))
            .unwrap();

        drop(Unique::new(&device, buffer));
        assert_eq!(device.stats().pending_destroys, 1);
        assert_eq!(device.stats().buffers, 1);
    }

    #[test]
    fn test_into_inner_keeps_resource() {
        let device = Device::new(Arc::new(NullBackend::new())).unwrap();
        let buffer = device
            .create_buffer(&BufferInfo::new(
                32,
                MemoryUsage::CpuOnly,
                BufferUsageFlags::UNIFORM_BUFFER,
            ))
            .unwrap();

        let released = Unique::new(&device, buffer).into_inner();
        assert_eq!(released, buffer);
        assert_eq!(device.stats().pending_destroys, 0);
        device.destroy_buffer(released);
    }
}
