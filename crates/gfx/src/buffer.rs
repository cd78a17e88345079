//! GPU buffer descriptions and records.
//!
//! # Overview
//!
//! - [`BufferUsageFlags`] and [`MemoryUsage`] describe how a buffer is used
//!   and where its memory lives
//! - [`BufferInfo`] is what client code passes to
//!   [`Device::create_buffer`](crate::device::Device::create_buffer),
//!   optionally carrying initial content
//! - [`Buffer`] is the pooled record behind a [`BufferHandle`]
//!
//! # Example
//!
//! ```
//! use cobalt_gfx::buffer::{BufferInfo, BufferUsageFlags, MemoryUsage};
//!
//! let vertices: [f32; 6] = [0.0, 0.5, -0.5, -0.5, 0.5, -0.5];
//! let info = BufferInfo::new(24, MemoryUsage::GpuOnly, BufferUsageFlags::VERTEX_BUFFER)
//!     .with_pod_data(&vertices)
//!     .with_debug_name("triangle");
//! assert_eq!(info.initial_data.len(), 24);
//! ```

use bitflags::bitflags;
use bytemuck::Pod;

use crate::backend::{BackendResource, DeviceResource};
use crate::handle::Handle;

bitflags! {
    /// Ways a buffer may be bound or accessed.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct BufferUsageFlags: u32 {
        const VERTEX_BUFFER = 1 << 0;
        const INDEX_BUFFER = 1 << 1;
        const UNIFORM_BUFFER = 1 << 2;
        const STORAGE_BUFFER = 1 << 3;
        const TRANSFER_SRC = 1 << 4;
        const TRANSFER_DST = 1 << 5;
    }
}

/// Where the memory backing a resource lives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum MemoryUsage {
    /// Host memory, mappable; typical for staging.
    #[default]
    CpuOnly,
    /// Device-local memory, not mappable.
    GpuOnly,
    /// Mappable memory the GPU reads efficiently; typical for uniforms.
    CpuToGpu,
    /// Mappable memory the GPU writes for readback.
    GpuToCpu,
}

impl MemoryUsage {
    /// Returns true if the memory can be mapped and written by the CPU.
    #[inline]
    pub fn is_host_visible(self) -> bool {
        self != MemoryUsage::GpuOnly
    }
}

/// Backend-level buffer description.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferCreateInfo {
    /// Size in bytes.
    pub size: u64,
    pub mem_usage: MemoryUsage,
    pub usage: BufferUsageFlags,
}

/// Client-level buffer creation request.
#[derive(Clone, Copy, Debug)]
pub struct BufferInfo<'a> {
    pub info: BufferCreateInfo,
    /// Bytes copied into the buffer right after creation. May be shorter
    /// than the buffer; the remainder is left undefined.
    pub initial_data: &'a [u8],
    pub debug_name: &'a str,
}

impl<'a> BufferInfo<'a> {
    /// Describes a buffer without initial content.
    pub fn new(size: u64, mem_usage: MemoryUsage, usage: BufferUsageFlags) -> Self {
        Self {
            info: BufferCreateInfo {
                size,
                mem_usage,
                usage,
            },
            initial_data: &[],
            debug_name: "",
        }
    }

    /// Describes a CPU-only transfer source holding `data`.
    pub fn staging(data: &'a [u8]) -> Self {
        Self::new(
            data.len() as u64,
            MemoryUsage::CpuOnly,
            BufferUsageFlags::TRANSFER_SRC,
        )
        .with_initial_data(data)
    }

    /// Sets the initial content.
    pub fn with_initial_data(mut self, data: &'a [u8]) -> Self {
        self.initial_data = data;
        self
    }

    /// Sets the initial content from plain-old-data values.
    pub fn with_pod_data<T: Pod>(self, data: &'a [T]) -> Self {
        self.with_initial_data(bytemuck::cast_slice(data))
    }

    pub fn with_debug_name(mut self, name: &'a str) -> Self {
        self.debug_name = name;
        self
    }
}

/// Region copied by a buffer-to-buffer copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferCopyRegion {
    pub src_offset: u64,
    pub dst_offset: u64,
    pub size: u64,
}

/// Width of the indices in an index buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IndexType {
    Uint16,
    #[default]
    Uint32,
}

/// Pooled buffer record.
#[derive(Debug)]
pub struct Buffer {
    pub(crate) resource: BackendResource,
    pub(crate) info: BufferCreateInfo,
    pub(crate) debug_name: String,
}

impl Buffer {
    /// Creation description (with the usage flags the device added).
    #[inline]
    pub fn info(&self) -> &BufferCreateInfo {
        &self.info
    }
}

impl DeviceResource for Buffer {
    fn resource(&self) -> BackendResource {
        self.resource
    }

    fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

/// Handle to a pooled [`Buffer`].
pub type BufferHandle = Handle<Buffer>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_usage_host_visibility() {
        assert!(MemoryUsage::CpuOnly.is_host_visible());
        assert!(MemoryUsage::CpuToGpu.is_host_visible());
        assert!(MemoryUsage::GpuToCpu.is_host_visible());
        assert!(!MemoryUsage::GpuOnly.is_host_visible());
    }

    #[test]
    fn test_staging_info() {
        let data = [1u8, 2, 3, 4];
        let info = BufferInfo::staging(&data);
        assert_eq!(info.info.size, 4);
        assert_eq!(info.info.mem_usage, MemoryUsage::CpuOnly);
        assert_eq!(info.info.usage, BufferUsageFlags::TRANSFER_SRC);
        assert_eq!(info.initial_data, &data);
    }

    #[test]
    fn test_pod_data_is_byte_cast() {
        let values = [1u32, 2];
        let info = BufferInfo::new(8, MemoryUsage::CpuOnly, BufferUsageFlags::UNIFORM_BUFFER)
            .with_pod_data(&values);
        assert_eq!(info.initial_data, bytemuck::cast_slice::<u32, u8>(&values));
    }
}
