//! Synchronization primitives.
//!
//! - [`Fence`] - GPU-to-CPU synchronization (for host waiting)
//! - [`Semaphore`] - GPU-to-GPU synchronization (between queue operations)
//!
//! # Overview
//!
//! Fences let the CPU learn that submitted work finished; the device keeps
//! one per frame slot and per queue to gate deferred destruction.
//! Semaphores order submissions against each other and against swapchain
//! acquire/present, and are never waited on by the CPU.

use bitflags::bitflags;

use crate::backend::{BackendResource, DeviceResource};
use crate::handle::Handle;

bitflags! {
    /// Pipeline stages a dependency waits on or signals from.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PipelineStageFlags: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const INPUT_ASSEMBLER = 1 << 1;
        const VERTEX_SHADER = 1 << 2;
        const TESSELLATION_CONTROL_SHADER = 1 << 3;
        const TESSELLATION_EVALUATION_SHADER = 1 << 4;
        const GEOMETRY_SHADER = 1 << 5;
        const FRAGMENT_SHADER = 1 << 6;
        const EARLY_FRAGMENT_TESTS = 1 << 7;
        const LATE_FRAGMENT_TESTS = 1 << 8;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 9;
        const COMPUTE_SHADER = 1 << 10;
        const TRANSFER = 1 << 11;
        const BOTTOM_OF_PIPE = 1 << 12;
        const ALL_GRAPHICS = Self::INPUT_ASSEMBLER.bits()
            | Self::VERTEX_SHADER.bits()
            | Self::TESSELLATION_CONTROL_SHADER.bits()
            | Self::TESSELLATION_EVALUATION_SHADER.bits()
            | Self::GEOMETRY_SHADER.bits()
            | Self::FRAGMENT_SHADER.bits()
            | Self::EARLY_FRAGMENT_TESTS.bits()
            | Self::LATE_FRAGMENT_TESTS.bits()
            | Self::COLOR_ATTACHMENT_OUTPUT.bits();
        const ALL_COMMANDS = 1 << 13;
    }
}

bitflags! {
    /// Memory accesses made visible or available by a barrier.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u32 {
        const INDEX_READ = 1 << 0;
        const VERTEX_ATTRIBUTE_READ = 1 << 1;
        const UNIFORM_READ = 1 << 2;
        const SHADER_READ = 1 << 3;
        const SHADER_WRITE = 1 << 4;
        const COLOR_ATTACHMENT_READ = 1 << 5;
        const COLOR_ATTACHMENT_WRITE = 1 << 6;
        const DEPTH_STENCIL_ATTACHMENT_READ = 1 << 7;
        const DEPTH_STENCIL_ATTACHMENT_WRITE = 1 << 8;
        const TRANSFER_READ = 1 << 9;
        const TRANSFER_WRITE = 1 << 10;
        const HOST_READ = 1 << 11;
        const HOST_WRITE = 1 << 12;
    }
}

/// Fence creation request.
#[derive(Clone, Copy, Debug, Default)]
pub struct FenceInfo<'a> {
    /// Create the fence already signaled, so the first wait returns at once.
    pub signaled: bool,
    pub debug_name: &'a str,
}

impl<'a> FenceInfo<'a> {
    pub fn signaled(mut self, signaled: bool) -> Self {
        self.signaled = signaled;
        self
    }

    pub fn with_debug_name(mut self, name: &'a str) -> Self {
        self.debug_name = name;
        self
    }
}

/// Pooled fence record.
#[derive(Debug)]
pub struct Fence {
    pub(crate) resource: BackendResource,
    pub(crate) debug_name: String,
}

impl DeviceResource for Fence {
    fn resource(&self) -> BackendResource {
        self.resource
    }

    fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

pub type FenceHandle = Handle<Fence>;

/// Semaphore creation request.
#[derive(Clone, Copy, Debug, Default)]
pub struct SemaphoreInfo<'a> {
    pub debug_name: &'a str,
}

impl<'a> SemaphoreInfo<'a> {
    pub fn with_debug_name(mut self, name: &'a str) -> Self {
        self.debug_name = name;
        self
    }
}

/// Pooled semaphore record.
#[derive(Debug)]
pub struct Semaphore {
    pub(crate) resource: BackendResource,
    pub(crate) debug_name: String,
}

impl DeviceResource for Semaphore {
    fn resource(&self) -> BackendResource {
        self.resource
    }

    fn debug_name(&self) -> &str {
        &self.debug_name
    }
}

pub type SemaphoreHandle = Handle<Semaphore>;
