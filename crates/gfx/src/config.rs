//! Device configuration.

/// Tunables of a [`Device`](crate::Device).
///
/// # Example
///
/// ```
/// use cobalt_gfx::DeviceConfig;
///
/// let config = DeviceConfig::default()
///     .with_frames_in_flight(3)
///     .with_fence_timeout(1_000_000_000);
/// assert_eq!(config.frames_in_flight, 3);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Number of frame ring slots. Resources destroyed during a frame are
    /// freed once that slot comes around again.
    pub frames_in_flight: u32,
    /// Timeout of the frame fence wait in `new_frame`, in nanoseconds.
    pub fence_timeout: u64,
    /// Frames a cached descriptor set survives without being requested.
    /// Values below `frames_in_flight` are accepted with a warning, and a
    /// recycled set may then still be read by an in-flight frame.
    pub descriptor_set_max_unused_frames: u32,
    /// Sets allocated per backend descriptor pool.
    pub descriptor_sets_per_pool: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            fence_timeout: u64::MAX,
            descriptor_set_max_unused_frames: 10,
            descriptor_sets_per_pool: 32,
        }
    }
}

impl DeviceConfig {
    pub fn with_frames_in_flight(mut self, frames: u32) -> Self {
        self.frames_in_flight = frames;
        self
    }

    pub fn with_fence_timeout(mut self, timeout: u64) -> Self {
        self.fence_timeout = timeout;
        self
    }

    pub fn with_descriptor_set_max_unused_frames(mut self, frames: u32) -> Self {
        self.descriptor_set_max_unused_frames = frames;
        self
    }

    pub fn with_descriptor_sets_per_pool(mut self, sets: u32) -> Self {
        self.descriptor_sets_per_pool = sets;
        self
    }
}
