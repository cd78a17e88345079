//! Backend error codes.

use thiserror::Error;

/// Error returned by device and backend operations.
///
/// Mirrors the result codes a backend reports. Success is `Ok(_)`;
/// [`GfxError::Timeout`] is the only non-fatal variant and is surfaced
/// to the caller rather than treated as a failure by the device.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GfxError {
    /// A wait or acquire did not complete within its timeout.
    #[error("operation timed out")]
    Timeout,

    /// The backend failed for an unspecified reason.
    #[error("unknown backend error")]
    Unknown,

    /// Device-local memory is exhausted.
    #[error("out of device memory")]
    OutOfDeviceMemory,

    /// Host memory is exhausted.
    #[error("out of host memory")]
    OutOfHostMemory,

    /// A creation parameter was rejected.
    #[error("invalid parameter")]
    InvalidParameter,

    /// A backend object could not be initialized.
    #[error("initialization failed")]
    InitializationFailed,
}

impl GfxError {
    /// Returns the numeric result code (`Success` is 0, `Timeout` is 1,
    /// errors are negative).
    pub fn code(self) -> i32 {
        match self {
            GfxError::Timeout => 1,
            GfxError::Unknown => -1,
            GfxError::OutOfDeviceMemory => -2,
            GfxError::OutOfHostMemory => -3,
            GfxError::InvalidParameter => -4,
            GfxError::InitializationFailed => -5,
        }
    }

    /// Returns true for [`GfxError::Timeout`].
    #[inline]
    pub fn is_timeout(self) -> bool {
        self == GfxError::Timeout
    }
}

/// Result type alias for gfx operations.
pub type GfxResult<T> = std::result::Result<T, GfxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_codes() {
        assert_eq!(GfxError::Timeout.code(), 1);
        assert_eq!(GfxError::Unknown.code(), -1);
        assert_eq!(GfxError::OutOfDeviceMemory.code(), -2);
        assert_eq!(GfxError::OutOfHostMemory.code(), -3);
        assert_eq!(GfxError::InvalidParameter.code(), -4);
        assert_eq!(GfxError::InitializationFailed.code(), -5);
    }

    #[test]
    fn test_only_timeout_is_timeout() {
        assert!(GfxError::Timeout.is_timeout());
        assert!(!GfxError::OutOfDeviceMemory.is_timeout());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(GfxError::OutOfHostMemory.to_string(), "out of host memory");
    }
}
