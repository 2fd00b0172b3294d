use displaydoc::Display;

/// Result type used throughout the bus interfaces
pub type Result<T> = core::result::Result<T, Error>;

/// Errors returned by bus interfaces and the devices built on them
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// insufficient memory to complete the operation
    NoMemory,
    /// store node not found
    NotFound,
    /// store transaction conflicted and must be retried
    Retry,
    /// operation was unsuccessful
    Unsuccessful,
    /// capability is not available yet
    NotReady,
    /// operation is not supported by this device
    NotSupported,
    /// buffer too small, {required} bytes required
    BufferTooSmall {
        /// Number of bytes the operation needs
        required: usize,
    },
    /// invalid parameter
    InvalidParameter,
    /// request was cancelled
    Cancelled,
    /// backend did not respond in time
    Timeout,
    /// failed to parse store value
    Parse,
    /// backend does not offer a required feature
    DeviceNotReady,
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}
