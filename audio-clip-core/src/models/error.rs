use thiserror::Error;

/// Errors raised by buffering, capture, and clip encoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClipError {
    /// The device id cannot be resolved, or the OS refused to open it.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("permission denied")]
    PermissionDenied,

    /// An operation reached a buffer, collection, or session after teardown.
    #[error("object disposed: {0}")]
    ObjectDisposed(String),

    /// Normalization or transcoding of a saved clip failed.
    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    /// No active buffer exists for the device id.
    #[error("no active buffer for device: {0}")]
    KeyNotFound(String),

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl ClipError {
    /// Collapse OS-level open failures into the single error the owner sees.
    pub fn into_device_unavailable(self, device_id: &str) -> Self {
        match self {
            Self::DeviceUnavailable(_) => self,
            Self::PermissionDenied => {
                Self::DeviceUnavailable(format!("{device_id}: permission denied"))
            }
            other => Self::DeviceUnavailable(format!("{device_id}: {other}")),
        }
    }
}

impl From<std::io::Error> for ClipError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}
