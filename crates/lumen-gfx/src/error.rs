use std::path::PathBuf;

use thiserror::Error;

use crate::decode::PixelFormat;

/// Failure to read or decode the image file.
#[derive(Debug, Error)]
#[error("failed to decode image {path:?}")]
pub struct DecodeError {
    pub path: PathBuf,
    #[source]
    pub source: image::ImageError,
}

/// Failure while turning decoded pixels into a GPU texture.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The decoder produced a layout this pipeline does not handle. There is
    /// no conversion path; this is a precondition violation.
    #[error("unsupported pixel format {0:?}; only {supported:?} is handled", supported = PixelFormat::Rgba8UnormSrgb)]
    UnsupportedFormat(PixelFormat),
    #[error("image dimensions {width}x{height} exceed the device limit of {limit}")]
    TooLarge { width: u32, height: u32, limit: u32 },
    /// Device-level texture creation or write failure (validation,
    /// out-of-memory). Never retried here.
    #[error("device error during texture upload: {0}")]
    Device(wgpu::Error),
}

/// Failure while creating a GPU device.
#[derive(Debug, Error)]
pub enum CreateDeviceError {
    #[error("no suitable GPU adapter found (hardware or software fallback)")]
    NoAdapter,
    #[error("device request failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    /// The device was removed again while it was being created.
    #[error("device removed during creation")]
    Removed,
    /// The device was reset while it was being created.
    #[error("device reset during creation")]
    Reset,
}

impl CreateDeviceError {
    /// Whether the recovery loop may retry after this error. Only the
    /// removed/reset class is retried; everything else is fatal.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Removed | Self::Reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_classification() {
        assert!(CreateDeviceError::Removed.is_recoverable());
        assert!(CreateDeviceError::Reset.is_recoverable());
        assert!(!CreateDeviceError::NoAdapter.is_recoverable());
    }
}
