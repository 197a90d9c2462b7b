//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the four operations every backend must
//! support: identify, resize, crop, and convert. All of them work on encoded
//! bytes in and encoded bytes out, so each pipeline stage consumes exactly
//! what the previous stage produced.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), pure Rust, built on
//! the `image` crate.

use super::params::{ConvertParams, CropParams, ResizeParams};
use crate::types::FileType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("Failed to decode image: {0}")]
    Decode(String),
    #[error("Failed to encode {format}: {reason}")]
    Encode { format: FileType, reason: String },
    #[error(
        "Crop region {width}x{height}+{x}+{y} exceeds image bounds {image_width}x{image_height}"
    )]
    CropOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        image_width: u32,
        image_height: u32,
    },
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// Authoritative facts read from encoded bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: FileType,
    pub width: u32,
    pub height: u32,
    /// Length of the encoded buffer in bytes.
    pub size: u64,
}

/// Trait for image processing backends.
///
/// Every backend must implement all four operations so the rest of the
/// codebase is backend-agnostic. Outputs of `resize` and `crop` keep the
/// input's container; only `convert` changes it.
pub trait ImageBackend: Sync {
    /// Decode the buffer and report its true format, dimensions and size.
    fn identify(&self, data: &[u8]) -> Result<ImageInfo, BackendError>;

    /// Resize to exact dimensions, re-encoding in the same container.
    fn resize(&self, data: &[u8], params: &ResizeParams) -> Result<Vec<u8>, BackendError>;

    /// Extract a sub-region, re-encoding in the same container.
    fn crop(&self, data: &[u8], params: &CropParams) -> Result<Vec<u8>, BackendError>;

    /// Re-encode into the target container.
    fn convert(&self, data: &[u8], params: &ConvertParams) -> Result<Vec<u8>, BackendError>;

    /// Resize for upload normalization, trading encoder quality for size so
    /// the output is at most `max_bytes` where the container allows it.
    fn downscale(
        &self,
        data: &[u8],
        params: &ResizeParams,
        _max_bytes: u64,
    ) -> Result<Vec<u8>, BackendError> {
        self.resize(data, params)
    }
}
