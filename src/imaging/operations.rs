//! High-level image operations.
//!
//! These functions combine calculations with backend execution.
//! They take configuration, compute parameters, and call the backend.

use super::backend::{BackendError, ImageBackend, ImageInfo};
use super::calculations::{calculate_fit_width, needs_downscale};
use super::params::{ResizeParams, Transformation};
use tracing::debug;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Read authoritative metadata from encoded bytes.
pub fn get_info(backend: &impl ImageBackend, data: &[u8]) -> Result<ImageInfo> {
    backend.identify(data)
}

/// Configuration for upload normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeConfig {
    /// Buffers at or above this many bytes are candidates for downscaling.
    pub threshold: u64,
    /// Target width for downscaled uploads.
    pub width: u32,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            threshold: 100 * 1024,
            width: 800,
        }
    }
}

/// Plan the normalization resize without executing it.
///
/// Returns `None` when the buffer is under the threshold or the image is
/// already no wider than the target.
pub fn plan_normalization(
    buffer_len: u64,
    info: &ImageInfo,
    config: &NormalizeConfig,
) -> Option<ResizeParams> {
    if buffer_len < config.threshold || !needs_downscale(info.width, config.width) {
        return None;
    }
    let (width, height) = calculate_fit_width((info.width, info.height), config.width);
    Some(ResizeParams { width, height })
}

/// Downscale an oversized upload in place of the original buffer.
///
/// Buffers under the threshold pass through untouched (same allocation,
/// same bytes). The backend receives the original length as the byte
/// budget for the downscaled output.
pub fn normalize(
    backend: &impl ImageBackend,
    data: Vec<u8>,
    config: &NormalizeConfig,
) -> Result<Vec<u8>> {
    if (data.len() as u64) < config.threshold {
        return Ok(data);
    }
    let info = backend.identify(&data)?;
    match plan_normalization(data.len() as u64, &info, config) {
        Some(params) => {
            debug!(
                from_width = info.width,
                from_height = info.height,
                to_width = params.width,
                to_height = params.height,
                bytes = data.len(),
                "normalizing upload"
            );
            backend.downscale(&data, &params, data.len() as u64)
        }
        None => Ok(data),
    }
}

/// Apply transformations in order, each consuming the previous output.
///
/// Stops at the first failing step; nothing partial is returned.
pub fn apply_transformations(
    backend: &impl ImageBackend,
    data: Vec<u8>,
    steps: &[Transformation],
) -> Result<Vec<u8>> {
    steps.iter().try_fold(data, |buffer, step| {
        debug!(step = step.key(), bytes = buffer.len(), "applying transformation");
        match step {
            Transformation::Resize(params) => backend.resize(&buffer, params),
            Transformation::Crop(params) => backend.crop(&buffer, params),
            Transformation::Format(params) => backend.convert(&buffer, params),
        }
    })
}
