//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::CropParams;

/// Calculate dimensions for a fixed target width, preserving aspect ratio.
///
/// # Arguments
/// * `source` - Original image dimensions (width, height)
/// * `target_width` - Width of the output in pixels
///
/// # Returns
/// * `(width, height)` - Height is rounded and never below 1
///
/// # Examples
/// ```
/// # use pixelvault::imaging::calculate_fit_width;
/// // 1600x1200 (4:3) at width 800 → 800x600
/// assert_eq!(calculate_fit_width((1600, 1200), 800), (800, 600));
/// ```
pub fn calculate_fit_width(source: (u32, u32), target_width: u32) -> (u32, u32) {
    let (src_w, src_h) = source;
    if src_w == 0 {
        return (target_width, src_h.max(1));
    }
    let h = (src_h as f64 * target_width as f64 / src_w as f64).round() as u32;
    (target_width, h.max(1))
}

/// Whether an upload at `source_width` needs downscaling to `target_width`.
///
/// Normalization only shrinks: narrower images are left alone.
pub fn needs_downscale(source_width: u32, target_width: u32) -> bool {
    source_width > target_width
}

/// Whether the crop region lies entirely inside an image of the given size.
///
/// Computed in `u64` so offsets near `u32::MAX` cannot wrap.
pub fn crop_within_bounds(image: (u32, u32), region: &CropParams) -> bool {
    let (img_w, img_h) = image;
    region.width > 0
        && region.height > 0
        && region.x as u64 + region.width as u64 <= img_w as u64
        && region.y as u64 + region.height as u64 <= img_h as u64
}
