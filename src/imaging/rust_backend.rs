//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Sniff container | `image::guess_format` (magic bytes, not file names) |
//! | Decode (PNG, JPEG) | `image::load_from_memory_with_format` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Crop | `DynamicImage::crop_imm` after a bounds check |
//! | Encode → PNG | `image::codecs::png::PngEncoder` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` at the configured [`Quality`] |
//!
//! Every operation fully decodes its input, so a buffer with a valid header
//! but a truncated body is rejected at the first stage that touches it.
//!
//! Normalization ([`ImageBackend::downscale`]) must not grow the upload. PNG
//! output is written at maximum compression; JPEG output steps the quality
//! down from the configured value until it fits the byte budget.

use super::backend::{BackendError, ImageBackend, ImageInfo};
use super::calculations::crop_within_bounds;
use super::params::{ConvertParams, CropParams, Quality, ResizeParams};
use crate::types::FileType;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageFormat};
use tracing::{debug, warn};

/// Quality decrement between attempts when fitting a JPEG into a budget.
const QUALITY_STEP: u32 = 10;

/// Pure Rust backend using the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend {
    quality: Quality,
}

impl RustBackend {
    pub fn new() -> Self {
        Self::with_quality(Quality::default())
    }

    pub fn with_quality(quality: Quality) -> Self {
        Self { quality }
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn to_image_format(file_type: FileType) -> ImageFormat {
    match file_type {
        FileType::Png => ImageFormat::Png,
        FileType::Jpeg => ImageFormat::Jpeg,
    }
}

/// Identify the container from magic bytes.
fn sniff_format(data: &[u8]) -> Result<FileType, BackendError> {
    let format = image::guess_format(data)
        .map_err(|e| BackendError::Decode(format!("Unrecognized image data: {}", e)))?;
    match format {
        ImageFormat::Png => Ok(FileType::Png),
        ImageFormat::Jpeg => Ok(FileType::Jpeg),
        other => Err(BackendError::UnsupportedFormat(format!("{:?}", other))),
    }
}

/// Decode an in-memory image, returning it with its container.
fn load_image(data: &[u8]) -> Result<(DynamicImage, FileType), BackendError> {
    let file_type = sniff_format(data)?;
    let img = image::load_from_memory_with_format(data, to_image_format(file_type))
        .map_err(|e| BackendError::Decode(format!("{} data: {}", file_type, e)))?;
    Ok((img, file_type))
}

fn check_target(params: &ResizeParams) -> Result<(), BackendError> {
    if params.width == 0 || params.height == 0 {
        return Err(BackendError::ProcessingFailed(format!(
            "Cannot resize to {}x{}",
            params.width, params.height
        )));
    }
    Ok(())
}

fn encode_error(file_type: FileType) -> impl FnOnce(image::ImageError) -> BackendError {
    move |e| BackendError::Encode {
        format: file_type,
        reason: e.to_string(),
    }
}

fn encode_png(img: &DynamicImage, compression: CompressionType) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buf, compression, PngFilter::Adaptive);
    img.write_with_encoder(encoder)
        .map_err(encode_error(FileType::Png))?;
    Ok(buf)
}

fn encode_jpeg(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value() as u8);
    // JPEG has no alpha channel and no 16-bit mode
    let result = match img.color() {
        ColorType::L8 | ColorType::Rgb8 => img.write_with_encoder(encoder),
        _ => DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder),
    };
    result.map_err(encode_error(FileType::Jpeg))?;
    Ok(buf)
}

/// Encode a decoded image into the given container.
fn encode_image(
    img: &DynamicImage,
    file_type: FileType,
    quality: Quality,
) -> Result<Vec<u8>, BackendError> {
    match file_type {
        FileType::Png => encode_png(img, CompressionType::Default),
        FileType::Jpeg => encode_jpeg(img, quality),
    }
}

/// Encode as JPEG at the highest quality, from `start` down, that fits
/// `max_bytes`. Quality 1 is returned even if it still does not fit.
fn encode_jpeg_within(
    img: &DynamicImage,
    start: Quality,
    max_bytes: u64,
) -> Result<Vec<u8>, BackendError> {
    let mut quality = start;
    loop {
        let out = encode_jpeg(img, quality)?;
        if out.len() as u64 <= max_bytes || quality.value() <= 1 {
            debug!(
                quality = quality.value(),
                bytes = out.len(),
                max_bytes,
                "encoded within budget"
            );
            return Ok(out);
        }
        quality = Quality::new(quality.value().saturating_sub(QUALITY_STEP));
    }
}

impl ImageBackend for RustBackend {
    fn identify(&self, data: &[u8]) -> Result<ImageInfo, BackendError> {
        let (img, format) = load_image(data)?;
        Ok(ImageInfo {
            format,
            width: img.width(),
            height: img.height(),
            size: data.len() as u64,
        })
    }

    fn resize(&self, data: &[u8], params: &ResizeParams) -> Result<Vec<u8>, BackendError> {
        check_target(params)?;
        let (img, format) = load_image(data)?;
        let resized = img.resize_exact(params.width, params.height, FilterType::Lanczos3);
        encode_image(&resized, format, self.quality)
    }

    fn crop(&self, data: &[u8], params: &CropParams) -> Result<Vec<u8>, BackendError> {
        let (img, format) = load_image(data)?;
        if !crop_within_bounds((img.width(), img.height()), params) {
            return Err(BackendError::CropOutOfBounds {
                x: params.x,
                y: params.y,
                width: params.width,
                height: params.height,
                image_width: img.width(),
                image_height: img.height(),
            });
        }
        let cropped = img.crop_imm(params.x, params.y, params.width, params.height);
        encode_image(&cropped, format, self.quality)
    }

    fn convert(&self, data: &[u8], params: &ConvertParams) -> Result<Vec<u8>, BackendError> {
        let (img, _) = load_image(data)?;
        encode_image(&img, params.target, self.quality)
    }

    fn downscale(
        &self,
        data: &[u8],
        params: &ResizeParams,
        max_bytes: u64,
    ) -> Result<Vec<u8>, BackendError> {
        check_target(params)?;
        let (img, format) = load_image(data)?;
        let resized = img.resize_exact(params.width, params.height, FilterType::Lanczos3);
        let out = match format {
            FileType::Png => encode_png(&resized, CompressionType::Best)?,
            FileType::Jpeg => encode_jpeg_within(&resized, self.quality, max_bytes)?,
        };
        if out.len() as u64 > max_bytes {
            warn!(format = %format, bytes = out.len(), max_bytes, "downscaled output exceeds budget");
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{jpeg_bytes, noise_jpeg_bytes, noise_png_bytes, png_bytes, rgba_png_bytes};

    #[test]
    fn identify_synthetic_png() {
        let data = png_bytes(200, 150);
        let info = RustBackend::new().identify(&data).unwrap();
        assert_eq!(info.format, FileType::Png);
        assert_eq!(info.width, 200);
        assert_eq!(info.height, 150);
        assert_eq!(info.size, data.len() as u64);
    }

    #[test]
    fn identify_synthetic_jpeg() {
        let data = jpeg_bytes(320, 240);
        let info = RustBackend::new().identify(&data).unwrap();
        assert_eq!(info.format, FileType::Jpeg);
        assert_eq!((info.width, info.height), (320, 240));
    }

    #[test]
    fn identify_garbage_errors() {
        let result = RustBackend::new().identify(b"definitely not an image");
        assert!(matches!(result, Err(BackendError::Decode(_))));
    }

    #[test]
    fn identify_truncated_png_errors() {
        let data = png_bytes(200, 150);
        let truncated = &data[..data.len() / 2];
        assert!(RustBackend::new().identify(truncated).is_err());
    }

    #[test]
    fn identify_rejects_other_containers() {
        // GIF89a header
        let result = RustBackend::new().identify(b"GIF89a\x01\x00\x01\x00\x00\x00\x00;");
        assert!(matches!(result, Err(BackendError::UnsupportedFormat(_))));
    }

    #[test]
    fn resize_is_exact_and_keeps_container() {
        let backend = RustBackend::new();
        let out = backend
            .resize(
                &jpeg_bytes(400, 300),
                &ResizeParams {
                    width: 250,
                    height: 250,
                },
            )
            .unwrap();
        let info = backend.identify(&out).unwrap();
        assert_eq!(info.format, FileType::Jpeg);
        assert_eq!((info.width, info.height), (250, 250));
    }

    #[test]
    fn resize_to_zero_errors() {
        let result = RustBackend::new().resize(
            &png_bytes(10, 10),
            &ResizeParams {
                width: 0,
                height: 10,
            },
        );
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }

    #[test]
    fn crop_extracts_region() {
        let backend = RustBackend::new();
        let out = backend
            .crop(
                &png_bytes(300, 200),
                &CropParams {
                    x: 50,
                    y: 25,
                    width: 120,
                    height: 100,
                },
            )
            .unwrap();
        let info = backend.identify(&out).unwrap();
        assert_eq!(info.format, FileType::Png);
        assert_eq!((info.width, info.height), (120, 100));
    }

    #[test]
    fn crop_outside_bounds_errors() {
        let result = RustBackend::new().crop(
            &png_bytes(50, 50),
            &CropParams {
                x: 0,
                y: 0,
                width: 100,
                height: 100,
            },
        );
        assert!(matches!(
            result,
            Err(BackendError::CropOutOfBounds {
                image_width: 50,
                image_height: 50,
                ..
            })
        ));
    }

    #[test]
    fn convert_png_to_jpeg_and_back() {
        let backend = RustBackend::new();
        let jpeg = backend
            .convert(
                &png_bytes(64, 48),
                &ConvertParams {
                    target: FileType::Jpeg,
                },
            )
            .unwrap();
        assert_eq!(backend.identify(&jpeg).unwrap().format, FileType::Jpeg);

        let png = backend
            .convert(
                &jpeg,
                &ConvertParams {
                    target: FileType::Png,
                },
            )
            .unwrap();
        let info = backend.identify(&png).unwrap();
        assert_eq!(info.format, FileType::Png);
        assert_eq!((info.width, info.height), (64, 48));
    }

    #[test]
    fn convert_rgba_to_jpeg_drops_alpha() {
        let backend = RustBackend::new();
        let jpeg = backend
            .convert(
                &rgba_png_bytes(40, 40),
                &ConvertParams {
                    target: FileType::Jpeg,
                },
            )
            .unwrap();
        assert_eq!(backend.identify(&jpeg).unwrap().format, FileType::Jpeg);
    }

    #[test]
    fn lower_quality_gives_smaller_jpeg() {
        let source = jpeg_bytes(300, 300);
        let params = ConvertParams {
            target: FileType::Jpeg,
        };
        let low = RustBackend::with_quality(Quality::new(20))
            .convert(&source, &params)
            .unwrap();
        let high = RustBackend::with_quality(Quality::new(95))
            .convert(&source, &params)
            .unwrap();
        assert!(low.len() < high.len());
    }

    // =========================================================================
    // Downscale budget
    // =========================================================================

    #[test]
    fn downscale_low_quality_jpeg_stays_within_input_size() {
        let backend = RustBackend::new();
        let data = noise_jpeg_bytes(1000, 1000, 25);
        let params = ResizeParams {
            width: 800,
            height: 800,
        };

        // The configured quality alone would grow the file
        let plain = backend.resize(&data, &params).unwrap();
        assert!(plain.len() > data.len());

        let out = backend.downscale(&data, &params, data.len() as u64).unwrap();
        assert!(out.len() <= data.len(), "output {} > input {}", out.len(), data.len());
        let info = backend.identify(&out).unwrap();
        assert_eq!(info.format, FileType::Jpeg);
        assert_eq!((info.width, info.height), (800, 800));
    }

    #[test]
    fn downscale_png_keeps_container_and_shrinks() {
        let backend = RustBackend::new();
        let data = noise_png_bytes(1000, 500);
        let out = backend
            .downscale(
                &data,
                &ResizeParams {
                    width: 800,
                    height: 400,
                },
                data.len() as u64,
            )
            .unwrap();
        assert!(out.len() <= data.len());
        let info = backend.identify(&out).unwrap();
        assert_eq!(info.format, FileType::Png);
        assert_eq!((info.width, info.height), (800, 400));
    }

    #[test]
    fn downscale_unreachable_budget_still_returns_image() {
        let backend = RustBackend::new();
        let out = backend
            .downscale(
                &jpeg_bytes(400, 300),
                &ResizeParams {
                    width: 200,
                    height: 150,
                },
                1,
            )
            .unwrap();
        assert_eq!(backend.identify(&out).unwrap().width, 200);
    }
}
