//! Shared test utilities for the pixelvault test suite.
//!
//! Synthesizes real encoded images in memory so tests never depend on
//! fixture files, plus a [`Fixture`] bundling a temporary storage directory,
//! an in-memory metadata store, and a registered user.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let fx = Fixture::new();
//! let backend = RustBackend::new();
//! let artifact = fx.ingestor(&backend).ingest(&fx.owner, Upload::from_bytes(png_bytes(300, 200)), &fx.ctx).unwrap();
//! ```

use crate::config::ServiceConfig;
use crate::engine::TransformEngine;
use crate::imaging::ImageBackend;
use crate::ingest::UploadIngestor;
use crate::storage::FileStore;
use crate::store::SqliteStore;
use crate::types::{Owner, RequestContext};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage, RgbaImage};
use tempfile::TempDir;

// =========================================================================
// Synthetic images
// =========================================================================

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

/// A smooth gradient PNG. Compresses well, so stays small.
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = gradient(width, height);
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// A smooth gradient JPEG at the encoder's default quality.
pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = gradient(width, height);
    let mut buf = Vec::new();
    JpegEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// A PNG with a translucent alpha channel.
pub fn rgba_png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([(x % 256) as u8, (y % 256) as u8, 64, 128])
    });
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgba8)
        .unwrap();
    buf
}

fn noise(width: u32, height: u32) -> RgbImage {
    // xorshift32, fixed seed for reproducible sizes
    let mut state: u32 = 0x9E37_79B9;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        state
    };
    RgbImage::from_fn(width, height, |_, _| {
        let v = next();
        image::Rgb([v as u8, (v >> 8) as u8, (v >> 16) as u8])
    })
}

/// A PNG of pseudo-random noise. Barely compresses, so roughly
/// `width * height * 3` bytes.
pub fn noise_png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = noise(width, height);
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// A noise JPEG at an explicit quality. Low qualities give a large file
/// that a default-quality re-encode would grow.
pub fn noise_jpeg_bytes(width: u32, height: u32, quality: u8) -> Vec<u8> {
    let img = noise(width, height);
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

// =========================================================================
// Fixture
// =========================================================================

/// Isolated storage + metadata store with one registered user.
pub struct Fixture {
    pub tmp: TempDir,
    pub files: FileStore,
    pub store: SqliteStore,
    pub config: ServiceConfig,
    pub owner: Owner,
    pub ctx: RequestContext,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let files = FileStore::open(tmp.path().join("uploads")).unwrap();
        let store = SqliteStore::open_in_memory().unwrap();
        let owner = store.create_user("alice").unwrap().owner().unwrap();
        Self {
            tmp,
            files,
            store,
            config: ServiceConfig::default(),
            owner,
            ctx: RequestContext {
                secure: false,
                host: "localhost".to_string(),
            },
        }
    }

    /// Register another user and return their identity.
    pub fn add_user(&self, username: &str) -> Owner {
        self.store.create_user(username).unwrap().owner().unwrap()
    }

    pub fn ingestor<'a, B: ImageBackend>(&'a self, backend: &'a B) -> UploadIngestor<'a, B, SqliteStore> {
        UploadIngestor::new(backend, &self.store, &self.files, &self.config)
    }

    pub fn engine<'a, B: ImageBackend>(&'a self, backend: &'a B) -> TransformEngine<'a, B, SqliteStore> {
        TransformEngine::new(backend, &self.store, &self.files, &self.config)
    }
}
