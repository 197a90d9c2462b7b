//! Image processing in pure Rust, on top of the `image` crate.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | full decode, format sniffed from magic bytes |
//! | **Resize** | `resize_exact` with Lanczos3 |
//! | **Crop** | bounds check + `crop_imm` |
//! | **Convert** | PNG / JPEG encoders |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining calculations + backend

pub mod backend;
mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend, ImageInfo};
pub use calculations::{calculate_fit_width, crop_within_bounds, needs_downscale};
pub use operations::{NormalizeConfig, apply_transformations, get_info, normalize};
pub use params::{ConvertParams, CropParams, Quality, ResizeParams, Transformation};
pub use rust_backend::RustBackend;
