//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the pipeline (which decides what to produce) and the
//! [`backend`](super::backend) (which does the pixel work). A
//! [`Transformation`] is one step of a derived-artifact request, already
//! validated; the backend trusts the numbers it receives.
//!
//! ## Types
//!
//! - [`Quality`]: JPEG encoding quality (1–100, default 80). Clamped on construction.
//! - [`ResizeParams`]: exact target dimensions.
//! - [`CropParams`]: top-left offset plus region size.
//! - [`ConvertParams`]: target container.
//! - [`Transformation`]: closed set of the three steps above.

use crate::types::FileType;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// Resize to exactly `width` x `height`. Aspect ratio is not preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeParams {
    pub width: u32,
    pub height: u32,
}

/// Extract the `width` x `height` region whose top-left corner is at (`x`, `y`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropParams {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Re-encode into another container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertParams {
    pub target: FileType,
}

/// One validated step of a derived-artifact request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transformation {
    Resize(ResizeParams),
    Crop(CropParams),
    Format(ConvertParams),
}

impl Transformation {
    /// Request key this step was parsed from.
    pub fn key(&self) -> &'static str {
        match self {
            Transformation::Resize(_) => "resize",
            Transformation::Crop(_) => "crop",
            Transformation::Format(_) => "format",
        }
    }
}
