//! Response shapes and the JSON envelope.
//!
//! # Envelope
//!
//! Every response is wrapped the same way:
//!
//! ```text
//! {"message":"success","data":{...}}
//! {"message":"error","error":[{"message":"...","path":["..."]}]}
//! ```
//!
//! # Data Shapes
//!
//! ```text
//! upload / transform   {"url": "...", "meta": {"fileSize": "12.34 KB", "dimensions": "800 x 600", "fileType": "png"}}
//! retrieve             {"id": 7, "meta": {...}, "url": "..."}
//! list                 {"images": [{"id": 7, "meta": {...}}], "pagination": {...}}
//! list (no records)    {"msg": "You have no uploaded images yet."}
//! ```
//!
//! # Architecture
//!
//! Each response has a `format_*` function (returns the JSON string) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::error::{FieldError, PipelineError};
use crate::listing::{Listing, NO_IMAGES_MESSAGE, Pagination};
use crate::types::{FileType, ImageId, ImageRecord, StoredArtifact};
use serde::Serialize;

// ============================================================================
// Meta block
// ============================================================================

/// Size in kilobytes (1024 bytes) to two decimals, e.g. `"97.66 KB"`.
pub fn format_file_size(bytes: u64) -> String {
    format!("{:.2} KB", bytes as f64 / 1024.0)
}

/// `"W x H"`.
pub fn format_dimensions(width: u32, height: u32) -> String {
    format!("{} x {}", width, height)
}

/// Formatted metadata for one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMeta {
    pub file_size: String,
    pub dimensions: String,
    pub file_type: FileType,
}

impl ImageMeta {
    pub fn from_record(record: &ImageRecord) -> Self {
        Self {
            file_size: format_file_size(record.file_size),
            dimensions: format_dimensions(record.width, record.height),
            file_type: record.file_type,
        }
    }
}

// ============================================================================
// Response bodies
// ============================================================================

/// Body for a freshly stored artifact (upload or transform).
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactResponse {
    pub url: String,
    pub meta: ImageMeta,
}

impl From<&StoredArtifact> for ArtifactResponse {
    fn from(artifact: &StoredArtifact) -> Self {
        Self {
            url: artifact.url.clone(),
            meta: ImageMeta::from_record(&artifact.record),
        }
    }
}

/// Body for a single retrieved artifact.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedImage {
    pub id: ImageId,
    pub meta: ImageMeta,
    pub url: String,
}

impl From<&StoredArtifact> for RetrievedImage {
    fn from(artifact: &StoredArtifact) -> Self {
        Self {
            id: artifact.record.id,
            meta: ImageMeta::from_record(&artifact.record),
            url: artifact.url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ListedImage {
    pub id: ImageId,
    pub meta: ImageMeta,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ListResponse {
    Page {
        images: Vec<ListedImage>,
        pagination: Pagination,
    },
    Empty {
        msg: &'static str,
    },
}

impl From<&Listing> for ListResponse {
    fn from(listing: &Listing) -> Self {
        match listing {
            Listing::Page { images, pagination } => ListResponse::Page {
                images: images
                    .iter()
                    .map(|record| ListedImage {
                        id: record.id,
                        meta: ImageMeta::from_record(record),
                    })
                    .collect(),
                pagination: *pagination,
            },
            Listing::Empty => ListResponse::Empty {
                msg: NO_IMAGES_MESSAGE,
            },
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(tag = "message", rename_all = "lowercase")]
pub enum Envelope<T: Serialize> {
    Success { data: T },
    Error { error: Vec<FieldError> },
}

pub fn format_success<T: Serialize>(data: T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&Envelope::Success { data })
}

/// Error envelope with only the caller-safe messages.
pub fn format_error(err: &PipelineError) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&Envelope::<()>::Error {
        error: err.public_errors(),
    })
}

pub fn format_artifact(artifact: &StoredArtifact) -> serde_json::Result<String> {
    format_success(ArtifactResponse::from(artifact))
}

pub fn format_retrieved(artifact: &StoredArtifact) -> serde_json::Result<String> {
    format_success(RetrievedImage::from(artifact))
}

pub fn format_listing(listing: &Listing) -> serde_json::Result<String> {
    format_success(ListResponse::from(listing))
}

/// Print a result's envelope to stdout.
pub fn print_result<T>(
    result: &Result<T, PipelineError>,
    format: impl Fn(&T) -> serde_json::Result<String>,
) -> serde_json::Result<()> {
    let json = match result {
        Ok(value) => format(value)?,
        Err(err) => format_error(err)?,
    };
    println!("{}", json);
    Ok(())
}
