//! Shared types used across the pipeline stages.
//!
//! Records here are what the [`store`](crate::store) persists and what the
//! ingestor, engine and catalog hand back to callers. They carry only
//! authoritative values: dimensions, size and container always come from the
//! final encoded bytes, never from what a client claimed.

use crate::error::PipelineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two containers an artifact may be stored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Png,
    Jpeg,
}

impl FileType {
    pub const ALL: [FileType; 2] = [FileType::Png, FileType::Jpeg];

    /// Canonical lowercase name, also used as the stored file extension.
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Png => "png",
            FileType::Jpeg => "jpeg",
        }
    }

    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    pub fn mime(self) -> &'static str {
        match self {
            FileType::Png => "image/png",
            FileType::Jpeg => "image/jpeg",
        }
    }

    /// Parse a canonical name (`png` or `jpeg`). Case-sensitive, no aliases.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Map an allowlisted mime type to its container.
    pub fn from_mime(mime: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.mime() == mime)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a stored image record. Always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(i64);

impl ImageId {
    /// Parse a caller-supplied identifier.
    ///
    /// Anything that is not a positive base-10 integer is rejected with the
    /// same `"Invalid ID"` validation error, before any lookup happens.
    pub fn parse(raw: &str) -> Result<Self, PipelineError> {
        match raw.trim().parse::<i64>() {
            Ok(n) if n > 0 => Ok(Self(n)),
            _ => Err(PipelineError::invalid_id()),
        }
    }

    pub(crate) fn from_db(raw: i64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An authenticated caller, as supplied by the session collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub id: i64,
    pub username: String,
}

impl Owner {
    /// Accept a session identity, failing closed when it is malformed.
    pub fn authenticated(id: i64, username: &str) -> Result<Self, PipelineError> {
        if id <= 0 || username.trim().is_empty() {
            return Err(PipelineError::Unauthorized);
        }
        Ok(Self {
            id,
            username: username.to_string(),
        })
    }
}

/// A user row as held by the metadata store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn owner(&self) -> Result<Owner, PipelineError> {
        Owner::authenticated(self.id, &self.username)
    }
}

/// A persisted artifact record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRecord {
    pub id: ImageId,
    pub user_id: i64,
    pub storage_path: String,
    pub file_name: String,
    pub file_type: FileType,
    /// Size of the stored bytes.
    pub file_size: u64,
    pub width: u32,
    pub height: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values for a record that has not been inserted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImage {
    pub user_id: i64,
    pub storage_path: String,
    pub file_name: String,
    pub file_type: FileType,
    pub file_size: u64,
    pub width: u32,
    pub height: u32,
}

/// Per-request facts the public URL depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Whether the inbound request arrived over TLS.
    pub secure: bool,
    /// Host name the client addressed, without port.
    pub host: String,
}

/// A freshly stored or retrieved artifact plus its public URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub record: ImageRecord,
    pub url: String,
}
