//! Caller-facing error taxonomy for the pipeline.
//!
//! Each stage keeps its own error enum ([`BackendError`], [`StoreError`]);
//! they funnel into [`PipelineError`] at the ingestor/engine/catalog boundary.
//! Server-side failures carry full detail for logging but expose only a
//! generic message through [`PipelineError::public_errors`].

use crate::imaging::BackendError;
use crate::store::StoreError;
use serde::Serialize;
use thiserror::Error;

/// A single user-facing validation message, optionally pointing at a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Vec::new(),
        }
    }

    pub fn at(path: &[&str], message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: path.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn join_messages(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(|f| {
            if f.path.is_empty() {
                f.message.clone()
            } else {
                format!("{}: {}", f.path.join("."), f.message)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Validation failed: {}", join_messages(.0))]
    Validation(Vec<FieldError>),
    #[error("Missing or malformed session")]
    Unauthorized,
    /// Covers both "does not exist" and "belongs to someone else".
    #[error("Image not found")]
    NotFound,
    #[error("Image processing failed: {0}")]
    Processing(#[from] BackendError),
    #[error("Storage failed: {0}")]
    Storage(#[from] StoreError),
}

impl PipelineError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(message)])
    }

    pub fn invalid_id() -> Self {
        Self::validation("Invalid ID")
    }

    pub fn no_transformations() -> Self {
        Self::Validation(vec![FieldError::at(
            &["transformations"],
            "No transformations",
        )])
    }

    /// HTTP-equivalent status for the transport layer.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Unauthorized => 401,
            Self::NotFound => 404,
            Self::Processing(_) | Self::Storage(_) => 500,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Messages safe to return to the caller.
    pub fn public_errors(&self) -> Vec<FieldError> {
        match self {
            Self::Validation(fields) => fields.clone(),
            Self::Unauthorized => vec![FieldError::new("Unauthorized")],
            Self::NotFound => vec![FieldError::new("Image Not Found")],
            Self::Processing(_) | Self::Storage(_) => {
                vec![FieldError::new("something went wrong")]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display_joins_paths() {
        let err = PipelineError::Validation(vec![
            FieldError::at(&["transformations", "resize", "width"], "Required"),
            FieldError::new("Invalid ID"),
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: transformations.resize.width: Required; Invalid ID"
        );
    }

    #[test]
    fn status_codes() {
        assert_eq!(PipelineError::invalid_id().status_code(), 400);
        assert_eq!(PipelineError::Unauthorized.status_code(), 401);
        assert_eq!(PipelineError::NotFound.status_code(), 404);
        let processing = PipelineError::from(BackendError::Decode("truncated".into()));
        assert_eq!(processing.status_code(), 500);
        assert!(processing.is_server_error());
    }

    #[test]
    fn server_errors_hide_detail() {
        let err = PipelineError::from(BackendError::Decode("secret path /srv/x".into()));
        let public = err.public_errors();
        assert_eq!(public, vec![FieldError::new("something went wrong")]);
    }

    #[test]
    fn not_found_message_is_uniform() {
        assert_eq!(
            PipelineError::NotFound.public_errors()[0].message,
            "Image Not Found"
        );
    }

    #[test]
    fn field_error_without_path_omits_it_in_json() {
        let json = serde_json::to_string(&FieldError::new("Invalid ID")).unwrap();
        assert_eq!(json, r#"{"message":"Invalid ID"}"#);
    }
}
