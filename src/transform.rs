//! Transformation requests: parsing, validation, and the fixed apply order.
//!
//! Wire form:
//!
//! ```json
//! {"transformations": {
//!     "resize": {"width": 400, "height": 300},
//!     "crop":   {"x": 0, "y": 0, "width": 200, "height": 200},
//!     "format": "jpeg"
//! }}
//! ```
//!
//! Every key is optional but at least one must be present. The set is
//! closed: unknown keys are rejected rather than ignored. `format` may also
//! be written `{"target": "jpeg"}`.
//!
//! Parsing happens in two passes. Serde checks the shape (types, required
//! fields, unknown keys) and stops at the first problem. `validator` then
//! checks the value constraints and reports every violation at once, each
//! with a path such as `transformations.resize.width`. Nothing here touches
//! image bytes; geometry that depends on the source (a crop window past the
//! edge) is the codec's call.
//!
//! Whatever order the keys arrive in, steps run resize → crop → format.

use crate::error::{FieldError, PipelineError};
use crate::imaging::{ConvertParams, CropParams, ResizeParams, Transformation};
use crate::types::FileType;
use serde::Deserialize;
use serde_json::{Value, json};
use std::borrow::Cow;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

/// Smallest accepted resize edge, in pixels.
pub const MIN_RESIZE_EDGE: u32 = 200;
/// Smallest accepted crop edge, in pixels.
pub const MIN_CROP_EDGE: u32 = 100;

/// Recognized keys, in apply order.
pub const TRANSFORMATION_KEYS: [&str; 3] = ["resize", "crop", "format"];

/// A validated set of requested transformations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformationSet {
    pub resize: Option<ResizeParams>,
    pub crop: Option<CropParams>,
    pub format: Option<FileType>,
}

impl TransformationSet {
    /// Parse a raw JSON request body.
    pub fn from_json(body: &str) -> Result<Self, PipelineError> {
        let value: Value = serde_json::from_str(body).map_err(|e| {
            PipelineError::Validation(vec![FieldError::new(format!("Invalid JSON: {e}"))])
        })?;
        Self::from_value(&value)
    }

    /// Validate an already-parsed request body.
    pub fn from_value(body: &Value) -> Result<Self, PipelineError> {
        let request = RequestBody::deserialize(body)
            .map_err(|e| PipelineError::Validation(vec![FieldError::new(e.to_string())]))?;
        request
            .validate()
            .map_err(|e| PipelineError::Validation(field_errors(&e)))?;
        Ok(request.transformations.into_set())
    }

    pub fn is_empty(&self) -> bool {
        self.resize.is_none() && self.crop.is_none() && self.format.is_none()
    }

    /// Requested steps in apply order.
    pub fn steps(&self) -> Vec<Transformation> {
        let mut steps = Vec::with_capacity(3);
        if let Some(resize) = self.resize {
            steps.push(Transformation::Resize(resize));
        }
        if let Some(crop) = self.crop {
            steps.push(Transformation::Crop(crop));
        }
        if let Some(target) = self.format {
            steps.push(Transformation::Format(ConvertParams { target }));
        }
        steps
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
struct RequestBody {
    #[validate(nested)]
    transformations: TransformationsBody,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
struct TransformationsBody {
    #[validate(nested)]
    resize: Option<ResizeBody>,
    #[validate(nested)]
    crop: Option<CropBody>,
    #[validate(nested)]
    format: Option<FormatBody>,
}

impl TransformationsBody {
    /// Only called after validation passed.
    fn into_set(self) -> TransformationSet {
        TransformationSet {
            resize: self.resize.map(|r| ResizeParams {
                width: r.width,
                height: r.height,
            }),
            crop: self.crop.map(|c| CropParams {
                x: c.x,
                y: c.y,
                width: c.width,
                height: c.height,
            }),
            format: self.format.and_then(|f| FileType::parse(&f.target)),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
struct ResizeBody {
    #[validate(range(min = MIN_RESIZE_EDGE))]
    width: u32,
    #[validate(range(min = MIN_RESIZE_EDGE))]
    height: u32,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
struct CropBody {
    x: u32,
    y: u32,
    #[validate(range(min = MIN_CROP_EDGE))]
    width: u32,
    #[validate(range(min = MIN_CROP_EDGE))]
    height: u32,
}

/// `format` in either wire form, normalized to its target name.
#[derive(Debug, Deserialize, Validate)]
#[serde(from = "FormatWire")]
struct FormatBody {
    #[validate(custom(function = "known_format"))]
    target: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FormatWire {
    Name(String),
    Target(FormatTarget),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FormatTarget {
    target: String,
}

impl From<FormatWire> for FormatBody {
    fn from(wire: FormatWire) -> Self {
        let target = match wire {
            FormatWire::Name(name) => name,
            FormatWire::Target(FormatTarget { target }) => target,
        };
        Self { target }
    }
}

fn known_format(name: &str) -> Result<(), ValidationError> {
    if FileType::parse(name).is_some() {
        return Ok(());
    }
    let expected = FileType::ALL
        .iter()
        .map(|t| format!("'{}'", t.as_str()))
        .collect::<Vec<_>>()
        .join(" | ");
    let mut err = ValidationError::new("enum");
    err.message = Some(Cow::Owned(format!(
        "Invalid enum value. Expected {expected}, received '{name}'"
    )));
    Err(err)
}

// ============================================================================
// Error mapping
// ============================================================================

fn message_for(err: &ValidationError) -> String {
    if let Some(message) = &err.message {
        return message.to_string();
    }
    match (&*err.code, err.params.get("min").and_then(Value::as_f64)) {
        ("range", Some(min)) => format!("Number must be greater than or equal to {min}"),
        (code, _) => code.to_string(),
    }
}

fn push_errors(out: &mut Vec<FieldError>, prefix: &[String], errs: &ValidationErrors) {
    for (field, kind) in errs.errors() {
        let mut path = prefix.to_vec();
        path.push(field.to_string());
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for e in field_errors {
                    out.push(FieldError {
                        message: message_for(e),
                        path: path.clone(),
                    });
                }
            }
            ValidationErrorsKind::Struct(nested) => push_errors(out, &path, nested),
            ValidationErrorsKind::List(items) => {
                for (idx, nested) in items {
                    let mut item_path = path.clone();
                    item_path.push(idx.to_string());
                    push_errors(out, &item_path, nested);
                }
            }
        }
    }
}

/// Flatten nested validator errors into path-addressed field errors,
/// ordered by path.
fn field_errors(errs: &ValidationErrors) -> Vec<FieldError> {
    let mut out = Vec::new();
    push_errors(&mut out, &[], errs);
    out.sort_by(|a, b| a.path.cmp(&b.path));
    out
}

/// Machine-readable description of the accepted transformation keys.
pub fn capabilities() -> Value {
    let integer = |min: u32| json!({ "type": "integer", "minimum": min });
    let formats: Vec<&str> = FileType::ALL.iter().map(|t| t.as_str()).collect();
    json!({
        "type": "object",
        "properties": {
            "transformations": {
                "type": "object",
                "additionalProperties": false,
                "minProperties": 1,
                "properties": {
                    "resize": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["width", "height"],
                        "properties": {
                            "width": integer(MIN_RESIZE_EDGE),
                            "height": integer(MIN_RESIZE_EDGE),
                        },
                    },
                    "crop": {
                        "type": "object",
                        "additionalProperties": false,
                        "required": ["x", "y", "width", "height"],
                        "properties": {
                            "x": integer(0),
                            "y": integer(0),
                            "width": integer(MIN_CROP_EDGE),
                            "height": integer(MIN_CROP_EDGE),
                        },
                    },
                    "format": { "type": "string", "enum": formats },
                },
            },
        },
        "required": ["transformations"],
        "x-apply-order": TRANSFORMATION_KEYS,
    })
}
