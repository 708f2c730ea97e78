//! Field paths and field-indexed validation errors.

use std::fmt;

use serde_json::Value as JsonValue;

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathElement {
    Child(String),
    Index(usize),
    Key(String),
}

/// Location of a value inside an object, rendered as `spec.containers[0].name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldPath {
    elements: Vec<PathElement>,
}

impl FieldPath {
    /// The empty (root) path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a path from dotted segments, e.g. `FieldPath::from_segments(["spec", "replicas"])`.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            elements: segments
                .into_iter()
                .map(|s| PathElement::Child(s.into()))
                .collect(),
        }
    }

    pub fn child(&self, name: impl Into<String>) -> Self {
        self.push(PathElement::Child(name.into()))
    }

    pub fn index(&self, index: usize) -> Self {
        self.push(PathElement::Index(index))
    }

    pub fn key(&self, key: impl Into<String>) -> Self {
        self.push(PathElement::Key(key.into()))
    }

    fn push(&self, element: PathElement) -> Self {
        let mut elements = self.elements.clone();
        elements.push(element);
        Self { elements }
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    pub fn is_root(&self) -> bool {
        self.elements.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.elements.iter().enumerate() {
            match element {
                PathElement::Child(name) if i == 0 => f.write_str(name)?,
                PathElement::Child(name) => write!(f, ".{}", name)?,
                PathElement::Index(index) => write!(f, "[{}]", index)?,
                PathElement::Key(key) => write!(f, "[{}]", key)?,
            }
        }
        Ok(())
    }
}

/// Category of a [`FieldError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Required,
    Invalid,
    Forbidden,
    NotSupported,
    Duplicate,
    TooMany,
    InternalError,
}

impl ErrorKind {
    /// Human-readable form used in error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Required => "Required value",
            ErrorKind::Invalid => "Invalid value",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotSupported => "Unsupported value",
            ErrorKind::Duplicate => "Duplicate value",
            ErrorKind::TooMany => "Too many",
            ErrorKind::InternalError => "Internal error",
        }
    }

    fn shows_value(&self) -> bool {
        matches!(
            self,
            ErrorKind::Invalid | ErrorKind::NotSupported | ErrorKind::Duplicate
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validation failure at a field path.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub kind: ErrorKind,
    pub field: FieldPath,
    pub bad_value: JsonValue,
    pub detail: String,
    /// Which structural rule produced the error (`minimum`, `format`, ...).
    pub origin: Option<String>,
    /// Set on hand-written errors the declarative validator is expected to reproduce.
    pub covered_by_declarative: bool,
}

impl FieldError {
    pub fn new(
        kind: ErrorKind,
        field: FieldPath,
        bad_value: JsonValue,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            field,
            bad_value,
            detail: detail.into(),
            origin: None,
            covered_by_declarative: false,
        }
    }

    pub fn required(field: FieldPath, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Required, field, JsonValue::Null, detail)
    }

    pub fn invalid(field: FieldPath, bad_value: JsonValue, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invalid, field, bad_value, detail)
    }

    pub fn forbidden(field: FieldPath, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, field, JsonValue::Null, detail)
    }

    pub fn not_supported(field: FieldPath, bad_value: JsonValue, valid: &[JsonValue]) -> Self {
        let quoted: Vec<String> = valid.iter().map(|v| v.to_string()).collect();
        Self::new(
            ErrorKind::NotSupported,
            field,
            bad_value,
            format!("supported values: {}", quoted.join(", ")),
        )
    }

    pub fn duplicate(field: FieldPath, bad_value: JsonValue) -> Self {
        Self::new(ErrorKind::Duplicate, field, bad_value, "")
    }

    pub fn too_many(field: FieldPath, actual: usize, max: usize) -> Self {
        Self::new(
            ErrorKind::TooMany,
            field,
            JsonValue::from(actual),
            format!("must have at most {} items", max),
        )
    }

    pub fn internal(field: FieldPath, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, field, JsonValue::Null, detail)
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn mark_covered_by_declarative(mut self) -> Self {
        self.covered_by_declarative = true;
        self
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.field.is_root() {
            write!(f, "{}: ", self.field)?;
        }
        f.write_str(self.kind.as_str())?;
        if self.kind.shows_value() {
            write!(f, ": {}", self.bad_value)?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for FieldError {}

/// Ordered collection of field errors.
pub type ErrorList = Vec<FieldError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_display() {
        let path = FieldPath::new()
            .child("spec")
            .child("containers")
            .index(0)
            .child("env")
            .key("HOME");
        assert_eq!(path.to_string(), "spec.containers[0].env[HOME]");
        assert_eq!(FieldPath::new().to_string(), "");
    }

    #[test]
    fn test_error_display() {
        let err = FieldError::invalid(
            FieldPath::from_segments(["spec", "replicas"]),
            json!(-1),
            "must be greater than or equal to 0",
        );
        assert_eq!(
            err.to_string(),
            "spec.replicas: Invalid value: -1: must be greater than or equal to 0"
        );

        let err = FieldError::required(FieldPath::new().child("app"), "");
        assert_eq!(err.to_string(), "app: Required value");
    }

    #[test]
    fn test_origin_builder() {
        let err = FieldError::invalid(FieldPath::new(), json!(1), "x")
            .with_origin("minimum")
            .mark_covered_by_declarative();
        assert_eq!(err.origin.as_deref(), Some("minimum"));
        assert!(err.covered_by_declarative);
    }
}
