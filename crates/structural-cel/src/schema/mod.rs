//! Schema adapters.
//!
//! Every concrete schema format is exposed through the [`Schema`] trait. Two
//! adapters exist:
//!
//! - [`StructuralSchema`]: an owned tree parsed from the native structural form
//! - [`OpenApiDocument`]: an arena of nodes built from an OpenAPI v3 document,
//!   where `$ref` becomes an integer handle so recursive definitions stay finite
//!
//! Navigation (`properties`, `items`, `additional_properties`) returns fresh
//! [`SchemaRef`] handles on demand, so a cyclic schema is only ever expanded as
//! deep as a caller walks it.

mod meta;
mod openapi;
mod structural;

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::field::FieldPath;

pub use meta::with_type_and_object_meta;
pub use openapi::{OpenApiDocument, OpenApiSchema};
pub use structural::StructuralSchema;

/// Shared handle to a schema node.
pub type SchemaRef = Arc<dyn Schema>;

/// Failure to convert a concrete schema document.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("schema conversion failed at '{path}': {message}")]
pub struct SchemaConversionError {
    /// Location within the schema document (`properties[spec].items`).
    pub path: FieldPath,
    pub message: String,
}

impl SchemaConversionError {
    pub fn new(path: &FieldPath, message: impl Into<String>) -> Self {
        Self {
            path: path.clone(),
            message: message.into(),
        }
    }
}

/// The `type` of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    Object,
    Array,
    String,
    Number,
    Integer,
    Boolean,
}

impl SchemaKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "object" => Some(SchemaKind::Object),
            "array" => Some(SchemaKind::Array),
            "string" => Some(SchemaKind::String),
            "number" => Some(SchemaKind::Number),
            "integer" => Some(SchemaKind::Integer),
            "boolean" => Some(SchemaKind::Boolean),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::Object => "object",
            SchemaKind::Array => "array",
            SchemaKind::String => "string",
            SchemaKind::Number => "number",
            SchemaKind::Integer => "integer",
            SchemaKind::Boolean => "boolean",
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListType {
    Atomic,
    Set,
    Map,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapType {
    Granular,
    Atomic,
}

/// Overrides the error type produced by a failing rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Reason {
    FieldValueInvalid,
    FieldValueForbidden,
    FieldValueRequired,
    FieldValueDuplicate,
}

/// One entry of a node's `x-kubernetes-validations`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRule {
    pub rule: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub message_expression: String,
    #[serde(default)]
    pub reason: Option<Reason>,
    /// Dotted path, relative to the node, that failures are reported at.
    #[serde(default)]
    pub field_path: String,
    /// Run the rule on update even when no old value correlates.
    #[serde(default)]
    pub optional_old_self: bool,
}

impl ValidationRule {
    pub fn new(rule: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            message: String::new(),
            message_expression: String::new(),
            reason: None,
            field_path: String::new(),
            optional_old_self: false,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_message_expression(mut self, expr: impl Into<String>) -> Self {
        self.message_expression = expr.into();
        self
    }
}

/// Value constraints and extension flags of a schema node.
///
/// Deserialized straight from the node's JSON object; structural keys such as
/// `type`, `properties` and `items` are handled by the adapters.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facets {
    #[serde(default)]
    pub required: Vec<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    #[serde(default)]
    pub exclusive_minimum: bool,
    #[serde(default)]
    pub exclusive_maximum: bool,
    pub multiple_of: Option<f64>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub min_properties: Option<u64>,
    pub max_properties: Option<u64>,
    pub pattern: Option<String>,
    pub format: Option<String>,
    #[serde(rename = "enum", default)]
    pub enum_values: Vec<JsonValue>,
    #[serde(default)]
    pub nullable: bool,

    #[serde(rename = "x-kubernetes-list-type")]
    pub list_type: Option<ListType>,
    #[serde(rename = "x-kubernetes-list-map-keys", default)]
    pub list_map_keys: Vec<String>,
    #[serde(rename = "x-kubernetes-map-type")]
    pub map_type: Option<MapType>,
    #[serde(rename = "x-kubernetes-embedded-resource", default)]
    pub embedded_resource: bool,
    #[serde(rename = "x-kubernetes-preserve-unknown-fields", default)]
    pub preserve_unknown_fields: bool,
    #[serde(rename = "x-kubernetes-int-or-string", default)]
    pub int_or_string: bool,
    #[serde(rename = "x-kubernetes-validations", default)]
    pub validations: Vec<ValidationRule>,
}

impl Facets {
    fn from_node(node: &JsonValue, path: &FieldPath) -> Result<Self, SchemaConversionError> {
        let facets: Facets = serde_json::from_value(node.clone())
            .map_err(|e| SchemaConversionError::new(path, e.to_string()))?;

        match (facets.list_type, facets.list_map_keys.is_empty()) {
            (Some(ListType::Map), true) => {
                return Err(SchemaConversionError::new(
                    path,
                    "x-kubernetes-list-type: map requires x-kubernetes-list-map-keys",
                ))
            }
            (Some(ListType::Map), false) => {}
            (_, false) => {
                return Err(SchemaConversionError::new(
                    path,
                    "x-kubernetes-list-map-keys requires x-kubernetes-list-type: map",
                ))
            }
            _ => {}
        }
        Ok(facets)
    }
}

/// Shape of `additionalProperties`.
#[derive(Debug, Clone)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(SchemaRef),
}

/// A schema node, independent of the document format it came from.
pub trait Schema: fmt::Debug + Send + Sync {
    /// The declared `type`, if any.
    fn kind(&self) -> Option<SchemaKind>;

    fn facets(&self) -> &Facets;

    /// Declared properties in a stable order.
    fn properties(&self) -> Vec<(String, SchemaRef)>;

    fn property(&self, name: &str) -> Option<SchemaRef> {
        self.properties()
            .into_iter()
            .find_map(|(n, s)| (n == name).then_some(s))
    }

    fn items(&self) -> Option<SchemaRef>;

    fn additional_properties(&self) -> Option<AdditionalProperties>;

    /// The schema of `additionalProperties` when it is a schema rather than a flag.
    fn additional_properties_schema(&self) -> Option<SchemaRef> {
        match self.additional_properties() {
            Some(AdditionalProperties::Schema(s)) => Some(s),
            _ => None,
        }
    }
}

// ============================================================================
// Shared JSON helpers
// ============================================================================

/// Raw, not yet converted view of a node's structural keys.
#[derive(Debug)]
struct NodeShape<'a> {
    kind: Option<SchemaKind>,
    facets: Facets,
    properties: Vec<(&'a String, &'a JsonValue)>,
    items: Option<&'a JsonValue>,
    additional: Option<RawAdditional<'a>>,
}

#[derive(Debug)]
enum RawAdditional<'a> {
    Allowed(bool),
    Schema(&'a JsonValue),
}

fn node_shape<'a>(
    node: &'a JsonValue,
    path: &FieldPath,
) -> Result<NodeShape<'a>, SchemaConversionError> {
    let object = node
        .as_object()
        .ok_or_else(|| SchemaConversionError::new(path, "schema must be a JSON object"))?;

    let kind = match object.get("type") {
        None => None,
        Some(JsonValue::String(t)) => Some(
            SchemaKind::parse(t)
                .ok_or_else(|| SchemaConversionError::new(path, format!("unknown type '{}'", t)))?,
        ),
        Some(other) => {
            return Err(SchemaConversionError::new(
                path,
                format!("type must be a string, got {}", other),
            ))
        }
    };

    let properties = match object.get("properties") {
        None => Vec::new(),
        Some(JsonValue::Object(props)) => props.iter().collect(),
        Some(_) => {
            return Err(SchemaConversionError::new(
                path,
                "properties must be an object",
            ))
        }
    };

    let additional = match object.get("additionalProperties") {
        None => None,
        Some(JsonValue::Bool(b)) => Some(RawAdditional::Allowed(*b)),
        Some(schema @ JsonValue::Object(_)) => Some(RawAdditional::Schema(schema)),
        Some(other) => {
            return Err(SchemaConversionError::new(
                path,
                format!(
                    "additionalProperties must be a boolean or a schema, got {}",
                    other
                ),
            ))
        }
    };

    if !properties.is_empty() && matches!(additional, Some(RawAdditional::Schema(_))) {
        return Err(SchemaConversionError::new(
            path,
            "properties and additionalProperties are mutually exclusive",
        ));
    }

    Ok(NodeShape {
        kind,
        facets: Facets::from_node(node, path)?,
        properties,
        items: object.get("items"),
        additional,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_facets_from_node() {
        let facets = Facets::from_node(
            &json!({
                "type": "array",
                "maxItems": 5,
                "x-kubernetes-list-type": "map",
                "x-kubernetes-list-map-keys": ["name"],
                "x-kubernetes-validations": [
                    {"rule": "size(self) > 0", "message": "empty", "reason": "FieldValueForbidden"}
                ]
            }),
            &FieldPath::new(),
        )
        .unwrap();
        assert_eq!(facets.max_items, Some(5));
        assert_eq!(facets.list_type, Some(ListType::Map));
        assert_eq!(facets.validations[0].reason, Some(Reason::FieldValueForbidden));
        assert_eq!(facets.validations[0].message, "empty");
    }

    #[test]
    fn test_list_map_requires_keys() {
        let err = Facets::from_node(
            &json!({"type": "array", "x-kubernetes-list-type": "map"}),
            &FieldPath::new().child("spec"),
        )
        .unwrap_err();
        assert_eq!(err.path.to_string(), "spec");
        assert!(err.message.contains("list-map-keys"));
    }

    #[test]
    fn test_invalid_list_type() {
        let err = Facets::from_node(
            &json!({"x-kubernetes-list-type": "bag"}),
            &FieldPath::new(),
        )
        .unwrap_err();
        assert!(err.message.contains("bag"));
    }

    #[test]
    fn test_malformed_additional_properties() {
        let err = node_shape(&json!({"additionalProperties": 3}), &FieldPath::new()).unwrap_err();
        assert!(err.message.contains("additionalProperties"));
    }
}
