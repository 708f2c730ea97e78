//! Owned schema tree parsed from the native structural form.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{
    node_shape, AdditionalProperties, Facets, RawAdditional, Schema, SchemaConversionError,
    SchemaKind, SchemaRef,
};
use crate::field::FieldPath;

#[derive(Debug)]
enum StructuralAdditional {
    Allowed(bool),
    Schema(Arc<StructuralSchema>),
}

/// A structural schema node.
///
/// Structural schemas are trees: `$ref` is rejected during conversion.
#[derive(Debug)]
pub struct StructuralSchema {
    kind: Option<SchemaKind>,
    facets: Facets,
    properties: Vec<(String, Arc<StructuralSchema>)>,
    items: Option<Arc<StructuralSchema>>,
    additional: Option<StructuralAdditional>,
}

impl StructuralSchema {
    /// Converts a JSON schema document.
    pub fn from_json(node: &JsonValue) -> Result<SchemaRef, SchemaConversionError> {
        let schema: SchemaRef = Self::convert(node, &FieldPath::new())?;
        Ok(schema)
    }

    fn convert(
        node: &JsonValue,
        path: &FieldPath,
    ) -> Result<Arc<StructuralSchema>, SchemaConversionError> {
        if node.get("$ref").is_some() {
            return Err(SchemaConversionError::new(
                path,
                "$ref is not allowed in a structural schema",
            ));
        }
        let shape = node_shape(node, path)?;

        let properties_path = path.child("properties");
        let properties = shape
            .properties
            .into_iter()
            .map(|(name, prop)| {
                Ok((
                    name.clone(),
                    Self::convert(prop, &properties_path.key(name.as_str()))?,
                ))
            })
            .collect::<Result<Vec<_>, SchemaConversionError>>()?;

        let items = shape
            .items
            .map(|items| Self::convert(items, &path.child("items")))
            .transpose()?;

        let additional = match shape.additional {
            None => None,
            Some(RawAdditional::Allowed(b)) => Some(StructuralAdditional::Allowed(b)),
            Some(RawAdditional::Schema(s)) => Some(StructuralAdditional::Schema(Self::convert(
                s,
                &path.child("additionalProperties"),
            )?)),
        };

        Ok(Arc::new(StructuralSchema {
            kind: shape.kind,
            facets: shape.facets,
            properties,
            items,
            additional,
        }))
    }

    /// A schema of the given kind with no constraints.
    pub fn leaf(kind: SchemaKind) -> Arc<StructuralSchema> {
        Arc::new(StructuralSchema {
            kind: Some(kind),
            facets: Facets::default(),
            properties: Vec::new(),
            items: None,
            additional: None,
        })
    }

    /// An object schema with the given properties.
    pub fn object(properties: Vec<(String, Arc<StructuralSchema>)>) -> Arc<StructuralSchema> {
        Arc::new(StructuralSchema {
            kind: Some(SchemaKind::Object),
            facets: Facets::default(),
            properties,
            items: None,
            additional: None,
        })
    }
}

impl Schema for StructuralSchema {
    fn kind(&self) -> Option<SchemaKind> {
        self.kind
    }

    fn facets(&self) -> &Facets {
        &self.facets
    }

    fn properties(&self) -> Vec<(String, SchemaRef)> {
        self.properties
            .iter()
            .map(|(name, s)| (name.clone(), s.clone() as SchemaRef))
            .collect()
    }

    fn property(&self, name: &str) -> Option<SchemaRef> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s.clone() as SchemaRef)
    }

    fn items(&self) -> Option<SchemaRef> {
        self.items.clone().map(|s| s as SchemaRef)
    }

    fn additional_properties(&self) -> Option<AdditionalProperties> {
        self.additional.as_ref().map(|a| match a {
            StructuralAdditional::Allowed(b) => AdditionalProperties::Allowed(*b),
            StructuralAdditional::Schema(s) => AdditionalProperties::Schema(s.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_conversion() {
        let schema = StructuralSchema::from_json(&json!({
            "type": "object",
            "required": ["spec"],
            "properties": {
                "spec": {
                    "type": "object",
                    "properties": {
                        "replicas": {"type": "integer", "minimum": 0},
                        "ports": {"type": "array", "items": {"type": "integer"}}
                    }
                },
                "labels": {
                    "type": "object",
                    "additionalProperties": {"type": "string"}
                }
            }
        }))
        .unwrap();

        assert_eq!(schema.kind(), Some(SchemaKind::Object));
        assert_eq!(schema.facets().required, vec!["spec".to_string()]);
        let spec = schema.property("spec").unwrap();
        let replicas = spec.property("replicas").unwrap();
        assert_eq!(replicas.kind(), Some(SchemaKind::Integer));
        assert_eq!(replicas.facets().minimum, Some(0.0));
        let ports = spec.property("ports").unwrap();
        assert_eq!(ports.items().unwrap().kind(), Some(SchemaKind::Integer));
        let labels = schema.property("labels").unwrap();
        assert_eq!(
            labels.additional_properties_schema().unwrap().kind(),
            Some(SchemaKind::String)
        );
    }

    #[test]
    fn test_unknown_type_reports_path() {
        let err = StructuralSchema::from_json(&json!({
            "type": "object",
            "properties": {"spec": {"type": "thing"}}
        }))
        .unwrap_err();
        assert_eq!(err.path.to_string(), "properties[spec]");
        assert!(err.message.contains("unknown type 'thing'"));
    }

    #[test]
    fn test_ref_rejected() {
        let err = StructuralSchema::from_json(&json!({
            "type": "object",
            "properties": {"spec": {"$ref": "#/components/schemas/Spec"}}
        }))
        .unwrap_err();
        assert!(err.message.contains("$ref"));
    }

    #[test]
    fn test_properties_with_additional_schema_rejected() {
        let err = StructuralSchema::from_json(&json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
            "additionalProperties": {"type": "string"}
        }))
        .unwrap_err();
        assert!(err.message.contains("mutually exclusive"));
    }
}
