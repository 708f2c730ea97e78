//! Resource envelope fields added to root and embedded-resource schemas.

use std::sync::Arc;

use super::{AdditionalProperties, Facets, Schema, SchemaKind, SchemaRef, StructuralSchema};

const ENVELOPE_FIELDS: &[&str] = &["apiVersion", "kind", "metadata"];

/// Wraps `inner` so it also declares `apiVersion`, `kind` and `metadata`.
///
/// Only `metadata.name` and `metadata.generateName` are visible; every other
/// metadata field is opaque to expressions. Declarations of the envelope
/// fields on `inner` are replaced.
pub fn with_type_and_object_meta(inner: SchemaRef) -> SchemaRef {
    let string = || StructuralSchema::leaf(SchemaKind::String) as SchemaRef;
    let metadata: SchemaRef = StructuralSchema::object(vec![
        ("name".to_string(), StructuralSchema::leaf(SchemaKind::String)),
        (
            "generateName".to_string(),
            StructuralSchema::leaf(SchemaKind::String),
        ),
    ]);
    Arc::new(ObjectMetaSchema {
        inner,
        envelope: vec![
            ("apiVersion".to_string(), string()),
            ("kind".to_string(), string()),
            ("metadata".to_string(), metadata),
        ],
    })
}

#[derive(Debug)]
struct ObjectMetaSchema {
    inner: SchemaRef,
    envelope: Vec<(String, SchemaRef)>,
}

impl Schema for ObjectMetaSchema {
    fn kind(&self) -> Option<SchemaKind> {
        Some(SchemaKind::Object)
    }

    fn facets(&self) -> &Facets {
        self.inner.facets()
    }

    fn properties(&self) -> Vec<(String, SchemaRef)> {
        let mut properties: Vec<_> = self
            .inner
            .properties()
            .into_iter()
            .filter(|(name, _)| !ENVELOPE_FIELDS.contains(&name.as_str()))
            .collect();
        properties.extend(self.envelope.iter().cloned());
        properties
    }

    fn property(&self, name: &str) -> Option<SchemaRef> {
        match self.envelope.iter().find(|(n, _)| n == name) {
            Some((_, s)) => Some(s.clone()),
            None => self.inner.property(name),
        }
    }

    fn items(&self) -> Option<SchemaRef> {
        None
    }

    fn additional_properties(&self) -> Option<AdditionalProperties> {
        self.inner.additional_properties()
    }
}
