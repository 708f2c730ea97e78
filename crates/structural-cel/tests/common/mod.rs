//! Shared helpers for engine integration tests.

use serde_json::Value as JsonValue;
use structural_cel::{CelConfig, ErrorList, SchemaRef, SchemaValidator, StructuralSchema};

/// Convert a structural schema and assert it succeeds.
#[allow(dead_code)]
pub fn schema(document: JsonValue) -> SchemaRef {
    match StructuralSchema::from_json(&document) {
        Ok(schema) => schema,
        Err(e) => panic!("failed to convert schema: {}", e),
    }
}

/// Build a validator with the default configuration.
#[allow(dead_code)]
pub fn validator(document: JsonValue) -> SchemaValidator {
    SchemaValidator::new(schema(document), CelConfig::default())
}

/// Render errors as `field: detail` for compact assertions.
#[allow(dead_code)]
pub fn details(errors: &ErrorList) -> Vec<String> {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.detail))
        .collect()
}
