//! Conversion of JSON object data into runtime values.
//!
//! Without a schema, integers become `int` and other numbers `double`. With a
//! schema, `number` fields are always `double` and `format: byte` strings are
//! decoded to `bytes`, matching the types the checker derived.

use base64::Engine;
use serde_json::Value as JsonValue;

use crate::eval::{MapKey, Value};
use crate::schema::{SchemaKind, SchemaRef};

/// Converts JSON without type information.
pub fn from_json(json: &JsonValue) -> Value {
    match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => Value::string(s.as_str()),
        JsonValue::Array(items) => Value::from(items.iter().map(from_json).collect::<Vec<_>>()),
        JsonValue::Object(fields) => Value::map(
            fields
                .iter()
                .map(|(k, v)| (MapKey::from(k.as_str()), from_json(v))),
        ),
    }
}

/// Converts JSON guided by the schema node it is validated against.
pub fn from_json_with_schema(json: &JsonValue, schema: &SchemaRef) -> Value {
    let facets = schema.facets();
    if facets.int_or_string {
        return from_json(json);
    }
    match (schema.kind(), json) {
        (Some(SchemaKind::Number), JsonValue::Number(n)) => {
            Value::Double(n.as_f64().unwrap_or(f64::NAN))
        }
        (Some(SchemaKind::String), JsonValue::String(s))
            if facets.format.as_deref() == Some("byte") =>
        {
            match base64::engine::general_purpose::STANDARD.decode(s) {
                Ok(bytes) => Value::bytes(bytes),
                Err(_) => Value::string(s.as_str()),
            }
        }
        (_, JsonValue::Array(items)) => match schema.items() {
            Some(item_schema) => Value::from(
                items
                    .iter()
                    .map(|item| from_json_with_schema(item, &item_schema))
                    .collect::<Vec<_>>(),
            ),
            None => from_json(json),
        },
        (_, JsonValue::Object(fields)) => {
            let additional = schema.additional_properties_schema();
            Value::map(fields.iter().map(|(k, v)| {
                let value = match schema.property(k).or_else(|| additional.clone()) {
                    Some(child) => from_json_with_schema(v, &child),
                    None => from_json(v),
                };
                (MapKey::from(k.as_str()), value)
            }))
        }
        _ => from_json(json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StructuralSchema;
    use serde_json::json;

    #[test]
    fn test_schema_less_numbers() {
        assert_eq!(from_json(&json!(3)), Value::Int(3));
        assert!(matches!(from_json(&json!(1.5)), Value::Double(d) if d == 1.5));
    }

    #[test]
    fn test_schema_guided_conversion() {
        let schema = StructuralSchema::from_json(&json!({
            "type": "object",
            "properties": {
                "ratio": {"type": "number"},
                "data": {"type": "string", "format": "byte"},
                "counts": {"type": "object", "additionalProperties": {"type": "number"}}
            }
        }))
        .unwrap();
        let value = from_json_with_schema(
            &json!({"ratio": 2, "data": "aGk=", "counts": {"a": 1}, "other": 4}),
            &schema,
        );
        let Value::Map(m) = value else {
            panic!("expected a map");
        };
        assert!(matches!(m.get_str("ratio"), Some(Value::Double(d)) if *d == 2.0));
        assert_eq!(m.get_str("data"), Some(&Value::bytes(&b"hi"[..])));
        assert!(matches!(
            m.get_str("counts").and_then(Value::as_map).and_then(|c| c.get_str("a")),
            Some(Value::Double(_))
        ));
        assert!(matches!(m.get_str("other"), Some(Value::Int(4))));
    }
}
