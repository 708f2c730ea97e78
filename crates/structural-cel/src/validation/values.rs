//! Structural value checks of a single schema node.
//!
//! Children are not visited here; the walker in the parent module recurses.
//! Every error carries the keyword that produced it as its origin.

use regex::Regex;
use serde_json::Value as JsonValue;

use crate::field::{ErrorKind, ErrorList, FieldError, FieldPath};
use crate::library::format;
use crate::schema::{ListType, SchemaKind, SchemaRef};

fn type_matches(kind: SchemaKind, value: &JsonValue) -> bool {
    match (kind, value) {
        (SchemaKind::Object, JsonValue::Object(_)) => true,
        (SchemaKind::Array, JsonValue::Array(_)) => true,
        (SchemaKind::String, JsonValue::String(_)) => true,
        (SchemaKind::Boolean, JsonValue::Bool(_)) => true,
        (SchemaKind::Number, JsonValue::Number(_)) => true,
        (SchemaKind::Integer, JsonValue::Number(n)) => n.is_i64() || n.is_u64(),
        _ => false,
    }
}

/// Deep equality where numbers compare by value, so `1` equals `1.0`.
fn json_equal(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x == y,
                _ => x.as_f64() == y.as_f64(),
            },
        },
        (JsonValue::Array(x), JsonValue::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| json_equal(x, y))
        }
        (JsonValue::Object(x), JsonValue::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| json_equal(v, other)))
        }
        _ => a == b,
    }
}

/// Checks the keywords of one node against one value.
#[derive(Debug)]
pub(crate) struct ValueValidator {
    schema: SchemaRef,
    pattern: Option<Result<Regex, regex::Error>>,
}

impl ValueValidator {
    pub(crate) fn new(schema: SchemaRef) -> Self {
        let pattern = schema.facets().pattern.as_deref().map(Regex::new);
        Self { schema, pattern }
    }

    pub(crate) fn validate(&self, path: &FieldPath, value: &JsonValue) -> ErrorList {
        let facets = self.schema.facets();
        let mut errs = ErrorList::new();

        if value.is_null() {
            if !facets.nullable && self.schema.kind().is_some() {
                errs.push(self.type_error(path, value));
            }
            return errs;
        }

        if facets.int_or_string {
            let ok = matches!(value, JsonValue::String(_))
                || matches!(value, JsonValue::Number(n) if n.is_i64() || n.is_u64());
            if !ok {
                errs.push(
                    FieldError::invalid(path.clone(), value.clone(), "must be an integer or a string")
                        .with_origin("type"),
                );
                return errs;
            }
        } else if let Some(kind) = self.schema.kind() {
            if !type_matches(kind, value) {
                errs.push(self.type_error(path, value));
                return errs;
            }
        }

        if !facets.enum_values.is_empty()
            && !facets.enum_values.iter().any(|allowed| json_equal(allowed, value))
        {
            errs.push(
                FieldError::not_supported(path.clone(), value.clone(), &facets.enum_values)
                    .with_origin("enum"),
            );
        }

        match value {
            JsonValue::Number(n) => {
                if let Some(n) = n.as_f64() {
                    self.validate_number(path, value, n, &mut errs);
                }
            }
            JsonValue::String(s) => self.validate_string(path, value, s, &mut errs),
            JsonValue::Array(items) => self.validate_array(path, items, &mut errs),
            JsonValue::Object(fields) => {
                for required in &facets.required {
                    if !fields.contains_key(required) {
                        errs.push(
                            FieldError::required(path.child(required.as_str()), "")
                                .with_origin("required"),
                        );
                    }
                }
                let count = fields.len() as u64;
                if let Some(min) = facets.min_properties.filter(|min| count < *min) {
                    errs.push(
                        FieldError::invalid(
                            path.clone(),
                            value.clone(),
                            format!("must have at least {} properties", min),
                        )
                        .with_origin("minProperties"),
                    );
                }
                if let Some(max) = facets.max_properties.filter(|max| count > *max) {
                    errs.push(
                        FieldError::new(
                            ErrorKind::TooMany,
                            path.clone(),
                            JsonValue::from(count),
                            format!("must have at most {} properties", max),
                        )
                        .with_origin("maxProperties"),
                    );
                }
            }
            _ => {}
        }
        errs
    }

    fn type_error(&self, path: &FieldPath, value: &JsonValue) -> FieldError {
        let kind = self.schema.kind().map(|k| k.as_str()).unwrap_or("any");
        FieldError::invalid(path.clone(), value.clone(), format!("must be of type {}", kind))
            .with_origin("type")
    }

    fn validate_number(&self, path: &FieldPath, value: &JsonValue, n: f64, errs: &mut ErrorList) {
        let facets = self.schema.facets();
        let invalid = |detail: String, origin: &str| {
            FieldError::invalid(path.clone(), value.clone(), detail).with_origin(origin)
        };
        if let Some(min) = facets.minimum {
            if facets.exclusive_minimum && n <= min {
                errs.push(invalid(format!("must be greater than {}", min), "minimum"));
            } else if n < min {
                errs.push(invalid(
                    format!("must be greater than or equal to {}", min),
                    "minimum",
                ));
            }
        }
        if let Some(max) = facets.maximum {
            if facets.exclusive_maximum && n >= max {
                errs.push(invalid(format!("must be less than {}", max), "maximum"));
            } else if n > max {
                errs.push(invalid(
                    format!("must be less than or equal to {}", max),
                    "maximum",
                ));
            }
        }
        if let Some(factor) = facets.multiple_of.filter(|f| *f != 0.0) {
            let quotient = n / factor;
            if (quotient - quotient.round()).abs() > f64::EPSILON * quotient.abs().max(1.0) {
                errs.push(invalid(format!("must be a multiple of {}", factor), "multipleOf"));
            }
        }
    }

    fn validate_string(&self, path: &FieldPath, value: &JsonValue, s: &str, errs: &mut ErrorList) {
        let facets = self.schema.facets();
        let invalid = |detail: String, origin: &str| {
            FieldError::invalid(path.clone(), value.clone(), detail).with_origin(origin)
        };
        let length = s.chars().count() as u64;
        if let Some(min) = facets.min_length.filter(|min| length < *min) {
            errs.push(invalid(format!("should be at least {} chars long", min), "minLength"));
        }
        if let Some(max) = facets.max_length.filter(|max| length > *max) {
            errs.push(invalid(format!("may not be more than {} chars long", max), "maxLength"));
        }
        match &self.pattern {
            Some(Ok(re)) if !re.is_match(s) => {
                let pattern = facets.pattern.as_deref().unwrap_or_default();
                errs.push(invalid(format!("must match pattern '{}'", pattern), "pattern"));
            }
            Some(Err(e)) => errs.push(
                FieldError::internal(path.clone(), format!("invalid pattern: {}", e))
                    .with_origin("pattern"),
            ),
            _ => {}
        }
        if let Some(name) = &facets.format {
            if format::validate(name, s) == Some(false) {
                errs.push(invalid(format!("must be of format: {}", name), "format"));
            }
        }
    }

    fn validate_array(&self, path: &FieldPath, items: &[JsonValue], errs: &mut ErrorList) {
        let facets = self.schema.facets();
        let count = items.len();
        if let Some(min) = facets.min_items.filter(|min| (count as u64) < *min) {
            errs.push(
                FieldError::invalid(
                    path.clone(),
                    JsonValue::from(count),
                    format!("must have at least {} items", min),
                )
                .with_origin("minItems"),
            );
        }
        if let Some(max) = facets.max_items.filter(|max| (count as u64) > *max) {
            let max = usize::try_from(max).unwrap_or(usize::MAX);
            errs.push(FieldError::too_many(path.clone(), count, max).with_origin("maxItems"));
        }

        match facets.list_type {
            Some(ListType::Set) => {
                for (i, item) in items.iter().enumerate() {
                    if items[..i].contains(item) {
                        errs.push(
                            FieldError::duplicate(path.index(i), item.clone()).with_origin("listType"),
                        );
                    }
                }
            }
            Some(ListType::Map) => {
                let keys: Vec<Option<JsonValue>> = items
                    .iter()
                    .map(|item| list_map_key(&facets.list_map_keys, item))
                    .collect();
                for (i, key) in keys.iter().enumerate() {
                    let Some(key) = key else { continue };
                    if keys[..i].iter().flatten().any(|k| k == key) {
                        errs.push(
                            FieldError::duplicate(path.index(i), key.clone()).with_origin("listType"),
                        );
                    }
                }
            }
            _ => {}
        }
    }
}

/// The `listMapKeys` fields of a list item, as an object.
pub(crate) fn list_map_key(keys: &[String], item: &JsonValue) -> Option<JsonValue> {
    let fields = item.as_object()?;
    let key: serde_json::Map<String, JsonValue> = keys
        .iter()
        .filter_map(|k| fields.get(k).map(|v| (k.clone(), v.clone())))
        .collect();
    Some(JsonValue::Object(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StructuralSchema;
    use serde_json::json;

    fn check(schema: JsonValue, value: JsonValue) -> ErrorList {
        let schema = StructuralSchema::from_json(&schema).unwrap();
        ValueValidator::new(schema).validate(&FieldPath::new().child("f"), &value)
    }

    fn origins(errs: &ErrorList) -> Vec<&str> {
        errs.iter().filter_map(|e| e.origin.as_deref()).collect()
    }

    #[test]
    fn test_enum_compares_numbers_by_value() {
        let schema = json!({"type": "number", "enum": [1, 2.5]});
        assert!(check(schema.clone(), json!(1.0)).is_empty());
        assert!(check(schema.clone(), json!(2.5)).is_empty());
        assert_eq!(origins(&check(schema, json!(1.5))), ["enum"]);

        let schema = json!({"type": "object", "enum": [{"a": [1.0]}]});
        assert!(check(schema, json!({"a": [1]})).is_empty());
    }

    #[test]
    fn test_numeric_bounds() {
        let schema = json!({"type": "integer", "minimum": 1, "maximum": 10, "multipleOf": 2});
        assert!(check(schema.clone(), json!(4)).is_empty());
        let errs = check(schema.clone(), json!(0));
        assert_eq!(errs[0].detail, "must be greater than or equal to 1");
        assert_eq!(origins(&errs), ["minimum"]);
        assert_eq!(origins(&check(schema, json!(11))), ["maximum", "multipleOf"]);
    }

    #[test]
    fn test_exclusive_bounds() {
        let schema = json!({"type": "number", "minimum": 0, "exclusiveMinimum": true});
        assert_eq!(check(schema, json!(0))[0].detail, "must be greater than 0");
    }

    #[test]
    fn test_string_keywords() {
        let schema = json!({"type": "string", "maxLength": 3, "pattern": "^[a-z]+$"});
        let errs = check(schema, json!("ABCD"));
        assert_eq!(origins(&errs), ["maxLength", "pattern"]);
        assert_eq!(errs[1].detail, "must match pattern '^[a-z]+$'");

        let errs = check(json!({"type": "string", "format": "uuid"}), json!("nope"));
        assert_eq!(errs[0].detail, "must be of format: uuid");
        assert!(check(json!({"type": "string", "format": "custom"}), json!("x")).is_empty());
    }

    #[test]
    fn test_enum_and_type() {
        let errs = check(json!({"type": "string", "enum": ["a", "b"]}), json!("c"));
        assert_eq!(errs[0].kind, ErrorKind::NotSupported);
        assert_eq!(origins(&errs), ["enum"]);

        let errs = check(json!({"type": "integer"}), json!("1"));
        assert_eq!(errs[0].detail, "must be of type integer");
        assert!(check(json!({"type": "integer", "nullable": true}), json!(null)).is_empty());
    }

    #[test]
    fn test_required_fields() {
        let errs = check(
            json!({"type": "object", "required": ["app", "tier"], "properties": {
                "app": {"type": "string"}, "tier": {"type": "string"}
            }}),
            json!({"tier": "web"}),
        );
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ErrorKind::Required);
        assert_eq!(errs[0].field.to_string(), "f.app");
    }

    #[test]
    fn test_list_uniqueness() {
        let set = json!({"type": "array", "x-kubernetes-list-type": "set", "items": {"type": "integer"}});
        let errs = check(set, json!([1, 2, 1]));
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].kind, ErrorKind::Duplicate);
        assert_eq!(errs[0].field.to_string(), "f[2]");

        let map = json!({
            "type": "array",
            "x-kubernetes-list-type": "map",
            "x-kubernetes-list-map-keys": ["name"],
            "items": {"type": "object", "properties": {"name": {"type": "string"}}}
        });
        let errs = check(map, json!([{"name": "a"}, {"name": "b"}, {"name": "a", "x": 1}]));
        assert_eq!(errs.len(), 1);
        assert_eq!(errs[0].bad_value, json!({"name": "a"}));
    }

    #[test]
    fn test_item_counts() {
        let schema = json!({"type": "array", "minItems": 2, "maxItems": 3});
        assert_eq!(origins(&check(schema.clone(), json!([1]))), ["minItems"]);
        let errs = check(schema, json!([1, 2, 3, 4]));
        assert_eq!(errs[0].kind, ErrorKind::TooMany);
    }
}
