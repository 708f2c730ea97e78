//! Typed object values built by object literals.
//!
//! An object literal such as `Object{spec: Object.spec{replicas: 3}}` yields
//! an [`ObjectVal`]. Nested objects carry their own type name, which must
//! match the path they are reached by: the value of `spec` above must be
//! named `Object.spec`. [`ObjectVal::check_type_names`] verifies that for a
//! whole tree, and [`ObjectVal::to_native`] converts it to JSON.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use base64::Engine;
use serde_json::{Map as JsonMap, Number, Value as JsonValue};
use thiserror::Error;

use crate::eval::{MapKey, Value};
use crate::field::FieldPath;
use crate::types::TypeRef;

/// A constructed object does not fit its declared type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TypeMismatchError {
    #[error("no such field '{field}' on type '{type_name}'")]
    UnknownField { type_name: String, field: String },

    #[error("type name mismatch at '{path}': expected '{expected}', got '{actual}'")]
    TypeName {
        path: String,
        expected: String,
        actual: String,
    },
}

/// A map with a non-string key cannot be converted to a JSON object.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("map key at '{path}' must be a string, got {key}")]
pub struct MapKeyTypeError {
    pub path: String,
    pub key: String,
}

/// A value without a JSON form.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NativeError {
    #[error(transparent)]
    MapKey(#[from] MapKeyTypeError),

    #[error("double at '{path}' is not finite: {value}")]
    NonFiniteDouble { path: String, value: f64 },
}

/// An object value with a declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectVal {
    type_ref: TypeRef,
    fields: BTreeMap<String, Value>,
}

impl TypeRef {
    /// Constructs an object of this type.
    ///
    /// Schema-backed types reject fields their schema does not declare.
    pub fn val(&self, fields: HashMap<String, Value>) -> Result<ObjectVal, TypeMismatchError> {
        if self.schema().is_some() {
            if let Some(unknown) = fields.keys().find(|name| self.field(name).is_none()) {
                return Err(TypeMismatchError::UnknownField {
                    type_name: self.type_name().to_string(),
                    field: unknown.clone(),
                });
            }
        }
        Ok(ObjectVal {
            type_ref: self.clone(),
            fields: fields.into_iter().collect(),
        })
    }
}

impl ObjectVal {
    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    pub fn type_name(&self) -> &str {
        self.type_ref.type_name()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when no field was set, as opposed to no object being produced.
    pub fn is_zero(&self) -> bool {
        self.fields.is_empty()
    }

    /// Every nested object whose type name differs from its path-derived name.
    ///
    /// Lists and maps are transparent: their elements share the name of the
    /// field holding them.
    pub fn check_type_names(&self) -> Vec<TypeMismatchError> {
        let mut errors = Vec::new();
        self.check_fields(self.type_name(), &FieldPath::new(), &mut errors);
        errors
    }

    fn check_fields(&self, type_name: &str, path: &FieldPath, errors: &mut Vec<TypeMismatchError>) {
        for (name, value) in &self.fields {
            let expected = format!("{}.{}", type_name, name);
            check_value(value, &expected, &path.child(name.as_str()), errors);
        }
    }

    /// Converts to a JSON object.
    pub fn to_native(&self) -> Result<JsonMap<String, JsonValue>, NativeError> {
        self.native_fields(&FieldPath::new())
    }

    fn native_fields(&self, path: &FieldPath) -> Result<JsonMap<String, JsonValue>, NativeError> {
        self.fields
            .iter()
            .map(|(name, value)| Ok((name.clone(), to_native(value, &path.child(name.as_str()))?)))
            .collect()
    }
}

fn check_value(value: &Value, expected: &str, path: &FieldPath, errors: &mut Vec<TypeMismatchError>) {
    match value {
        Value::Object(object) => {
            if object.type_name() != expected {
                errors.push(TypeMismatchError::TypeName {
                    path: path.to_string(),
                    expected: expected.to_string(),
                    actual: object.type_name().to_string(),
                });
            }
            object.check_fields(expected, path, errors);
        }
        Value::List(items) => {
            for (i, item) in items.iter().enumerate() {
                check_value(item, expected, &path.index(i), errors);
            }
        }
        Value::Map(map) => {
            for (key, item) in map.iter() {
                check_value(item, expected, &path.key(key.to_value().to_string()), errors);
            }
        }
        Value::Null
        | Value::Bool(_)
        | Value::Int(_)
        | Value::Double(_)
        | Value::String(_)
        | Value::Bytes(_)
        | Value::Cidr(_)
        | Value::Ip(_) => {}
    }
}

/// Converts a value to JSON. Bytes become standard base64 strings.
///
/// NaN and the infinities have no JSON form and are rejected.
pub fn to_native(value: &Value, path: &FieldPath) -> Result<JsonValue, NativeError> {
    Ok(match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(i) => JsonValue::from(*i),
        Value::Double(d) => match Number::from_f64(*d) {
            Some(n) => JsonValue::Number(n),
            None => {
                return Err(NativeError::NonFiniteDouble {
                    path: path.to_string(),
                    value: *d,
                })
            }
        },
        Value::String(s) => JsonValue::String(s.to_string()),
        Value::Bytes(b) => {
            JsonValue::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
        Value::List(items) => JsonValue::Array(
            items
                .iter()
                .enumerate()
                .map(|(i, item)| to_native(item, &path.index(i)))
                .collect::<Result<_, _>>()?,
        ),
        Value::Map(map) => {
            let mut object = JsonMap::with_capacity(map.len());
            for (key, item) in map.iter() {
                let MapKey::String(k) = key else {
                    return Err(MapKeyTypeError {
                        path: path.to_string(),
                        key: key.to_value().to_string(),
                    }
                    .into());
                };
                object.insert(k.to_string(), to_native(item, &path.key(k.as_ref()))?);
            }
            JsonValue::Object(object)
        }
        Value::Object(object) => JsonValue::Object(object.native_fields(path)?),
        Value::Cidr(c) => JsonValue::String(c.to_string()),
        Value::Ip(ip) => JsonValue::String(ip.to_string()),
    })
}

impl fmt::Display for ObjectVal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.type_name())?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StructuralSchema;
    use serde_json::json;
    use std::sync::Arc;

    fn fields(entries: Vec<(&str, Value)>) -> HashMap<String, Value> {
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_round_trip_to_native() {
        let t = TypeRef::unstructured("T");
        let object = t
            .val(fields(vec![
                ("a", Value::Int(1)),
                (
                    "b",
                    Value::from(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
                ),
            ]))
            .unwrap();
        assert_eq!(
            JsonValue::Object(object.to_native().unwrap()),
            json!({"a": 1, "b": [1, 2, 3]})
        );
        assert!(!object.is_zero());
        assert!(t.val(HashMap::new()).unwrap().is_zero());
    }

    #[test]
    fn test_bytes_and_nested_objects_to_native() {
        let inner = TypeRef::unstructured("T.spec")
            .val(fields(vec![("data", Value::bytes(b"hi".as_slice()))]))
            .unwrap();
        let outer = TypeRef::unstructured("T")
            .val(fields(vec![("spec", Value::Object(Arc::new(inner)))]))
            .unwrap();
        assert_eq!(
            JsonValue::Object(outer.to_native().unwrap()),
            json!({"spec": {"data": "aGk="}})
        );
    }

    #[test]
    fn test_non_string_map_key_is_an_error() {
        let object = TypeRef::unstructured("T")
            .val(fields(vec![(
                "m",
                Value::map([(MapKey::Int(1), Value::Bool(true))]),
            )]))
            .unwrap();
        let err = object.to_native().unwrap_err();
        assert_eq!(
            err,
            NativeError::MapKey(MapKeyTypeError {
                path: "m".to_string(),
                key: "1".to_string(),
            })
        );
    }

    #[test]
    fn test_non_finite_double_is_an_error() {
        let object = TypeRef::unstructured("T")
            .val(fields(vec![(
                "ratio",
                Value::from(vec![Value::Double(1.5), Value::Double(f64::INFINITY)]),
            )]))
            .unwrap();
        let err = object.to_native().unwrap_err();
        assert!(matches!(
            err,
            NativeError::NonFiniteDouble { ref path, .. } if path == "ratio[1]"
        ));
        assert!(to_native(&Value::Double(f64::NAN), &FieldPath::new()).is_err());
    }

    #[test]
    fn test_check_type_names_collects_every_violation() {
        let wrong = |name: &str| {
            Value::Object(Arc::new(
                TypeRef::unstructured(name).val(HashMap::new()).unwrap(),
            ))
        };
        let good_spec = TypeRef::unstructured("T.spec")
            .val(fields(vec![(
                "items",
                Value::from(vec![wrong("T.spec.items"), wrong("Other")]),
            )]))
            .unwrap();
        let root = TypeRef::unstructured("T")
            .val(fields(vec![
                ("spec", Value::Object(Arc::new(good_spec))),
                ("status", wrong("T.spec")),
            ]))
            .unwrap();

        let errors = root.check_type_names();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&TypeMismatchError::TypeName {
            path: "spec.items[1]".to_string(),
            expected: "T.spec.items".to_string(),
            actual: "Other".to_string(),
        }));
        assert!(errors.contains(&TypeMismatchError::TypeName {
            path: "status".to_string(),
            expected: "T.status".to_string(),
            actual: "T.spec".to_string(),
        }));
    }

    #[test]
    fn test_schema_backed_type_rejects_unknown_fields() {
        let schema = StructuralSchema::from_json(&json!({
            "type": "object",
            "properties": {"replicas": {"type": "integer"}}
        }))
        .unwrap();
        let t = TypeRef::new("Object", schema);
        assert!(t.val(fields(vec![("replicas", Value::Int(1))])).is_ok());
        assert_eq!(
            t.val(fields(vec![("replica", Value::Int(1))])).unwrap_err(),
            TypeMismatchError::UnknownField {
                type_name: "Object".to_string(),
                field: "replica".to_string(),
            }
        );
    }
}
