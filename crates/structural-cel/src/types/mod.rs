//! Expression types and their derivation from schemas.
//!
//! Object types are [`TypeRef`] handles over a schema node. Field types are
//! derived on demand through [`TypeRef::field`], so a recursive schema is
//! only ever expanded as far as an expression navigates it.

mod decls;

use std::fmt;
use std::sync::Arc;

pub use decls::{FunctionDecl, OverloadDecl, VariableDecl};

use crate::escaping;
use crate::schema::{with_type_and_object_meta, AdditionalProperties, SchemaKind, SchemaRef};

/// The type of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum CelType {
    Bool,
    Int,
    Double,
    String,
    Bytes,
    Null,
    Dyn,
    List(Arc<CelType>),
    Map(Arc<CelType>, Arc<CelType>),
    Object(TypeRef),
    Cidr,
    Ip,
    /// Generic parameter in an overload signature.
    TypeParam(Arc<str>),
    /// Placeholder after a check error; assignable to anything.
    Error,
}

impl CelType {
    pub fn list(elem: CelType) -> Self {
        CelType::List(Arc::new(elem))
    }

    pub fn map(key: CelType, value: CelType) -> Self {
        CelType::Map(Arc::new(key), Arc::new(value))
    }

    pub fn param(name: &str) -> Self {
        CelType::TypeParam(Arc::from(name))
    }

    /// Name used in check error messages.
    pub fn display_name(&self) -> String {
        match self {
            CelType::Bool => "bool".to_string(),
            CelType::Int => "int".to_string(),
            CelType::Double => "double".to_string(),
            CelType::String => "string".to_string(),
            CelType::Bytes => "bytes".to_string(),
            CelType::Null => "null_type".to_string(),
            CelType::Dyn => "dyn".to_string(),
            CelType::List(elem) => format!("list({})", elem.display_name()),
            CelType::Map(k, v) => format!("map({}, {})", k.display_name(), v.display_name()),
            CelType::Object(t) => t.type_name().to_string(),
            CelType::Cidr => "net.CIDR".to_string(),
            CelType::Ip => "net.IP".to_string(),
            CelType::TypeParam(name) => name.to_string(),
            CelType::Error => "*error*".to_string(),
        }
    }

    /// True for values that support field selection by name.
    pub fn is_object_like(&self) -> bool {
        matches!(self, CelType::Object(_))
    }

    /// True if values of this type may be null at runtime.
    pub fn is_nullable(&self) -> bool {
        matches!(
            self,
            CelType::Null | CelType::Dyn | CelType::Error | CelType::Object(_)
        )
    }
}

impl fmt::Display for CelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

// ============================================================================
// Object types
// ============================================================================

/// Handle over an object type.
///
/// Two handles are the same type when their names are equal. A handle without
/// a schema is unstructured: any field name is accepted with type `dyn`.
#[derive(Clone)]
pub struct TypeRef {
    name: Arc<str>,
    schema: Option<SchemaRef>,
}

impl TypeRef {
    pub fn new(name: impl Into<Arc<str>>, schema: SchemaRef) -> Self {
        Self {
            name: name.into(),
            schema: Some(schema),
        }
    }

    pub fn unstructured(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            schema: None,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> Option<&SchemaRef> {
        self.schema.as_ref()
    }

    /// Looks up a field by its property name.
    pub fn field(&self, name: &str) -> Option<FieldType> {
        let Some(schema) = &self.schema else {
            return Some(FieldType {
                name: name.to_string(),
                cel_type: CelType::Dyn,
                schema: None,
                required: false,
            });
        };
        let property = schema.property(name)?;
        let child_name = format!("{}.{}", self.name, name);
        Some(FieldType {
            name: name.to_string(),
            cel_type: schema_type(&property, &child_name),
            required: schema.facets().required.iter().any(|r| r == name),
            schema: Some(property),
        })
    }

    /// Looks up a field by the identifier it is exposed under.
    ///
    /// Only the exact escaped form of a property resolves to it: `a__dash__b`
    /// finds `a-b`, but `a-b` never appears as an identifier.
    pub fn field_by_ident(&self, ident: &str) -> Option<FieldType> {
        if self.schema.is_none() {
            return self.field(ident);
        }
        let name = escaping::unescape(ident);
        if escaping::escape(&name).as_deref() != Some(ident) {
            return None;
        }
        self.field(&name)
    }

    /// Every declared field, in schema order.
    pub fn fields(&self) -> Vec<FieldType> {
        let Some(schema) = &self.schema else {
            return Vec::new();
        };
        schema
            .properties()
            .into_iter()
            .filter_map(|(name, _)| self.field(&name))
            .collect()
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRef")
            .field("name", &self.name)
            .field("structured", &self.schema.is_some())
            .finish()
    }
}

/// A field of an object type.
#[derive(Debug, Clone)]
pub struct FieldType {
    /// The property name (unescaped).
    pub name: String,
    pub cel_type: CelType,
    pub schema: Option<SchemaRef>,
    pub required: bool,
}

/// Derives the expression type of a schema node.
///
/// `type_name` names object types found at this node; nested objects extend it
/// with `.<property>`. List items and map values share their parent's name.
pub fn schema_type(schema: &SchemaRef, type_name: &str) -> CelType {
    let facets = schema.facets();
    if facets.int_or_string {
        return CelType::Dyn;
    }
    match schema.kind() {
        None => CelType::Dyn,
        Some(SchemaKind::Boolean) => CelType::Bool,
        Some(SchemaKind::Integer) => CelType::Int,
        Some(SchemaKind::Number) => CelType::Double,
        Some(SchemaKind::String) if facets.format.as_deref() == Some("byte") => CelType::Bytes,
        Some(SchemaKind::String) => CelType::String,
        Some(SchemaKind::Array) => match schema.items() {
            Some(items) => CelType::list(schema_type(&items, type_name)),
            None => CelType::list(CelType::Dyn),
        },
        Some(SchemaKind::Object) => {
            if facets.embedded_resource {
                return CelType::Object(TypeRef::new(
                    type_name,
                    with_type_and_object_meta(schema.clone()),
                ));
            }
            let has_properties = !schema.properties().is_empty();
            match schema.additional_properties() {
                Some(AdditionalProperties::Schema(values)) => {
                    CelType::map(CelType::String, schema_type(&values, type_name))
                }
                Some(AdditionalProperties::Allowed(true)) if !has_properties => {
                    CelType::map(CelType::String, CelType::Dyn)
                }
                _ if facets.preserve_unknown_fields && !has_properties => {
                    CelType::map(CelType::String, CelType::Dyn)
                }
                _ => CelType::Object(TypeRef::new(type_name, schema.clone())),
            }
        }
    }
}

/// Upper bound on the size of values of a schema node, if declared.
pub fn schema_max_size(schema: &SchemaRef) -> Option<u64> {
    let facets = schema.facets();
    match schema.kind() {
        Some(SchemaKind::Array) => facets.max_items,
        Some(SchemaKind::String) => facets.max_length,
        Some(SchemaKind::Object) => facets.max_properties,
        _ => None,
    }
}
