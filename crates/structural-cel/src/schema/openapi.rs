//! OpenAPI v3 documents converted into an arena of schema nodes.
//!
//! Named definitions under `components.schemas` occupy the first arena slots.
//! A `$ref` (or an `allOf` holding a single `$ref`) resolves to the handle of
//! its target at conversion time, so recursive definitions cost one handle
//! lookup per step instead of an unbounded expansion.
//!
//! A reference with keywords of its own next to it becomes a node of its
//! own: the target's keywords with the sibling keywords laid over them.
//! `x-kubernetes-validations` and `required` accumulate, any other sibling
//! keyword replaces the target's.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{
    node_shape, AdditionalProperties, Facets, RawAdditional, Schema, SchemaConversionError,
    SchemaKind, SchemaRef,
};
use crate::field::FieldPath;

const REF_PREFIX: &str = "#/components/schemas/";

/// Keywords that never change validation or typing.
const ANNOTATIONS: &[&str] = &["$ref", "allOf", "description", "title", "example"];

type NodeId = usize;

#[derive(Debug)]
enum NodeAdditional {
    Allowed(bool),
    Schema(NodeId),
}

#[derive(Debug)]
struct Node {
    kind: Option<SchemaKind>,
    facets: Facets,
    properties: Vec<(String, NodeId)>,
    items: Option<NodeId>,
    additional: Option<NodeAdditional>,
}

#[derive(Debug)]
struct Arena {
    nodes: Vec<Node>,
}

/// A converted OpenAPI document.
#[derive(Debug, Clone)]
pub struct OpenApiDocument {
    arena: Arc<Arena>,
    names: HashMap<String, NodeId>,
}

/// Handle to one node of an [`OpenApiDocument`].
#[derive(Debug, Clone)]
pub struct OpenApiSchema {
    arena: Arc<Arena>,
    id: NodeId,
}

impl OpenApiDocument {
    /// Converts every definition in `components.schemas`.
    pub fn from_json(document: &JsonValue) -> Result<Self, SchemaConversionError> {
        let root = FieldPath::new().child("components").child("schemas");
        let definitions = document
            .pointer("/components/schemas")
            .and_then(JsonValue::as_object)
            .ok_or_else(|| SchemaConversionError::new(&root, "missing components.schemas"))?;

        let names: HashMap<String, NodeId> = definitions
            .keys()
            .enumerate()
            .map(|(id, name)| (name.clone(), id))
            .collect();

        let mut builder = Builder {
            names: &names,
            definitions: definitions.values().collect(),
            nodes: std::iter::repeat_with(|| None)
                .take(definitions.len())
                .collect(),
        };
        let mut aliases = HashMap::new();
        for (name, definition) in definitions {
            let path = root.key(name.as_str());
            let id = names[name];
            let node = match resolve_ref(definition, &path, &names)? {
                Some(_) if has_siblings(definition) => {
                    let merged = builder.merge_ref(definition, &path)?;
                    builder.node(&merged, &path)?
                }
                Some(target) => {
                    aliases.insert(id, target);
                    builder.node(&strip_ref(definition), &path)?
                }
                None => builder.node(definition, &path)?,
            };
            builder.nodes[id] = Some(node);
        }

        let nodes = builder
            .nodes
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| SchemaConversionError::new(&root, "unfilled schema slot"))?;

        let mut resolved = HashMap::with_capacity(names.len());
        for (name, &id) in &names {
            let mut target = id;
            let mut hops = 0;
            while let Some(&next) = aliases.get(&target) {
                hops += 1;
                if hops > aliases.len() {
                    return Err(SchemaConversionError::new(
                        &root.key(name.as_str()),
                        "definition is an alias cycle",
                    ));
                }
                target = next;
            }
            resolved.insert(name.clone(), target);
        }

        Ok(Self {
            arena: Arc::new(Arena { nodes }),
            names: resolved,
        })
    }

    /// Handle to a named definition.
    pub fn schema(&self, name: &str) -> Option<SchemaRef> {
        self.names.get(name).map(|&id| {
            Arc::new(OpenApiSchema {
                arena: self.arena.clone(),
                id,
            }) as SchemaRef
        })
    }

    /// Number of nodes in the arena, named and anonymous.
    pub fn node_count(&self) -> usize {
        self.arena.nodes.len()
    }
}

/// Returns the target of a `$ref` or single-entry `allOf: [{$ref}]`.
fn resolve_ref(
    node: &JsonValue,
    path: &FieldPath,
    names: &HashMap<String, NodeId>,
) -> Result<Option<NodeId>, SchemaConversionError> {
    let reference = match (node.get("$ref"), node.get("allOf")) {
        (Some(r), _) => r,
        (None, Some(JsonValue::Array(all))) if all.len() == 1 => match all[0].get("$ref") {
            Some(r) => r,
            None => return Ok(None),
        },
        _ => return Ok(None),
    };
    let reference = reference
        .as_str()
        .ok_or_else(|| SchemaConversionError::new(path, "$ref must be a string"))?;
    let name = reference.strip_prefix(REF_PREFIX).ok_or_else(|| {
        SchemaConversionError::new(path, format!("unsupported $ref '{}'", reference))
    })?;
    names
        .get(name)
        .copied()
        .map(Some)
        .ok_or_else(|| SchemaConversionError::new(path, format!("unresolvable $ref '{}'", reference)))
}

/// A reference node carries keywords beyond the reference itself.
fn has_siblings(node: &JsonValue) -> bool {
    node.as_object()
        .is_some_and(|o| o.keys().any(|k| !ANNOTATIONS.contains(&k.as_str())))
}

/// An alias definition is resolved by name; its own slot only holds the
/// remaining keys.
fn strip_ref(node: &JsonValue) -> JsonValue {
    let mut node = node.clone();
    if let Some(object) = node.as_object_mut() {
        object.remove("$ref");
        object.remove("allOf");
    }
    node
}

/// Lays the keywords of `layer` over `base`.
fn overlay(base: &mut JsonValue, layer: JsonValue) {
    let (Some(base), JsonValue::Object(layer)) = (base.as_object_mut(), layer) else {
        return;
    };
    for (key, value) in layer {
        if matches!(key.as_str(), "x-kubernetes-validations" | "required") {
            if let (Some(JsonValue::Array(existing)), JsonValue::Array(more)) =
                (base.get_mut(&key), &value)
            {
                existing.extend(more.iter().cloned());
                continue;
            }
        }
        base.insert(key, value);
    }
}

struct Builder<'a> {
    names: &'a HashMap<String, NodeId>,
    /// Definition bodies, indexed like `names`.
    definitions: Vec<&'a JsonValue>,
    nodes: Vec<Option<Node>>,
}

impl Builder<'_> {
    /// Converts a nested schema, returning the handle it is reachable by.
    fn child(&mut self, node: &JsonValue, path: &FieldPath) -> Result<NodeId, SchemaConversionError> {
        let converted = match resolve_ref(node, path, self.names)? {
            Some(target) if !has_siblings(node) => return Ok(target),
            Some(_) => {
                let merged = self.merge_ref(node, path)?;
                self.node(&merged, path)?
            }
            None => self.node(node, path)?,
        };
        self.nodes.push(Some(converted));
        Ok(self.nodes.len() - 1)
    }

    /// Flattens a reference chain into one schema body, nearest keywords on
    /// top. Nested references inside the body stay references.
    fn merge_ref(&self, node: &JsonValue, path: &FieldPath) -> Result<JsonValue, SchemaConversionError> {
        let mut layers = vec![strip_ref(node)];
        let mut current = node;
        while let Some(target) = resolve_ref(current, path, self.names)? {
            if layers.len() > self.definitions.len() {
                return Err(SchemaConversionError::new(path, "$ref chain is a cycle"));
            }
            current = self.definitions[target];
            layers.push(strip_ref(current));
        }
        let mut merged = JsonValue::Object(Default::default());
        while let Some(layer) = layers.pop() {
            overlay(&mut merged, layer);
        }
        Ok(merged)
    }

    fn node(&mut self, node: &JsonValue, path: &FieldPath) -> Result<Node, SchemaConversionError> {
        let shape = node_shape(node, path)?;

        let properties_path = path.child("properties");
        let mut properties = Vec::with_capacity(shape.properties.len());
        for (name, prop) in shape.properties {
            let id = self.child(prop, &properties_path.key(name.as_str()))?;
            properties.push((name.clone(), id));
        }

        let items = match shape.items {
            Some(items) => Some(self.child(items, &path.child("items"))?),
            None => None,
        };

        let additional = match shape.additional {
            None => None,
            Some(RawAdditional::Allowed(b)) => Some(NodeAdditional::Allowed(b)),
            Some(RawAdditional::Schema(s)) => Some(NodeAdditional::Schema(
                self.child(s, &path.child("additionalProperties"))?,
            )),
        };

        Ok(Node {
            kind: shape.kind,
            facets: shape.facets,
            properties,
            items,
            additional,
        })
    }
}

impl OpenApiSchema {
    fn node(&self) -> &Node {
        &self.arena.nodes[self.id]
    }

    fn handle(&self, id: NodeId) -> SchemaRef {
        Arc::new(OpenApiSchema {
            arena: self.arena.clone(),
            id,
        })
    }
}

impl Schema for OpenApiSchema {
    fn kind(&self) -> Option<SchemaKind> {
        self.node().kind
    }

    fn facets(&self) -> &Facets {
        &self.node().facets
    }

    fn properties(&self) -> Vec<(String, SchemaRef)> {
        self.node()
            .properties
            .iter()
            .map(|(name, id)| (name.clone(), self.handle(*id)))
            .collect()
    }

    fn property(&self, name: &str) -> Option<SchemaRef> {
        self.node()
            .properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| self.handle(*id))
    }

    fn items(&self) -> Option<SchemaRef> {
        self.node().items.map(|id| self.handle(id))
    }

    fn additional_properties(&self) -> Option<AdditionalProperties> {
        self.node().additional.as_ref().map(|a| match a {
            NodeAdditional::Allowed(b) => AdditionalProperties::Allowed(*b),
            NodeAdditional::Schema(id) => AdditionalProperties::Schema(self.handle(*id)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree_document() -> JsonValue {
        json!({
            "components": {
                "schemas": {
                    "Tree": {
                        "type": "object",
                        "properties": {
                            "value": {"type": "integer", "maximum": 10},
                            "children": {
                                "type": "array",
                                "items": {"$ref": "#/components/schemas/Tree"}
                            },
                            "meta": {"allOf": [{"$ref": "#/components/schemas/Meta"}]}
                        }
                    },
                    "Meta": {
                        "type": "object",
                        "properties": {"name": {"type": "string"}}
                    }
                }
            }
        })
    }

    #[test]
    fn test_recursive_reference_is_a_handle() {
        let document = OpenApiDocument::from_json(&tree_document()).unwrap();
        let tree = document.schema("Tree").unwrap();

        let mut node = tree.clone();
        for _ in 0..100 {
            node = node.property("children").unwrap().items().unwrap();
        }
        assert_eq!(node.kind(), Some(SchemaKind::Object));
        assert_eq!(node.property("value").unwrap().facets().maximum, Some(10.0));

        // Tree, Meta, value, children and Meta's name. The two refs add nothing.
        assert_eq!(document.node_count(), 5);
    }

    #[test]
    fn test_all_of_single_ref() {
        let document = OpenApiDocument::from_json(&tree_document()).unwrap();
        let meta = document
            .schema("Tree")
            .unwrap()
            .property("meta")
            .unwrap();
        assert!(meta.property("name").is_some());
    }

    #[test]
    fn test_unresolvable_ref() {
        let err = OpenApiDocument::from_json(&json!({
            "components": {"schemas": {
                "A": {"type": "object", "properties": {"b": {"$ref": "#/components/schemas/B"}}}
            }}
        }))
        .unwrap_err();
        assert_eq!(err.path.to_string(), "components.schemas[A].properties[b]");
        assert!(err.message.contains("unresolvable"));
    }

    #[test]
    fn test_alias_definitions() {
        let document = OpenApiDocument::from_json(&json!({
            "components": {"schemas": {
                "A": {"$ref": "#/components/schemas/B"},
                "B": {"type": "object", "properties": {"x": {"type": "string"}}}
            }}
        }))
        .unwrap();
        assert!(document.schema("A").unwrap().property("x").is_some());

        let err = OpenApiDocument::from_json(&json!({
            "components": {"schemas": {
                "A": {"$ref": "#/components/schemas/B"},
                "B": {"$ref": "#/components/schemas/A"}
            }}
        }))
        .unwrap_err();
        assert!(err.message.contains("alias cycle"));
    }

    fn port_document() -> JsonValue {
        json!({
            "components": {"schemas": {
                "Port": {
                    "type": "integer",
                    "minimum": 1,
                    "x-kubernetes-validations": [{"rule": "self != 22"}]
                },
                "Svc": {
                    "type": "object",
                    "properties": {
                        "port": {
                            "allOf": [{"$ref": "#/components/schemas/Port"}],
                            "description": "listening port",
                            "x-kubernetes-validations": [{"rule": "self < 100"}]
                        },
                        "plain": {"$ref": "#/components/schemas/Port"}
                    }
                },
                "NarrowPort": {
                    "$ref": "#/components/schemas/Port",
                    "maximum": 50
                }
            }}
        })
    }

    #[test]
    fn test_ref_siblings_overlay_target() {
        let document = OpenApiDocument::from_json(&port_document()).unwrap();
        let svc = document.schema("Svc").unwrap();

        let port = svc.property("port").unwrap();
        assert_eq!(port.kind(), Some(SchemaKind::Integer));
        assert_eq!(port.facets().minimum, Some(1.0));
        let rules: Vec<_> = port.facets().validations.iter().map(|r| r.rule.as_str()).collect();
        assert_eq!(rules, ["self != 22", "self < 100"]);

        let plain = svc.property("plain").unwrap();
        assert_eq!(plain.facets().validations.len(), 1);
    }

    #[test]
    fn test_alias_definition_with_siblings() {
        let document = OpenApiDocument::from_json(&port_document()).unwrap();
        let narrow = document.schema("NarrowPort").unwrap();
        assert_eq!(narrow.kind(), Some(SchemaKind::Integer));
        assert_eq!(narrow.facets().maximum, Some(50.0));
        assert_eq!(narrow.facets().minimum, Some(1.0));
        assert_eq!(narrow.facets().validations.len(), 1);
    }

    #[test]
    fn test_ref_cycle_with_siblings() {
        let err = OpenApiDocument::from_json(&json!({
            "components": {"schemas": {
                "A": {"$ref": "#/components/schemas/B", "maxLength": 3},
                "B": {"$ref": "#/components/schemas/A", "minLength": 1}
            }}
        }))
        .unwrap_err();
        assert!(err.message.contains("cycle"));
    }

    #[test]
    fn test_missing_components() {
        assert!(OpenApiDocument::from_json(&json!({"openapi": "3.0.0"})).is_err());
    }
}
