//! Schema validation of whole objects.
//!
//! [`SchemaValidator`] compiles every rule of a schema once and then checks
//! any number of objects against it. A walk visits each node in this order:
//!
//! 1. value validations (`required`, bounds, `enum`, `format`, ...)
//! 2. the node's rules
//! 3. list items
//! 4. `additionalProperties` entries
//! 5. declared properties
//!
//! On update the previous object is walked alongside. Old values correlate
//! through object properties, map entries and `listType: map` lists; set and
//! atomic list items never correlate.

mod rules;
mod values;

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::config::CelConfig;
use crate::env::{EnvironmentBuilder, RuleMode};
use crate::field::{ErrorList, FieldError, FieldPath};
use crate::ratchet::{Operation, RatchetState};
use crate::schema::{Facets, ListType, OpenApiDocument, SchemaRef, StructuralSchema};

pub use rules::BUDGET_EXHAUSTED as BUDGET_EXHAUSTED_DETAIL;

use rules::{evaluate_rules, CompiledRule, RuleTarget};
use values::{list_map_key, ValueValidator};

#[derive(Debug)]
struct Node {
    schema: SchemaRef,
    values: ValueValidator,
    rules: Vec<CompiledRule>,
    items: Option<usize>,
    properties: Vec<(String, usize)>,
    additional: Option<usize>,
}

/// Validates objects against a schema and its rules.
///
/// Immutable once built; share it between threads freely.
#[derive(Debug)]
pub struct SchemaValidator {
    nodes: Vec<Node>,
    config: CelConfig,
}

impl SchemaValidator {
    /// Compiles the rules of every node reachable from `schema`.
    ///
    /// Every distinct node is compiled once, however many references reach
    /// it.
    pub fn new(schema: SchemaRef, config: CelConfig) -> Self {
        let mut validator = Self {
            nodes: Vec::new(),
            config,
        };
        validator.build(schema, &mut HashMap::new());
        tracing::debug!(nodes = validator.nodes.len(), "compiled schema validator");
        validator
    }

    /// Converts a structural schema document and compiles it.
    ///
    /// A document that cannot be converted is reported as one internal error.
    pub fn from_structural_json(
        document: &JsonValue,
        config: CelConfig,
    ) -> Result<Self, FieldError> {
        let schema = StructuralSchema::from_json(document)
            .map_err(|e| FieldError::internal(FieldPath::new(), e.to_string()))?;
        Ok(Self::new(schema, config))
    }

    /// Converts the definition `name` of an OpenAPI document and compiles it.
    ///
    /// A document that cannot be converted, or has no such definition, is
    /// reported as one internal error.
    pub fn from_openapi_json(
        document: &JsonValue,
        name: &str,
        config: CelConfig,
    ) -> Result<Self, FieldError> {
        let document = OpenApiDocument::from_json(document)
            .map_err(|e| FieldError::internal(FieldPath::new(), e.to_string()))?;
        let schema = document.schema(name).ok_or_else(|| {
            FieldError::internal(
                FieldPath::new(),
                format!("no schema definition named '{}'", name),
            )
        })?;
        Ok(Self::new(schema, config))
    }

    /// Nodes are keyed by the address of their facets. Every schema handle
    /// stays alive in `self.nodes`, so an address never names two nodes.
    fn build(&mut self, schema: SchemaRef, seen: &mut HashMap<*const Facets, usize>) -> usize {
        let key: *const Facets = schema.facets();
        if let Some(&index) = seen.get(&key) {
            return index;
        }

        let facets = schema.facets();
        let rules = if facets.validations.is_empty() {
            Vec::new()
        } else {
            let mut builder = EnvironmentBuilder::new(schema.clone())
                .mode(RuleMode::Update)
                .with_config(self.config.clone());
            if facets.embedded_resource {
                builder = builder.resource_root();
            }
            let env = builder.build();
            facets
                .validations
                .iter()
                .map(|rule| CompiledRule::compile(&env, rule))
                .collect()
        };

        let index = self.nodes.len();
        self.nodes.push(Node {
            schema: schema.clone(),
            values: ValueValidator::new(schema.clone()),
            rules,
            items: None,
            properties: Vec::new(),
            additional: None,
        });

        seen.insert(key, index);
        let items = schema.items().map(|s| self.build(s, seen));
        let additional = schema
            .additional_properties_schema()
            .map(|s| self.build(s, seen));
        let properties = schema
            .properties()
            .into_iter()
            .map(|(name, s)| (name, self.build(s, seen)))
            .collect();

        let node = &mut self.nodes[index];
        node.items = items;
        node.additional = additional;
        node.properties = properties;
        index
    }

    /// Number of compiled rules, across all nodes.
    pub fn rule_count(&self) -> usize {
        self.nodes.iter().map(|n| n.rules.len()).sum()
    }

    /// Validates `obj`, and on update its change from `old`.
    ///
    /// Returns the errors in traversal order and the budget left. Once the
    /// budget runs out no further rule is evaluated, but value validations
    /// still run on every node.
    pub fn validate(
        &self,
        path: &FieldPath,
        obj: &JsonValue,
        old: Option<&JsonValue>,
        budget: i64,
    ) -> (ErrorList, i64) {
        let operation = if old.is_some() {
            Operation::Update
        } else {
            Operation::Create
        };
        let mut walk = Walk {
            validator: self,
            errors: ErrorList::new(),
            budget,
            exhausted: false,
            ratcheting: self.config.ratcheting && operation == Operation::Update,
        };
        let mut ratchet = RatchetState::new();
        walk.node(&mut ratchet, 0, path, obj, old);
        (walk.errors, walk.budget)
    }

    /// Validates with the configured runtime cost budget.
    pub fn validate_object(&self, obj: &JsonValue, old: Option<&JsonValue>) -> ErrorList {
        self.validate(&FieldPath::new(), obj, old, self.config.runtime_cost_budget)
            .0
    }
}

struct Walk<'a> {
    validator: &'a SchemaValidator,
    errors: ErrorList,
    budget: i64,
    /// No further rule may run.
    exhausted: bool,
    ratcheting: bool,
}

impl<'a> Walk<'a> {
    fn node(
        &mut self,
        ratchet: &mut RatchetState,
        index: usize,
        path: &FieldPath,
        value: &JsonValue,
        old: Option<&JsonValue>,
    ) {
        let validator = self.validator;
        let Some(node) = validator.nodes.get(index) else {
            return;
        };

        let value_errors = if self.ratcheting {
            ratchet.leaf(Operation::Update, value, old, |v| node.values.validate(path, v))
        } else {
            node.values.validate(path, value)
        };
        let mistyped = value_errors
            .iter()
            .any(|e| e.origin.as_deref() == Some("type"));
        self.errors.extend(value_errors);
        if mistyped {
            return;
        }

        if !self.exhausted {
            let target = RuleTarget {
                path,
                schema: &node.schema,
                value,
                old,
                unchanged: self.ratcheting && old == Some(value),
                max_message_bytes: validator.config.max_message_expression_bytes,
            };
            self.exhausted =
                evaluate_rules(&node.rules, &target, &mut self.budget, &mut self.errors).is_break();
        }

        ratchet.branch(|scope| self.children(scope, node, path, value, old))
    }

    fn children(
        &mut self,
        ratchet: &mut RatchetState,
        node: &Node,
        path: &FieldPath,
        value: &JsonValue,
        old: Option<&JsonValue>,
    ) {
        match value {
            JsonValue::Array(items) => {
                let Some(item_index) = node.items else {
                    return;
                };
                let facets = node.schema.facets();
                let old_items: &[JsonValue] = match (facets.list_type, old) {
                    (Some(ListType::Map), Some(JsonValue::Array(old_items))) => {
                        old_items.as_slice()
                    }
                    _ => &[],
                };
                for (i, item) in items.iter().enumerate() {
                    let old_item = correlate_list_item(&facets.list_map_keys, item, old_items);
                    self.node(ratchet, item_index, &path.index(i), item, old_item);
                }
            }
            JsonValue::Object(fields) => {
                let old_fields = old.and_then(JsonValue::as_object);
                if let Some(additional) = node.additional {
                    for (key, field) in fields {
                        if node.properties.iter().any(|(name, _)| name == key) {
                            continue;
                        }
                        let old_field = old_fields.and_then(|o| o.get(key));
                        self.node(ratchet, additional, &path.key(key.as_str()), field, old_field);
                    }
                }
                for (name, child) in &node.properties {
                    let Some(field) = fields.get(name) else {
                        continue;
                    };
                    let old_field = old_fields.and_then(|o| o.get(name));
                    self.node(ratchet, *child, &path.child(name.as_str()), field, old_field);
                }
            }
            _ => {}
        }
    }
}

fn correlate_list_item<'v>(
    keys: &[String],
    item: &JsonValue,
    old_items: &'v [JsonValue],
) -> Option<&'v JsonValue> {
    if old_items.is_empty() {
        return None;
    }
    let key = list_map_key(keys, item)?;
    old_items
        .iter()
        .find(|old| list_map_key(keys, old).as_ref() == Some(&key))
}
