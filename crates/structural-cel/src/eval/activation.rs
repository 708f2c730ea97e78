//! Variable bindings for evaluation.
//!
//! [`RuleActivation`] is what the validator binds for a rule: `self`,
//! `oldSelf`, caller variables, and the root object's properties under
//! their escaped identifiers.

use std::collections::HashMap;

use super::Value;
use crate::escaping;

/// Resolves variable names during evaluation.
pub trait Activation: Send + Sync {
    /// Returns `None` if the variable is not bound.
    fn resolve(&self, name: &str) -> Option<Value>;

    fn has(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }
}

/// An activation backed by a HashMap.
#[derive(Debug, Clone, Default)]
pub struct MapActivation {
    bindings: HashMap<String, Value>,
}

impl MapActivation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binding(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl Activation for MapActivation {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.bindings.get(name).cloned()
    }

    fn has(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }
}

/// Local bindings layered over a parent; used for comprehension variables.
pub struct HierarchicalActivation<'a> {
    parent: &'a dyn Activation,
    local: HashMap<String, Value>,
}

impl<'a> HierarchicalActivation<'a> {
    pub fn new(parent: &'a dyn Activation) -> Self {
        Self {
            parent,
            local: HashMap::new(),
        }
    }

    pub fn with_binding(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.local.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.local.insert(name.into(), value.into());
    }
}

impl Activation for HierarchicalActivation<'_> {
    fn resolve(&self, name: &str) -> Option<Value> {
        self.local
            .get(name)
            .cloned()
            .or_else(|| self.parent.resolve(name))
    }

    fn has(&self, name: &str) -> bool {
        self.local.contains_key(name) || self.parent.has(name)
    }
}

/// Bindings for one rule evaluation.
#[derive(Debug, Clone)]
pub struct RuleActivation {
    self_value: Value,
    old_self: Option<Value>,
    variables: HashMap<String, Value>,
    expose_root_properties: bool,
}

impl RuleActivation {
    pub fn new(self_value: Value) -> Self {
        Self {
            self_value,
            old_self: None,
            variables: HashMap::new(),
            expose_root_properties: false,
        }
    }

    /// Binds `oldSelf`. `None` leaves it unbound, which evaluates to `null`
    /// for rules compiled with an optional old value.
    pub fn with_old_self(mut self, old_self: Option<Value>) -> Self {
        self.old_self = old_self;
        self
    }

    /// Binds a caller variable such as `params` or `request`.
    pub fn with_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    /// Resolves unknown identifiers as escaped properties of `self`.
    pub fn with_root_properties(mut self) -> Self {
        self.expose_root_properties = true;
        self
    }
}

impl Activation for RuleActivation {
    fn resolve(&self, name: &str) -> Option<Value> {
        match name {
            "self" => return Some(self.self_value.clone()),
            "oldSelf" => return self.old_self.clone(),
            _ => {}
        }
        if let Some(value) = self.variables.get(name) {
            return Some(value.clone());
        }
        if !self.expose_root_properties {
            return None;
        }
        let property = escaping::unescape(name);
        match &self.self_value {
            Value::Map(m) => m.get_str(&property).cloned(),
            Value::Object(o) => o.get(&property).cloned(),
            _ => None,
        }
    }
}
