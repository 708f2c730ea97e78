//! Scope management for variable resolution during type checking.
//!
//! Comprehension iteration and accumulator variables shadow outer bindings
//! inside their own scope.

use std::collections::HashMap;

use crate::types::{CelType, VariableDecl};

#[derive(Debug, Clone, Default)]
struct Scope {
    variables: HashMap<String, VariableDecl>,
}

/// A stack of scopes, innermost last.
#[derive(Debug)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    /// Pops the innermost scope. The outermost scope is never popped.
    pub fn exit_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    pub fn add_variable(&mut self, name: impl Into<String>, cel_type: CelType) {
        let name = name.into();
        if let Some(scope) = self.scopes.last_mut() {
            scope
                .variables
                .insert(name.clone(), VariableDecl::new(name, cel_type));
        }
    }

    /// Resolves a name from the innermost scope outward.
    pub fn resolve(&self, name: &str) -> Option<&VariableDecl> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.variables.get(name))
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shadowing() {
        let mut scopes = ScopeStack::new();
        scopes.add_variable("x", CelType::Int);
        scopes.enter_scope();
        scopes.add_variable("x", CelType::String);
        assert_eq!(scopes.resolve("x").unwrap().cel_type, CelType::String);
        scopes.exit_scope();
        assert_eq!(scopes.resolve("x").unwrap().cel_type, CelType::Int);

        scopes.exit_scope();
        assert!(scopes.resolve("x").is_some());
    }
}
