//! Declarations shared by the checker and the evaluator.

use std::sync::Arc;

use super::CelType;
use crate::eval::{CallCost, EvalError, FunctionImpl, Value};

/// A declared variable.
#[derive(Debug, Clone)]
pub struct VariableDecl {
    pub name: String,
    pub cel_type: CelType,
}

impl VariableDecl {
    pub fn new(name: impl Into<String>, cel_type: CelType) -> Self {
        Self {
            name: name.into(),
            cel_type,
        }
    }
}

/// One signature of a function.
///
/// Operators are declared with an overload but no implementation: the
/// evaluator handles them natively.
#[derive(Clone)]
pub struct OverloadDecl {
    /// Unique identifier, e.g. `string_starts_with`.
    pub id: String,
    /// Parameter types, receiver first for member functions.
    pub params: Vec<CelType>,
    pub result: CelType,
    pub is_member: bool,
    pub type_params: Vec<String>,
    pub implementation: Option<FunctionImpl>,
    pub cost: CallCost,
}

impl OverloadDecl {
    /// A global function `name(args...)`.
    pub fn function(id: impl Into<String>, params: Vec<CelType>, result: CelType) -> Self {
        Self {
            id: id.into(),
            params,
            result,
            is_member: false,
            type_params: Vec::new(),
            implementation: None,
            cost: CallCost::Fixed(1),
        }
    }

    /// A receiver-style function `recv.name(args...)`; `params[0]` is the receiver.
    pub fn method(id: impl Into<String>, params: Vec<CelType>, result: CelType) -> Self {
        Self {
            is_member: true,
            ..Self::function(id, params, result)
        }
    }

    pub fn with_type_params(mut self, params: &[&str]) -> Self {
        self.type_params = params.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_impl<F>(mut self, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.implementation = Some(Arc::new(f));
        self
    }

    pub fn with_cost(mut self, cost: CallCost) -> Self {
        self.cost = cost;
        self
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl std::fmt::Debug for OverloadDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverloadDecl")
            .field("id", &self.id)
            .field("params", &self.params)
            .field("result", &self.result)
            .field("is_member", &self.is_member)
            .field("has_impl", &self.implementation.is_some())
            .finish()
    }
}

/// A function and all of its overloads.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub overloads: Vec<OverloadDecl>,
}

impl FunctionDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overloads: Vec::new(),
        }
    }

    pub fn with_overload(mut self, overload: OverloadDecl) -> Self {
        self.overloads.push(overload);
        self
    }

    /// Adds the overloads of `other`, replacing any with the same id.
    pub fn merge(&mut self, other: FunctionDecl) {
        for overload in other.overloads {
            self.overloads.retain(|o| o.id != overload.id);
            self.overloads.push(overload);
        }
    }
}
