//! Function implementations and registry for evaluation.
//!
//! The registry is built from the same [`FunctionDecl`]s the checker sees;
//! overloads without an implementation (operators) are skipped.

use std::collections::HashMap;
use std::sync::Arc;

use super::{EvalError, EvalErrorKind, Value};
use crate::types::FunctionDecl;

/// A function implementation.
///
/// Receives already-evaluated arguments, receiver first for member functions.
pub type FunctionImpl = Arc<dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync>;

/// Cost charged for one call of an overload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallCost {
    Fixed(u64),
    /// `base` plus `factor` times the summed size of the arguments, rounded up.
    Linear { base: u64, factor: f64 },
}

impl CallCost {
    /// Cost for arguments whose summed size is `size`.
    pub fn for_size(&self, size: u64) -> u64 {
        match *self {
            CallCost::Fixed(c) => c,
            CallCost::Linear { base, factor } => {
                base.saturating_add((size as f64 * factor).ceil() as u64)
            }
        }
    }

    /// Cost for concrete argument values.
    pub fn for_args(&self, args: &[Value]) -> u64 {
        match self {
            CallCost::Fixed(c) => *c,
            CallCost::Linear { .. } => self.for_size(args.iter().map(Value::cost_size).sum()),
        }
    }
}

/// A callable overload.
#[derive(Clone)]
pub struct Overload {
    pub id: String,
    pub is_member: bool,
    /// Number of parameters, receiver included.
    pub arity: usize,
    pub implementation: FunctionImpl,
    pub cost: CallCost,
}

impl Overload {
    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        (self.implementation)(args)
    }
}

impl std::fmt::Debug for Overload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Overload")
            .field("id", &self.id)
            .field("is_member", &self.is_member)
            .field("arity", &self.arity)
            .finish()
    }
}

/// Registry of callable functions.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Vec<Overload>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects every implemented overload of the given declarations.
    pub fn from_decls<'a>(decls: impl IntoIterator<Item = &'a FunctionDecl>) -> Self {
        let mut registry = Self::new();
        for decl in decls {
            for overload in &decl.overloads {
                let Some(implementation) = &overload.implementation else {
                    continue;
                };
                registry.register(
                    &decl.name,
                    Overload {
                        id: overload.id.clone(),
                        is_member: overload.is_member,
                        arity: overload.arity(),
                        implementation: implementation.clone(),
                        cost: overload.cost,
                    },
                );
            }
        }
        registry
    }

    pub fn register(&mut self, name: &str, overload: Overload) {
        let overloads = self.functions.entry(name.to_string()).or_default();
        overloads.retain(|o| o.id != overload.id);
        overloads.push(overload);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Overloads matching the call shape, restricted to `ids` when non-empty.
    pub fn find_overloads(
        &self,
        name: &str,
        arity: usize,
        is_member: bool,
        ids: &[String],
    ) -> Vec<&Overload> {
        self.functions
            .get(name)
            .map(|overloads| {
                overloads
                    .iter()
                    .filter(|o| o.arity == arity && o.is_member == is_member)
                    .filter(|o| ids.is_empty() || ids.contains(&o.id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Calls the first overload that accepts the arguments.
    ///
    /// An overload rejects arguments by returning a `NoMatchingOverload`
    /// error; any other error is final.
    pub fn dispatch(
        &self,
        name: &str,
        args: &[Value],
        is_member: bool,
        ids: &[String],
    ) -> Result<(Value, u64), EvalError> {
        for overload in self.find_overloads(name, args.len(), is_member, ids) {
            match overload.call(args) {
                Err(e) if e.kind == EvalErrorKind::NoMatchingOverload => continue,
                Err(e) => return Err(e),
                Ok(value) => return Ok((value, overload.cost.for_args(args))),
            }
        }
        if self.contains(name) {
            Err(EvalError::no_matching_overload(name))
        } else {
            Err(EvalError::unknown_function(name))
        }
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CelType, OverloadDecl};

    fn double_decl() -> FunctionDecl {
        FunctionDecl::new("double")
            .with_overload(
                OverloadDecl::function("double_int", vec![CelType::Int], CelType::Int).with_impl(
                    |args| match args {
                        [Value::Int(i)] => Ok(Value::Int(i * 2)),
                        _ => Err(EvalError::no_matching_overload("double")),
                    },
                ),
            )
            .with_overload(
                OverloadDecl::function("double_string", vec![CelType::String], CelType::String)
                    .with_impl(|args| match args {
                        [Value::String(s)] => Ok(Value::from(format!("{}{}", s, s))),
                        _ => Err(EvalError::no_matching_overload("double")),
                    })
                    .with_cost(CallCost::Linear {
                        base: 1,
                        factor: 0.1,
                    }),
            )
    }

    #[test]
    fn test_dispatch_falls_through_overloads() {
        let registry = FunctionRegistry::from_decls([&double_decl()]);
        let (value, cost) = registry
            .dispatch("double", &[Value::from("ab")], false, &[])
            .unwrap();
        assert_eq!(value, Value::from("abab"));
        assert_eq!(cost, 2);

        let (value, cost) = registry
            .dispatch("double", &[Value::Int(21)], false, &[])
            .unwrap();
        assert_eq!(value, Value::Int(42));
        assert_eq!(cost, 1);
    }

    #[test]
    fn test_dispatch_errors() {
        let registry = FunctionRegistry::from_decls([&double_decl()]);
        let err = registry
            .dispatch("double", &[Value::Bool(true)], false, &[])
            .unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::NoMatchingOverload);

        let err = registry.dispatch("triple", &[], false, &[]).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::UnknownFunction);
    }

    #[test]
    fn test_checked_ids_restrict_dispatch() {
        let registry = FunctionRegistry::from_decls([&double_decl()]);
        let ids = vec!["double_string".to_string()];
        assert!(registry
            .dispatch("double", &[Value::Int(1)], false, &ids)
            .is_err());
    }

    #[test]
    fn test_linear_cost() {
        let cost = CallCost::Linear {
            base: 1,
            factor: 0.1,
        };
        assert_eq!(cost.for_size(0), 1);
        assert_eq!(cost.for_size(25), 4);
        assert_eq!(CallCost::Fixed(5).for_size(1000), 5);
    }
}
