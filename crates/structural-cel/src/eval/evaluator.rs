//! Tree-walking evaluator for checked expressions.
//!
//! The evaluator performs depth-first traversal of the AST and charges every
//! step to a shared [`Meter`]. It supports:
//!
//! - Arithmetic, comparison, and logical operators
//! - Short-circuit evaluation for `&&`, `||`, and ternary
//! - Function calls via the function registry
//! - Comprehensions produced by the `all`, `exists`, `map` and `filter` macros
//! - Object literals, which charge a base construction cost per literal
//!
//! Errors propagate as `Err`. `&&` and `||` absorb an error on one side when
//! the other side decides the result, except for cost errors, which always
//! abort.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;

use structural_cel_parser::{BinaryOp, Expr, SpannedExpr, UnaryOp};

use super::{ops, Activation, EvalError, FunctionRegistry, HierarchicalActivation, MapKey, Value};
use crate::checker::CheckResult;
use crate::escaping;

/// Cost of creating a list literal.
pub const LIST_CREATE_COST: u64 = 10;
/// Cost of creating a map literal.
pub const MAP_CREATE_COST: u64 = 30;
/// Cost of creating an object literal, nested literals included.
pub const OBJECT_CREATE_COST: u64 = 40;
/// Per-character cost of string traversal.
pub const STRING_TRAVERSAL_FACTOR: f64 = 0.1;

/// Tracks cost against the per-call limit and the remaining budget.
#[derive(Debug)]
pub struct Meter {
    used: Cell<u64>,
    per_call_limit: u64,
    budget: u64,
}

impl Meter {
    pub fn new(per_call_limit: u64, budget: u64) -> Self {
        Self {
            used: Cell::new(0),
            per_call_limit,
            budget,
        }
    }

    pub fn charge(&self, cost: u64) -> Result<(), EvalError> {
        let used = self.used.get().saturating_add(cost);
        self.used.set(used);
        if used > self.per_call_limit {
            return Err(EvalError::cost_limit_exceeded());
        }
        if used > self.budget {
            return Err(EvalError::budget_exhausted());
        }
        Ok(())
    }

    pub fn used(&self) -> u64 {
        self.used.get()
    }
}

/// Evaluates one checked expression.
pub struct Evaluator<'a> {
    activation: &'a dyn Activation,
    functions: &'a FunctionRegistry,
    checked: &'a CheckResult,
    optional_variables: &'a [String],
    meter: &'a Meter,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        activation: &'a dyn Activation,
        functions: &'a FunctionRegistry,
        checked: &'a CheckResult,
        meter: &'a Meter,
    ) -> Self {
        Self {
            activation,
            functions,
            checked,
            optional_variables: &[],
            meter,
        }
    }

    /// Variables that evaluate to `null` when the activation does not bind them.
    pub fn with_optional_variables(mut self, names: &'a [String]) -> Self {
        self.optional_variables = names;
        self
    }

    pub fn eval(&self, expr: &SpannedExpr) -> Result<Value, EvalError> {
        self.eval_expr(expr)
    }

    fn scoped<'b>(&'b self, activation: &'b dyn Activation) -> Evaluator<'b> {
        Evaluator {
            activation,
            functions: self.functions,
            checked: self.checked,
            optional_variables: self.optional_variables,
            meter: self.meter,
        }
    }

    fn eval_expr(&self, expr: &SpannedExpr) -> Result<Value, EvalError> {
        match &expr.node {
            // Literals are free
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(i) => Ok(Value::Int(*i)),
            Expr::Float(f) => Ok(Value::Double(*f)),
            Expr::String(s) => Ok(Value::string(s.as_str())),
            Expr::Bytes(b) => Ok(Value::bytes(b.as_slice())),

            Expr::Ident(name) => {
                self.meter.charge(1)?;
                self.eval_ident(name)
            }

            Expr::List(elements) => self.eval_list(elements),
            Expr::Map(entries) => self.eval_map(entries),

            Expr::Unary { op, expr: inner } => {
                let value = self.eval_expr(inner)?;
                self.meter.charge(1)?;
                match op {
                    UnaryOp::Neg => ops::negate(&value),
                    UnaryOp::Not => ops::not(&value),
                }
            }
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right),
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                let cond = self.eval_expr(cond)?;
                match cond {
                    Value::Bool(true) => self.eval_expr(then_expr),
                    Value::Bool(false) => self.eval_expr(else_expr),
                    other => Err(EvalError::type_mismatch("bool", other.type_name())),
                }
            }

            Expr::Member { expr: operand, field } => {
                let value = self.eval_expr(operand)?;
                self.meter.charge(1)?;
                self.select(expr.id, &value, field)
            }
            Expr::Index {
                expr: operand,
                index,
            } => {
                let value = self.eval_expr(operand)?;
                let index = self.eval_expr(index)?;
                self.meter.charge(1)?;
                ops::index(&value, &index)
            }
            Expr::Call { expr: callee, args } => self.eval_call(expr.id, callee, args),
            Expr::Struct { type_name, fields } => self.eval_struct(expr.id, type_name, fields),

            Expr::Comprehension {
                iter_var,
                iter_range,
                accu_var,
                accu_init,
                loop_condition,
                loop_step,
                result,
            } => self.eval_comprehension(
                iter_var,
                iter_range,
                accu_var,
                accu_init,
                loop_condition,
                loop_step,
                result,
            ),

            Expr::MemberTestOnly {
                expr: operand,
                field,
            } => {
                let value = self.eval_expr(operand)?;
                self.meter.charge(1)?;
                self.test_member(expr.id, &value, field)
            }
        }
    }

    fn eval_ident(&self, name: &str) -> Result<Value, EvalError> {
        if let Some(value) = self.activation.resolve(name) {
            return Ok(value);
        }
        if self.optional_variables.iter().any(|v| v == name) {
            return Ok(Value::Null);
        }
        Err(EvalError::unknown_identifier(name))
    }

    fn eval_list(&self, elements: &[SpannedExpr]) -> Result<Value, EvalError> {
        self.meter.charge(LIST_CREATE_COST)?;
        let values = elements
            .iter()
            .map(|e| self.eval_expr(e))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::from(values))
    }

    fn eval_map(&self, entries: &[(SpannedExpr, SpannedExpr)]) -> Result<Value, EvalError> {
        self.meter.charge(MAP_CREATE_COST)?;
        let mut map = super::ValueMap::new();
        for (k, v) in entries {
            let key = self.eval_expr(k)?;
            let key = MapKey::from_value(&key).ok_or_else(|| {
                EvalError::invalid_argument(format!("unsupported key type: {}", key.type_name()))
            })?;
            if map.contains_key(&key) {
                return Err(EvalError::invalid_argument(format!(
                    "repeated key: {}",
                    key.to_value()
                )));
            }
            map.insert(key, self.eval_expr(v)?);
        }
        Ok(Value::Map(Arc::new(map)))
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        left: &SpannedExpr,
        right: &SpannedExpr,
    ) -> Result<Value, EvalError> {
        match op {
            BinaryOp::And => return self.eval_logical(left, right, false),
            BinaryOp::Or => return self.eval_logical(left, right, true),
            _ => {}
        }

        let left = self.eval_expr(left)?;
        let right = self.eval_expr(right)?;
        self.meter.charge(operator_cost(op, &left, &right))?;
        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
                ops::arithmetic(op, &left, &right)
            }
            BinaryOp::In => ops::contains(&left, &right),
            _ => ops::relation(op, &left, &right),
        }
    }

    /// `&&` when `decisive` is false, `||` when it is true.
    fn eval_logical(
        &self,
        left: &SpannedExpr,
        right: &SpannedExpr,
        decisive: bool,
    ) -> Result<Value, EvalError> {
        let left = match self.eval_expr(left) {
            Ok(Value::Bool(b)) if b == decisive => return Ok(Value::Bool(b)),
            Ok(Value::Bool(_)) => None,
            Ok(other) => Some(EvalError::type_mismatch("bool", other.type_name())),
            Err(e) if e.is_cost_error() => return Err(e),
            Err(e) => Some(e),
        };
        self.meter.charge(1)?;
        match self.eval_expr(right) {
            Ok(Value::Bool(b)) if b == decisive => Ok(Value::Bool(b)),
            Ok(Value::Bool(b)) => match left {
                Some(e) => Err(e),
                None => Ok(Value::Bool(b)),
            },
            Ok(other) => Err(left.unwrap_or_else(|| EvalError::type_mismatch("bool", other.type_name()))),
            Err(e) if e.is_cost_error() => Err(e),
            Err(e) => Err(left.unwrap_or(e)),
        }
    }

    /// Field selection. Objects and maps are addressed by property name; the
    /// checker records it for fields it resolved, otherwise the identifier is
    /// tried as written and then unescaped.
    fn select(&self, id: i64, value: &Value, field: &str) -> Result<Value, EvalError> {
        let recorded = self.checked.property_name(id);
        let lookup = |get: &dyn Fn(&str) -> Option<Value>| match recorded {
            Some(name) => get(name),
            None => get(field).or_else(|| get(&escaping::unescape(field))),
        };
        match value {
            Value::Map(m) => lookup(&|k| m.get_str(k).cloned())
                .ok_or_else(|| EvalError::field_not_found(recorded.unwrap_or(field))),
            Value::Object(o) => lookup(&|k| o.get(k).cloned())
                .ok_or_else(|| EvalError::field_not_found(recorded.unwrap_or(field))),
            other => Err(EvalError::no_matching_overload(&format!(
                "_._ ({}, {})",
                other.type_name(),
                field
            ))),
        }
    }

    fn test_member(&self, id: i64, value: &Value, field: &str) -> Result<Value, EvalError> {
        let name = self
            .checked
            .property_name(id)
            .map(str::to_string)
            .unwrap_or_else(|| escaping::unescape(field));
        match value {
            Value::Map(m) => Ok(Value::Bool(
                m.get_str(&name).is_some() || m.get_str(field).is_some(),
            )),
            Value::Object(o) => Ok(Value::Bool(o.get(&name).is_some())),
            other => Err(EvalError::no_matching_overload(&format!(
                "has ({})",
                other.type_name()
            ))),
        }
    }

    fn eval_call(
        &self,
        id: i64,
        callee: &SpannedExpr,
        args: &[SpannedExpr],
    ) -> Result<Value, EvalError> {
        let (name, receiver) = match &callee.node {
            Expr::Ident(name) => (name.as_str(), None),
            Expr::Member { expr, field } => (field.as_str(), Some(expr.as_ref())),
            _ => return Err(EvalError::internal("unsupported call target")),
        };

        let mut values = Vec::with_capacity(args.len() + 1);
        if let Some(receiver) = receiver {
            values.push(self.eval_expr(receiver)?);
        }
        for arg in args {
            values.push(self.eval_expr(arg)?);
        }

        let ids = self.checked.overload_ids(id);
        let (value, cost) = self
            .functions
            .dispatch(name, &values, receiver.is_some(), ids)?;
        self.meter.charge(cost)?;
        Ok(value)
    }

    fn eval_struct(
        &self,
        id: i64,
        type_name: &str,
        fields: &[(String, SpannedExpr)],
    ) -> Result<Value, EvalError> {
        self.meter.charge(OBJECT_CREATE_COST)?;
        let type_ref = self
            .checked
            .object_type(id)
            .ok_or_else(|| EvalError::internal(format!("unresolved object type {}", type_name)))?;

        let mut values = HashMap::with_capacity(fields.len());
        for (name, expr) in fields {
            let property = match type_ref.field(name) {
                Some(_) => name.clone(),
                None => escaping::unescape(name),
            };
            values.insert(property, self.eval_expr(expr)?);
        }
        let object = type_ref
            .val(values)
            .map_err(|e| EvalError::new(super::EvalErrorKind::TypeMismatch, e.to_string()))?;
        Ok(Value::Object(Arc::new(object)))
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_comprehension(
        &self,
        iter_var: &str,
        iter_range: &SpannedExpr,
        accu_var: &str,
        accu_init: &SpannedExpr,
        loop_condition: &SpannedExpr,
        loop_step: &SpannedExpr,
        result: &SpannedExpr,
    ) -> Result<Value, EvalError> {
        let range = self.eval_expr(iter_range)?;
        let items: Vec<Value> = match &range {
            Value::List(items) => items.to_vec(),
            Value::Map(m) => m.keys().map(MapKey::to_value).collect(),
            other => {
                return Err(EvalError::type_mismatch("list or map", other.type_name()));
            }
        };

        let mut accu = self.eval_expr(accu_init)?;
        for item in items {
            let scope = HierarchicalActivation::new(self.activation)
                .with_binding(iter_var, item)
                .with_binding(accu_var, accu.clone());
            let inner = self.scoped(&scope);
            match inner.eval_expr(loop_condition)? {
                Value::Bool(true) => {}
                Value::Bool(false) => break,
                other => return Err(EvalError::type_mismatch("bool", other.type_name())),
            }
            accu = inner.eval_expr(loop_step)?;
        }

        let scope = HierarchicalActivation::new(self.activation).with_binding(accu_var, accu);
        self.scoped(&scope).eval_expr(result)
    }
}

/// Cost of applying a binary operator to evaluated operands.
fn operator_cost(op: BinaryOp, left: &Value, right: &Value) -> u64 {
    let traversal = |size: u64| 1 + (size as f64 * STRING_TRAVERSAL_FACTOR).ceil() as u64;
    match (op, left, right) {
        (BinaryOp::Add, Value::String(_), _) | (BinaryOp::Add, Value::Bytes(_), _) => {
            traversal(left.cost_size() + right.cost_size())
        }
        (BinaryOp::Add, Value::List(_), _) => 1 + left.cost_size() + right.cost_size(),
        (BinaryOp::Eq | BinaryOp::Ne, Value::String(_) | Value::Bytes(_), _) => {
            traversal(left.cost_size().min(right.cost_size()))
        }
        (BinaryOp::In, _, Value::List(items)) => 1 + items.len() as u64,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{EvalErrorKind, MapActivation};

    fn eval_with(source: &str, activation: &dyn Activation) -> Result<Value, EvalError> {
        let ast = structural_cel_parser::parse(source).into_result().unwrap();
        let checked = CheckResult::default();
        let functions = FunctionRegistry::new();
        let meter = Meter::new(u64::MAX, u64::MAX);
        Evaluator::new(activation, &functions, &checked, &meter).eval(&ast)
    }

    fn eval(source: &str) -> Result<Value, EvalError> {
        eval_with(source, &MapActivation::new())
    }

    #[test]
    fn test_arithmetic_and_logic() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), Value::Int(7));
        assert_eq!(eval("true && !false").unwrap(), Value::Bool(true));
        assert_eq!(eval("1 < 2 ? 'a' : 'b'").unwrap(), Value::from("a"));
        assert_eq!(eval("2 in [1, 2, 3]").unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_logical_absorbs_errors() {
        assert_eq!(eval("false && 1 / 0 == 1").unwrap(), Value::Bool(false));
        assert_eq!(eval("1 / 0 == 1 || true").unwrap(), Value::Bool(true));
        assert_eq!(
            eval("1 / 0 == 1 && true").unwrap_err().kind,
            EvalErrorKind::DivisionByZero
        );
    }

    #[test]
    fn test_comprehensions() {
        assert_eq!(eval("[1, 2, 3].all(x, x > 0)").unwrap(), Value::Bool(true));
        assert_eq!(eval("[1, 2, 3].exists(x, x > 2)").unwrap(), Value::Bool(true));
        assert_eq!(
            eval("[1, 2, 3].exists_one(x, x > 1)").unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            eval("[1, 2, 3].map(x, x * 2)").unwrap(),
            Value::from(vec![Value::Int(2), Value::Int(4), Value::Int(6)])
        );
        assert_eq!(
            eval("{'a': 1, 'b': 2}.filter(k, k != 'a')").unwrap(),
            Value::from(vec![Value::from("b")])
        );
    }

    #[test]
    fn test_field_selection_and_has() {
        let obj = Value::map([
            (MapKey::from("replicas"), Value::Int(3)),
            (MapKey::from("min-replicas"), Value::Int(1)),
        ]);
        let activation = MapActivation::new().with_binding("self", obj);
        assert_eq!(
            eval_with("self.replicas", &activation).unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            eval_with("self.min__dash__replicas", &activation).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            eval_with("has(self.max)", &activation).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            eval_with("self.max", &activation).unwrap_err().kind,
            EvalErrorKind::FieldNotFound
        );
    }

    #[test]
    fn test_meter_limits() {
        let meter = Meter::new(10, 100);
        assert!(meter.charge(10).is_ok());
        assert_eq!(
            meter.charge(1).unwrap_err().kind,
            EvalErrorKind::CostLimitExceeded
        );

        let meter = Meter::new(100, 10);
        assert_eq!(
            meter.charge(11).unwrap_err().kind,
            EvalErrorKind::BudgetExhausted
        );
    }

    #[test]
    fn test_cost_errors_are_not_absorbed() {
        let ast = structural_cel_parser::parse("[1, 2, 3].all(x, x > 0) || true")
            .into_result()
            .unwrap();
        let checked = CheckResult::default();
        let functions = FunctionRegistry::new();
        let activation = MapActivation::new();
        let meter = Meter::new(u64::MAX, 5);
        let err = Evaluator::new(&activation, &functions, &checked, &meter)
            .eval(&ast)
            .unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::BudgetExhausted);
    }
}
