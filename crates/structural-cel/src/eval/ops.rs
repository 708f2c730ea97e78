//! Operator semantics over runtime values.

use std::cmp::Ordering;
use std::sync::Arc;

use structural_cel_parser::BinaryOp;

use super::{EvalError, MapKey, Value};

pub(crate) fn add(left: &Value, right: &Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(*b)
            .map(Value::Int)
            .ok_or_else(|| EvalError::overflow("addition")),
        (Value::Double(a), Value::Double(b)) => Ok(Value::Double(a + b)),
        (Value::String(a), Value::String(b)) => {
            let mut s = String::with_capacity(a.len() + b.len());
            s.push_str(a);
            s.push_str(b);
            Ok(Value::from(s))
        }
        (Value::Bytes(a), Value::Bytes(b)) => {
            Ok(Value::bytes([&a[..], &b[..]].concat()))
        }
        (Value::List(a), Value::List(b)) => {
            let joined: Vec<Value> = a.iter().chain(b.iter()).cloned().collect();
            Ok(Value::from(joined))
        }
        _ => Err(no_overload("_+_", left, right)),
    }
}

pub(crate) fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    if op == BinaryOp::Add {
        return add(left, right);
    }
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                BinaryOp::Sub => a.checked_sub(b).ok_or_else(|| EvalError::overflow("subtraction")),
                BinaryOp::Mul => a
                    .checked_mul(b)
                    .ok_or_else(|| EvalError::overflow("multiplication")),
                BinaryOp::Div if b == 0 => Err(EvalError::division_by_zero()),
                BinaryOp::Div => a.checked_div(b).ok_or_else(|| EvalError::overflow("division")),
                BinaryOp::Mod if b == 0 => Err(EvalError::modulo_by_zero()),
                BinaryOp::Mod => a.checked_rem(b).ok_or_else(|| EvalError::overflow("modulus")),
                _ => Err(EvalError::internal(format!("not arithmetic: {}", op))),
            };
            result.map(Value::Int)
        }
        (Value::Double(a), Value::Double(b)) => match op {
            BinaryOp::Sub => Ok(Value::Double(a - b)),
            BinaryOp::Mul => Ok(Value::Double(a * b)),
            BinaryOp::Div => Ok(Value::Double(a / b)),
            _ => Err(no_overload(&format!("_{}_", op), left, right)),
        },
        _ => Err(no_overload(&format!("_{}_", op), left, right)),
    }
}

pub(crate) fn negate(value: &Value) -> Result<Value, EvalError> {
    match value {
        Value::Int(i) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| EvalError::overflow("negation")),
        Value::Double(d) => Ok(Value::Double(-d)),
        other => Err(EvalError::no_matching_overload(&format!(
            "-_ ({})",
            other.type_name()
        ))),
    }
}

pub(crate) fn not(value: &Value) -> Result<Value, EvalError> {
    match value {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        other => Err(EvalError::no_matching_overload(&format!(
            "!_ ({})",
            other.type_name()
        ))),
    }
}

pub(crate) fn relation(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(left == right)),
        BinaryOp::Ne => return Ok(Value::Bool(left != right)),
        _ => {}
    }
    let ordering = left
        .compare(right)
        .ok_or_else(|| no_overload(&format!("_{}_", op), left, right))?;
    let result = match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::Ge => ordering != Ordering::Less,
        _ => return Err(EvalError::internal(format!("not a relation: {}", op))),
    };
    Ok(Value::Bool(result))
}

pub(crate) fn contains(element: &Value, container: &Value) -> Result<Value, EvalError> {
    match container {
        Value::List(items) => Ok(Value::Bool(items.iter().any(|v| v == element))),
        Value::Map(m) => Ok(Value::Bool(
            MapKey::from_value(element).is_some_and(|k| m.contains_key(&k)),
        )),
        _ => Err(no_overload("@in", element, container)),
    }
}

pub(crate) fn index(container: &Value, index: &Value) -> Result<Value, EvalError> {
    match (container, index) {
        (Value::List(items), Value::Int(i)) => list_index(items, *i),
        (Value::List(items), Value::Double(d)) if d.fract() == 0.0 => list_index(items, *d as i64),
        (Value::Map(m), key) => {
            let k = MapKey::from_value(key)
                .ok_or_else(|| EvalError::invalid_argument(format!("unsupported key type: {}", key.type_name())))?;
            m.get(&k)
                .cloned()
                .ok_or_else(|| EvalError::key_not_found(&key.to_string()))
        }
        (Value::Object(o), Value::String(name)) => o
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::field_not_found(name)),
        _ => Err(no_overload("_[_]", container, index)),
    }
}

fn list_index(items: &Arc<[Value]>, i: i64) -> Result<Value, EvalError> {
    usize::try_from(i)
        .ok()
        .and_then(|idx| items.get(idx))
        .cloned()
        .ok_or_else(|| EvalError::index_out_of_bounds(i, items.len()))
}

fn no_overload(op: &str, left: &Value, right: &Value) -> EvalError {
    EvalError::no_matching_overload(&format!(
        "{} ({}, {})",
        op,
        left.type_name(),
        right.type_name()
    ))
}
