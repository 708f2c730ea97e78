//! List functions: `isSorted`, `sum`, `min`, `max`, `indexOf`, `lastIndexOf`.

use std::cmp::Ordering;

use super::{arg, list_arg};
use crate::eval::{CallCost, EvalError, Value};
use crate::types::{CelType, FunctionDecl, OverloadDecl};

const PER_ELEMENT: CallCost = CallCost::Linear {
    base: 1,
    factor: 1.0,
};

fn t() -> CelType {
    CelType::param("T")
}

fn list_t() -> CelType {
    CelType::list(t())
}

fn compare(a: &Value, b: &Value, function: &str) -> Result<Ordering, EvalError> {
    a.compare(b).ok_or_else(|| {
        EvalError::invalid_argument(format!(
            "{}: cannot compare {} and {}",
            function,
            a.type_name(),
            b.type_name()
        ))
    })
}

fn is_sorted(args: &[Value]) -> Result<Value, EvalError> {
    let items = list_arg(args, 0, "isSorted")?;
    for pair in items.windows(2) {
        if compare(&pair[0], &pair[1], "isSorted")? == Ordering::Greater {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn sum(args: &[Value]) -> Result<Value, EvalError> {
    let items = list_arg(args, 0, "sum")?;
    let Some(first) = items.first() else {
        return Ok(Value::Int(0));
    };
    match first {
        Value::Int(_) => items.iter().try_fold(Value::Int(0), |acc, item| match (acc, item) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(*b)
                .map(Value::Int)
                .ok_or_else(|| EvalError::overflow("sum")),
            (_, other) => Err(EvalError::type_mismatch("int", other.type_name())),
        }),
        Value::Double(_) => items
            .iter()
            .try_fold(0.0, |acc, item| match item {
                Value::Double(d) => Ok(acc + d),
                other => Err(EvalError::type_mismatch("double", other.type_name())),
            })
            .map(Value::Double),
        _ => Err(EvalError::no_matching_overload("sum")),
    }
}

fn extreme(args: &[Value], function: &str, keep: Ordering) -> Result<Value, EvalError> {
    let items = list_arg(args, 0, function)?;
    let mut best = items.first().ok_or_else(|| {
        EvalError::invalid_argument(format!("{}(list) called on empty list", function))
    })?;
    for item in &items[1..] {
        if compare(item, best, function)? == keep {
            best = item;
        }
    }
    Ok(best.clone())
}

fn position(args: &[Value], function: &str, last: bool) -> Result<Value, EvalError> {
    let items = list_arg(args, 0, function)?;
    let needle = arg(args, 1, function)?;
    let found = if last {
        items.iter().rposition(|v| v == needle)
    } else {
        items.iter().position(|v| v == needle)
    };
    Ok(Value::Int(found.map_or(-1, |i| i as i64)))
}

pub(super) fn functions() -> Vec<FunctionDecl> {
    vec![
        FunctionDecl::new("isSorted").with_overload(
            OverloadDecl::method("list_is_sorted", vec![list_t()], CelType::Bool)
                .with_type_params(&["T"])
                .with_impl(is_sorted)
                .with_cost(PER_ELEMENT),
        ),
        FunctionDecl::new("sum")
            .with_overload(
                OverloadDecl::method("list_int_sum", vec![CelType::list(CelType::Int)], CelType::Int)
                    .with_impl(sum)
                    .with_cost(PER_ELEMENT),
            )
            .with_overload(
                OverloadDecl::method(
                    "list_double_sum",
                    vec![CelType::list(CelType::Double)],
                    CelType::Double,
                )
                .with_impl(sum)
                .with_cost(PER_ELEMENT),
            ),
        FunctionDecl::new("min").with_overload(
            OverloadDecl::method("list_min", vec![list_t()], t())
                .with_type_params(&["T"])
                .with_impl(|args| extreme(args, "min", Ordering::Less))
                .with_cost(PER_ELEMENT),
        ),
        FunctionDecl::new("max").with_overload(
            OverloadDecl::method("list_max", vec![list_t()], t())
                .with_type_params(&["T"])
                .with_impl(|args| extreme(args, "max", Ordering::Greater))
                .with_cost(PER_ELEMENT),
        ),
        FunctionDecl::new("indexOf").with_overload(
            OverloadDecl::method("list_index_of", vec![list_t(), t()], CelType::Int)
                .with_type_params(&["T"])
                .with_impl(|args| position(args, "indexOf", false))
                .with_cost(PER_ELEMENT),
        ),
        FunctionDecl::new("lastIndexOf").with_overload(
            OverloadDecl::method("list_last_index_of", vec![list_t(), t()], CelType::Int)
                .with_type_params(&["T"])
                .with_impl(|args| position(args, "lastIndexOf", true))
                .with_cost(PER_ELEMENT),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{EvalErrorKind, FunctionRegistry};

    fn call(name: &str, args: &[Value]) -> Result<Value, EvalError> {
        FunctionRegistry::from_decls(functions().iter())
            .dispatch(name, args, true, &[])
            .map(|(v, _)| v)
    }

    fn ints(values: &[i64]) -> Value {
        Value::from(values.iter().copied().map(Value::Int).collect::<Vec<_>>())
    }

    #[test]
    fn test_is_sorted() {
        assert_eq!(call("isSorted", &[ints(&[1, 2, 2, 3])]).unwrap(), Value::Bool(true));
        assert_eq!(call("isSorted", &[ints(&[3, 1])]).unwrap(), Value::Bool(false));
        assert_eq!(call("isSorted", &[ints(&[])]).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_sum() {
        assert_eq!(call("sum", &[ints(&[1, 2, 3])]).unwrap(), Value::Int(6));
        assert_eq!(call("sum", &[ints(&[])]).unwrap(), Value::Int(0));
        assert_eq!(
            call("sum", &[ints(&[i64::MAX, 1])]).unwrap_err().kind,
            EvalErrorKind::Overflow
        );
    }

    #[test]
    fn test_min_max() {
        assert_eq!(call("min", &[ints(&[4, 2, 9])]).unwrap(), Value::Int(2));
        assert_eq!(call("max", &[ints(&[4, 2, 9])]).unwrap(), Value::Int(9));
        let err = call("min", &[ints(&[])]).unwrap_err();
        assert!(err.message.contains("empty list"));
    }

    #[test]
    fn test_index_of() {
        let list = ints(&[1, 2, 1]);
        assert_eq!(call("indexOf", &[list.clone(), Value::Int(1)]).unwrap(), Value::Int(0));
        assert_eq!(call("lastIndexOf", &[list.clone(), Value::Int(1)]).unwrap(), Value::Int(2));
        assert_eq!(call("indexOf", &[list, Value::Int(7)]).unwrap(), Value::Int(-1));
    }
}
