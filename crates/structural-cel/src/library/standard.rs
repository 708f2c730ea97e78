//! Standard library: operators, `size`, string predicates and conversions.
//!
//! Operators are declared for the checker only; the evaluator applies them
//! natively.

use std::sync::Arc;

use base64::Engine;
use regex::Regex;

use super::{arg, str_arg};
use crate::eval::{CallCost, EvalError, Value};
use crate::types::{CelType, FunctionDecl, OverloadDecl};

const TRAVERSAL: CallCost = CallCost::Linear {
    base: 1,
    factor: 0.1,
};

fn t() -> CelType {
    CelType::param("T")
}

fn operator(name: &str, overloads: Vec<OverloadDecl>) -> FunctionDecl {
    overloads
        .into_iter()
        .fold(FunctionDecl::new(name), FunctionDecl::with_overload)
}

fn binary(id: &str, operand: CelType, result: CelType) -> OverloadDecl {
    OverloadDecl::function(id, vec![operand.clone(), operand], result)
}

fn operators() -> Vec<FunctionDecl> {
    use CelType::{Bool, Bytes, Double, Int, String};

    let relation = |name: &str, prefix: &str| {
        operator(
            name,
            vec![
                binary(&format!("{prefix}_int64"), Int, Bool),
                binary(&format!("{prefix}_double"), Double, Bool),
                OverloadDecl::function(format!("{prefix}_int64_double"), vec![Int, Double], Bool),
                OverloadDecl::function(format!("{prefix}_double_int64"), vec![Double, Int], Bool),
                binary(&format!("{prefix}_string"), String, Bool),
                binary(&format!("{prefix}_bytes"), Bytes, Bool),
                binary(&format!("{prefix}_bool"), Bool, Bool),
            ],
        )
    };
    let arithmetic = |name: &str, prefix: &str| {
        operator(
            name,
            vec![
                binary(&format!("{prefix}_int64"), Int, Int),
                binary(&format!("{prefix}_double"), Double, Double),
            ],
        )
    };

    vec![
        operator(
            "_+_",
            vec![
                binary("add_int64", Int, Int),
                binary("add_double", Double, Double),
                binary("add_string", String, String),
                binary("add_bytes", Bytes, Bytes),
                binary("add_list", CelType::list(t()), CelType::list(t())).with_type_params(&["T"]),
            ],
        ),
        arithmetic("_-_", "subtract"),
        arithmetic("_*_", "multiply"),
        arithmetic("_/_", "divide"),
        operator("_%_", vec![binary("modulo_int64", Int, Int)]),
        operator(
            "-_",
            vec![
                OverloadDecl::function("negate_int64", vec![Int], Int),
                OverloadDecl::function("negate_double", vec![Double], Double),
            ],
        ),
        operator("!_", vec![OverloadDecl::function("logical_not", vec![Bool], Bool)]),
        operator("_&&_", vec![binary("logical_and", Bool, Bool)]),
        operator("_||_", vec![binary("logical_or", Bool, Bool)]),
        operator(
            "_==_",
            vec![binary("equals", t(), Bool).with_type_params(&["T"])],
        ),
        operator(
            "_!=_",
            vec![binary("not_equals", t(), Bool).with_type_params(&["T"])],
        ),
        relation("_<_", "less"),
        relation("_<=_", "less_equals"),
        relation("_>_", "greater"),
        relation("_>=_", "greater_equals"),
        operator(
            "@in",
            vec![
                OverloadDecl::function("in_list", vec![t(), CelType::list(t())], Bool)
                    .with_type_params(&["T"]),
                OverloadDecl::function(
                    "in_map",
                    vec![CelType::param("K"), CelType::map(CelType::param("K"), CelType::param("V"))],
                    Bool,
                )
                .with_type_params(&["K", "V"]),
            ],
        ),
        operator(
            "_[_]",
            vec![
                OverloadDecl::function("index_list", vec![CelType::list(t()), Int], t())
                    .with_type_params(&["T"]),
                OverloadDecl::function(
                    "index_map",
                    vec![
                        CelType::map(CelType::param("K"), CelType::param("V")),
                        CelType::param("K"),
                    ],
                    CelType::param("V"),
                )
                .with_type_params(&["K", "V"]),
            ],
        ),
        operator(
            "_?_:_",
            vec![OverloadDecl::function("conditional", vec![Bool, t(), t()], t())
                .with_type_params(&["T"])],
        ),
    ]
}

// ==================== Functions ====================

fn size_of(args: &[Value]) -> Result<Value, EvalError> {
    let size = match arg(args, 0, "size")? {
        Value::String(s) => s.chars().count(),
        Value::Bytes(b) => b.len(),
        Value::List(l) => l.len(),
        Value::Map(m) => m.len(),
        _ => return Err(EvalError::no_matching_overload("size")),
    };
    i64::try_from(size)
        .map(Value::Int)
        .map_err(|_| EvalError::overflow("size"))
}

fn size_overloads(name_prefix: &str, member: bool) -> Vec<OverloadDecl> {
    let sized = [
        ("string", CelType::String),
        ("bytes", CelType::Bytes),
        ("list", CelType::list(CelType::Dyn)),
        ("map", CelType::map(CelType::Dyn, CelType::Dyn)),
    ];
    sized
        .into_iter()
        .map(|(suffix, ty)| {
            let id = format!("{name_prefix}{suffix}");
            let decl = if member {
                OverloadDecl::method(id, vec![ty], CelType::Int)
            } else {
                OverloadDecl::function(id, vec![ty], CelType::Int)
            };
            decl.with_impl(size_of)
        })
        .collect()
}

fn string_predicate(
    name: &'static str,
    id: &str,
    test: fn(&str, &str) -> bool,
) -> FunctionDecl {
    FunctionDecl::new(name).with_overload(
        OverloadDecl::method(id, vec![CelType::String, CelType::String], CelType::Bool)
            .with_impl(move |args| {
                let s = str_arg(args, 0, name)?;
                let needle = str_arg(args, 1, name)?;
                Ok(Value::Bool(test(s, needle)))
            })
            .with_cost(TRAVERSAL),
    )
}

fn matches(args: &[Value]) -> Result<Value, EvalError> {
    let s = str_arg(args, 0, "matches")?;
    let pattern = str_arg(args, 1, "matches")?;
    let re = Regex::new(pattern)
        .map_err(|e| EvalError::invalid_argument(format!("invalid regex '{}': {}", pattern, e)))?;
    Ok(Value::Bool(re.is_match(s)))
}

fn to_int(args: &[Value]) -> Result<Value, EvalError> {
    match arg(args, 0, "int")? {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Double(d) => {
            let truncated = d.trunc();
            // i64::MAX as f64 rounds up to 2^63, which is already out of range
            if truncated.is_finite() && truncated >= i64::MIN as f64 && truncated < i64::MAX as f64 {
                Ok(Value::Int(truncated as i64))
            } else {
                Err(EvalError::invalid_conversion("double", "int"))
            }
        }
        Value::String(s) => s
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| EvalError::invalid_conversion("string", "int")),
        _ => Err(EvalError::no_matching_overload("int")),
    }
}

fn to_double(args: &[Value]) -> Result<Value, EvalError> {
    match arg(args, 0, "double")? {
        Value::Int(i) => Ok(Value::Double(*i as f64)),
        Value::Double(d) => Ok(Value::Double(*d)),
        Value::String(s) => s
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| EvalError::invalid_conversion("string", "double")),
        _ => Err(EvalError::no_matching_overload("double")),
    }
}

fn to_string(args: &[Value]) -> Result<Value, EvalError> {
    match arg(args, 0, "string")? {
        Value::String(s) => Ok(Value::String(s.clone())),
        Value::Int(i) => Ok(Value::from(i.to_string())),
        Value::Double(d) => Ok(Value::from(d.to_string())),
        Value::Bool(b) => Ok(Value::from(b.to_string())),
        Value::Bytes(b) => std::str::from_utf8(b)
            .map(Value::from)
            .map_err(|_| EvalError::invalid_conversion("bytes", "string")),
        Value::Cidr(c) => Ok(Value::from(c.to_string())),
        Value::Ip(ip) => Ok(Value::from(ip.to_string())),
        _ => Err(EvalError::no_matching_overload("string")),
    }
}

fn to_bytes(args: &[Value]) -> Result<Value, EvalError> {
    match arg(args, 0, "bytes")? {
        Value::Bytes(b) => Ok(Value::Bytes(b.clone())),
        Value::String(s) => Ok(Value::bytes(s.as_bytes())),
        _ => Err(EvalError::no_matching_overload("bytes")),
    }
}

fn conversion(
    name: &str,
    sources: Vec<(&str, CelType)>,
    result: CelType,
    implementation: fn(&[Value]) -> Result<Value, EvalError>,
) -> FunctionDecl {
    sources
        .into_iter()
        .fold(FunctionDecl::new(name), |decl, (source, ty)| {
            decl.with_overload(
                OverloadDecl::function(format!("{source}_to_{name}"), vec![ty], result.clone())
                    .with_impl(implementation),
            )
        })
}

pub(super) fn functions() -> Vec<FunctionDecl> {
    let mut functions = operators();

    let mut size = FunctionDecl::new("size");
    for overload in size_overloads("size_", false)
        .into_iter()
        .chain(size_overloads("size_member_", true))
    {
        size = size.with_overload(overload);
    }
    functions.push(size);

    functions.push(string_predicate("contains", "string_contains", |s, n| {
        s.contains(n)
    }));
    functions.push(string_predicate("startsWith", "string_starts_with", |s, n| {
        s.starts_with(n)
    }));
    functions.push(string_predicate("endsWith", "string_ends_with", |s, n| {
        s.ends_with(n)
    }));
    functions.push(
        FunctionDecl::new("matches")
            .with_overload(
                OverloadDecl::method(
                    "string_matches",
                    vec![CelType::String, CelType::String],
                    CelType::Bool,
                )
                .with_impl(matches)
                .with_cost(TRAVERSAL),
            )
            .with_overload(
                OverloadDecl::function(
                    "matches_string",
                    vec![CelType::String, CelType::String],
                    CelType::Bool,
                )
                .with_impl(matches)
                .with_cost(TRAVERSAL),
            ),
    );

    use CelType::{Bool, Bytes, Double, Int, String};
    functions.push(conversion(
        "int",
        vec![("int64", Int), ("double", Double), ("string", String)],
        Int,
        to_int,
    ));
    functions.push(conversion(
        "double",
        vec![("int64", Int), ("double", Double), ("string", String)],
        Double,
        to_double,
    ));
    functions.push(conversion(
        "string",
        vec![
            ("string", String),
            ("int64", Int),
            ("double", Double),
            ("bool", Bool),
            ("bytes", Bytes),
            ("cidr", CelType::Cidr),
            ("ip", CelType::Ip),
        ],
        String,
        to_string,
    ));
    functions.push(conversion(
        "bytes",
        vec![("bytes", Bytes), ("string", String)],
        Bytes,
        to_bytes,
    ));
    functions.push(
        FunctionDecl::new("dyn").with_overload(
            OverloadDecl::function("to_dyn", vec![t()], CelType::Dyn)
                .with_type_params(&["T"])
                .with_impl(|args| arg(args, 0, "dyn").cloned()),
        ),
    );
    functions.push(
        FunctionDecl::new("base64").with_overload(
            OverloadDecl::function("bytes_to_base64", vec![Bytes], String).with_impl(|args| {
                match arg(args, 0, "base64")? {
                    Value::Bytes(b) => Ok(Value::String(Arc::from(
                        base64::engine::general_purpose::STANDARD.encode(b),
                    ))),
                    _ => Err(EvalError::no_matching_overload("base64")),
                }
            }),
        ),
    );
    functions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{EvalErrorKind, FunctionRegistry};

    fn registry() -> FunctionRegistry {
        FunctionRegistry::from_decls(functions().iter())
    }

    fn call(name: &str, args: &[Value], member: bool) -> Result<Value, EvalError> {
        registry().dispatch(name, args, member, &[]).map(|(v, _)| v)
    }

    #[test]
    fn test_size() {
        assert_eq!(call("size", &[Value::from("héllo")], false).unwrap(), Value::Int(5));
        assert_eq!(
            call("size", &[Value::from(vec![Value::Int(1)])], true).unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn test_string_predicates() {
        let args = [Value::from("kube-system"), Value::from("kube")];
        assert_eq!(call("startsWith", &args, true).unwrap(), Value::Bool(true));
        assert_eq!(call("endsWith", &args, true).unwrap(), Value::Bool(false));
        assert_eq!(call("contains", &args, true).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_matches() {
        let args = [Value::from("v1.2.3"), Value::from(r"^v\d+\.\d+\.\d+$")];
        assert_eq!(call("matches", &args, true).unwrap(), Value::Bool(true));
        let bad = [Value::from("x"), Value::from("(")];
        assert_eq!(
            call("matches", &bad, true).unwrap_err().kind,
            EvalErrorKind::InvalidArgument
        );
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("int", &[Value::Double(2.9)], false).unwrap(), Value::Int(2));
        assert_eq!(call("int", &[Value::from("42")], false).unwrap(), Value::Int(42));
        assert_eq!(
            call("int", &[Value::Double(1e300)], false).unwrap_err().kind,
            EvalErrorKind::InvalidConversion
        );
        assert_eq!(
            call("string", &[Value::Int(7)], false).unwrap(),
            Value::from("7")
        );
        assert_eq!(
            call("double", &[Value::Int(1)], false).unwrap(),
            Value::Double(1.0)
        );
    }

    #[test]
    fn test_matches_cost_scales_with_input() {
        let short = [Value::from("a"), Value::from("a")];
        let long = [Value::from("a".repeat(100)), Value::from("a")];
        let registry = registry();
        let (_, short_cost) = registry.dispatch("matches", &short, true, &[]).unwrap();
        let (_, long_cost) = registry.dispatch("matches", &long, true, &[]).unwrap();
        assert!(long_cost > short_cost);
    }
}
