//! String extension functions.
//!
//! Offsets and lengths count Unicode code points, not bytes.

use super::{int_arg, list_arg, str_arg};
use crate::eval::{CallCost, EvalError, Value};
use crate::types::{CelType, FunctionDecl, OverloadDecl};

const TRAVERSAL: CallCost = CallCost::Linear {
    base: 1,
    factor: 0.1,
};

fn method(id: &str, params: Vec<CelType>, result: CelType) -> OverloadDecl {
    OverloadDecl::method(id, params, result).with_cost(TRAVERSAL)
}

fn chars(s: &str) -> Vec<char> {
    s.chars().collect()
}

fn code_point_index(
    value: i64,
    len: usize,
    function: &str,
) -> Result<usize, EvalError> {
    usize::try_from(value)
        .ok()
        .filter(|i| *i <= len)
        .ok_or_else(|| EvalError::index_out_of_bounds(value, len))
        .map_err(|e| EvalError::invalid_argument(format!("{}: {}", function, e)))
}

fn substring(args: &[Value]) -> Result<Value, EvalError> {
    let s = chars(str_arg(args, 0, "substring")?);
    let start = code_point_index(int_arg(args, 1, "substring")?, s.len(), "substring")?;
    let end = match args.len() {
        3 => code_point_index(int_arg(args, 2, "substring")?, s.len(), "substring")?,
        _ => s.len(),
    };
    if start > end {
        return Err(EvalError::invalid_argument(format!(
            "substring: invalid range {}..{}",
            start, end
        )));
    }
    Ok(Value::from(s[start..end].iter().collect::<String>()))
}

fn char_at(args: &[Value]) -> Result<Value, EvalError> {
    let s = chars(str_arg(args, 0, "charAt")?);
    let i = code_point_index(int_arg(args, 1, "charAt")?, s.len(), "charAt")?;
    Ok(Value::from(s.get(i).map(char::to_string).unwrap_or_default()))
}

fn index_of(args: &[Value]) -> Result<Value, EvalError> {
    let s = chars(str_arg(args, 0, "indexOf")?);
    let needle = chars(str_arg(args, 1, "indexOf")?);
    let offset = match args.len() {
        3 => code_point_index(int_arg(args, 2, "indexOf")?, s.len(), "indexOf")?,
        _ => 0,
    };
    let found = (offset..=s.len().saturating_sub(needle.len()))
        .find(|&i| i + needle.len() <= s.len() && s[i..i + needle.len()] == needle[..]);
    Ok(Value::Int(found.map_or(-1, |i| i as i64)))
}

fn last_index_of(args: &[Value]) -> Result<Value, EvalError> {
    let s = chars(str_arg(args, 0, "lastIndexOf")?);
    let needle = chars(str_arg(args, 1, "lastIndexOf")?);
    if needle.len() > s.len() {
        return Ok(Value::Int(-1));
    }
    let found = (0..=s.len() - needle.len())
        .rev()
        .find(|&i| s[i..i + needle.len()] == needle[..]);
    Ok(Value::Int(found.map_or(-1, |i| i as i64)))
}

fn split(args: &[Value]) -> Result<Value, EvalError> {
    let s = str_arg(args, 0, "split")?;
    let separator = str_arg(args, 1, "split")?;
    let limit = match args.len() {
        3 => int_arg(args, 2, "split")?,
        _ => -1,
    };
    let parts: Vec<Value> = match limit {
        0 => Vec::new(),
        n if n < 0 => s.split(separator).map(Value::from).collect(),
        n => s
            .splitn(usize::try_from(n).unwrap_or(usize::MAX), separator)
            .map(Value::from)
            .collect(),
    };
    Ok(Value::from(parts))
}

fn join(args: &[Value]) -> Result<Value, EvalError> {
    let items = list_arg(args, 0, "join")?;
    let separator = match args.len() {
        2 => str_arg(args, 1, "join")?,
        _ => "",
    };
    let parts = items
        .iter()
        .map(|v| {
            v.as_str()
                .ok_or_else(|| EvalError::type_mismatch("string", v.type_name()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::from(parts.join(separator)))
}

fn replace(args: &[Value]) -> Result<Value, EvalError> {
    let s = str_arg(args, 0, "replace")?;
    let from = str_arg(args, 1, "replace")?;
    let to = str_arg(args, 2, "replace")?;
    let replaced = match args.len() {
        4 => match int_arg(args, 3, "replace")? {
            n if n < 0 => s.replace(from, to),
            n => s.replacen(from, to, usize::try_from(n).unwrap_or(usize::MAX)),
        },
        _ => s.replace(from, to),
    };
    Ok(Value::from(replaced))
}

pub(super) fn functions() -> Vec<FunctionDecl> {
    use CelType::{Int, String as Str};

    let list_str = CelType::list(Str);
    vec![
        FunctionDecl::new("lowerAscii").with_overload(
            method("string_lower_ascii", vec![Str], Str)
                .with_impl(|args| Ok(Value::from(str_arg(args, 0, "lowerAscii")?.to_ascii_lowercase()))),
        ),
        FunctionDecl::new("upperAscii").with_overload(
            method("string_upper_ascii", vec![Str], Str)
                .with_impl(|args| Ok(Value::from(str_arg(args, 0, "upperAscii")?.to_ascii_uppercase()))),
        ),
        FunctionDecl::new("trim").with_overload(
            method("string_trim", vec![Str], Str)
                .with_impl(|args| Ok(Value::from(str_arg(args, 0, "trim")?.trim()))),
        ),
        FunctionDecl::new("charAt")
            .with_overload(method("string_char_at_int", vec![Str, Int], Str).with_impl(char_at)),
        FunctionDecl::new("substring")
            .with_overload(method("string_substring_int", vec![Str, Int], Str).with_impl(substring))
            .with_overload(
                method("string_substring_int_int", vec![Str, Int, Int], Str).with_impl(substring),
            ),
        FunctionDecl::new("indexOf")
            .with_overload(method("string_index_of_string", vec![Str, Str], Int).with_impl(index_of))
            .with_overload(
                method("string_index_of_string_int", vec![Str, Str, Int], Int).with_impl(index_of),
            ),
        FunctionDecl::new("lastIndexOf").with_overload(
            method("string_last_index_of_string", vec![Str, Str], Int).with_impl(last_index_of),
        ),
        FunctionDecl::new("split")
            .with_overload(
                method("string_split_string", vec![Str, Str], list_str.clone()).with_impl(split),
            )
            .with_overload(
                method("string_split_string_int", vec![Str, Str, Int], list_str.clone())
                    .with_impl(split),
            ),
        FunctionDecl::new("join")
            .with_overload(method("list_join", vec![list_str.clone()], Str).with_impl(join))
            .with_overload(
                method("list_join_string", vec![list_str, Str], Str).with_impl(join),
            ),
        FunctionDecl::new("replace")
            .with_overload(
                method("string_replace_string_string", vec![Str, Str, Str], Str).with_impl(replace),
            )
            .with_overload(
                method("string_replace_string_string_int", vec![Str, Str, Str, Int], Str)
                    .with_impl(replace),
            ),
    ]
}
