//! Overload resolution for function calls and operators.
//!
//! Every overload whose parameters accept the argument types matches. When
//! more than one matches, all of their IDs are recorded and the evaluator
//! picks among them by runtime value.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::{CelType, FunctionDecl};

/// Counter for scoping type parameters to a single overload match.
static SCOPE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Result of overload resolution.
#[derive(Debug)]
pub struct OverloadResult {
    pub result_type: CelType,
    pub overload_ids: Vec<String>,
}

/// Resolves the matching overload(s) of `func` for a call.
///
/// `target` is the receiver type for method calls.
pub fn resolve_overload(
    func: &FunctionDecl,
    target: Option<&CelType>,
    args: &[CelType],
    substitutions: &mut HashMap<Arc<str>, CelType>,
) -> Option<OverloadResult> {
    let full_args: Vec<&CelType> = target.into_iter().chain(args.iter()).collect();
    let mut overload_ids = Vec::new();
    let mut result_types = Vec::new();

    for overload in &func.overloads {
        if target.is_some() != overload.is_member || full_args.len() != overload.arity() {
            continue;
        }
        let mut local_subs = substitutions.clone();
        if let Some(result) = try_match_overload(
            &full_args,
            &overload.params,
            &overload.result,
            &overload.type_params,
            &mut local_subs,
        ) {
            overload_ids.push(overload.id.clone());
            result_types.push(result);
            *substitutions = local_subs;
        }
    }

    if overload_ids.is_empty() {
        return None;
    }

    // Several matches only happen with dyn arguments; agree or fall back to dyn.
    let result_type = match result_types.split_first() {
        Some((first, rest)) if rest.iter().all(|t| t == first) => first.clone(),
        _ => CelType::Dyn,
    };
    Some(OverloadResult {
        result_type,
        overload_ids,
    })
}

fn rename_type_params(ty: &CelType, rename_map: &HashMap<String, String>) -> CelType {
    match ty {
        CelType::TypeParam(name) => match rename_map.get(name.as_ref()) {
            Some(scoped) => CelType::param(scoped),
            None => ty.clone(),
        },
        CelType::List(elem) => CelType::list(rename_type_params(elem, rename_map)),
        CelType::Map(key, val) => CelType::map(
            rename_type_params(key, rename_map),
            rename_type_params(val, rename_map),
        ),
        _ => ty.clone(),
    }
}

/// Matches argument types against parameters, binding type parameters.
///
/// Returns the resolved result type on success.
fn try_match_overload(
    args: &[&CelType],
    params: &[CelType],
    result: &CelType,
    type_params: &[String],
    substitutions: &mut HashMap<Arc<str>, CelType>,
) -> Option<CelType> {
    let scope_id = SCOPE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let rename_map: HashMap<String, String> = type_params
        .iter()
        .map(|name| (name.clone(), format!("{}#{}", name, scope_id)))
        .collect();

    let scoped_params: Vec<CelType> = params
        .iter()
        .map(|p| rename_type_params(p, &rename_map))
        .collect();
    let scoped_result = rename_type_params(result, &rename_map);

    for (arg, param) in args.iter().zip(scoped_params.iter()) {
        if !is_assignable(arg, param, substitutions) {
            return None;
        }
    }
    Some(substitute_type(&scoped_result, substitutions))
}

/// Checks whether a value of type `arg` may be passed where `param` is expected.
pub fn is_assignable(
    arg: &CelType,
    param: &CelType,
    substitutions: &mut HashMap<Arc<str>, CelType>,
) -> bool {
    if let CelType::TypeParam(name) = param {
        match substitutions.get(name).cloned() {
            Some(bound) => {
                if is_assignable(arg, &bound, &mut HashMap::new())
                    || is_assignable(&bound, arg, &mut HashMap::new())
                {
                    if should_widen_binding(&bound, arg) {
                        substitutions.insert(name.clone(), arg.clone());
                    }
                } else {
                    substitutions.insert(name.clone(), CelType::Dyn);
                }
            }
            None => {
                substitutions.insert(name.clone(), arg.clone());
            }
        }
        return true;
    }

    if matches!(arg, CelType::Dyn | CelType::Error) || matches!(param, CelType::Dyn | CelType::Error)
    {
        return true;
    }
    if arg == param {
        return true;
    }

    match (arg, param) {
        (CelType::List(arg_elem), CelType::List(param_elem)) => {
            is_assignable(arg_elem, param_elem, substitutions)
        }
        (CelType::Map(arg_key, arg_val), CelType::Map(param_key, param_val)) => {
            is_assignable(arg_key, param_key, substitutions)
                && is_assignable(arg_val, param_val, substitutions)
        }
        (CelType::Null, other) => other.is_nullable(),
        _ => false,
    }
}

/// A binding to null or dyn gives way to the first more specific type.
fn should_widen_binding(bound: &CelType, arg: &CelType) -> bool {
    if bound == arg {
        return false;
    }
    match bound {
        CelType::Null => !matches!(arg, CelType::Null),
        CelType::Dyn => !matches!(arg, CelType::Dyn | CelType::Error),
        CelType::List(elem) => matches!(**elem, CelType::Dyn) && matches!(arg, CelType::List(_)),
        CelType::Map(_, val) => matches!(**val, CelType::Dyn) && matches!(arg, CelType::Map(..)),
        _ => false,
    }
}

/// Replaces bound type parameters with their bindings.
pub fn substitute_type(ty: &CelType, substitutions: &HashMap<Arc<str>, CelType>) -> CelType {
    match ty {
        CelType::TypeParam(name) => match substitutions.get(name) {
            Some(bound) => substitute_type(bound, substitutions),
            None => ty.clone(),
        },
        CelType::List(elem) => CelType::list(substitute_type(elem, substitutions)),
        CelType::Map(key, val) => CelType::map(
            substitute_type(key, substitutions),
            substitute_type(val, substitutions),
        ),
        _ => ty.clone(),
    }
}

/// Replaces any type parameter left unbound with `dyn`.
pub fn finalize_type(ty: &CelType) -> CelType {
    match ty {
        CelType::TypeParam(_) => CelType::Dyn,
        CelType::List(elem) => CelType::list(finalize_type(elem)),
        CelType::Map(key, val) => CelType::map(finalize_type(key), finalize_type(val)),
        _ => ty.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OverloadDecl;

    fn add() -> FunctionDecl {
        FunctionDecl::new("_+_")
            .with_overload(OverloadDecl::function(
                "add_int64",
                vec![CelType::Int, CelType::Int],
                CelType::Int,
            ))
            .with_overload(OverloadDecl::function(
                "add_string",
                vec![CelType::String, CelType::String],
                CelType::String,
            ))
            .with_overload(
                OverloadDecl::function(
                    "add_list",
                    vec![
                        CelType::list(CelType::param("T")),
                        CelType::list(CelType::param("T")),
                    ],
                    CelType::list(CelType::param("T")),
                )
                .with_type_params(&["T"]),
            )
    }

    #[test]
    fn test_resolve_simple_overload() {
        let mut subs = HashMap::new();
        let result = resolve_overload(&add(), None, &[CelType::Int, CelType::Int], &mut subs)
            .unwrap();
        assert_eq!(result.result_type, CelType::Int);
        assert_eq!(result.overload_ids, vec!["add_int64".to_string()]);
    }

    #[test]
    fn test_resolve_no_match() {
        let mut subs = HashMap::new();
        assert!(resolve_overload(&add(), None, &[CelType::String, CelType::Int], &mut subs).is_none());
    }

    #[test]
    fn test_dyn_matches_every_overload() {
        let mut subs = HashMap::new();
        let result =
            resolve_overload(&add(), None, &[CelType::Dyn, CelType::Dyn], &mut subs).unwrap();
        assert_eq!(result.overload_ids.len(), 3);
        assert_eq!(result.result_type, CelType::Dyn);
    }

    #[test]
    fn test_generic_list_widens_from_dyn() {
        let mut subs = HashMap::new();
        let result = resolve_overload(
            &add(),
            None,
            &[CelType::list(CelType::Dyn), CelType::list(CelType::Int)],
            &mut subs,
        )
        .unwrap();
        assert_eq!(
            finalize_type(&result.result_type),
            CelType::list(CelType::Int)
        );
    }

    #[test]
    fn test_resolve_method_overload() {
        let func = FunctionDecl::new("startsWith").with_overload(OverloadDecl::method(
            "string_starts_with",
            vec![CelType::String, CelType::String],
            CelType::Bool,
        ));
        let mut subs = HashMap::new();
        assert!(resolve_overload(&func, Some(&CelType::String), &[CelType::String], &mut subs)
            .is_some());
        assert!(resolve_overload(&func, None, &[CelType::String, CelType::String], &mut subs)
            .is_none());
    }

    #[test]
    fn test_null_is_assignable_to_nullable_types() {
        let mut subs = HashMap::new();
        assert!(is_assignable(&CelType::Null, &CelType::Dyn, &mut subs));
        assert!(!is_assignable(&CelType::Null, &CelType::Int, &mut subs));
    }
}
