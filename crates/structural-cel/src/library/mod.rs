//! Function libraries.
//!
//! A [`Library`] is a named set of [`FunctionDecl`]s whose overloads carry
//! their implementations. The environment builder merges the libraries it is
//! given into one declaration table, so two libraries may contribute
//! overloads to the same function name (`indexOf` on strings and on lists).
//!
//! - [`Library::standard`]: operators, `size`, string predicates, conversions
//! - [`Library::lists`]: `isSorted`, `sum`, `min`, `max`, `indexOf`, `lastIndexOf`
//! - [`Library::strings`]: case, trimming, splitting, joining, replacing
//! - [`Library::networking`]: `cidr`, `ip` and their methods
//! - [`Library::identifiers`]: `isFormat`, `isGenerateNameOfFormat`

pub mod format;
mod lists;
pub mod networking;
mod standard;
mod strings;

use crate::eval::{EvalError, Value};
use crate::types::FunctionDecl;

/// A named set of function declarations.
#[derive(Debug, Clone)]
pub struct Library {
    name: &'static str,
    functions: Vec<FunctionDecl>,
}

impl Library {
    pub fn new(name: &'static str, functions: Vec<FunctionDecl>) -> Self {
        Self { name, functions }
    }

    pub fn standard() -> Self {
        Self::new("standard", standard::functions())
    }

    pub fn lists() -> Self {
        Self::new("lists", lists::functions())
    }

    pub fn strings() -> Self {
        Self::new("strings", strings::functions())
    }

    pub fn networking() -> Self {
        Self::new("networking", networking::functions())
    }

    pub fn identifiers() -> Self {
        Self::new("identifiers", format::functions())
    }

    /// Every library, standard first.
    pub fn all() -> Vec<Library> {
        vec![
            Self::standard(),
            Self::lists(),
            Self::strings(),
            Self::networking(),
            Self::identifiers(),
        ]
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn functions(&self) -> &[FunctionDecl] {
        &self.functions
    }
}

// ============================================================================
// Argument helpers
// ============================================================================

fn mismatch(function: &str, args: &[Value]) -> EvalError {
    let types: Vec<&str> = args.iter().map(Value::type_name).collect();
    EvalError::no_matching_overload(&format!("{} ({})", function, types.join(", ")))
}

pub(crate) fn str_arg<'a>(args: &'a [Value], i: usize, function: &str) -> Result<&'a str, EvalError> {
    match args.get(i) {
        Some(Value::String(s)) => Ok(s),
        _ => Err(mismatch(function, args)),
    }
}

pub(crate) fn int_arg(args: &[Value], i: usize, function: &str) -> Result<i64, EvalError> {
    match args.get(i) {
        Some(Value::Int(n)) => Ok(*n),
        _ => Err(mismatch(function, args)),
    }
}

pub(crate) fn list_arg<'a>(
    args: &'a [Value],
    i: usize,
    function: &str,
) -> Result<&'a [Value], EvalError> {
    match args.get(i) {
        Some(Value::List(items)) => Ok(items),
        _ => Err(mismatch(function, args)),
    }
}

pub(crate) fn arg<'a>(args: &'a [Value], i: usize, function: &str) -> Result<&'a Value, EvalError> {
    args.get(i).ok_or_else(|| mismatch(function, args))
}
