//! Error types for type checking.

use structural_cel_parser::Span;
use thiserror::Error;

use crate::types::CelType;

/// A type checking error.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}")]
pub struct CheckError {
    pub kind: CheckErrorKind,
    /// The source span where the error occurred.
    pub span: Span,
    /// The expression ID where the error occurred.
    pub expr_id: i64,
}

impl CheckError {
    pub fn new(kind: CheckErrorKind, span: Span, expr_id: i64) -> Self {
        Self {
            kind,
            span,
            expr_id,
        }
    }

    pub fn undeclared_reference(name: &str, span: Span, expr_id: i64) -> Self {
        Self::new(
            CheckErrorKind::UndeclaredReference {
                name: name.to_string(),
            },
            span,
            expr_id,
        )
    }

    pub fn no_matching_overload(
        function: &str,
        arg_types: Vec<CelType>,
        span: Span,
        expr_id: i64,
    ) -> Self {
        Self::new(
            CheckErrorKind::NoMatchingOverload {
                function: function.to_string(),
                arg_types,
            },
            span,
            expr_id,
        )
    }

    pub fn type_mismatch(expected: CelType, actual: CelType, span: Span, expr_id: i64) -> Self {
        Self::new(
            CheckErrorKind::TypeMismatch { expected, actual },
            span,
            expr_id,
        )
    }

    pub fn undefined_field(type_name: &str, field: &str, span: Span, expr_id: i64) -> Self {
        Self::new(
            CheckErrorKind::UndefinedField {
                type_name: type_name.to_string(),
                field: field.to_string(),
            },
            span,
            expr_id,
        )
    }

    pub fn unknown_type(name: &str, span: Span, expr_id: i64) -> Self {
        Self::new(
            CheckErrorKind::UnknownType {
                name: name.to_string(),
            },
            span,
            expr_id,
        )
    }
}

/// The kind of type checking error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CheckErrorKind {
    #[error("undeclared reference to '{name}'")]
    UndeclaredReference { name: String },

    #[error("found no matching overload for '{function}' applied to '({})'", join_types(.arg_types))]
    NoMatchingOverload {
        function: String,
        arg_types: Vec<CelType>,
    },

    #[error("expected type '{expected}' but found '{actual}'")]
    TypeMismatch { expected: CelType, actual: CelType },

    #[error("undefined field '{field}' on type '{type_name}'")]
    UndefinedField { type_name: String, field: String },

    #[error("unknown object type '{name}'")]
    UnknownType { name: String },
}

fn join_types(types: &[CelType]) -> String {
    types
        .iter()
        .map(CelType::display_name)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = CheckError::no_matching_overload(
            "_+_",
            vec![CelType::Int, CelType::String],
            0..5,
            1,
        );
        assert_eq!(
            err.to_string(),
            "found no matching overload for '_+_' applied to '(int, string)'"
        );
        assert_eq!(
            CheckError::undeclared_reference("foo", 0..3, 1).to_string(),
            "undeclared reference to 'foo'"
        );
    }
}
