//! Evaluation error types.

use thiserror::Error;

/// The kind of evaluation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    DivisionByZero,
    ModuloByZero,
    Overflow,
    TypeMismatch,
    UnknownIdentifier,
    UnknownFunction,
    IndexOutOfBounds,
    KeyNotFound,
    InvalidArgument,
    NoMatchingOverload,
    FieldNotFound,
    InvalidConversion,
    /// The budget shared by all expressions of a validation ran out.
    BudgetExhausted,
    /// A single evaluation went over the per-call limit.
    CostLimitExceeded,
    Internal,
}

/// An error that occurred during evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EvalError {
    pub message: String,
    pub kind: EvalErrorKind,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    pub fn division_by_zero() -> Self {
        Self::new(EvalErrorKind::DivisionByZero, "division by zero")
    }

    pub fn modulo_by_zero() -> Self {
        Self::new(EvalErrorKind::ModuloByZero, "modulus by zero")
    }

    pub fn overflow(op: &str) -> Self {
        Self::new(EvalErrorKind::Overflow, format!("integer overflow in {}", op))
    }

    pub fn type_mismatch(expected: &str, actual: &str) -> Self {
        Self::new(
            EvalErrorKind::TypeMismatch,
            format!("expected {}, got {}", expected, actual),
        )
    }

    pub fn unknown_identifier(name: &str) -> Self {
        Self::new(
            EvalErrorKind::UnknownIdentifier,
            format!("no such attribute: {}", name),
        )
    }

    pub fn unknown_function(name: &str) -> Self {
        Self::new(
            EvalErrorKind::UnknownFunction,
            format!("unknown function: {}", name),
        )
    }

    pub fn index_out_of_bounds(index: i64, len: usize) -> Self {
        Self::new(
            EvalErrorKind::IndexOutOfBounds,
            format!("index out of bounds: {} (size {})", index, len),
        )
    }

    pub fn key_not_found(key: &str) -> Self {
        Self::new(EvalErrorKind::KeyNotFound, format!("no such key: {}", key))
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::InvalidArgument, message)
    }

    pub fn no_matching_overload(func: &str) -> Self {
        Self::new(
            EvalErrorKind::NoMatchingOverload,
            format!("no such overload: {}", func),
        )
    }

    pub fn field_not_found(field: &str) -> Self {
        Self::new(
            EvalErrorKind::FieldNotFound,
            format!("no such key: {}", field),
        )
    }

    pub fn invalid_conversion(from: &str, to: &str) -> Self {
        Self::new(
            EvalErrorKind::InvalidConversion,
            format!("cannot convert {} to {}", from, to),
        )
    }

    pub fn budget_exhausted() -> Self {
        Self::new(
            EvalErrorKind::BudgetExhausted,
            "operation cancelled: actual cost budget exhausted",
        )
    }

    pub fn cost_limit_exceeded() -> Self {
        Self::new(
            EvalErrorKind::CostLimitExceeded,
            "operation cancelled: actual cost limit exceeded",
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::Internal, message)
    }

    /// True for errors that must abort the whole validation, not just one rule.
    pub fn is_cost_error(&self) -> bool {
        matches!(
            self.kind,
            EvalErrorKind::BudgetExhausted | EvalErrorKind::CostLimitExceeded
        )
    }
}
