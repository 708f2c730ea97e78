//! Type checker.
//!
//! Produces a [`CheckResult`] with a `type_map` and `reference_map` that the
//! evaluator consults for resolved field names, overload IDs and object
//! types, plus a [`CostEstimate`] computed from the checked tree.

#[allow(clippy::module_inception)]
mod checker;
mod cost;
mod errors;
mod overload;
mod scope;

pub use checker::{check, CheckResult, Checker, ReferenceInfo};
pub use cost::{CostEstimate, CostEstimator};
pub use errors::{CheckError, CheckErrorKind};
pub use overload::is_assignable;
