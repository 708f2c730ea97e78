//! Expression evaluation.
//!
//! - [`Value`]: runtime values
//! - [`Activation`]: variable bindings
//! - [`FunctionRegistry`]: callable function overloads
//! - [`Evaluator`]: tree-walking interpreter with cost metering
//! - [`CompiledProgram`]: the reusable result of compilation

mod activation;
mod error;
mod evaluator;
mod functions;
pub(crate) mod ops;
mod program;
mod value;

pub use activation::{Activation, HierarchicalActivation, MapActivation, RuleActivation};
pub use error::{EvalError, EvalErrorKind};
pub use evaluator::{
    Evaluator, Meter, LIST_CREATE_COST, MAP_CREATE_COST, OBJECT_CREATE_COST,
    STRING_TRAVERSAL_FACTOR,
};
pub use functions::{CallCost, FunctionImpl, FunctionRegistry, Overload};
pub use program::{CompiledProgram, EvaluationResult};
pub use value::{MapKey, Value, ValueMap};
