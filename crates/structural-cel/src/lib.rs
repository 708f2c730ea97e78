//! Structural CEL: schema-typed expressions for validating structured objects
//!
//! Expressions are compiled against the type derived from an object schema
//! and evaluated against concrete objects under a cost budget.
//!
//! # Quick Start
//!
//! ```
//! use serde_json::json;
//! use structural_cel::{CelConfig, SchemaValidator};
//!
//! let validator = SchemaValidator::from_structural_json(
//!     &json!({
//!         "type": "object",
//!         "required": ["app"],
//!         "properties": {
//!             "app": {"type": "string"},
//!             "replicas": {
//!                 "type": "integer",
//!                 "x-kubernetes-validations": [
//!                     {"rule": "self <= 10", "message": "at most 10 replicas"}
//!                 ]
//!             }
//!         }
//!     }),
//!     CelConfig::default(),
//! )
//! .unwrap();
//!
//! let errors = validator.validate_object(&json!({"replicas": 12}), None);
//! assert_eq!(errors.len(), 2);
//! assert_eq!(errors[0].field.to_string(), "app");
//! assert_eq!(errors[1].detail, "at most 10 replicas");
//! ```
//!
//! # Architecture
//!
//! - **Schema**: adapters exposing structural and OpenAPI schemas through one trait
//! - **Environment**: variables, root properties and libraries for one schema
//! - **Checker**: type checking and static cost estimation
//! - **Evaluator**: cost-metered interpretation of compiled programs
//! - **Validation**: value checks, rules and ratcheting over whole objects
//! - **Reconcile**: comparison against hand-written validation results

// Core modules
pub mod checker;
pub mod config;
pub mod env;
pub mod escaping;
pub mod eval;
pub mod field;
pub mod library;
pub mod metrics;
pub mod object;
pub mod ratchet;
pub mod reconcile;
pub mod schema;
pub mod types;
pub mod unstructured;
pub mod validation;

pub use config::{CelConfig, ConfigError};
pub use env::{
    CompileError, Environment, EnvironmentBuilder, ResultKind, RuleMode, Variable, ROOT_TYPE_NAME,
};
pub use field::{ErrorKind, ErrorList, FieldError, FieldPath};
pub use library::Library;
pub use metrics::{MetricsError, ValidationMetrics};
pub use object::{to_native, MapKeyTypeError, NativeError, ObjectVal, TypeMismatchError};
pub use ratchet::{Operation, RatchetState};
pub use reconcile::{compare_and_emit_mismatches, gather_mismatches};
pub use validation::SchemaValidator;

// Re-export from eval module
pub use eval::{
    Activation, CompiledProgram, EvalError, EvalErrorKind, EvaluationResult, RuleActivation, Value,
};

// Re-export from schema module
pub use schema::{
    OpenApiDocument, Schema, SchemaConversionError, SchemaKind, SchemaRef, StructuralSchema,
    ValidationRule,
};

pub use types::{CelType, TypeRef};
