//! Type environment and compiler.
//!
//! An [`Environment`] is built once per root schema and compiles any number
//! of expressions against it:
//!
//! ```ignore
//! let env = EnvironmentBuilder::new(schema)
//!     .mode(RuleMode::Update)
//!     .with_variable(Variable::Params(CelType::Dyn))
//!     .build();
//! let program = env.compile("self.replicas >= oldSelf.replicas", ResultKind::Bool)?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use structural_cel_parser::ParseError;
use thiserror::Error;

use crate::checker::{CheckError, Checker, CostEstimate, CostEstimator};
use crate::config::CelConfig;
use crate::escaping;
use crate::eval::{CompiledProgram, FunctionRegistry};
use crate::library::Library;
use crate::schema::{with_type_and_object_meta, SchemaRef};
use crate::types::{schema_max_size, schema_type, CelType, FunctionDecl, TypeRef, VariableDecl};

/// Type name of the root object.
pub const ROOT_TYPE_NAME: &str = "Object";

/// Whether rules see the previous version of the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RuleMode {
    /// Only `self` is declared.
    #[default]
    Create,
    /// `oldSelf` is declared with the same type as `self`.
    Update,
}

/// Caller-supplied variables, each opted into per call site.
#[derive(Debug, Clone, PartialEq)]
pub enum Variable {
    Request(CelType),
    /// May be unbound at evaluation time; evaluates to `null` then.
    Params(CelType),
    /// Declared as `namespaceObject`; `namespace` is a reserved word.
    Namespace(CelType),
    Authorizer,
    RequestResourceAuthorizer,
    /// Composited variables, accessed as `variables.<name>`.
    Variables(CelType),
}

impl Variable {
    pub fn name(&self) -> &'static str {
        match self {
            Variable::Request(_) => "request",
            Variable::Params(_) => "params",
            Variable::Namespace(_) => "namespaceObject",
            Variable::Authorizer => "authorizer",
            Variable::RequestResourceAuthorizer => "requestResourceAuthorizer",
            Variable::Variables(_) => "variables",
        }
    }

    pub fn cel_type(&self) -> CelType {
        match self {
            Variable::Request(t)
            | Variable::Params(t)
            | Variable::Namespace(t)
            | Variable::Variables(t) => t.clone(),
            Variable::Authorizer | Variable::RequestResourceAuthorizer => {
                CelType::Object(TypeRef::unstructured("kubernetes.authorization.Authorizer"))
            }
        }
    }

    fn is_optional(&self) -> bool {
        matches!(self, Variable::Params(_))
    }
}

/// The type an expression must produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// Validation rules.
    Bool,
    /// Mutation expressions that build an object literal.
    ObjectConstructor,
    /// Message expressions.
    String,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultKind::Bool => f.write_str("bool"),
            ResultKind::ObjectConstructor => f.write_str("an object"),
            ResultKind::String => f.write_str("string"),
        }
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Why an expression failed to compile.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("syntax error: {}", join(.0))]
    Parse(Vec<ParseError>),

    #[error("type error: {}", join(.0))]
    Check(Vec<CheckError>),

    #[error("expression must evaluate to {expected}, got {actual}")]
    ResultType { expected: ResultKind, actual: CelType },

    #[error("estimated expression cost {estimated} exceeds the limit of {limit}")]
    CostLimit { estimated: u64, limit: u64 },
}

// ============================================================================
// Builder
// ============================================================================

/// Builds an [`Environment`] for one root schema.
pub struct EnvironmentBuilder {
    schema: SchemaRef,
    libraries: Vec<Library>,
    mode: RuleMode,
    variables: Vec<Variable>,
    config: CelConfig,
    resource_root: bool,
}

impl EnvironmentBuilder {
    pub fn new(schema: SchemaRef) -> Self {
        Self {
            schema,
            libraries: Vec::new(),
            mode: RuleMode::default(),
            variables: Vec::new(),
            config: CelConfig::default(),
            resource_root: false,
        }
    }

    /// Adds a library. Without any, every library is included.
    pub fn with_library(mut self, library: Library) -> Self {
        self.libraries.push(library);
        self
    }

    pub fn mode(mut self, mode: RuleMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_variable(mut self, variable: Variable) -> Self {
        self.variables.retain(|v| v.name() != variable.name());
        self.variables.push(variable);
        self
    }

    pub fn with_config(mut self, config: CelConfig) -> Self {
        self.config = config;
        self
    }

    /// Treats the root as a resource, exposing `apiVersion`, `kind` and
    /// `metadata` even when the schema omits them.
    pub fn resource_root(mut self) -> Self {
        self.resource_root = true;
        self
    }

    pub fn build(self) -> Environment {
        let schema = if self.resource_root {
            with_type_and_object_meta(self.schema)
        } else {
            self.schema
        };
        let self_type = schema_type(&schema, ROOT_TYPE_NAME);

        let mut functions: HashMap<String, FunctionDecl> = HashMap::new();
        let libraries = if self.libraries.is_empty() {
            Library::all()
        } else {
            self.libraries
        };
        for library in &libraries {
            for decl in library.functions() {
                match functions.get_mut(&decl.name) {
                    Some(existing) => existing.merge(decl.clone()),
                    None => {
                        functions.insert(decl.name.clone(), decl.clone());
                    }
                }
            }
        }
        let registry = Arc::new(FunctionRegistry::from_decls(functions.values()));

        let mut declarations = vec![VariableDecl::new("self", self_type.clone())];
        let mut optional = Vec::new();
        if self.mode == RuleMode::Update {
            declarations.push(VariableDecl::new("oldSelf", self_type.clone()));
            optional.push("oldSelf".to_string());
        }
        for variable in &self.variables {
            declarations.push(VariableDecl::new(variable.name(), variable.cel_type()));
            if variable.is_optional() {
                optional.push(variable.name().to_string());
            }
        }

        let mut root_properties = Vec::new();
        if let CelType::Object(root) = &self_type {
            for field in root.fields() {
                if escaping::is_root_reserved(&field.name) {
                    continue;
                }
                let Some(ident) = escaping::escape(&field.name) else {
                    continue;
                };
                if declarations.iter().any(|d| d.name == ident) {
                    continue;
                }
                root_properties.push(ident.clone());
                declarations.push(VariableDecl::new(ident, field.cel_type));
            }
        }

        let mut sizes = HashMap::new();
        if let Some(size) = schema_max_size(&schema) {
            sizes.insert("self".to_string(), size);
            if self.mode == RuleMode::Update {
                sizes.insert("oldSelf".to_string(), size);
            }
        }

        tracing::debug!(
            functions = functions.len(),
            variables = declarations.len(),
            "built expression environment"
        );

        Environment {
            schema,
            self_type,
            declarations,
            optional,
            root_properties,
            sizes,
            functions,
            registry,
            config: self.config,
        }
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Compiles expressions against one root schema. Immutable once built.
#[derive(Debug, Clone)]
pub struct Environment {
    schema: SchemaRef,
    self_type: CelType,
    declarations: Vec<VariableDecl>,
    optional: Vec<String>,
    root_properties: Vec<String>,
    sizes: HashMap<String, u64>,
    functions: HashMap<String, FunctionDecl>,
    registry: Arc<FunctionRegistry>,
    config: CelConfig,
}

impl Environment {
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn self_type(&self) -> &CelType {
        &self.self_type
    }

    /// Declared variables, including root properties.
    pub fn declarations(&self) -> &[VariableDecl] {
        &self.declarations
    }

    /// Identifiers declared for the root object's properties.
    pub fn root_properties(&self) -> &[String] {
        &self.root_properties
    }

    pub fn functions(&self) -> &HashMap<String, FunctionDecl> {
        &self.functions
    }

    pub fn compile(&self, source: &str, kind: ResultKind) -> Result<CompiledProgram, CompileError> {
        let ast = structural_cel_parser::parse(source)
            .into_result()
            .map_err(CompileError::Parse)?;

        let root = match &self.self_type {
            CelType::Object(root) => Some(root),
            _ => None,
        };
        let mut checker = Checker::new(&self.declarations, &self.functions);
        if let Some(root) = root {
            checker = checker.with_object_root(root);
        }
        for (name, size) in &self.sizes {
            checker = checker.with_variable_size(name.clone(), *size);
        }
        let checked = checker.check(&ast);
        if !checked.is_ok() {
            return Err(CompileError::Check(checked.errors));
        }

        let actual = checked.get_type(ast.id).cloned().unwrap_or(CelType::Dyn);
        let matches_kind = match kind {
            ResultKind::Bool => actual == CelType::Bool,
            ResultKind::String => actual == CelType::String,
            ResultKind::ObjectConstructor => matches!(actual, CelType::Object(_)),
        };
        if !matches_kind {
            return Err(CompileError::ResultType {
                expected: kind,
                actual,
            });
        }

        let estimated: CostEstimate =
            CostEstimator::new(&checked, &self.functions, self.config.default_max_list_size)
                .estimate(&ast);
        if let Some(limit) = self.config.max_expression_cost {
            if estimated.max > limit {
                return Err(CompileError::CostLimit {
                    estimated: estimated.max,
                    limit,
                });
            }
        }

        Ok(CompiledProgram::new(
            source,
            ast,
            checked,
            self.registry.clone(),
            self.declarations.iter().map(|d| d.name.clone()).collect(),
            self.optional.clone(),
            estimated,
            u64::try_from(self.config.per_call_limit).unwrap_or(0),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{RuleActivation, Value};
    use crate::schema::StructuralSchema;
    use crate::unstructured::from_json;
    use serde_json::json;

    fn schema() -> SchemaRef {
        StructuralSchema::from_json(&json!({
            "type": "object",
            "properties": {
                "replicas": {"type": "integer"},
                "min-replicas": {"type": "integer"},
                "int": {"type": "integer"},
                "params": {"type": "string"},
                "labels": {"type": "object", "additionalProperties": {"type": "string"}}
            }
        }))
        .unwrap()
    }

    fn env(mode: RuleMode) -> Environment {
        EnvironmentBuilder::new(schema())
            .mode(mode)
            .with_variable(Variable::Params(CelType::Dyn))
            .build()
    }

    #[test]
    fn test_root_properties_are_escaped() {
        let env = env(RuleMode::Create);
        let props = env.root_properties();
        assert!(props.contains(&"replicas".to_string()));
        assert!(props.contains(&"min__dash__replicas".to_string()));
        assert!(!props.contains(&"int".to_string()));
        // shadowed by the declared variable
        assert_eq!(env.declarations().iter().filter(|d| d.name == "params").count(), 1);
    }

    #[test]
    fn test_compile_and_evaluate() {
        let env = env(RuleMode::Create);
        let program = env
            .compile("min__dash__replicas <= self.replicas", ResultKind::Bool)
            .unwrap();
        let obj = from_json(&json!({"replicas": 3, "min-replicas": 1}));
        let activation = RuleActivation::new(obj).with_root_properties();
        let result = program.evaluate(&activation, 100);
        assert_eq!(result.value, Ok(Value::Bool(true)));
        assert!(result.remaining_budget < 100);
    }

    #[test]
    fn test_old_self_requires_update_mode() {
        let err = env(RuleMode::Create)
            .compile("self.replicas >= oldSelf.replicas", ResultKind::Bool)
            .unwrap_err();
        assert!(matches!(err, CompileError::Check(_)));
        assert!(env(RuleMode::Update)
            .compile("self.replicas >= oldSelf.replicas", ResultKind::Bool)
            .is_ok());
    }

    #[test]
    fn test_result_kind_mismatch() {
        let err = env(RuleMode::Create)
            .compile("self.replicas + 1", ResultKind::Bool)
            .unwrap_err();
        assert_eq!(err.to_string(), "expression must evaluate to bool, got int");
        assert!(env(RuleMode::Create)
            .compile("'replicas: ' + string(self.replicas)", ResultKind::String)
            .is_ok());
    }

    #[test]
    fn test_object_constructor() {
        let program = env(RuleMode::Create)
            .compile("Object{replicas: 2}", ResultKind::ObjectConstructor)
            .unwrap();
        let result = program.evaluate(&RuleActivation::new(Value::Null), 1000);
        let Ok(Value::Object(obj)) = result.value else {
            panic!("expected an object, got {:?}", result.value);
        };
        assert_eq!(obj.get("replicas"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_parse_and_check_errors() {
        let env = env(RuleMode::Create);
        assert!(matches!(
            env.compile("self.replicas >", ResultKind::Bool),
            Err(CompileError::Parse(_))
        ));
        assert!(matches!(
            env.compile("self.missing == 1", ResultKind::Bool),
            Err(CompileError::Check(_))
        ));
        assert!(matches!(
            env.compile("nope(1)", ResultKind::Bool),
            Err(CompileError::Check(_))
        ));
    }

    #[test]
    fn test_params_may_be_unbound() {
        let program = env(RuleMode::Create)
            .compile("params == null", ResultKind::Bool)
            .unwrap();
        let result = program.evaluate(&RuleActivation::new(Value::Null), 100);
        assert_eq!(result.value, Ok(Value::Bool(true)));
    }

    #[test]
    fn test_estimated_cost_limit() {
        let config = CelConfig {
            max_expression_cost: Some(5),
            ..CelConfig::default()
        };
        let env = EnvironmentBuilder::new(schema()).with_config(config).build();
        let err = env
            .compile("self.labels.all(k, self.labels[k].startsWith('a'))", ResultKind::Bool)
            .unwrap_err();
        assert!(matches!(err, CompileError::CostLimit { limit: 5, .. }));
    }

    #[test]
    fn test_networking_and_format_libraries() {
        let env = env(RuleMode::Create);
        for rule in [
            "cidr('10.0.0.0/8').containsIP(ip('10.1.1.1'))",
            "'my-name'.isFormat('dns1123label')",
            "[3, 1, 2].max() == 3",
            "'a,b'.split(',').size() == 2",
        ] {
            let program = env.compile(rule, ResultKind::Bool).unwrap();
            let result = program.evaluate(&RuleActivation::new(Value::Null), 10_000);
            assert_eq!(result.value, Ok(Value::Bool(true)), "{}", rule);
        }
    }
}
