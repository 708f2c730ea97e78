//! Core type checker implementation.
//!
//! The checker takes raw data (variables, functions, an optional object root
//! type) rather than an environment, so the environment builder and tests can
//! drive it directly.

use std::collections::HashMap;
use std::sync::Arc;

use structural_cel_parser::{BinaryOp, Expr, SpannedExpr, UnaryOp};

use super::errors::CheckError;
use super::overload::{finalize_type, is_assignable, resolve_overload, substitute_type};
use super::scope::ScopeStack;
use crate::types::{schema_max_size, CelType, FieldType, FunctionDecl, TypeRef, VariableDecl};

/// Reference information for a resolved identifier, field or function.
#[derive(Debug, Clone, Default)]
pub struct ReferenceInfo {
    pub name: String,
    /// Matching overload IDs for function calls.
    pub overload_ids: Vec<String>,
    /// Property name a field selection resolved to.
    pub field: Option<String>,
    /// Object type an object literal constructs.
    pub object_type: Option<TypeRef>,
}

impl ReferenceInfo {
    pub fn ident(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn function(name: impl Into<String>, overload_ids: Vec<String>) -> Self {
        Self {
            name: name.into(),
            overload_ids,
            ..Self::default()
        }
    }

    pub fn field(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            field: Some(name.clone()),
            name,
            ..Self::default()
        }
    }

    pub fn object(type_ref: TypeRef) -> Self {
        Self {
            name: type_ref.type_name().to_string(),
            object_type: Some(type_ref),
            ..Self::default()
        }
    }
}

/// Result of type checking an expression.
#[derive(Debug, Clone, Default)]
pub struct CheckResult {
    /// Expression ID to inferred type.
    pub type_map: HashMap<i64, CelType>,
    /// Expression ID to resolved reference.
    pub reference_map: HashMap<i64, ReferenceInfo>,
    /// Expression ID to the declared maximum size of its value, where a schema bounds it.
    pub sizes: HashMap<i64, u64>,
    pub errors: Vec<CheckError>,
}

impl CheckResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get_type(&self, expr_id: i64) -> Option<&CelType> {
        self.type_map.get(&expr_id)
    }

    pub fn get_reference(&self, expr_id: i64) -> Option<&ReferenceInfo> {
        self.reference_map.get(&expr_id)
    }

    /// The property name a field selection resolved to.
    pub fn property_name(&self, expr_id: i64) -> Option<&str> {
        self.reference_map
            .get(&expr_id)
            .and_then(|r| r.field.as_deref())
    }

    /// Overload IDs a call resolved to; empty when unresolved.
    pub fn overload_ids(&self, expr_id: i64) -> &[String] {
        self.reference_map
            .get(&expr_id)
            .map(|r| r.overload_ids.as_slice())
            .unwrap_or(&[])
    }

    /// Object type of an object literal.
    pub fn object_type(&self, expr_id: i64) -> Option<&TypeRef> {
        self.reference_map
            .get(&expr_id)
            .and_then(|r| r.object_type.as_ref())
    }
}

/// Type checker for expressions.
pub struct Checker<'a> {
    scopes: ScopeStack,
    functions: &'a HashMap<String, FunctionDecl>,
    /// Root type that object literal names are resolved against.
    object_root: Option<&'a TypeRef>,
    variable_sizes: HashMap<String, u64>,
    type_map: HashMap<i64, CelType>,
    reference_map: HashMap<i64, ReferenceInfo>,
    sizes: HashMap<i64, u64>,
    errors: Vec<CheckError>,
    substitutions: HashMap<Arc<str>, CelType>,
}

impl<'a> Checker<'a> {
    pub fn new(variables: &[VariableDecl], functions: &'a HashMap<String, FunctionDecl>) -> Self {
        let mut scopes = ScopeStack::new();
        for decl in variables {
            scopes.add_variable(decl.name.clone(), decl.cel_type.clone());
        }
        Self {
            scopes,
            functions,
            object_root: None,
            variable_sizes: HashMap::new(),
            type_map: HashMap::new(),
            reference_map: HashMap::new(),
            sizes: HashMap::new(),
            errors: Vec::new(),
            substitutions: HashMap::new(),
        }
    }

    /// Enables object literals, named after `root` and its nested fields.
    pub fn with_object_root(mut self, root: &'a TypeRef) -> Self {
        self.object_root = Some(root);
        self
    }

    /// Declares the maximum size of a variable's value for cost estimation.
    pub fn with_variable_size(mut self, name: impl Into<String>, size: u64) -> Self {
        self.variable_sizes.insert(name.into(), size);
        self
    }

    pub fn check(mut self, expr: &SpannedExpr) -> CheckResult {
        self.check_expr(expr);
        self.finalize_types();
        CheckResult {
            type_map: self.type_map,
            reference_map: self.reference_map,
            sizes: self.sizes,
            errors: self.errors,
        }
    }

    fn set_type(&mut self, expr_id: i64, cel_type: CelType) {
        self.type_map.insert(expr_id, cel_type);
    }

    fn set_reference(&mut self, expr_id: i64, reference: ReferenceInfo) {
        self.reference_map.insert(expr_id, reference);
    }

    fn report_error(&mut self, error: CheckError) {
        self.errors.push(error);
    }

    fn finalize_types(&mut self) {
        for ty in self.type_map.values_mut() {
            *ty = finalize_type(&substitute_type(ty, &self.substitutions));
        }
    }

    fn check_expr(&mut self, expr: &SpannedExpr) -> CelType {
        let result = match &expr.node {
            Expr::Null => CelType::Null,
            Expr::Bool(_) => CelType::Bool,
            Expr::Int(_) => CelType::Int,
            Expr::Float(_) => CelType::Double,
            Expr::String(_) => CelType::String,
            Expr::Bytes(_) => CelType::Bytes,

            Expr::Ident(name) => self.check_ident(name, expr),

            Expr::List(elements) => {
                let types: Vec<CelType> = elements.iter().map(|e| self.check_expr(e)).collect();
                CelType::list(join_types(&types))
            }
            Expr::Map(entries) => {
                let mut key_types = Vec::with_capacity(entries.len());
                let mut value_types = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    key_types.push(self.check_expr(key));
                    value_types.push(self.check_expr(value));
                }
                CelType::map(join_types(&key_types), join_types(&value_types))
            }

            Expr::Unary { op, expr: inner } => {
                let inner_type = self.check_expr(inner);
                let name = match op {
                    UnaryOp::Neg => "-_",
                    UnaryOp::Not => "!_",
                };
                self.resolve_function_call(name, None, &[inner_type], expr)
            }
            Expr::Binary { op, left, right } => {
                let left_type = self.check_expr(left);
                let right_type = self.check_expr(right);
                self.resolve_function_call(
                    binary_op_to_function(*op),
                    None,
                    &[left_type, right_type],
                    expr,
                )
            }
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                let cond_type = self.check_expr(cond);
                let then_type = self.check_expr(then_expr);
                let else_type = self.check_expr(else_expr);
                self.resolve_function_call("_?_:_", None, &[cond_type, then_type, else_type], expr)
            }

            Expr::Member { expr: obj, field } => self.check_member(obj, field, expr),
            Expr::Index { expr: obj, index } => {
                let obj_type = self.check_expr(obj);
                let index_type = self.check_expr(index);
                self.resolve_function_call("_[_]", None, &[obj_type, index_type], expr)
            }
            Expr::Call { expr: callee, args } => self.check_call(callee, args, expr),
            Expr::Struct { type_name, fields } => self.check_struct(type_name, fields, expr),

            Expr::Comprehension {
                iter_var,
                iter_range,
                accu_var,
                accu_init,
                loop_condition,
                loop_step,
                result,
            } => {
                let range_type = self.check_expr(iter_range);
                let iter_type = match &range_type {
                    CelType::List(elem) => (**elem).clone(),
                    CelType::Map(key, _) => (**key).clone(),
                    CelType::Dyn | CelType::Error => CelType::Dyn,
                    other => {
                        self.report_error(CheckError::type_mismatch(
                            CelType::list(CelType::Dyn),
                            other.clone(),
                            iter_range.span.clone(),
                            iter_range.id,
                        ));
                        CelType::Error
                    }
                };
                let accu_type = self.check_expr(accu_init);

                self.scopes.enter_scope();
                self.scopes.add_variable(iter_var.clone(), iter_type);
                self.scopes.add_variable(accu_var.clone(), accu_type.clone());

                let cond_type = self.check_expr(loop_condition);
                if !matches!(cond_type, CelType::Bool | CelType::Dyn | CelType::Error) {
                    self.report_error(CheckError::type_mismatch(
                        CelType::Bool,
                        cond_type,
                        loop_condition.span.clone(),
                        loop_condition.id,
                    ));
                }

                let step_type = substitute_type(&self.check_expr(loop_step), &self.substitutions);
                // An empty list accumulator takes its element type from the step.
                if accu_type == CelType::list(CelType::Dyn) && matches!(step_type, CelType::List(_))
                {
                    self.scopes.add_variable(accu_var.clone(), step_type);
                }

                let result_type = self.check_expr(result);
                self.scopes.exit_scope();
                result_type
            }

            Expr::MemberTestOnly { expr: obj, field } => {
                let obj_type = self.check_expr(obj);
                match &obj_type {
                    CelType::Object(t) => {
                        if let Some(found) = self.resolve_field(t, field, expr) {
                            if t.schema().is_some() {
                                self.set_reference(expr.id, ReferenceInfo::field(found.name));
                            }
                        }
                    }
                    CelType::Map(..) | CelType::Dyn | CelType::Error => {}
                    other => {
                        self.report_error(CheckError::undefined_field(
                            &other.display_name(),
                            field,
                            expr.span.clone(),
                            expr.id,
                        ));
                    }
                }
                CelType::Bool
            }
        };

        self.set_type(expr.id, result.clone());
        result
    }

    fn check_ident(&mut self, name: &str, expr: &SpannedExpr) -> CelType {
        let Some(decl) = self.scopes.resolve(name) else {
            self.report_error(CheckError::undeclared_reference(
                name,
                expr.span.clone(),
                expr.id,
            ));
            return CelType::Error;
        };
        let cel_type = decl.cel_type.clone();
        if let Some(size) = self.variable_sizes.get(name) {
            self.sizes.insert(expr.id, *size);
        }
        self.set_reference(expr.id, ReferenceInfo::ident(name));
        cel_type
    }

    fn check_member(&mut self, obj: &SpannedExpr, field: &str, expr: &SpannedExpr) -> CelType {
        let obj_type = self.check_expr(obj);
        match &obj_type {
            CelType::Object(t) => {
                let Some(found) = self.resolve_field(t, field, expr) else {
                    return CelType::Error;
                };
                if let Some(size) = found.schema.as_ref().and_then(schema_max_size) {
                    self.sizes.insert(expr.id, size);
                }
                if t.schema().is_some() {
                    self.set_reference(expr.id, ReferenceInfo::field(found.name));
                }
                found.cel_type
            }
            CelType::Map(_, value) => (**value).clone(),
            CelType::Dyn | CelType::Error => CelType::Dyn,
            other => {
                self.report_error(CheckError::undefined_field(
                    &other.display_name(),
                    field,
                    expr.span.clone(),
                    expr.id,
                ));
                CelType::Error
            }
        }
    }

    fn resolve_field(&mut self, t: &TypeRef, field: &str, expr: &SpannedExpr) -> Option<FieldType> {
        let found = t.field_by_ident(field);
        if found.is_none() {
            self.report_error(CheckError::undefined_field(
                t.type_name(),
                field,
                expr.span.clone(),
                expr.id,
            ));
        }
        found
    }

    fn check_call(&mut self, callee: &SpannedExpr, args: &[SpannedExpr], expr: &SpannedExpr) -> CelType {
        match &callee.node {
            Expr::Member {
                expr: receiver,
                field: name,
            } => {
                let receiver_type = self.check_expr(receiver);
                let arg_types: Vec<_> = args.iter().map(|a| self.check_expr(a)).collect();
                self.resolve_function_call(name, Some(receiver_type), &arg_types, expr)
            }
            Expr::Ident(name) => {
                let arg_types: Vec<_> = args.iter().map(|a| self.check_expr(a)).collect();
                self.resolve_function_call(name, None, &arg_types, expr)
            }
            _ => {
                self.check_expr(callee);
                for arg in args {
                    self.check_expr(arg);
                }
                self.report_error(CheckError::undeclared_reference(
                    "<call target>",
                    callee.span.clone(),
                    callee.id,
                ));
                CelType::Error
            }
        }
    }

    fn resolve_function_call(
        &mut self,
        name: &str,
        receiver: Option<CelType>,
        args: &[CelType],
        expr: &SpannedExpr,
    ) -> CelType {
        let Some(func) = self.functions.get(name) else {
            self.report_error(CheckError::undeclared_reference(
                name,
                expr.span.clone(),
                expr.id,
            ));
            return CelType::Error;
        };
        match resolve_overload(func, receiver.as_ref(), args, &mut self.substitutions) {
            Some(result) => {
                self.set_reference(
                    expr.id,
                    ReferenceInfo::function(&func.name, result.overload_ids),
                );
                result.result_type
            }
            None => {
                let all_args: Vec<_> = receiver.into_iter().chain(args.iter().cloned()).collect();
                self.report_error(CheckError::no_matching_overload(
                    &func.name,
                    all_args,
                    expr.span.clone(),
                    expr.id,
                ));
                CelType::Error
            }
        }
    }

    /// Object literals are named by their path from the root type:
    /// `Object`, `Object.spec`, `Object.spec.template`. Lists and maps along
    /// the path are transparent.
    fn check_struct(
        &mut self,
        type_name: &str,
        fields: &[(String, SpannedExpr)],
        expr: &SpannedExpr,
    ) -> CelType {
        let field_types: Vec<CelType> = fields.iter().map(|(_, v)| self.check_expr(v)).collect();

        let Some(type_ref) = self.resolve_object_type(type_name) else {
            self.report_error(CheckError::unknown_type(
                type_name,
                expr.span.clone(),
                expr.id,
            ));
            return CelType::Error;
        };

        for ((name, value), value_type) in fields.iter().zip(field_types) {
            let Some(field) = type_ref.field_by_ident(name).or_else(|| type_ref.field(name)) else {
                self.report_error(CheckError::undefined_field(
                    type_ref.type_name(),
                    name,
                    value.span.clone(),
                    value.id,
                ));
                continue;
            };
            if !is_assignable(&value_type, &field.cel_type, &mut HashMap::new()) {
                self.report_error(CheckError::type_mismatch(
                    field.cel_type,
                    value_type,
                    value.span.clone(),
                    value.id,
                ));
            }
        }

        self.set_reference(expr.id, ReferenceInfo::object(type_ref.clone()));
        CelType::Object(type_ref)
    }

    fn resolve_object_type(&self, type_name: &str) -> Option<TypeRef> {
        let root = self.object_root?;
        let rest = type_name.strip_prefix(root.type_name())?;
        if rest.is_empty() {
            return Some(root.clone());
        }
        let mut current = root.clone();
        for segment in rest.strip_prefix('.')?.split('.') {
            let mut ty = current.field(segment)?.cel_type;
            current = loop {
                match ty {
                    CelType::Object(t) => break t,
                    CelType::List(elem) => ty = (*elem).clone(),
                    CelType::Map(_, value) => ty = (*value).clone(),
                    _ => return None,
                }
            };
        }
        Some(current)
    }
}

/// Type checks `expr` against variables and functions, without object literals.
pub fn check(
    expr: &SpannedExpr,
    variables: &[VariableDecl],
    functions: &HashMap<String, FunctionDecl>,
) -> CheckResult {
    Checker::new(variables, functions).check(expr)
}

/// Common type of list elements or map entries; `dyn` when they disagree.
fn join_types(types: &[CelType]) -> CelType {
    let Some((first, rest)) = types.split_first() else {
        return CelType::Dyn;
    };
    let mut best = first.clone();
    for ty in rest {
        if *ty == best || matches!(ty, CelType::Null) {
            continue;
        }
        if matches!(best, CelType::Null) && ty.is_nullable() {
            best = ty.clone();
            continue;
        }
        return CelType::Dyn;
    }
    best
}

fn binary_op_to_function(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "_+_",
        BinaryOp::Sub => "_-_",
        BinaryOp::Mul => "_*_",
        BinaryOp::Div => "_/_",
        BinaryOp::Mod => "_%_",
        BinaryOp::Eq => "_==_",
        BinaryOp::Ne => "_!=_",
        BinaryOp::Lt => "_<_",
        BinaryOp::Le => "_<=_",
        BinaryOp::Gt => "_>_",
        BinaryOp::Ge => "_>=_",
        BinaryOp::In => "@in",
        BinaryOp::And => "_&&_",
        BinaryOp::Or => "_||_",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::CheckErrorKind;
    use crate::library;
    use crate::schema::StructuralSchema;
    use serde_json::json;

    fn functions() -> HashMap<String, FunctionDecl> {
        library::Library::standard()
            .functions()
            .iter()
            .map(|f| (f.name.clone(), f.clone()))
            .collect()
    }

    fn root() -> TypeRef {
        let schema = StructuralSchema::from_json(&json!({
            "type": "object",
            "properties": {
                "spec": {
                    "type": "object",
                    "properties": {
                        "replicas": {"type": "integer"},
                        "name": {"type": "string", "maxLength": 64},
                        "max-surge": {"type": "integer"},
                        "ports": {"type": "array", "items": {
                            "type": "object",
                            "properties": {"port": {"type": "integer"}}
                        }}
                    }
                }
            }
        }))
        .unwrap();
        TypeRef::new("Object", schema)
    }

    fn check_with_self(source: &str) -> CheckResult {
        let ast = structural_cel_parser::parse(source).into_result().unwrap();
        let functions = functions();
        let root = root();
        let variables = [VariableDecl::new("self", CelType::Object(root.clone()))];
        Checker::new(&variables, &functions)
            .with_object_root(&root)
            .check(&ast)
    }

    fn result_type(source: &str) -> CelType {
        let ast = structural_cel_parser::parse(source).into_result().unwrap();
        let functions = functions();
        let root = root();
        let variables = [VariableDecl::new("self", CelType::Object(root.clone()))];
        let result = Checker::new(&variables, &functions)
            .with_object_root(&root)
            .check(&ast);
        assert!(result.is_ok(), "{source}: {:?}", result.errors);
        result.type_map[&ast.id].clone()
    }

    #[test]
    fn test_literal_and_operator_types() {
        assert_eq!(result_type("1 + 2"), CelType::Int);
        assert_eq!(result_type("'a' + 'b'"), CelType::String);
        assert_eq!(result_type("1 < 2 && true"), CelType::Bool);
        assert_eq!(result_type("[1, 2]"), CelType::list(CelType::Int));
        assert_eq!(result_type("[1, 'a']"), CelType::list(CelType::Dyn));
        assert_eq!(result_type("true ? 1 : 2"), CelType::Int);
    }

    #[test]
    fn test_field_selection() {
        assert_eq!(result_type("self.spec.replicas"), CelType::Int);
        assert_eq!(result_type("self.spec.max__dash__surge"), CelType::Int);
        assert_eq!(
            result_type("self.spec.ports.map(p, p.port)"),
            CelType::list(CelType::Int)
        );
        assert_eq!(result_type("has(self.spec.name)"), CelType::Bool);

        let result = check_with_self("self.spec.replica");
        assert!(matches!(
            result.errors[0].kind,
            CheckErrorKind::UndefinedField { .. }
        ));
    }

    #[test]
    fn test_records_property_names_and_sizes() {
        let ast = structural_cel_parser::parse("self.spec.max__dash__surge")
            .into_result()
            .unwrap();
        let functions = functions();
        let root = root();
        let variables = [VariableDecl::new("self", CelType::Object(root.clone()))];
        let result = Checker::new(&variables, &functions).check(&ast);
        assert_eq!(result.property_name(ast.id), Some("max-surge"));

        let ast = structural_cel_parser::parse("self.spec.name")
            .into_result()
            .unwrap();
        let result = Checker::new(&variables, &functions).check(&ast);
        assert_eq!(result.sizes.get(&ast.id), Some(&64));
    }

    #[test]
    fn test_undeclared_and_mismatched() {
        let result = check_with_self("other > 1");
        assert!(matches!(
            result.errors[0].kind,
            CheckErrorKind::UndeclaredReference { .. }
        ));

        let result = check_with_self("self.spec.replicas + 'a'");
        assert!(matches!(
            result.errors[0].kind,
            CheckErrorKind::NoMatchingOverload { .. }
        ));
    }

    #[test]
    fn test_object_literals() {
        let ty = result_type("Object{spec: Object.spec{replicas: 3}}");
        assert_eq!(ty.display_name(), "Object");
        assert_eq!(
            result_type("Object.spec.ports{port: 80}").display_name(),
            "Object.spec.ports"
        );

        let result = check_with_self("Object.status{}");
        assert!(matches!(
            result.errors[0].kind,
            CheckErrorKind::UnknownType { .. }
        ));

        let result = check_with_self("Object.spec{replicas: 'three'}");
        assert!(matches!(
            result.errors[0].kind,
            CheckErrorKind::TypeMismatch { .. }
        ));
    }
}
