//! Evaluation of a node's `x-kubernetes-validations` rules.

use std::ops::ControlFlow;

use serde_json::Value as JsonValue;

use crate::env::{CompileError, Environment, ResultKind};
use crate::eval::{CompiledProgram, EvalErrorKind, RuleActivation, Value};
use crate::field::{ErrorKind, ErrorList, FieldError, FieldPath};
use crate::schema::{Reason, SchemaRef, ValidationRule};
use crate::unstructured::from_json_with_schema;

pub const BUDGET_EXHAUSTED: &str =
    "validation failed due to running out of cost budget, no further validation rules will be run";
const MESSAGE_BUDGET_EXHAUSTED: &str = "messageExpression evaluation failed due to running out of cost budget, no further validation rules will be run";

/// A rule compiled once against the environment of its schema node.
#[derive(Debug)]
pub(crate) struct CompiledRule {
    rule: ValidationRule,
    program: Result<CompiledProgram, CompileError>,
    message: Option<Result<CompiledProgram, CompileError>>,
    /// The rule reads `oldSelf`.
    transition: bool,
}

impl CompiledRule {
    pub(crate) fn compile(env: &Environment, rule: &ValidationRule) -> Self {
        let program = env.compile(&rule.rule, ResultKind::Bool);
        if let Err(e) = &program {
            tracing::debug!(rule = %rule.rule, error = %e, "rule failed to compile");
        }
        let message = (!rule.message_expression.is_empty())
            .then(|| env.compile(&rule.message_expression, ResultKind::String));
        let transition = match &program {
            Ok(p) => p.references("oldSelf"),
            Err(_) => rule.rule.contains("oldSelf"),
        };
        Self {
            rule: rule.clone(),
            program,
            message,
            transition,
        }
    }
}

/// Everything the rules of one node are evaluated against.
pub(crate) struct RuleTarget<'a> {
    pub path: &'a FieldPath,
    pub schema: &'a SchemaRef,
    pub value: &'a JsonValue,
    pub old: Option<&'a JsonValue>,
    /// Skip rules that do not read `oldSelf`.
    pub unchanged: bool,
    pub max_message_bytes: usize,
}

impl RuleTarget<'_> {
    fn type_value(&self) -> JsonValue {
        JsonValue::from(self.schema.kind().map(|k| k.as_str()).unwrap_or_default())
    }
}

/// Runs `rules` in order, threading `budget` through every evaluation.
///
/// Breaks once no further rule may run for this object.
pub(crate) fn evaluate_rules(
    rules: &[CompiledRule],
    target: &RuleTarget<'_>,
    budget: &mut i64,
    errs: &mut ErrorList,
) -> ControlFlow<()> {
    if rules.is_empty() || target.value.is_null() {
        return ControlFlow::Continue(());
    }
    let self_value = from_json_with_schema(target.value, target.schema);
    let old_value = target
        .old
        .map(|old| from_json_with_schema(old, target.schema));

    for compiled in rules {
        let rule = &compiled.rule;
        let program = match &compiled.program {
            Ok(program) => program,
            Err(e) => {
                errs.push(FieldError::internal(
                    target.path.clone(),
                    format!("rule compile error: {}", e),
                ));
                continue;
            }
        };
        if compiled.transition && target.old.is_none() && !rule.optional_old_self {
            tracing::debug!(rule = %rule.rule, path = %target.path, "skipping transition rule without old value");
            continue;
        }
        if target.unchanged && !compiled.transition {
            continue;
        }

        let activation = RuleActivation::new(self_value.clone())
            .with_old_self(old_value.clone())
            .with_root_properties();
        let result = program.evaluate(&activation, *budget);
        *budget = result.remaining_budget;

        match result.value {
            Ok(Value::Bool(true)) => {}
            Ok(Value::Bool(false)) => {
                let Some(detail) = failure_message(compiled, target, &activation, budget, errs)
                else {
                    return ControlFlow::Break(());
                };
                errs.push(rule_error(rule, target, detail));
            }
            Ok(other) => errs.push(FieldError::internal(
                target.path.clone(),
                format!("rule evaluated to {}, expected bool: {}", other.type_name(), rule.rule),
            )),
            Err(e) => match e.kind {
                EvalErrorKind::BudgetExhausted => {
                    tracing::warn!(path = %target.path, rule = %rule.rule, "cost budget exhausted");
                    errs.push(FieldError::invalid(
                        target.path.clone(),
                        target.type_value(),
                        BUDGET_EXHAUSTED,
                    ));
                    return ControlFlow::Break(());
                }
                EvalErrorKind::CostLimitExceeded => {
                    tracing::warn!(path = %target.path, rule = %rule.rule, "per-call cost limit exceeded");
                    errs.push(FieldError::invalid(
                        target.path.clone(),
                        target.type_value(),
                        format!(
                            "'{}': no further validation rules will be run due to call cost exceeds limit for rule: {}",
                            e,
                            rule_text(rule)
                        ),
                    ));
                    return ControlFlow::Break(());
                }
                EvalErrorKind::NoMatchingOverload => errs.push(FieldError::invalid(
                    target.path.clone(),
                    target.type_value(),
                    format!(
                        "'{}': call arguments did not match a supported operator, function or macro signature for rule: {}",
                        e,
                        rule_text(rule)
                    ),
                )),
                _ => errs.push(FieldError::invalid(
                    target.path.clone(),
                    target.type_value(),
                    format!("{} evaluating rule: {}", e, rule_text(rule)),
                )),
            },
        }
    }
    ControlFlow::Continue(())
}

fn rule_text(rule: &ValidationRule) -> &str {
    rule.rule.trim()
}

fn fallback_message(rule: &ValidationRule) -> String {
    if rule.message.is_empty() {
        format!("failed rule: {}", rule_text(rule))
    } else {
        rule.message.clone()
    }
}

/// The detail of a failed rule, or `None` when the message expression ran
/// the budget out.
fn failure_message(
    compiled: &CompiledRule,
    target: &RuleTarget<'_>,
    activation: &RuleActivation,
    budget: &mut i64,
    errs: &mut ErrorList,
) -> Option<String> {
    let program = match &compiled.message {
        None => return Some(fallback_message(&compiled.rule)),
        Some(Err(e)) => {
            errs.push(FieldError::internal(
                target.path.clone(),
                format!("messageExpression compile error: {}", e),
            ));
            return Some(fallback_message(&compiled.rule));
        }
        Some(Ok(program)) => program,
    };

    let result = program.evaluate(activation, *budget);
    *budget = result.remaining_budget;
    let problem = match result.value {
        Err(e) if e.kind == EvalErrorKind::BudgetExhausted => {
            tracing::warn!(path = %target.path, "cost budget exhausted in messageExpression");
            errs.push(FieldError::invalid(
                target.path.clone(),
                target.type_value(),
                MESSAGE_BUDGET_EXHAUSTED,
            ));
            return None;
        }
        Err(e) => format!("messageExpression evaluation failed due to: {}", e),
        Ok(value) => match value.as_str().map(str::trim) {
            Some(message) if message.len() > target.max_message_bytes => format!(
                "messageExpression beyond allowable length of {}",
                target.max_message_bytes
            ),
            Some(message) if message.contains('\n') => {
                "messageExpression should not contain line breaks".to_string()
            }
            Some(message) if !message.is_empty() => return Some(message.to_string()),
            _ => "messageExpression should evaluate to a non-empty string".to_string(),
        },
    };
    tracing::debug!(path = %target.path, rule = %compiled.rule.rule, "{}", problem);
    Some(fallback_message(&compiled.rule))
}

fn rule_error(rule: &ValidationRule, target: &RuleTarget<'_>, detail: String) -> FieldError {
    let path = retarget(target.path, &rule.field_path);
    match rule.reason.unwrap_or(Reason::FieldValueInvalid) {
        Reason::FieldValueInvalid => FieldError::invalid(path, target.type_value(), detail),
        Reason::FieldValueRequired => FieldError::required(path, detail),
        Reason::FieldValueForbidden => FieldError::forbidden(path, detail),
        Reason::FieldValueDuplicate => {
            FieldError::new(ErrorKind::Duplicate, path, target.type_value(), detail)
        }
    }
}

/// Appends a dotted relative `fieldPath` such as `.spec.replicas`.
fn retarget(path: &FieldPath, field_path: &str) -> FieldPath {
    field_path
        .split('.')
        .filter(|segment| !segment.is_empty())
        .fold(path.clone(), |path, segment| path.child(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{EnvironmentBuilder, RuleMode};
    use crate::schema::StructuralSchema;
    use serde_json::json;

    fn schema() -> SchemaRef {
        StructuralSchema::from_json(&json!({
            "type": "object",
            "properties": {
                "replicas": {"type": "integer"},
                "name": {"type": "string"}
            }
        }))
        .unwrap()
    }

    fn compile(rules: &[ValidationRule]) -> Vec<CompiledRule> {
        let env = EnvironmentBuilder::new(schema())
            .mode(RuleMode::Update)
            .build();
        rules.iter().map(|r| CompiledRule::compile(&env, r)).collect()
    }

    fn run(rules: &[ValidationRule], value: JsonValue, old: Option<JsonValue>) -> ErrorList {
        let schema = schema();
        let path = FieldPath::new().child("spec");
        let target = RuleTarget {
            path: &path,
            schema: &schema,
            value: &value,
            old: old.as_ref(),
            unchanged: false,
            max_message_bytes: 5120,
        };
        let mut budget = 1_000_000;
        let mut errs = ErrorList::new();
        let _ = evaluate_rules(&compile(rules), &target, &mut budget, &mut errs);
        errs
    }

    #[test]
    fn test_failed_rule_messages() {
        let errs = run(
            &[
                ValidationRule::new("self.replicas > 1"),
                ValidationRule::new("self.replicas > 2").with_message("too few"),
                ValidationRule::new("self.replicas > 0"),
            ],
            json!({"replicas": 1}),
            None,
        );
        assert_eq!(errs.len(), 2);
        assert_eq!(errs[0].detail, "failed rule: self.replicas > 1");
        assert_eq!(errs[0].bad_value, json!("object"));
        assert_eq!(errs[1].detail, "too few");
    }

    #[test]
    fn test_message_expression() {
        let errs = run(
            &[ValidationRule::new("self.replicas > 1")
                .with_message_expression("'replicas is ' + string(self.replicas)")],
            json!({"replicas": 1}),
            None,
        );
        assert_eq!(errs[0].detail, "replicas is 1");

        let errs = run(
            &[ValidationRule::new("self.replicas > 1")
                .with_message("fallback")
                .with_message_expression("'  '")],
            json!({"replicas": 1}),
            None,
        );
        assert_eq!(errs[0].detail, "fallback");
    }

    #[test]
    fn test_compile_error_is_internal() {
        let errs = run(&[ValidationRule::new("self.missing == 1")], json!({}), None);
        assert_eq!(errs[0].kind, ErrorKind::InternalError);
        assert!(errs[0].detail.starts_with("rule compile error: "));
    }

    #[test]
    fn test_transition_rules_need_old_value() {
        let mut optional = ValidationRule::new("oldSelf == null || self.replicas >= oldSelf.replicas");
        optional.optional_old_self = true;
        let rules = [
            ValidationRule::new("self.replicas >= oldSelf.replicas"),
            optional,
        ];
        assert!(run(&rules, json!({"replicas": 1}), None).is_empty());
        let errs = run(&rules, json!({"replicas": 1}), Some(json!({"replicas": 2})));
        assert_eq!(errs.len(), 2);
    }

    #[test]
    fn test_reason_and_field_path() {
        let mut rule = ValidationRule::new("has(self.name)");
        rule.reason = Some(Reason::FieldValueRequired);
        rule.field_path = ".name".to_string();
        let errs = run(&[rule], json!({}), None);
        assert_eq!(errs[0].kind, ErrorKind::Required);
        assert_eq!(errs[0].field.to_string(), "spec.name");
    }

    #[test]
    fn test_runtime_error_keeps_siblings() {
        let errs = run(
            &[
                ValidationRule::new("self.replicas / 0 == 1"),
                ValidationRule::new("self.replicas == 2"),
            ],
            json!({"replicas": 1}),
            None,
        );
        assert_eq!(errs.len(), 2);
        assert_eq!(errs[0].detail, "division by zero evaluating rule: self.replicas / 0 == 1");
    }

    #[test]
    fn test_retarget() {
        let base = FieldPath::new().child("spec");
        assert_eq!(retarget(&base, "").to_string(), "spec");
        assert_eq!(retarget(&base, ".a.b").to_string(), "spec.a.b");
    }
}
