//! Compiled, reusable programs.

use std::sync::Arc;

use structural_cel_parser::SpannedExpr;

use super::{Activation, EvalError, Evaluator, FunctionRegistry, Meter, Value};
use crate::checker::{CheckResult, CostEstimate};
use crate::types::CelType;

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub value: Result<Value, EvalError>,
    /// Budget left after this evaluation; negative when it ran out.
    pub remaining_budget: i64,
}

/// A parsed and type-checked expression.
///
/// Immutable once built; evaluate it from any number of threads.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    source: String,
    ast: SpannedExpr,
    checked: CheckResult,
    functions: Arc<FunctionRegistry>,
    variables: Vec<String>,
    optional_variables: Vec<String>,
    result_type: CelType,
    estimated_cost: CostEstimate,
    per_call_limit: u64,
}

impl CompiledProgram {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        source: &str,
        ast: SpannedExpr,
        checked: CheckResult,
        functions: Arc<FunctionRegistry>,
        variables: Vec<String>,
        optional_variables: Vec<String>,
        estimated_cost: CostEstimate,
        per_call_limit: u64,
    ) -> Self {
        let result_type = checked
            .type_map
            .get(&ast.id)
            .cloned()
            .unwrap_or(CelType::Dyn);
        Self {
            source: source.to_string(),
            ast,
            checked,
            functions,
            variables,
            optional_variables,
            result_type,
            estimated_cost,
            per_call_limit,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn result_type(&self) -> &CelType {
        &self.result_type
    }

    /// Static cost bounds computed at compile time.
    pub fn estimated_cost(&self) -> CostEstimate {
        self.estimated_cost
    }

    /// Names of the variables this program was compiled against.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// True if the expression mentions `name` as an identifier.
    pub fn references(&self, name: &str) -> bool {
        self.ast.references_ident(name)
    }

    /// Evaluates against `activation`, charging cost to `budget`.
    ///
    /// A non-positive budget fails without evaluating anything.
    pub fn evaluate(&self, activation: &dyn Activation, budget: i64) -> EvaluationResult {
        if budget <= 0 {
            return EvaluationResult {
                value: Err(EvalError::budget_exhausted()),
                remaining_budget: budget,
            };
        }
        let meter = Meter::new(self.per_call_limit, budget.unsigned_abs());
        let value = Evaluator::new(activation, &self.functions, &self.checked, &meter)
            .with_optional_variables(&self.optional_variables)
            .eval(&self.ast);
        let used = i64::try_from(meter.used()).unwrap_or(i64::MAX);
        EvaluationResult {
            value,
            remaining_budget: budget.saturating_sub(used),
        }
    }
}
