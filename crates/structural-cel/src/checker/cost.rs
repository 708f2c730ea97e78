//! Static cost estimation over a checked expression.
//!
//! The estimate mirrors the runtime charges of the evaluator. Sizes come from
//! literal lengths, schema bounds recorded by the checker, or a configured
//! default for unbounded values.

use std::collections::HashMap;

use structural_cel_parser::{BinaryOp, Expr, SpannedExpr};

use super::CheckResult;
use crate::eval::{LIST_CREATE_COST, MAP_CREATE_COST, OBJECT_CREATE_COST, STRING_TRAVERSAL_FACTOR};
use crate::types::{CelType, FunctionDecl};

/// Lower and upper bound on the cost of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CostEstimate {
    pub min: u64,
    pub max: u64,
}

impl CostEstimate {
    pub fn fixed(cost: u64) -> Self {
        Self {
            min: cost,
            max: cost,
        }
    }

    pub fn add(self, other: CostEstimate) -> Self {
        Self {
            min: self.min.saturating_add(other.min),
            max: self.max.saturating_add(other.max),
        }
    }

    /// Either branch may run.
    pub fn union(self, other: CostEstimate) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// Estimates the cost of evaluating a checked expression.
pub struct CostEstimator<'a> {
    checked: &'a CheckResult,
    functions: &'a HashMap<String, FunctionDecl>,
    default_size: u64,
}

impl<'a> CostEstimator<'a> {
    pub fn new(
        checked: &'a CheckResult,
        functions: &'a HashMap<String, FunctionDecl>,
        default_size: u64,
    ) -> Self {
        Self {
            checked,
            functions,
            default_size,
        }
    }

    pub fn estimate(&self, expr: &SpannedExpr) -> CostEstimate {
        match &expr.node {
            Expr::Null
            | Expr::Bool(_)
            | Expr::Int(_)
            | Expr::Float(_)
            | Expr::String(_)
            | Expr::Bytes(_) => CostEstimate::default(),

            Expr::Ident(_) => CostEstimate::fixed(1),

            Expr::List(elements) => elements
                .iter()
                .fold(CostEstimate::fixed(LIST_CREATE_COST), |acc, e| {
                    acc.add(self.estimate(e))
                }),
            Expr::Map(entries) => entries
                .iter()
                .fold(CostEstimate::fixed(MAP_CREATE_COST), |acc, (k, v)| {
                    acc.add(self.estimate(k)).add(self.estimate(v))
                }),
            Expr::Struct { fields, .. } => fields
                .iter()
                .fold(CostEstimate::fixed(OBJECT_CREATE_COST), |acc, (_, v)| {
                    acc.add(self.estimate(v))
                }),

            Expr::Unary { expr: inner, .. }
            | Expr::Member { expr: inner, .. }
            | Expr::MemberTestOnly { expr: inner, .. } => {
                self.estimate(inner).add(CostEstimate::fixed(1))
            }
            Expr::Index { expr: inner, index } => self
                .estimate(inner)
                .add(self.estimate(index))
                .add(CostEstimate::fixed(1)),

            Expr::Binary { op, left, right } => self.estimate_binary(*op, left, right),
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => self
                .estimate(cond)
                .add(self.estimate(then_expr).union(self.estimate(else_expr))),

            Expr::Call { expr: callee, args } => {
                let receiver = match &callee.node {
                    Expr::Member { expr, .. } => Some(expr.as_ref()),
                    _ => None,
                };
                let operands: Vec<&SpannedExpr> = receiver.into_iter().chain(args.iter()).collect();
                let arguments = operands
                    .iter()
                    .fold(CostEstimate::default(), |acc, a| acc.add(self.estimate(a)));
                let size: u64 = operands.iter().map(|a| self.size(a)).sum();
                arguments.add(self.call_cost(expr.id, size))
            }

            Expr::Comprehension {
                iter_range,
                accu_init,
                loop_condition,
                loop_step,
                result,
                ..
            } => {
                let fixed = self
                    .estimate(iter_range)
                    .add(self.estimate(accu_init))
                    .add(self.estimate(result));
                let per_item = self.estimate(loop_condition).add(self.estimate(loop_step));
                let items = self.size(iter_range);
                CostEstimate {
                    min: fixed.min,
                    max: fixed.max.saturating_add(per_item.max.saturating_mul(items)),
                }
            }
        }
    }

    fn estimate_binary(&self, op: BinaryOp, left: &SpannedExpr, right: &SpannedExpr) -> CostEstimate {
        let l = self.estimate(left);
        let r = self.estimate(right);
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            return CostEstimate {
                min: l.min,
                max: l.max.saturating_add(1).saturating_add(r.max),
            };
        }

        let traversal = |size: u64| 1 + (size as f64 * STRING_TRAVERSAL_FACTOR).ceil() as u64;
        let left_type = self.checked.get_type(left.id);
        let is_text = matches!(left_type, Some(CelType::String | CelType::Bytes));
        let is_list = matches!(left_type, Some(CelType::List(_)));
        let op_max = match op {
            BinaryOp::Add if is_text => traversal(self.size(left) + self.size(right)),
            BinaryOp::Add if is_list => 1 + self.size(left) + self.size(right),
            BinaryOp::Eq | BinaryOp::Ne if is_text => {
                traversal(self.size(left).min(self.size(right)))
            }
            BinaryOp::In if matches!(self.checked.get_type(right.id), Some(CelType::List(_))) => {
                1 + self.size(right)
            }
            _ => 1,
        };
        l.add(r).add(CostEstimate {
            min: 1,
            max: op_max,
        })
    }

    fn call_cost(&self, id: i64, size: u64) -> CostEstimate {
        let Some(reference) = self.checked.get_reference(id) else {
            return CostEstimate::fixed(1);
        };
        let Some(decl) = self.functions.get(&reference.name) else {
            return CostEstimate::fixed(1);
        };
        decl.overloads
            .iter()
            .filter(|o| reference.overload_ids.contains(&o.id))
            .map(|o| CostEstimate {
                min: o.cost.for_size(0),
                max: o.cost.for_size(size),
            })
            .reduce(CostEstimate::union)
            .unwrap_or(CostEstimate::fixed(1))
    }

    /// Upper bound on the size of the value an expression produces.
    fn size(&self, expr: &SpannedExpr) -> u64 {
        match &expr.node {
            Expr::String(s) => s.chars().count() as u64,
            Expr::Bytes(b) => b.len() as u64,
            Expr::List(elements) => elements.len() as u64,
            Expr::Map(entries) => entries.len() as u64,
            _ => match self.checked.sizes.get(&expr.id) {
                Some(size) => *size,
                None => match self.checked.get_type(expr.id) {
                    Some(CelType::Bool | CelType::Int | CelType::Double | CelType::Null) => 1,
                    _ => self.default_size,
                },
            },
        }
    }
}
