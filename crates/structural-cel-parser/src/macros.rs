//! Parse-time macro expansion.
//!
//! Macros rewrite specific call shapes into core AST nodes:
//!
//! - `has(m.x)` becomes [`Expr::MemberTestOnly`]
//! - `l.all(x, p)`, `l.exists(x, p)`, `l.exists_one(x, p)`, `l.map(x, t)`,
//!   `l.map(x, p, t)` and `l.filter(x, p)` become [`Expr::Comprehension`]
//!
//! Macros are keyed by name, argument count and call style, so a global
//! `map(...)` function call and a receiver-style `l.map(x, t)` never collide.

use std::sync::LazyLock;

use crate::ast::{BinaryOp, Expr, Span, Spanned, SpannedExpr, UnaryOp};

/// Accumulator variable name used in comprehension expansions.
pub const ACCU_VAR: &str = "__result__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacroStyle {
    /// `name(args...)`
    Global,
    /// `receiver.name(args...)`
    Receiver,
}

/// Outcome of attempting a macro expansion.
#[derive(Debug)]
pub enum MacroExpansion {
    Expanded(SpannedExpr),
    /// The call matched a macro signature but its arguments were malformed.
    Error(String),
}

/// Allocates node IDs for synthetic expressions created during expansion.
pub struct MacroContext<'a> {
    next_id: &'a mut i64,
}

impl<'a> MacroContext<'a> {
    pub fn new(next_id: &'a mut i64) -> Self {
        Self { next_id }
    }

    pub fn next_id(&mut self) -> i64 {
        let id = *self.next_id;
        *self.next_id += 1;
        id
    }

    fn node(&mut self, node: Expr, span: &Span) -> SpannedExpr {
        Spanned::new(self.next_id(), node, span.clone())
    }

    fn accu(&mut self, span: &Span) -> SpannedExpr {
        self.node(Expr::Ident(ACCU_VAR.to_string()), span)
    }
}

pub type MacroExpander = fn(
    ctx: &mut MacroContext<'_>,
    span: Span,
    receiver: Option<SpannedExpr>,
    args: Vec<SpannedExpr>,
) -> MacroExpansion;

#[derive(Clone)]
pub struct Macro {
    pub name: &'static str,
    pub style: MacroStyle,
    pub arg_count: usize,
    pub expander: MacroExpander,
}

impl std::fmt::Debug for Macro {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Macro")
            .field("name", &self.name)
            .field("style", &self.style)
            .field("arg_count", &self.arg_count)
            .finish_non_exhaustive()
    }
}

/// Macros keyed by `(name, arg_count, style)`.
#[derive(Debug, Clone, Default)]
pub struct MacroRegistry {
    macros: Vec<Macro>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry every parse uses.
    pub fn standard() -> &'static MacroRegistry {
        static STANDARD: LazyLock<MacroRegistry> = LazyLock::new(|| {
            let mut registry = MacroRegistry::new();
            for m in STANDARD_MACROS {
                registry.register(m.clone());
            }
            registry
        });
        &STANDARD
    }

    pub fn register(&mut self, m: Macro) {
        self.macros
            .retain(|e| (e.name, e.arg_count, e.style) != (m.name, m.arg_count, m.style));
        self.macros.push(m);
    }

    pub fn lookup(&self, name: &str, arg_count: usize, style: MacroStyle) -> Option<&Macro> {
        self.macros
            .iter()
            .find(|m| m.name == name && m.arg_count == arg_count && m.style == style)
    }
}

const fn receiver(name: &'static str, arg_count: usize, expander: MacroExpander) -> Macro {
    Macro {
        name,
        style: MacroStyle::Receiver,
        arg_count,
        expander,
    }
}

static STANDARD_MACROS: &[Macro] = &[
    Macro {
        name: "has",
        style: MacroStyle::Global,
        arg_count: 1,
        expander: expand_has,
    },
    receiver("all", 2, expand_all),
    receiver("exists", 2, expand_exists),
    receiver("exists_one", 2, expand_exists_one),
    receiver("map", 2, expand_map),
    receiver("map", 3, expand_map_filter),
    receiver("filter", 2, expand_filter),
];

// ============================================================================
// Expanders
// ============================================================================

fn expand_has(
    ctx: &mut MacroContext<'_>,
    span: Span,
    _receiver: Option<SpannedExpr>,
    mut args: Vec<SpannedExpr>,
) -> MacroExpansion {
    match args.pop().map(|a| a.node) {
        Some(Expr::Member { expr, field }) => {
            MacroExpansion::Expanded(ctx.node(Expr::MemberTestOnly { expr, field }, &span))
        }
        _ => MacroExpansion::Error("invalid argument to has() macro".to_string()),
    }
}

/// Splits `(x, rest...)` into the iteration variable name and remaining args.
fn iter_var(args: Vec<SpannedExpr>) -> Result<(String, Vec<SpannedExpr>), MacroExpansion> {
    let mut args = args.into_iter();
    match args.next().map(|a| a.node) {
        Some(Expr::Ident(name)) if name != ACCU_VAR => Ok((name, args.collect())),
        Some(Expr::Ident(_)) => Err(MacroExpansion::Error(format!(
            "iteration variable overwrites accumulator variable: {}",
            ACCU_VAR
        ))),
        _ => Err(MacroExpansion::Error(
            "argument must be a simple name".to_string(),
        )),
    }
}

struct Fold {
    init: SpannedExpr,
    condition: SpannedExpr,
    step: SpannedExpr,
    result: SpannedExpr,
}

fn comprehension(
    ctx: &mut MacroContext<'_>,
    span: Span,
    range: SpannedExpr,
    iter_var: String,
    fold: Fold,
) -> MacroExpansion {
    MacroExpansion::Expanded(ctx.node(
        Expr::Comprehension {
            iter_var,
            iter_range: Box::new(range),
            accu_var: ACCU_VAR.to_string(),
            accu_init: Box::new(fold.init),
            loop_condition: Box::new(fold.condition),
            loop_step: Box::new(fold.step),
            result: Box::new(fold.result),
        },
        &span,
    ))
}

fn binary(
    ctx: &mut MacroContext<'_>,
    op: BinaryOp,
    left: SpannedExpr,
    right: SpannedExpr,
    span: &Span,
) -> SpannedExpr {
    ctx.node(
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

macro_rules! unpack {
    ($receiver:expr, $args:expr) => {
        match ($receiver, iter_var($args)) {
            (Some(range), Ok((var, rest))) => (range, var, rest),
            (None, _) => {
                return MacroExpansion::Error("macro requires a receiver".to_string())
            }
            (_, Err(e)) => return e,
        }
    };
}

fn expand_all(
    ctx: &mut MacroContext<'_>,
    span: Span,
    receiver: Option<SpannedExpr>,
    args: Vec<SpannedExpr>,
) -> MacroExpansion {
    let (range, var, mut rest) = unpack!(receiver, args);
    let Some(predicate) = rest.pop() else {
        return MacroExpansion::Error("all() requires a predicate".to_string());
    };
    let init = ctx.node(Expr::Bool(true), &span);
    let condition = ctx.accu(&span);
    let accu = ctx.accu(&span);
    let step = binary(ctx, BinaryOp::And, accu, predicate, &span);
    let result = ctx.accu(&span);
    comprehension(
        ctx,
        span,
        range,
        var,
        Fold {
            init,
            condition,
            step,
            result,
        },
    )
}

fn expand_exists(
    ctx: &mut MacroContext<'_>,
    span: Span,
    receiver: Option<SpannedExpr>,
    args: Vec<SpannedExpr>,
) -> MacroExpansion {
    let (range, var, mut rest) = unpack!(receiver, args);
    let Some(predicate) = rest.pop() else {
        return MacroExpansion::Error("exists() requires a predicate".to_string());
    };
    let init = ctx.node(Expr::Bool(false), &span);
    let accu = ctx.accu(&span);
    let condition = ctx.node(
        Expr::Unary {
            op: UnaryOp::Not,
            expr: Box::new(accu),
        },
        &span,
    );
    let accu = ctx.accu(&span);
    let step = binary(ctx, BinaryOp::Or, accu, predicate, &span);
    let result = ctx.accu(&span);
    comprehension(
        ctx,
        span,
        range,
        var,
        Fold {
            init,
            condition,
            step,
            result,
        },
    )
}

fn expand_exists_one(
    ctx: &mut MacroContext<'_>,
    span: Span,
    receiver: Option<SpannedExpr>,
    args: Vec<SpannedExpr>,
) -> MacroExpansion {
    let (range, var, mut rest) = unpack!(receiver, args);
    let Some(predicate) = rest.pop() else {
        return MacroExpansion::Error("exists_one() requires a predicate".to_string());
    };
    let init = ctx.node(Expr::Int(0), &span);
    let condition = ctx.node(Expr::Bool(true), &span);
    let accu = ctx.accu(&span);
    let one = ctx.node(Expr::Int(1), &span);
    let incremented = binary(ctx, BinaryOp::Add, accu, one, &span);
    let unchanged = ctx.accu(&span);
    let step = ctx.node(
        Expr::Ternary {
            cond: Box::new(predicate),
            then_expr: Box::new(incremented),
            else_expr: Box::new(unchanged),
        },
        &span,
    );
    let accu = ctx.accu(&span);
    let one = ctx.node(Expr::Int(1), &span);
    let result = binary(ctx, BinaryOp::Eq, accu, one, &span);
    comprehension(
        ctx,
        span,
        range,
        var,
        Fold {
            init,
            condition,
            step,
            result,
        },
    )
}

/// `accu + [element]`
fn append(ctx: &mut MacroContext<'_>, element: SpannedExpr, span: &Span) -> SpannedExpr {
    let accu = ctx.accu(span);
    let single = ctx.node(Expr::List(vec![element]), span);
    binary(ctx, BinaryOp::Add, accu, single, span)
}

fn list_fold(
    ctx: &mut MacroContext<'_>,
    span: Span,
    range: SpannedExpr,
    var: String,
    filter: Option<SpannedExpr>,
    element: SpannedExpr,
) -> MacroExpansion {
    let init = ctx.node(Expr::List(Vec::new()), &span);
    let condition = ctx.node(Expr::Bool(true), &span);
    let appended = append(ctx, element, &span);
    let step = match filter {
        Some(predicate) => {
            let unchanged = ctx.accu(&span);
            ctx.node(
                Expr::Ternary {
                    cond: Box::new(predicate),
                    then_expr: Box::new(appended),
                    else_expr: Box::new(unchanged),
                },
                &span,
            )
        }
        None => appended,
    };
    let result = ctx.accu(&span);
    comprehension(
        ctx,
        span,
        range,
        var,
        Fold {
            init,
            condition,
            step,
            result,
        },
    )
}

fn expand_map(
    ctx: &mut MacroContext<'_>,
    span: Span,
    receiver: Option<SpannedExpr>,
    args: Vec<SpannedExpr>,
) -> MacroExpansion {
    let (range, var, mut rest) = unpack!(receiver, args);
    let Some(transform) = rest.pop() else {
        return MacroExpansion::Error("map() requires a transform".to_string());
    };
    list_fold(ctx, span, range, var, None, transform)
}

fn expand_map_filter(
    ctx: &mut MacroContext<'_>,
    span: Span,
    receiver: Option<SpannedExpr>,
    args: Vec<SpannedExpr>,
) -> MacroExpansion {
    let (range, var, rest) = unpack!(receiver, args);
    let mut rest = rest.into_iter();
    let (Some(predicate), Some(transform)) = (rest.next(), rest.next()) else {
        return MacroExpansion::Error("map() requires a predicate and a transform".to_string());
    };
    list_fold(ctx, span, range, var, Some(predicate), transform)
}

fn expand_filter(
    ctx: &mut MacroContext<'_>,
    span: Span,
    receiver: Option<SpannedExpr>,
    args: Vec<SpannedExpr>,
) -> MacroExpansion {
    let (range, var, mut rest) = unpack!(receiver, args);
    let Some(predicate) = rest.pop() else {
        return MacroExpansion::Error("filter() requires a predicate".to_string());
    };
    let element = ctx.node(Expr::Ident(var.clone()), &span);
    list_fold(ctx, span, range, var, Some(predicate), element)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_distinguishes_styles() {
        let registry = MacroRegistry::standard();
        assert!(registry.lookup("has", 1, MacroStyle::Global).is_some());
        assert!(registry.lookup("has", 1, MacroStyle::Receiver).is_none());
        assert!(registry.lookup("map", 2, MacroStyle::Receiver).is_some());
        assert!(registry.lookup("map", 3, MacroStyle::Receiver).is_some());
        assert!(registry.lookup("map", 4, MacroStyle::Receiver).is_none());
    }

    #[test]
    fn test_iteration_variable_must_be_simple_name() {
        let mut id = 1;
        let mut ctx = MacroContext::new(&mut id);
        let range = Spanned::new(100, Expr::List(vec![]), 0..2);
        let bad = Spanned::new(101, Expr::Int(1), 3..4);
        let pred = Spanned::new(102, Expr::Bool(true), 5..9);
        let out = expand_all(&mut ctx, 0..10, Some(range), vec![bad, pred]);
        assert!(matches!(out, MacroExpansion::Error(_)));
    }
}
