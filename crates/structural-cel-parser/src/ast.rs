//! Expression syntax tree.

/// Byte offsets into the source string.
pub type Span = std::ops::Range<usize>;

/// AST node with source location and unique ID.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    /// Unique identifier for this node (1-indexed, assigned during parsing)
    pub id: i64,
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(id: i64, node: T, span: Span) -> Self {
        Self { id, node, span }
    }
}

/// A spanned expression.
pub type SpannedExpr = Spanned<Expr>;

/// Expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // Literals
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),

    Ident(String),

    // Collections
    List(Vec<SpannedExpr>),
    Map(Vec<(SpannedExpr, SpannedExpr)>),

    // Operations
    Unary {
        op: UnaryOp,
        expr: Box<SpannedExpr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<SpannedExpr>,
        right: Box<SpannedExpr>,
    },
    Ternary {
        cond: Box<SpannedExpr>,
        then_expr: Box<SpannedExpr>,
        else_expr: Box<SpannedExpr>,
    },

    // Access
    Member {
        expr: Box<SpannedExpr>,
        field: String,
    },
    Index {
        expr: Box<SpannedExpr>,
        index: Box<SpannedExpr>,
    },
    Call {
        expr: Box<SpannedExpr>,
        args: Vec<SpannedExpr>,
    },

    /// Object literal: `Object{field: value}` or `Object.spec{field: value}`.
    ///
    /// `type_name` is the dotted name preceding the braces, already flattened.
    Struct {
        type_name: String,
        fields: Vec<(String, SpannedExpr)>,
    },

    /// Comprehension produced by macro expansion.
    ///
    /// ```text
    /// let accu_var = accu_init
    /// for iter_var in iter_range {
    ///    if !loop_condition { break }
    ///    accu_var = loop_step
    /// }
    /// return result
    /// ```
    Comprehension {
        iter_var: String,
        iter_range: Box<SpannedExpr>,
        accu_var: String,
        accu_init: Box<SpannedExpr>,
        loop_condition: Box<SpannedExpr>,
        loop_step: Box<SpannedExpr>,
        result: Box<SpannedExpr>,
    },

    /// Presence test produced by `has(m.x)`.
    MemberTestOnly {
        expr: Box<SpannedExpr>,
        field: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-`
    Neg,
    /// `!`
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,

    In,

    // Logical
    And,
    Or,
}

impl BinaryOp {
    /// The source spelling of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SpannedExpr {
    /// Returns true if any identifier in this tree has the given name.
    ///
    /// Comprehension iteration variables shadow outer names within their body.
    pub fn references_ident(&self, name: &str) -> bool {
        match &self.node {
            Expr::Ident(n) => n == name,
            Expr::Null
            | Expr::Bool(_)
            | Expr::Int(_)
            | Expr::Float(_)
            | Expr::String(_)
            | Expr::Bytes(_) => false,
            Expr::List(items) => items.iter().any(|e| e.references_ident(name)),
            Expr::Map(entries) => entries
                .iter()
                .any(|(k, v)| k.references_ident(name) || v.references_ident(name)),
            Expr::Unary { expr, .. } => expr.references_ident(name),
            Expr::Binary { left, right, .. } => {
                left.references_ident(name) || right.references_ident(name)
            }
            Expr::Ternary {
                cond,
                then_expr,
                else_expr,
            } => {
                cond.references_ident(name)
                    || then_expr.references_ident(name)
                    || else_expr.references_ident(name)
            }
            Expr::Member { expr, .. } | Expr::MemberTestOnly { expr, .. } => {
                expr.references_ident(name)
            }
            Expr::Index { expr, index } => {
                expr.references_ident(name) || index.references_ident(name)
            }
            Expr::Call { expr, args } => {
                expr.references_ident(name) || args.iter().any(|a| a.references_ident(name))
            }
            Expr::Struct { fields, .. } => fields.iter().any(|(_, v)| v.references_ident(name)),
            Expr::Comprehension {
                iter_var,
                iter_range,
                accu_var,
                accu_init,
                loop_condition,
                loop_step,
                result,
            } => {
                if iter_range.references_ident(name) || accu_init.references_ident(name) {
                    return true;
                }
                if iter_var == name || accu_var == name {
                    return false;
                }
                loop_condition.references_ident(name)
                    || loop_step.references_ident(name)
                    || result.references_ident(name)
            }
        }
    }
}
