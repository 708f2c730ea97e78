//! Parser for schema-typed CEL expressions.
//!
//! Produces a [`SpannedExpr`] tree with macros (`has`, `all`, `exists`,
//! `exists_one`, `map`, `filter`) already expanded. Every node carries a
//! unique ID that the checker uses to attach types and resolved references.

pub mod ast;
mod lexer;
pub mod macros;
mod parser;

pub use ast::{BinaryOp, Expr, Span, Spanned, SpannedExpr, UnaryOp};
pub use lexer::RESERVED_WORDS;
pub use macros::{MacroRegistry, ACCU_VAR};

/// A parse error with source location.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}..{}", self.message, self.span.start, self.span.end)
    }
}

impl std::error::Error for ParseError {}

/// Result of parsing an expression.
///
/// On a trailing-token error the AST of the leading expression is kept.
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub ast: Option<SpannedExpr>,
    pub errors: Vec<ParseError>,
}

impl ParseResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty() && self.ast.is_some()
    }

    pub fn is_err(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Converts to a Result, discarding partial AST on error.
    pub fn into_result(self) -> Result<SpannedExpr, Vec<ParseError>> {
        match (self.ast, self.errors.is_empty()) {
            (Some(ast), true) => Ok(ast),
            _ => Err(self.errors),
        }
    }
}

/// Parse an expression with the standard macros.
pub fn parse(input: &str) -> ParseResult {
    parse_with_macros(input, MacroRegistry::standard())
}

/// Parse an expression with a caller-supplied macro registry.
pub fn parse_with_macros(input: &str, macros: &MacroRegistry) -> ParseResult {
    let tokens = match lexer::lex(input) {
        Ok(tokens) => tokens,
        Err(e) => {
            return ParseResult {
                ast: None,
                errors: vec![ParseError {
                    message: e.message,
                    span: e.span,
                }],
            }
        }
    };

    let (ast, errors) = parser::parse_tokens(&tokens, macros);
    ParseResult { ast, errors }
}
