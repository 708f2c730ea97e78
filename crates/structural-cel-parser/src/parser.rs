//! Hand-written recursive descent parser with inline macro expansion.

use crate::ast::{BinaryOp, Expr, Span, Spanned, SpannedExpr, UnaryOp};
use crate::lexer::{SpannedToken, Token};
use crate::macros::{MacroContext, MacroExpansion, MacroRegistry, MacroStyle};
use crate::ParseError;

/// Maximum nesting depth before the parser refuses the expression.
pub const MAX_RECURSION_DEPTH: usize = 250;

pub struct Parser<'a> {
    tokens: &'a [SpannedToken],
    pos: usize,
    /// Counter for generating unique node IDs (starts at 1)
    next_id: i64,
    depth: usize,
    macros: &'a MacroRegistry,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [SpannedToken], macros: &'a MacroRegistry) -> Self {
        Self {
            tokens,
            pos: 0,
            next_id: 1,
            depth: 0,
            macros,
        }
    }

    fn next_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // === Utility Methods ===

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| s.clone())
            .unwrap_or_else(|| self.eof_span())
    }

    fn eof_span(&self) -> Span {
        let end = self.tokens.last().map(|(_, s)| s.end).unwrap_or(0);
        end..end
    }

    fn advance(&mut self) -> Option<SpannedToken> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn match_token(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<Span, ParseError> {
        if self.check(token) {
            let span = self.peek_span();
            self.pos += 1;
            Ok(span)
        } else {
            Err(self.error_here(format!("expected '{}'", token)))
        }
    }

    fn error_here(&self, message: String) -> ParseError {
        let message = match self.peek() {
            Some(found) => format!("{}, found '{}'", message, found),
            None => format!("{}, found end of input", message),
        };
        ParseError {
            message,
            span: self.peek_span(),
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn binary(&mut self, op: BinaryOp, left: SpannedExpr, right: SpannedExpr) -> SpannedExpr {
        let span = left.span.start..right.span.end;
        Spanned::new(
            self.next_id(),
            Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        )
    }

    // === Expression Parsing ===

    pub fn parse_expr(&mut self) -> Result<SpannedExpr, ParseError> {
        self.depth += 1;
        if self.depth > MAX_RECURSION_DEPTH {
            return Err(ParseError {
                message: format!("expression nesting exceeds limit of {}", MAX_RECURSION_DEPTH),
                span: self.peek_span(),
            });
        }
        let result = self.parse_ternary();
        self.depth -= 1;
        result
    }

    /// `cond ? a : b`
    fn parse_ternary(&mut self) -> Result<SpannedExpr, ParseError> {
        let cond = self.parse_or()?;
        if !self.match_token(&Token::Question) {
            return Ok(cond);
        }
        let then_expr = self.parse_or()?;
        self.expect(&Token::Colon)?;
        let else_expr = self.parse_expr()?;
        let span = cond.span.start..else_expr.span.end;
        Ok(Spanned::new(
            self.next_id(),
            Expr::Ternary {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        ))
    }

    fn parse_or(&mut self) -> Result<SpannedExpr, ParseError> {
        let mut left = self.parse_and()?;
        while self.match_token(&Token::Or) {
            let right = self.parse_and()?;
            left = self.binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<SpannedExpr, ParseError> {
        let mut left = self.parse_relation()?;
        while self.match_token(&Token::And) {
            let right = self.parse_relation()?;
            left = self.binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_relation(&mut self) -> Result<SpannedExpr, ParseError> {
        let mut left = self.parse_addition()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                Some(Token::In) => BinaryOp::In,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_addition()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_addition(&mut self) -> Result<SpannedExpr, ParseError> {
        let mut left = self.parse_mult()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_mult()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_mult(&mut self) -> Result<SpannedExpr, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = self.binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<SpannedExpr, ParseError> {
        let start = self.peek_span().start;
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Not) => UnaryOp::Not,
            _ => return self.parse_postfix(),
        };
        self.pos += 1;

        // Fold `-<int>` into a literal unless a postfix operator binds tighter.
        if op == UnaryOp::Neg {
            if let Some((Token::Int(_), _)) = self.tokens.get(self.pos) {
                let is_followed_by_postfix = matches!(
                    self.tokens.get(self.pos + 1).map(|(t, _)| t),
                    Some(Token::Dot) | Some(Token::LBracket)
                );
                if !is_followed_by_postfix {
                    if let Some((Token::Int(n), span)) = self.advance() {
                        return Ok(Spanned::new(self.next_id(), Expr::Int(-n), start..span.end));
                    }
                }
            }
        }

        self.depth += 1;
        if self.depth > MAX_RECURSION_DEPTH {
            return Err(ParseError {
                message: format!("expression nesting exceeds limit of {}", MAX_RECURSION_DEPTH),
                span: self.peek_span(),
            });
        }
        let operand = self.parse_unary();
        self.depth -= 1;
        let operand = operand?;

        let span = start..operand.span.end;
        Ok(Spanned::new(
            self.next_id(),
            Expr::Unary {
                op,
                expr: Box::new(operand),
            },
            span,
        ))
    }

    /// Postfix chains: `.field`, `.method(args)`, `[index]`, `(args)`, `Type{...}`.
    fn parse_postfix(&mut self) -> Result<SpannedExpr, ParseError> {
        let mut expr = self.parse_atom()?;

        loop {
            match self.peek() {
                Some(Token::LParen) => expr = self.parse_call(expr)?,
                Some(Token::LBracket) => expr = self.parse_index(expr)?,
                Some(Token::Dot) => expr = self.parse_member(expr)?,
                Some(Token::LBrace) => match qualified_name(&expr) {
                    Some(name) => expr = self.parse_struct_init(name, expr.span.start)?,
                    None => break,
                },
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_args(&mut self, close: &Token) -> Result<(Vec<SpannedExpr>, Span), ParseError> {
        let mut args = Vec::new();
        if !self.check(close) {
            args.push(self.parse_expr()?);
            while self.match_token(&Token::Comma) {
                if self.check(close) {
                    break;
                }
                args.push(self.parse_expr()?);
            }
        }
        let end = self.expect(close)?;
        Ok((args, end))
    }

    fn parse_call(&mut self, callee: SpannedExpr) -> Result<SpannedExpr, ParseError> {
        let start = callee.span.start;
        self.expect(&Token::LParen)?;
        let (args, end) = self.parse_args(&Token::RParen)?;
        let span = start..end.end;

        let (name, receiver, style) = match &callee.node {
            Expr::Ident(name) => (name.clone(), None, MacroStyle::Global),
            Expr::Member { expr, field } => {
                (field.clone(), Some((**expr).clone()), MacroStyle::Receiver)
            }
            _ => {
                return Err(ParseError {
                    message: "call target must be a function name or method".to_string(),
                    span,
                })
            }
        };

        let macros = self.macros;
        if let Some(m) = macros.lookup(&name, args.len(), style) {
            let mut ctx = MacroContext::new(&mut self.next_id);
            return match (m.expander)(&mut ctx, span.clone(), receiver, args) {
                MacroExpansion::Expanded(expr) => Ok(expr),
                MacroExpansion::Error(message) => Err(ParseError { message, span }),
            };
        }

        Ok(Spanned::new(
            self.next_id(),
            Expr::Call {
                expr: Box::new(callee),
                args,
            },
            span,
        ))
    }

    fn parse_index(&mut self, base: SpannedExpr) -> Result<SpannedExpr, ParseError> {
        let start = base.span.start;
        self.expect(&Token::LBracket)?;
        let index = self.parse_expr()?;
        let end = self.expect(&Token::RBracket)?;
        Ok(Spanned::new(
            self.next_id(),
            Expr::Index {
                expr: Box::new(base),
                index: Box::new(index),
            },
            start..end.end,
        ))
    }

    fn parse_member(&mut self, base: SpannedExpr) -> Result<SpannedExpr, ParseError> {
        let start = base.span.start;
        self.expect(&Token::Dot)?;
        match self.peek().cloned() {
            Some(Token::Ident(field)) => {
                let end = self.peek_span().end;
                self.pos += 1;
                Ok(Spanned::new(
                    self.next_id(),
                    Expr::Member {
                        expr: Box::new(base),
                        field,
                    },
                    start..end,
                ))
            }
            Some(Token::Reserved(word)) => Err(ParseError {
                message: format!(
                    "reserved word '{}' cannot be used as a field name, escape it as '__{}__'",
                    word, word
                ),
                span: self.peek_span(),
            }),
            _ => Err(self.error_here("expected field name after '.'".to_string())),
        }
    }

    fn parse_struct_init(&mut self, type_name: String, start: usize) -> Result<SpannedExpr, ParseError> {
        self.expect(&Token::LBrace)?;
        let mut fields = Vec::new();
        if !self.check(&Token::RBrace) {
            fields.push(self.parse_struct_field()?);
            while self.match_token(&Token::Comma) {
                if self.check(&Token::RBrace) {
                    break;
                }
                fields.push(self.parse_struct_field()?);
            }
        }
        let end = self.expect(&Token::RBrace)?;
        Ok(Spanned::new(
            self.next_id(),
            Expr::Struct { type_name, fields },
            start..end.end,
        ))
    }

    fn parse_struct_field(&mut self) -> Result<(String, SpannedExpr), ParseError> {
        let name = match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                self.pos += 1;
                name
            }
            _ => return Err(self.error_here("expected field name".to_string())),
        };
        self.expect(&Token::Colon)?;
        let value = self.parse_expr()?;
        Ok((name, value))
    }

    fn parse_atom(&mut self) -> Result<SpannedExpr, ParseError> {
        let span = self.peek_span();
        let node = match self.peek().cloned() {
            Some(Token::Int(n)) => Expr::Int(n),
            Some(Token::Float(n)) => Expr::Float(n),
            Some(Token::String(s)) => Expr::String(s),
            Some(Token::Bytes(b)) => Expr::Bytes(b),
            Some(Token::True) => Expr::Bool(true),
            Some(Token::False) => Expr::Bool(false),
            Some(Token::Null) => Expr::Null,
            Some(Token::Ident(name)) => Expr::Ident(name),
            Some(Token::Reserved(word)) => {
                return Err(ParseError {
                    message: format!("reserved identifier: {}", word),
                    span,
                })
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                return Ok(expr);
            }
            Some(Token::LBracket) => {
                self.pos += 1;
                let (items, end) = self.parse_args(&Token::RBracket)?;
                return Ok(Spanned::new(
                    self.next_id(),
                    Expr::List(items),
                    span.start..end.end,
                ));
            }
            Some(Token::LBrace) => return self.parse_map(),
            Some(_) => return Err(self.error_here("unexpected token".to_string())),
            None => {
                return Err(ParseError {
                    message: "unexpected end of input".to_string(),
                    span: self.eof_span(),
                })
            }
        };
        self.pos += 1;
        Ok(Spanned::new(self.next_id(), node, span))
    }

    fn parse_map(&mut self) -> Result<SpannedExpr, ParseError> {
        let start = self.expect(&Token::LBrace)?.start;
        let mut entries = Vec::new();
        while !self.check(&Token::RBrace) {
            let key = self.parse_expr()?;
            self.expect(&Token::Colon)?;
            let value = self.parse_expr()?;
            entries.push((key, value));
            if !self.match_token(&Token::Comma) {
                break;
            }
        }
        let end = self.expect(&Token::RBrace)?;
        Ok(Spanned::new(self.next_id(), Expr::Map(entries), start..end.end))
    }
}

/// Flattens `Ident` or a `Member` chain rooted in an `Ident` into a dotted name.
fn qualified_name(expr: &SpannedExpr) -> Option<String> {
    match &expr.node {
        Expr::Ident(name) => Some(name.clone()),
        Expr::Member { expr, field } => {
            qualified_name(expr).map(|prefix| format!("{}.{}", prefix, field))
        }
        _ => None,
    }
}

/// Parse a full token stream, rejecting trailing tokens.
pub fn parse_tokens(
    tokens: &[SpannedToken],
    macros: &MacroRegistry,
) -> (Option<SpannedExpr>, Vec<ParseError>) {
    if tokens.is_empty() {
        return (
            None,
            vec![ParseError {
                message: "empty expression".to_string(),
                span: 0..0,
            }],
        );
    }

    let mut parser = Parser::new(tokens, macros);
    match parser.parse_expr() {
        Ok(ast) if parser.at_end() => (Some(ast), Vec::new()),
        Ok(ast) => {
            let err = parser.error_here("unexpected tokens after expression".to_string());
            (Some(ast), vec![err])
        }
        Err(e) => (None, vec![e]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_node(input: &str) -> Expr {
        let tokens = lex(input).unwrap();
        let (ast, errors) = parse_tokens(&tokens, MacroRegistry::standard());
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
        ast.expect("expected AST").node
    }

    #[test]
    fn test_precedence() {
        match parse_node("1 + 2 * 3") {
            Expr::Binary {
                op: BinaryOp::Add,
                right,
                ..
            } => assert!(matches!(right.node, Expr::Binary { op: BinaryOp::Mul, .. })),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_negative_literal_folding() {
        assert_eq!(parse_node("-9223372036854775807"), Expr::Int(-9223372036854775807));
        assert!(matches!(parse_node("-x"), Expr::Unary { op: UnaryOp::Neg, .. }));
    }

    #[test]
    fn test_struct_type_name_is_flattened() {
        match parse_node("Object.spec.template{replicas: 1}") {
            Expr::Struct { type_name, fields } => {
                assert_eq!(type_name, "Object.spec.template");
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].0, "replicas");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_node_ids_are_unique() {
        let tokens = lex("self.items.all(i, i.size() > 0 && i != 'x')").unwrap();
        let (ast, _) = parse_tokens(&tokens, MacroRegistry::standard());
        let mut ids = Vec::new();
        collect_ids(&ast.unwrap(), &mut ids);
        let len = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), len);
    }

    fn collect_ids(e: &SpannedExpr, out: &mut Vec<i64>) {
        out.push(e.id);
        match &e.node {
            Expr::Unary { expr, .. } | Expr::Member { expr, .. } | Expr::MemberTestOnly { expr, .. } => {
                collect_ids(expr, out)
            }
            Expr::Binary { left, right, .. } => {
                collect_ids(left, out);
                collect_ids(right, out);
            }
            Expr::Call { expr, args } => {
                collect_ids(expr, out);
                args.iter().for_each(|a| collect_ids(a, out));
            }
            Expr::Comprehension {
                iter_range,
                accu_init,
                loop_condition,
                loop_step,
                result,
                ..
            } => {
                for e in [iter_range, accu_init, loop_condition, loop_step, result] {
                    collect_ids(e, out);
                }
            }
            _ => {}
        }
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let input = format!("{}1{}", "(".repeat(400), ")".repeat(400));
        let tokens = lex(&input).unwrap();
        let (_, errors) = parse_tokens(&tokens, MacroRegistry::standard());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("nesting"));
    }
}
