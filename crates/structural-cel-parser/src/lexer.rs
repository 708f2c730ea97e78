//! Tokenizer built on logos.

use logos::Logos;

use crate::ast::Span;

pub type SpannedToken = (Token, Span);

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

/// Words that lex as [`Token::Reserved`] and may never name an identifier.
pub const RESERVED_WORDS: &[&str] = &[
    "as",
    "break",
    "const",
    "continue",
    "else",
    "for",
    "function",
    "if",
    "import",
    "let",
    "loop",
    "package",
    "namespace",
    "return",
    "var",
    "void",
    "while",
];

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
#[logos(skip r"//[^\n]*")]
pub enum Token {
    // === Numbers ===
    #[regex(r"0[xX][0-9a-fA-F]+", lex_hex_int, priority = 3)]
    #[regex(r"[0-9]+", lex_int, priority = 1)]
    Int(i64),

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", lex_float, priority = 5)]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", lex_float, priority = 2)]
    Float(f64),

    // === Strings ===
    #[regex(r#"""""#, |lex| lex_triple(lex, "\"\"\""))]
    #[regex(r"'''", |lex| lex_triple(lex, "'''"))]
    #[regex(r#"[rR]""#, |lex| lex_raw(lex, '"'))]
    #[regex(r"[rR]'", |lex| lex_raw(lex, '\''))]
    #[regex(r#"""#, |lex| lex_quoted(lex, '"'))]
    #[regex(r"'", |lex| lex_quoted(lex, '\''))]
    String(String),

    #[regex(r#"[bB]""#, |lex| lex_quoted(lex, '"').map(String::into_bytes))]
    #[regex(r"[bB]'", |lex| lex_quoted(lex, '\'').map(String::into_bytes))]
    Bytes(Vec<u8>),

    // === Keywords ===
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,
    #[token("in")]
    In,

    #[regex(
        r"as|break|const|continue|else|for|function|if|import|let|loop|package|namespace|return|var|void|while",
        |lex| lex.slice().to_string(),
        priority = 3
    )]
    Reserved(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 0)]
    Ident(String),

    // === Operators ===
    #[token("==")]
    EqEq,
    #[token("!=")]
    Ne,
    #[token("<=")]
    Le,
    #[token(">=")]
    Ge,
    #[token("&&")]
    And,
    #[token("||")]
    Or,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("!")]
    Not,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,

    // === Delimiters ===
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Int(n) => write!(f, "{}", n),
            Token::Float(n) => write!(f, "{}", n),
            Token::String(s) => write!(f, "{:?}", s),
            Token::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Token::True => f.write_str("true"),
            Token::False => f.write_str("false"),
            Token::Null => f.write_str("null"),
            Token::In => f.write_str("in"),
            Token::Reserved(s) | Token::Ident(s) => f.write_str(s),
            Token::EqEq => f.write_str("=="),
            Token::Ne => f.write_str("!="),
            Token::Le => f.write_str("<="),
            Token::Ge => f.write_str(">="),
            Token::And => f.write_str("&&"),
            Token::Or => f.write_str("||"),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::Percent => f.write_str("%"),
            Token::Lt => f.write_str("<"),
            Token::Gt => f.write_str(">"),
            Token::Not => f.write_str("!"),
            Token::Question => f.write_str("?"),
            Token::Colon => f.write_str(":"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::LBracket => f.write_str("["),
            Token::RBracket => f.write_str("]"),
            Token::LBrace => f.write_str("{"),
            Token::RBrace => f.write_str("}"),
            Token::Dot => f.write_str("."),
            Token::Comma => f.write_str(","),
        }
    }
}

// === Callbacks ===

fn lex_int(lex: &mut logos::Lexer<Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

fn lex_float(lex: &mut logos::Lexer<Token>) -> Option<f64> {
    lex.slice().parse().ok()
}

fn lex_hex_int(lex: &mut logos::Lexer<Token>) -> Option<i64> {
    i64::from_str_radix(&lex.slice()[2..], 16).ok()
}

/// Reads a single-line quoted string with escapes, consuming the closing quote.
fn lex_quoted(lex: &mut logos::Lexer<Token>, quote: char) -> Option<String> {
    let mut chars = lex.remainder().chars();
    let mut out = String::new();
    let mut consumed = 0;

    while let Some(c) = chars.next() {
        consumed += c.len_utf8();
        match c {
            c if c == quote => {
                lex.bump(consumed);
                return Some(out);
            }
            '\n' => return None,
            '\\' => {
                let esc = chars.next()?;
                consumed += esc.len_utf8();
                match esc {
                    '\\' | '/' | '"' | '\'' | '`' | '?' => out.push(esc),
                    'a' => out.push('\x07'),
                    'b' => out.push('\x08'),
                    'f' => out.push('\x0C'),
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    'v' => out.push('\x0B'),
                    'x' | 'u' | 'U' => {
                        let width = match esc {
                            'x' => 2,
                            'u' => 4,
                            _ => 8,
                        };
                        let hex: String = chars.by_ref().take(width).collect();
                        if hex.len() != width {
                            return None;
                        }
                        consumed += width;
                        let code = u32::from_str_radix(&hex, 16).ok()?;
                        out.push(char::from_u32(code)?);
                    }
                    d @ '0'..='3' => {
                        let rest: String = chars.by_ref().take(2).collect();
                        if rest.len() != 2 {
                            return None;
                        }
                        consumed += 2;
                        let code = u32::from_str_radix(&format!("{}{}", d, rest), 8).ok()?;
                        out.push(char::from_u32(code)?);
                    }
                    _ => return None,
                }
            }
            c => out.push(c),
        }
    }

    None
}

fn lex_raw(lex: &mut logos::Lexer<Token>, quote: char) -> Option<String> {
    let rest = lex.remainder();
    let end = rest.find(|c| c == quote || c == '\n')?;
    if !rest[end..].starts_with(quote) {
        return None;
    }
    let content = rest[..end].to_string();
    lex.bump(end + quote.len_utf8());
    Some(content)
}

fn lex_triple(lex: &mut logos::Lexer<Token>, terminator: &str) -> Option<String> {
    let rest = lex.remainder();
    let end = rest.find(terminator)?;
    let content = rest[..end].to_string();
    lex.bump(end + terminator.len());
    Some(content)
}

/// Tokenize the input string.
pub fn lex(input: &str) -> Result<Vec<SpannedToken>, LexError> {
    let mut lexer = Token::lexer(input);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                let text = &input[span.clone()];
                let message = if text.starts_with(['"', '\'']) || text.ends_with(['"', '\'']) {
                    "unterminated or malformed string literal".to_string()
                } else {
                    format!("unexpected character '{}'", text)
                };
                return Err(LexError { message, span });
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        lex(input).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn lex_numbers() {
        assert_eq!(kinds("42"), vec![Token::Int(42)]);
        assert_eq!(kinds("0x1F"), vec![Token::Int(31)]);
        assert_eq!(kinds("2.5"), vec![Token::Float(2.5)]);
        assert_eq!(kinds("1e3"), vec![Token::Float(1000.0)]);
    }

    #[test]
    fn lex_string_forms() {
        assert_eq!(kinds(r#""a\tb""#), vec![Token::String("a\tb".into())]);
        assert_eq!(kinds(r"'x'"), vec![Token::String("x".into())]);
        assert_eq!(kinds(r#"r"\d+""#), vec![Token::String(r"\d+".into())]);
        assert_eq!(kinds("'''a\nb'''"), vec![Token::String("a\nb".into())]);
        assert_eq!(kinds(r#""é""#), vec![Token::String("é".into())]);
        assert_eq!(kinds(r#""\101""#), vec![Token::String("A".into())]);
        assert_eq!(kinds(r#"b"ab""#), vec![Token::Bytes(b"ab".to_vec())]);
    }

    #[test]
    fn lex_reserved_words_are_not_identifiers() {
        for word in RESERVED_WORDS {
            assert_eq!(kinds(word), vec![Token::Reserved(word.to_string())]);
        }
        assert_eq!(kinds("format"), vec![Token::Ident("format".into())]);
        assert_eq!(kinds("iffy"), vec![Token::Ident("iffy".into())]);
    }

    #[test]
    fn lex_escaped_identifier() {
        assert_eq!(
            kinds("self.__dash__name"),
            vec![
                Token::Ident("self".into()),
                Token::Dot,
                Token::Ident("__dash__name".into())
            ]
        );
    }

    #[test]
    fn lex_operators_and_comments() {
        assert_eq!(
            kinds("a >= 1 && b // trailing\n|| !c"),
            vec![
                Token::Ident("a".into()),
                Token::Ge,
                Token::Int(1),
                Token::And,
                Token::Ident("b".into()),
                Token::Or,
                Token::Not,
                Token::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn lex_unterminated_string_fails() {
        assert!(lex("\"abc").is_err());
        assert!(lex("'abc\n'").is_err());
    }

    #[test]
    fn lex_unknown_character_fails() {
        let err = lex("a # b").unwrap_err();
        assert_eq!(err.span, 2..3);
    }
}
