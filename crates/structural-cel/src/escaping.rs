//! Mapping between schema property names and expression identifiers.
//!
//! Property names may contain `.`, `-` and `/`, start with `__`, or collide
//! with a language keyword. Such names are exposed under an escaped
//! identifier:
//!
//! | property     | identifier           |
//! |--------------|----------------------|
//! | `__x`        | `__underscores__x`   |
//! | `a.b`        | `a__dot__b`          |
//! | `a-b`        | `a__dash__b`         |
//! | `a/b`        | `a__slash__b`        |
//! | `namespace`  | `__namespace__`      |
//!
//! The mapping is a bijection over `[a-zA-Z_.\-/][a-zA-Z0-9_.\-/]*`. Names
//! outside that alphabet have no identifier form.

use structural_cel_parser::RESERVED_WORDS;

const LITERAL_KEYWORDS: &[&str] = &["true", "false", "null", "in"];

/// Identifiers that always refer to a type or builtin at the top level of an
/// expression. A root property with one of these names is only reachable as
/// `self.<name>`.
const ROOT_RESERVED: &[&str] = &[
    "int",
    "uint",
    "double",
    "bool",
    "string",
    "bytes",
    "list",
    "map",
    "null_type",
    "type",
];

const ESCAPES: &[(&str, &str)] = &[
    ("__", "__underscores__"),
    (".", "__dot__"),
    ("-", "__dash__"),
    ("/", "__slash__"),
];

fn is_keyword(name: &str) -> bool {
    LITERAL_KEYWORDS.contains(&name) || RESERVED_WORDS.contains(&name)
}

/// Returns true if `name` may not be declared as a bare top-level identifier.
pub fn is_root_reserved(name: &str) -> bool {
    ROOT_RESERVED.contains(&name)
}

fn in_alphabet(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let special = |c: char| matches!(c, '_' | '.' | '-' | '/');
    (first.is_ascii_alphabetic() || special(first))
        && chars.all(|c| c.is_ascii_alphanumeric() || special(c))
}

/// Escapes a property name into an identifier, or `None` if the name cannot
/// be represented.
pub fn escape(name: &str) -> Option<String> {
    if !in_alphabet(name) {
        return None;
    }
    if is_keyword(name) {
        return Some(format!("__{}__", name));
    }

    let mut out = String::with_capacity(name.len());
    let mut rest = name;
    'outer: while !rest.is_empty() {
        for (raw, escaped) in ESCAPES {
            if let Some(tail) = rest.strip_prefix(raw) {
                out.push_str(escaped);
                rest = tail;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    Some(out)
}

/// Reverses [`escape`]. Identifiers without escape sequences map to themselves.
pub fn unescape(ident: &str) -> String {
    if let Some(inner) = ident
        .strip_prefix("__")
        .and_then(|s| s.strip_suffix("__"))
    {
        if is_keyword(inner) {
            return inner.to_string();
        }
    }

    let mut out = String::with_capacity(ident.len());
    let mut rest = ident;
    'outer: while !rest.is_empty() {
        if rest.starts_with("__") {
            for (raw, escaped) in ESCAPES {
                if let Some(tail) = rest.strip_prefix(escaped) {
                    out.push_str(raw);
                    rest = tail;
                    continue 'outer;
                }
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}
