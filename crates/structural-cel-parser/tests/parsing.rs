//! Integration tests for the public parse() API.

mod common;

use structural_cel_parser::{BinaryOp, Expr, UnaryOp, ACCU_VAR};

// ============================================================================
// Literals and identifiers
// ============================================================================

#[test]
fn parse_scalar_literals() {
    assert_eq!(common::assert_parses("0").node, Expr::Int(0));
    assert_eq!(common::assert_parses("0x10").node, Expr::Int(16));
    assert_eq!(common::assert_parses("1.25").node, Expr::Float(1.25));
    assert_eq!(common::assert_parses("'a'").node, Expr::String("a".into()));
    assert_eq!(common::assert_parses("b'a'").node, Expr::Bytes(b"a".to_vec()));
    assert_eq!(common::assert_parses("null").node, Expr::Null);
    assert_eq!(common::assert_parses("false").node, Expr::Bool(false));
}

#[test]
fn parse_escaped_property_identifier() {
    match common::assert_parses("self.__dot__name == 'x'").node {
        Expr::Binary { op: BinaryOp::Eq, left, .. } => match left.node {
            Expr::Member { field, .. } => assert_eq!(field, "__dot__name"),
            other => panic!("expected member, got {:?}", other),
        },
        other => panic!("expected equality, got {:?}", other),
    }
}

// ============================================================================
// Operators
// ============================================================================

#[test]
fn parse_logical_precedence() {
    match common::assert_parses("a || b && c").node {
        Expr::Binary { op: BinaryOp::Or, right, .. } => {
            assert!(matches!(right.node, Expr::Binary { op: BinaryOp::And, .. }));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn parse_membership_and_negation() {
    match common::assert_parses("!('x' in self.tags)").node {
        Expr::Unary { op: UnaryOp::Not, expr } => {
            assert!(matches!(expr.node, Expr::Binary { op: BinaryOp::In, .. }));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn parse_ternary_is_right_associative() {
    match common::assert_parses("a ? 1 : b ? 2 : 3").node {
        Expr::Ternary { else_expr, .. } => {
            assert!(matches!(else_expr.node, Expr::Ternary { .. }));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

// ============================================================================
// Access and calls
// ============================================================================

#[test]
fn parse_method_call_keeps_receiver() {
    match common::assert_parses("self.name.startsWith('kube-')").node {
        Expr::Call { expr, args } => {
            assert_eq!(args.len(), 1);
            match expr.node {
                Expr::Member { field, .. } => assert_eq!(field, "startsWith"),
                other => panic!("expected member callee, got {:?}", other),
            }
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn parse_index_on_map() {
    assert!(matches!(
        common::assert_parses("self.labels['app']").node,
        Expr::Index { .. }
    ));
}

#[test]
fn parse_collection_literals_with_trailing_commas() {
    match common::assert_parses("[1, 2, 3,]").node {
        Expr::List(items) => assert_eq!(items.len(), 3),
        other => panic!("unexpected: {:?}", other),
    }
    match common::assert_parses("{'a': 1, 'b': 2,}").node {
        Expr::Map(entries) => assert_eq!(entries.len(), 2),
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn parse_nested_object_literal() {
    let ast = common::assert_parses("Object{spec: Object.spec{replicas: 3}}");
    match ast.node {
        Expr::Struct { type_name, fields } => {
            assert_eq!(type_name, "Object");
            match &fields[0].1.node {
                Expr::Struct { type_name, .. } => assert_eq!(type_name, "Object.spec"),
                other => panic!("unexpected: {:?}", other),
            }
        }
        other => panic!("unexpected: {:?}", other),
    }
}

// ============================================================================
// Macros
// ============================================================================

#[test]
fn parse_has_macro() {
    match common::assert_parses("has(self.spec)").node {
        Expr::MemberTestOnly { field, .. } => assert_eq!(field, "spec"),
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn parse_all_macro_expands_to_comprehension() {
    match common::assert_parses("self.items.all(i, i > 0)").node {
        Expr::Comprehension {
            iter_var, accu_var, accu_init, ..
        } => {
            assert_eq!(iter_var, "i");
            assert_eq!(accu_var, ACCU_VAR);
            assert_eq!(accu_init.node, Expr::Bool(true));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn parse_map_with_filter_expands() {
    match common::assert_parses("[1, 2].map(x, x > 1, x * 2)").node {
        Expr::Comprehension { loop_step, .. } => {
            assert!(matches!(loop_step.node, Expr::Ternary { .. }));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[test]
fn parse_non_macro_arity_stays_a_call() {
    assert!(matches!(
        common::assert_parses("self.items.filter(x)").node,
        Expr::Call { .. }
    ));
}

#[test]
fn parse_references_ident_respects_shadowing() {
    let ast = common::assert_parses("self.items.all(oldSelf, oldSelf > 0)");
    assert!(!ast.references_ident("oldSelf"));
    assert!(ast.references_ident("self"));

    let ast = common::assert_parses("self.x == oldSelf.x");
    assert!(ast.references_ident("oldSelf"));
}
