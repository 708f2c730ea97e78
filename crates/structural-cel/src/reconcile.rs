//! Differential check between hand-written and declarative validation.
//!
//! While validation moves from hand-written code to schema rules, both run and
//! their results are compared. Only hand-written errors marked
//! `covered_by_declarative` are expected to be reproduced.

use crate::field::{ErrorKind, FieldError};
use crate::metrics::ValidationMetrics;

const MISMATCH_PREFIX: &str =
    "Unexpected difference between hand written validation and declarative validation error results";
const MISMATCH_SUFFIX: &str = "This indicates a major bug in the implementation of declarative validation, please disable DeclarativeValidation feature gate to correct this problem";

/// Errors match on kind, field and origin. An `Invalid` error only matches
/// when both sides carry an origin.
fn matches(imperative: &FieldError, declarative: &FieldError) -> bool {
    if imperative.kind != declarative.kind || imperative.field != declarative.field {
        return false;
    }
    if imperative.kind == ErrorKind::Invalid
        && (imperative.origin.is_none() || declarative.origin.is_none())
    {
        return false;
    }
    imperative.origin == declarative.origin
}

fn render(err: &FieldError) -> String {
    let mut out = format!(
        "{{Type={:?}, Field={:?}",
        err.kind.as_str(),
        err.field.to_string()
    );
    if err.origin.is_some() || err.kind == ErrorKind::Invalid {
        out.push_str(&format!(
            ", Origin={:?}",
            err.origin.as_deref().unwrap_or_default()
        ));
    }
    out.push('}');
    out
}

/// Report lines for every covered hand-written error without a declarative
/// counterpart, then every declarative error left unmatched.
pub fn gather_mismatches(imperative: &[FieldError], declarative: &[FieldError]) -> Vec<String> {
    if imperative.is_empty() && declarative.is_empty() {
        return Vec::new();
    }

    let mut matched = vec![false; declarative.len()];
    let mut details = Vec::new();

    for expected in imperative.iter().filter(|e| e.covered_by_declarative) {
        let found =
            (0..declarative.len()).find(|&j| !matched[j] && matches(expected, &declarative[j]));
        match found {
            Some(j) => matched[j] = true,
            None => details.push(format!(
                "{}, unmatched error(s) found {}. {}",
                MISMATCH_PREFIX,
                render(expected),
                MISMATCH_SUFFIX
            )),
        }
    }

    for (actual, _) in declarative.iter().zip(&matched).filter(|(_, m)| !**m) {
        details.push(format!(
            "{}, extra error(s) found {}. {}",
            MISMATCH_PREFIX,
            render(actual),
            MISMATCH_SUFFIX
        ));
    }
    details
}

/// Logs every mismatch and counts the invocation once if any were found.
///
/// Returns the report lines.
pub fn compare_and_emit_mismatches(
    imperative: &[FieldError],
    declarative: &[FieldError],
    metrics: &ValidationMetrics,
) -> Vec<String> {
    let details = gather_mismatches(imperative, declarative);
    for detail in &details {
        tracing::warn!("{}", detail);
    }
    if !details.is_empty() {
        metrics.record_mismatch();
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldPath;
    use prometheus::Registry;
    use serde_json::json;

    fn replicas_error(origin: &str) -> FieldError {
        FieldError::invalid(FieldPath::new().child("replicas"), json!(0), "out of range")
            .with_origin(origin)
    }

    #[test]
    fn test_empty_inputs() {
        assert!(gather_mismatches(&[], &[]).is_empty());
    }

    #[test]
    fn test_matching_errors() {
        let imperative = [replicas_error("minimum").mark_covered_by_declarative()];
        let declarative = [replicas_error("minimum")];
        assert!(gather_mismatches(&imperative, &declarative).is_empty());
    }

    #[test]
    fn test_origin_mismatch_reports_both_sides() {
        let imperative = [replicas_error("minimum").mark_covered_by_declarative()];
        let declarative = [replicas_error("maximum")];
        let details = gather_mismatches(&imperative, &declarative);
        assert_eq!(details.len(), 2);
        assert!(details[0].contains("unmatched error(s) found"));
        assert!(details[0].contains(r#"Origin="minimum""#));
        assert!(details[1].contains("extra error(s) found"));
        assert!(details[1].contains(r#"Origin="maximum""#));
    }

    #[test]
    fn test_uncovered_errors_are_ignored() {
        let imperative = [replicas_error("minimum")];
        assert!(gather_mismatches(&imperative, &[]).is_empty());
    }

    #[test]
    fn test_invalid_requires_origin() {
        let bare = FieldError::invalid(FieldPath::new().child("x"), json!(1), "bad");
        let imperative = [bare.clone().mark_covered_by_declarative()];
        let details = gather_mismatches(&imperative, &[bare]);
        assert_eq!(details.len(), 2);
    }

    #[test]
    fn test_required_matches_without_origin() {
        let err = FieldError::required(FieldPath::new().child("app"), "");
        let imperative = [err.clone().mark_covered_by_declarative()];
        assert!(gather_mismatches(&imperative, &[err]).is_empty());
    }

    #[test]
    fn test_first_unmatched_declarative_wins() {
        let imperative = [
            replicas_error("minimum").mark_covered_by_declarative(),
            replicas_error("minimum").mark_covered_by_declarative(),
        ];
        let declarative = [replicas_error("minimum")];
        let details = gather_mismatches(&imperative, &declarative);
        assert_eq!(details.len(), 1);
        assert!(details[0].contains("unmatched"));
    }

    #[test]
    fn test_counter_increments_once_per_invocation() {
        let metrics = ValidationMetrics::new(&Registry::new()).unwrap();
        let imperative = [replicas_error("minimum").mark_covered_by_declarative()];
        let declarative = [replicas_error("maximum")];

        let details = compare_and_emit_mismatches(&imperative, &declarative, &metrics);
        assert_eq!(details.len(), 2);
        assert_eq!(metrics.mismatch_count(), 1);

        compare_and_emit_mismatches(&[], &[], &metrics);
        assert_eq!(metrics.mismatch_count(), 1);
    }
}
