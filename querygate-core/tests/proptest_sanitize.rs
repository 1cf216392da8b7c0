//! Property-based tests for query sanitization.

use proptest::prelude::*;
use querygate_core::sanitize::{normalize_whitespace, redact_literals, sanitize_query};

// ─────────────────────────────────────────────────────────────────────────────
// Strategies
// ─────────────────────────────────────────────────────────────────────────────

/// Single-line query-shaped text: identifiers, punctuation, literals, spaces and tabs.
fn arb_query_text() -> impl Strategy<Value = String> {
    r#"[a-zA-Z0-9_$!@"(){}\[\]:, \t]{0,96}"#
}

/// Query-shaped text spread over several lines.
fn arb_multiline_query_text() -> impl Strategy<Value = String> {
    r#"[a-zA-Z0-9_"(){}:, \r\n\u{2028}\u{2029}]{0,96}"#
}

fn is_line_terminator(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

/// A query with literal arguments in its argument list.
fn arb_query_with_arguments() -> impl Strategy<Value = String> {
    (
        "[a-z][a-zA-Z0-9]{0,10}",
        prop::collection::vec(("[a-z][a-zA-Z0-9]{0,8}", "[0-9]{1,6}|\"[a-z ]{0,12}\""), 1..5),
    )
        .prop_map(|(field, args)| {
            let args = args
                .iter()
                .map(|(name, value)| format!("{}: {}", name, value))
                .collect::<Vec<_>>()
                .join(", ");
            format!("query {{ {}({}) {{ id }} }}", field, args)
        })
}

/// Text without any colon.
fn arb_colon_free_text() -> impl Strategy<Value = String> {
    r#"[a-zA-Z0-9_(){},\s"]{0,64}"#
}

// ─────────────────────────────────────────────────────────────────────────────
// Properties
// ─────────────────────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn sanitize_is_idempotent(query in arb_query_text()) {
        let once = sanitize_query(&query);
        prop_assert_eq!(sanitize_query(&once), once);
    }

    #[test]
    fn sanitize_is_idempotent_on_any_line(
        query in any::<String>().prop_map(|s| s.replace(is_line_terminator, " "))
    ) {
        let once = sanitize_query(&query);
        prop_assert_eq!(sanitize_query(&once), once);
    }

    #[test]
    fn output_whitespace_is_normalized(query in arb_query_text()) {
        let out = sanitize_query(&query);
        prop_assert_eq!(out.trim(), out.as_str());
        prop_assert!(!out.contains("  "), "double space in {:?}", out);
        prop_assert!(!out.contains(['\n', '\t', '\r']), "line break or tab in {:?}", out);
    }

    #[test]
    fn multiline_output_has_no_line_breaks(query in arb_multiline_query_text()) {
        let out = sanitize_query(&query);
        prop_assert!(!out.contains(is_line_terminator), "line break in {:?}", out);
    }

    #[test]
    fn redaction_stays_within_a_line(query in arb_multiline_query_text()) {
        let redacted = redact_literals(&query);
        let lines_in: Vec<_> = query.split(is_line_terminator).collect();
        let lines_out: Vec<_> = redacted.split(is_line_terminator).collect();
        prop_assert_eq!(lines_out.len(), lines_in.len());
        for (line_in, line_out) in lines_in.iter().zip(&lines_out) {
            prop_assert_eq!(redact_literals(line_in), *line_out);
        }
    }

    #[test]
    fn no_colon_is_followed_by_a_delimiter(query in arb_query_text()) {
        let out = sanitize_query(&query);
        if let Some(pos) = out.find(':') {
            let rest = &out[pos..];
            prop_assert!(!rest.contains([',', ')']), "unredacted literal in {:?}", out);
        }
    }

    #[test]
    fn argument_values_never_survive(query in arb_query_with_arguments()) {
        let out = sanitize_query(&query);
        prop_assert!(!out.contains(':'), "colon left in {:?}", out);
        prop_assert!(!out.contains('"'), "string literal left in {:?}", out);
    }

    #[test]
    fn colon_free_text_only_changes_whitespace(query in arb_colon_free_text()) {
        prop_assert_eq!(sanitize_query(&query), normalize_whitespace(&query));
    }
}
