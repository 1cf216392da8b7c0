//! Query text sanitization.
//!
//! Query strings can carry literal argument values (ids, emails, tokens) that
//! must not be shipped to the metrics sink. Redaction is a deliberately simple
//! heuristic: every `:` is dropped together with whatever follows it on the same
//! line up to the next `,`, or, when the rest of the line has no comma, up to
//! the next `)`. Literals that contain commas or parentheses, nested input
//! objects and lists are therefore only partially redacted. That imprecision is
//! part of the contract; changing it would change what the sink aggregates on.
//!
//! After redaction, whitespace runs are collapsed to a single space and the
//! result is trimmed. Redaction runs before lines are joined, so a colon whose
//! line holds no delimiter survives even if a later line does. Sanitizing is
//! idempotent for single-line queries; a multi-line query can redact further
//! on a second pass once its lines have been joined.
//!
//! ```
//! use querygate_core::sanitize::sanitize_query;
//!
//! assert_eq!(
//!     sanitize_query(r#"query Foo(id: 123, name: "x") { bar }"#),
//!     "query Foo(id, name) { bar }"
//! );
//! ```

use regex::Regex;
use std::sync::LazyLock;

// SAFETY: .expect() on LazyLock with compile-time literal patterns.
// A failure here is a programmer error caught by the tests below.

/// A colon and the literal text after it on the same line: up to the first
/// `,` if the line has one, otherwise up to the first `)`.
///
/// Line terminators are `\n`, `\r`, U+2028 and U+2029. The delimiter is
/// captured (group 1 or 2) so the replacement can put it back.
static LITERAL_ARGUMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r":(?:[^,\r\n\x{2028}\x{2029}]*(,)|[^)\r\n\x{2028}\x{2029}]*(\)))")
        .expect("BUG: LITERAL_ARGUMENT regex is invalid")
});

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("BUG: WHITESPACE_RUN regex is invalid"));

/// Remove literal argument values from `query` and normalize its whitespace.
///
/// For a query without line terminators, applying the function to its own
/// output returns the same string.
pub fn sanitize_query(query: &str) -> String {
    let redacted = redact_literals(query);
    normalize_whitespace(&redacted)
}

/// Drop `: <literal>` segments, keeping the delimiter that ended each one.
pub fn redact_literals(query: &str) -> String {
    LITERAL_ARGUMENT.replace_all(query, "${1}${2}").into_owned()
}

/// Collapse every whitespace run to one space and trim both ends.
pub fn normalize_whitespace(query: &str) -> String {
    WHITESPACE_RUN.replace_all(query, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterns_compile() {
        LazyLock::force(&LITERAL_ARGUMENT);
        LazyLock::force(&WHITESPACE_RUN);
    }

    #[test]
    fn test_collapses_whitespace() {
        assert_eq!(sanitize_query("query   Foo {  bar  }"), "query Foo { bar }");
    }

    #[test]
    fn test_trims_and_joins_lines() {
        let query = "\n  query Hero {\n    hero {\n      name\n    }\n  }\n";
        assert_eq!(sanitize_query(query), "query Hero { hero { name } }");
    }

    #[test]
    fn test_redacts_literal_arguments() {
        assert_eq!(
            sanitize_query(r#"query Foo(id: 123, name: "x") { bar }"#),
            "query Foo(id, name) { bar }"
        );
    }

    #[test]
    fn test_query_without_arguments_unchanged() {
        assert_eq!(sanitize_query("{hero{name}}"), "{hero{name}}");
    }

    #[test]
    fn test_variable_definitions_lose_their_types() {
        assert_eq!(
            sanitize_query("query Hero($episode: Episode, $withFriends: Boolean!) { hero }"),
            "query Hero($episode, $withFriends) { hero }"
        );
    }

    #[test]
    fn test_colon_without_delimiter_is_kept() {
        // Aliases outside any argument list have nothing to stop at.
        assert_eq!(sanitize_query("{ luke: hero { name } }"), "{ luke: hero { name } }");
    }

    #[test]
    fn test_literal_with_comma_is_partially_redacted() {
        assert_eq!(
            sanitize_query(r#"{ search(text: "a, b") { id } }"#),
            r#"{ search(text, b") { id } }"#
        );
    }

    #[test]
    fn test_nested_input_object_is_partially_redacted() {
        assert_eq!(
            sanitize_query("mutation { add(input: {a: 1, b: 2}) { id } }"),
            "mutation { add(input, b) { id } }"
        );
    }

    #[test]
    fn test_redaction_stops_at_line_end() {
        let query = "{ user(id:\n 42\n) { name } }";
        assert_eq!(sanitize_query(query), "{ user(id: 42 ) { name } }");
    }

    #[test]
    fn test_alias_line_survives_in_multiline_query() {
        let query = "{\n  luke: hero {\n    name\n  }\n  leia: human(id: \"1003\") {\n    name\n  }\n}";
        assert_eq!(
            sanitize_query(query),
            "{ luke: hero { name } leia) { name } }"
        );
    }

    #[test]
    fn test_unicode_line_separators_end_a_line() {
        assert_eq!(redact_literals("a: b\u{2028}c)"), "a: b\u{2028}c)");
        assert_eq!(redact_literals("a: b\rc, d"), "a: b\rc, d");
    }

    #[test]
    fn test_comma_is_preferred_over_paren_on_the_same_line() {
        assert_eq!(
            sanitize_query("{ a(x: 1) { b(y: 2, z: 3) } }"),
            "{ a(x, z) } }"
        );
    }

    #[test]
    fn test_sanitize_is_idempotent_on_examples() {
        for query in [
            "query   Foo {  bar  }",
            r#"query Foo(id: 123, name: "x") { bar }"#,
            "{ a: b c }",
            "{ luke: hero { name } leia) { name } }",
            "",
            "   ",
        ] {
            let once = sanitize_query(query);
            assert_eq!(sanitize_query(&once), once, "not idempotent for {:?}", query);
        }
    }

    #[test]
    fn test_whitespace_only_query_becomes_empty() {
        assert_eq!(sanitize_query(" \t\n "), "");
    }
}
