//! Input sanitization for user-supplied strings
//!
//! A defense-in-depth filter applied to free-text form fields before they
//! are displayed or stored. It removes the most common script-injection
//! shapes (angle brackets, `javascript:` schemes, inline `on*=` handlers)
//! and bounds the length.
//!
//! This is NOT an HTML sanitizer. It does not parse markup, does not
//! understand entity encoding, and will not stop a determined attacker.
//! Output must still be escaped by whatever renders it.

use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum length of sanitized output, in characters
pub const MAX_INPUT_LEN: usize = 10_000;

static SCRIPT_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)javascript\s*:").expect("script scheme pattern is valid"));

static EVENT_HANDLER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bon[a-z]+\s*=").expect("event handler pattern is valid"));

/// Sanitize with the default length limit
#[must_use]
pub fn sanitize_input(input: &str) -> String {
    sanitize_with_limit(input, MAX_INPUT_LEN)
}

/// Sanitize, keeping at most `max_chars` characters
///
/// Stripping repeats until nothing matches, so fragments that only form a
/// pattern after an inner match is removed (`javajavascript:script:`) are
/// caught too. The result is a fixed point: sanitizing it again is a no-op.
#[must_use]
pub fn sanitize_with_limit(input: &str, max_chars: usize) -> String {
    let mut current = input.to_owned();
    loop {
        let next = strip_once(&current);
        if next == current {
            break;
        }
        current = next;
    }

    truncate_chars(current.trim(), max_chars).trim_end().to_owned()
}

fn strip_once(input: &str) -> String {
    let without_brackets = input.replace(['<', '>'], "");
    let without_scheme = SCRIPT_SCHEME.replace_all(&without_brackets, "");
    EVENT_HANDLER.replace_all(&without_scheme, "").into_owned()
}

fn truncate_chars(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((cut, _)) => &input[..cut],
        None => input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn script_tag_is_defanged() {
        let out = sanitize_input("<script>alert(1)</script>");
        assert!(!out.contains('<') && !out.contains('>'));
        assert!(!out.to_lowercase().contains("javascript:"));
        assert_eq!(out, "scriptalert(1)/script");
    }

    #[test]
    fn strips_scheme_case_insensitively() {
        assert_eq!(sanitize_input("JavaScript:alert(1)"), "alert(1)");
        assert_eq!(sanitize_input("javascript :void(0)"), "void(0)");
    }

    #[test]
    fn strips_nested_scheme() {
        assert_eq!(sanitize_input("javajavascript:script:go()"), "go()");
    }

    #[test]
    fn strips_event_handlers() {
        assert_eq!(sanitize_input("img src=x onerror=alert(1)"), "img src=x alert(1)");
        assert_eq!(sanitize_input("a ONCLICK = go()"), "a  go()");
    }

    #[test]
    fn leaves_words_containing_on_alone() {
        assert_eq!(sanitize_input("conversion=42"), "conversion=42");
        assert_eq!(sanitize_input("Revenue growth on track"), "Revenue growth on track");
    }

    #[test]
    fn trims_whitespace() {
        assert_eq!(sanitize_input("  hello \n"), "hello");
        assert_eq!(sanitize_input("< x"), "x");
    }

    #[test]
    fn truncates_to_limit() {
        let long = "a".repeat(MAX_INPUT_LEN + 500);
        assert_eq!(sanitize_input(&long).chars().count(), MAX_INPUT_LEN);
    }

    #[test]
    fn truncates_on_char_boundary() {
        let out = sanitize_with_limit("ééééé", 3);
        assert_eq!(out, "ééé");
    }

    #[test]
    fn empty_input() {
        assert_eq!(sanitize_input(""), "");
        assert_eq!(sanitize_input("<>"), "");
    }

    proptest! {
        #[test]
        fn prop_output_is_bounded_and_clean(input in ".{0,200}") {
            let out = sanitize_with_limit(&input, 64);
            prop_assert!(out.chars().count() <= 64);
            prop_assert!(!out.contains('<') && !out.contains('>'));
            prop_assert!(!SCRIPT_SCHEME.is_match(&out));
            prop_assert!(!EVENT_HANDLER.is_match(&out));
        }

        #[test]
        fn prop_idempotent(input in r"[ <>a-zA-Z:=()\t]{0,120}") {
            let once = sanitize_with_limit(&input, 40);
            let twice = sanitize_with_limit(&once, 40);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_idempotent_with_injection_fragments(
            parts in proptest::collection::vec(
                prop_oneof![
                    Just("javascript:"),
                    Just("java"),
                    Just("script:"),
                    Just("onload="),
                    Just("on"),
                    Just("click ="),
                    Just("<"),
                    Just(">"),
                    Just(" "),
                    Just("text"),
                ],
                0..24,
            )
        ) {
            let input = parts.concat();
            let once = sanitize_input(&input);
            prop_assert_eq!(sanitize_input(&once), once.clone());
            prop_assert!(!once.to_lowercase().contains("javascript:"));
        }
    }
}
