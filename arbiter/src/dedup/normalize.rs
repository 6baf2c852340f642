//! Canonical form of a test assertion for near-duplicate comparison.
//!
//! Pipeline: detect and strip priority tags → NFD decompose and drop combining
//! marks → lowercase → keep alphanumerics and comparison operators, collapse
//! everything else to single spaces.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use super::stopwords::{is_stopword, StopwordLanguage};

/// Canonical tag emitted by the test producer for evidence-derived checks.
pub const EVIDENCE_CRITICAL_TAG: &str = "[EVIDENCE-CRITICAL]";

static PRIORITY_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[\s*evidence[-_ ]critical\s*\]|\bpriority\s*=\s*critical\b").unwrap()
});

/// Normalized text of entries that carry no assertion and must be dropped.
const SENTINEL_PREFIXES: &[&str] = &[
    "generation failed",
    "test generation failed",
    "failed to generate",
];

/// A test assertion reduced to its comparable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTest {
    pub text: String,
    pub has_priority: bool,
}

pub fn has_priority_tag(raw: &str) -> bool {
    PRIORITY_TAG.is_match(raw)
}

pub fn normalize(raw: &str) -> NormalizedTest {
    let has_priority = has_priority_tag(raw);
    let stripped = PRIORITY_TAG.replace_all(raw, " ");

    let folded: String = stripped
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();

    let mut text = String::with_capacity(folded.len());
    let mut prev: Option<CharClass> = None;
    let mut chars = folded.chars().peekable();
    while let Some(c) = chars.next() {
        let class = if c.is_alphanumeric() {
            CharClass::Word
        } else if matches!(c, '<' | '>' | '=') || (c == '!' && chars.peek() == Some(&'=')) {
            CharClass::Operator
        } else {
            prev = prev.map(|_| CharClass::Separator);
            continue;
        };
        if let Some(p) = prev {
            if p != class {
                text.push(' ');
            }
        }
        text.push(c);
        prev = Some(class);
    }

    NormalizedTest { text, has_priority }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Word,
    Operator,
    Separator,
}

/// Empty entries and producer failure markers carry no assertion.
pub fn is_sentinel(normalized: &str) -> bool {
    normalized.is_empty() || SENTINEL_PREFIXES.iter().any(|p| normalized.starts_with(p))
}

/// Stopword-filtered token set of a normalized text.
pub fn token_set(normalized: &str, second: StopwordLanguage) -> BTreeSet<String> {
    normalized
        .split_whitespace()
        .filter(|t| !is_stopword(t, second))
        .map(str::to_string)
        .collect()
}

/// Operators and numeric tokens of a normalized text, in order.
pub fn literal_signature(normalized: &str) -> Vec<String> {
    normalized
        .split_whitespace()
        .filter(|t| t.chars().any(|c| c.is_ascii_digit() || matches!(c, '<' | '>' | '=')))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_punctuation_fold() {
        assert_eq!(normalize("Email Must Be Valid!").text, "email must be valid");
        assert_eq!(normalize("  email   must be, valid ").text, "email must be valid");
    }

    #[test]
    fn test_diacritics_removed() {
        assert_eq!(normalize("Città è già").text, "citta e gia");
    }

    #[test]
    fn test_priority_tag_detected_and_stripped() {
        let n = normalize("[EVIDENCE-CRITICAL] email must be valid");
        assert!(n.has_priority);
        assert_eq!(n.text, "email must be valid");

        let n = normalize("Revenue uses net amount (priority=critical)");
        assert!(n.has_priority);
        assert_eq!(n.text, "revenue uses net amount");

        assert!(!normalize("plain check").has_priority);
    }

    #[test]
    fn test_comparison_operators_survive() {
        assert_eq!(normalize("amount >= 5").text, "amount >= 5");
        assert_ne!(normalize("amount > 5").text, normalize("amount < 5").text);
        assert_eq!(normalize("status!='x'").text, "status != x");
        assert_eq!(normalize("Wow!").text, "wow");
    }

    #[test]
    fn test_sentinels() {
        assert!(is_sentinel(""));
        assert!(is_sentinel(&normalize("GENERATION FAILED: upstream 500").text));
        assert!(!is_sentinel("email must be valid"));
    }

    #[test]
    fn test_literal_signature() {
        assert_eq!(
            literal_signature(&normalize("amount >= 100 in 2023").text),
            vec![">=", "100", "2023"]
        );
        assert!(literal_signature("email must be valid").is_empty());
    }

    #[test]
    fn test_token_set_filters_stopwords() {
        let tokens = token_set("the email of the user must be valid", StopwordLanguage::Italian);
        let expected: BTreeSet<String> = ["email", "user", "must", "valid"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tokens, expected);
    }
}
