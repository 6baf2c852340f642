//! Stopword lists used when building token sets for Jaccard comparison.

use serde::{Deserialize, Serialize};

const ENGLISH: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "by", "for", "from", "has", "have", "if",
    "in", "into", "is", "it", "its", "of", "on", "or", "should", "that", "the", "their", "then",
    "there", "these", "this", "those", "to", "was", "were", "which", "will", "with",
];

const ITALIAN: &[&str] = &[
    "a", "al", "alla", "alle", "che", "con", "da", "dai", "dal", "dalla", "dei", "del", "della",
    "delle", "deve", "devono", "di", "e", "gli", "i", "il", "in", "la", "le", "lo", "nei", "nel",
    "nella", "per", "sono", "su", "sul", "sulla", "un", "una", "uno",
];

const SPANISH: &[&str] = &[
    "a", "al", "con", "de", "del", "debe", "deben", "el", "en", "es", "la", "las", "los", "o",
    "para", "por", "que", "se", "su", "sus", "un", "una", "y",
];

const FRENCH: &[&str] = &[
    "a", "au", "aux", "avec", "ce", "ces", "dans", "de", "des", "doit", "doivent", "du", "en",
    "est", "et", "la", "le", "les", "ou", "par", "pour", "que", "qui", "sur", "un", "une",
];

const GERMAN: &[&str] = &[
    "das", "dem", "den", "der", "des", "die", "ein", "eine", "einer", "es", "im", "in", "ist",
    "mit", "muss", "oder", "sind", "und", "von", "zu",
];

/// The second language filtered alongside English.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopwordLanguage {
    #[default]
    Italian,
    Spanish,
    French,
    German,
}

impl StopwordLanguage {
    fn words(self) -> &'static [&'static str] {
        match self {
            Self::Italian => ITALIAN,
            Self::Spanish => SPANISH,
            Self::French => FRENCH,
            Self::German => GERMAN,
        }
    }
}

/// True when `token` (already lowercased and accent-folded) is a stopword in
/// English or `second`.
pub fn is_stopword(token: &str, second: StopwordLanguage) -> bool {
    ENGLISH.contains(&token) || second.words().contains(&token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_always_filtered() {
        for lang in [
            StopwordLanguage::Italian,
            StopwordLanguage::Spanish,
            StopwordLanguage::French,
            StopwordLanguage::German,
        ] {
            assert!(is_stopword("the", lang));
        }
    }

    #[test]
    fn test_second_language_selectable() {
        assert!(is_stopword("della", StopwordLanguage::Italian));
        assert!(!is_stopword("della", StopwordLanguage::German));
        assert!(is_stopword("und", StopwordLanguage::German));
        assert!(!is_stopword("email", StopwordLanguage::Italian));
    }
}
