//! Near-duplicate collapsing for judge test assertions.
//!
//! Every surviving test costs one verdict per candidate, so paraphrases of the
//! same check are collapsed before the judge sees them. Comparison happens on
//! the normalized form (see [`normalize`]); the kept entry is always an
//! original producer string.
//!
//! Match order for a new test against each kept test:
//!
//! 1. exact normalized equality
//! 2. substring containment with `len(shorter)/len(longer) ≥ length_ratio_threshold`
//! 3. token-set Jaccard ≥ `jaccard_threshold` (stopwords removed)
//! 4. normalized Levenshtein similarity ≥ `sequence_threshold`
//! 5. Jaccard and sequence similarity both within their margins of threshold
//!
//! Rules 2-5 only apply when both tests carry the same sequence of comparison
//! operators and numbers: `amount > 100` and `amount < 100` are different
//! checks however similar the text.

pub mod normalize;
pub mod stopwords;

pub use normalize::{has_priority_tag, normalize, NormalizedTest, EVIDENCE_CRITICAL_TAG};
pub use stopwords::StopwordLanguage;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use normalize::{is_sentinel, literal_signature, token_set};

/// Deduplication thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub length_ratio_threshold: f64,
    pub jaccard_threshold: f64,
    pub sequence_threshold: f64,
    /// How far below `jaccard_threshold` still counts when sequence is also close.
    pub jaccard_margin: f64,
    /// How far below `sequence_threshold` still counts when Jaccard is also close.
    pub sequence_margin: f64,
    /// A duplicate replaces the kept text when it is this much longer (0.15 = 15%).
    pub longer_preference_ratio: f64,
    pub second_language: StopwordLanguage,
    /// Never merge tests whose numbers or comparison operators differ, however
    /// similar the rest of the text is ("from 2023" vs "from 2024").
    pub guard_literals: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            length_ratio_threshold: 0.90,
            jaccard_threshold: 0.88,
            sequence_threshold: 0.92,
            jaccard_margin: 0.05,
            sequence_margin: 0.03,
            longer_preference_ratio: 0.15,
            second_language: StopwordLanguage::Italian,
            guard_literals: true,
        }
    }
}

/// Which rule matched two tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Substring,
    Jaccard,
    Sequence,
    Combined,
}

/// Counters from one reduction, for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupReport {
    pub input: usize,
    pub sentinels_dropped: usize,
    pub duplicates_collapsed: usize,
    pub output: usize,
}

#[derive(Debug, Clone)]
struct KeptTest {
    original: String,
    normalized: String,
    tokens: BTreeSet<String>,
    literals: Vec<String>,
    has_priority: bool,
}

/// Collapses near-duplicate tests; deterministic and order-preserving.
#[derive(Debug, Clone, Default)]
pub struct TestDeduplicator {
    config: DedupConfig,
}

impl TestDeduplicator {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    pub fn reduce(&self, tests: &[String]) -> Vec<String> {
        self.reduce_with_report(tests).0
    }

    /// Reduce `tests` and report what was dropped.
    ///
    /// A replacement can make a kept entry newly similar to an earlier one, so
    /// passes repeat until nothing collapses; the output therefore contains no
    /// pair that would match, which makes `reduce` idempotent.
    pub fn reduce_with_report(&self, tests: &[String]) -> (Vec<String>, DedupReport) {
        let mut report = DedupReport {
            input: tests.len(),
            ..Default::default()
        };

        let mut current: Vec<KeptTest> = Vec::with_capacity(tests.len());
        for raw in tests {
            let n = normalize(raw);
            if is_sentinel(&n.text) {
                report.sentinels_dropped += 1;
                continue;
            }
            current.push(KeptTest {
                original: raw.trim().to_string(),
                tokens: token_set(&n.text, self.config.second_language),
                literals: literal_signature(&n.text),
                normalized: n.text,
                has_priority: n.has_priority,
            });
        }

        loop {
            let before = current.len();
            current = self.pass(current);
            report.duplicates_collapsed += before - current.len();
            if current.len() == before {
                break;
            }
        }

        let out: Vec<String> = current.into_iter().map(|k| k.original).collect();
        report.output = out.len();
        debug!(
            input = report.input,
            sentinels = report.sentinels_dropped,
            collapsed = report.duplicates_collapsed,
            output = report.output,
            "deduplicated test assertions"
        );
        (out, report)
    }

    fn pass(&self, entries: Vec<KeptTest>) -> Vec<KeptTest> {
        let mut kept: Vec<KeptTest> = Vec::with_capacity(entries.len());
        for entry in entries {
            let hit = kept
                .iter()
                .position(|k| self.match_kind(&entry, k).is_some());
            match hit {
                Some(idx) => self.merge(&mut kept[idx], entry),
                None => kept.push(entry),
            }
        }
        kept
    }

    fn merge(&self, kept: &mut KeptTest, incoming: KeptTest) {
        if incoming.has_priority && !kept.has_priority {
            debug!(kept = %kept.original, tagged = %incoming.original, "upgrading kept test to tagged variant");
            *kept = incoming;
            return;
        }
        if kept.has_priority && !incoming.has_priority {
            return;
        }
        let kept_len = kept.normalized.chars().count() as f64;
        let incoming_len = incoming.normalized.chars().count() as f64;
        if incoming_len > kept_len * (1.0 + self.config.longer_preference_ratio) {
            debug!(kept = %kept.original, longer = %incoming.original, "preferring longer duplicate");
            *kept = incoming;
        }
    }

    fn match_kind(&self, a: &KeptTest, b: &KeptTest) -> Option<MatchKind> {
        if a.normalized == b.normalized {
            return Some(MatchKind::Exact);
        }
        if self.config.guard_literals && a.literals != b.literals {
            return None;
        }

        let (shorter, longer) = if a.normalized.len() <= b.normalized.len() {
            (&a.normalized, &b.normalized)
        } else {
            (&b.normalized, &a.normalized)
        };
        if longer.contains(shorter.as_str()) {
            let ratio = shorter.chars().count() as f64 / longer.chars().count() as f64;
            if ratio >= self.config.length_ratio_threshold {
                return Some(MatchKind::Substring);
            }
        }

        let jaccard = jaccard(&a.tokens, &b.tokens);
        if jaccard >= self.config.jaccard_threshold {
            return Some(MatchKind::Jaccard);
        }

        let sequence = strsim::normalized_levenshtein(&a.normalized, &b.normalized);
        if sequence >= self.config.sequence_threshold {
            return Some(MatchKind::Sequence);
        }

        if jaccard >= self.config.jaccard_threshold - self.config.jaccard_margin
            && sequence >= self.config.sequence_threshold - self.config.sequence_margin
        {
            return Some(MatchKind::Combined);
        }

        None
    }
}

/// Jaccard similarity of two token sets; 0 when either is empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}
