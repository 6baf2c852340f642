//! Verdicts, per-candidate verdict rows and the candidates × tests matrix.

pub mod parser;

pub use parser::{parse_line, parse_response, LineParse, ParseError, ParsedResponse};

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Reason recorded when the judge returned fewer verdicts than tests.
pub const MISSING_VERDICT_REASON: &str = "no verdict returned";

/// Outcome of judging one (candidate, test) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail { reason: String },
}

impl Verdict {
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail {
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Pass => None,
            Self::Fail { reason } => Some(reason),
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "OK"),
            Self::Fail { reason } => write!(f, "KO - {}", reason),
        }
    }
}

/// Ordered verdicts of one candidate, one per test in test order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictRow {
    pub candidate: usize,
    pub verdicts: Vec<Verdict>,
}

impl VerdictRow {
    pub fn new(candidate: usize, verdicts: Vec<Verdict>) -> Self {
        Self {
            candidate,
            verdicts,
        }
    }

    /// A row failing every test with the same reason.
    pub fn all_failed(candidate: usize, test_count: usize, reason: &str) -> Self {
        Self::new(candidate, vec![Verdict::fail(reason); test_count])
    }

    pub fn passed(&self) -> usize {
        self.verdicts.iter().filter(|v| v.is_pass()).count()
    }

    pub fn total(&self) -> usize {
        self.verdicts.len()
    }

    /// `passed / total`, or `None` for an empty row (treated as failing).
    pub fn pass_rate(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.passed() as f64 / total as f64),
        }
    }

    pub fn is_perfect(&self) -> bool {
        self.total() > 0 && self.passed() == self.total()
    }

    /// Pad with [`MISSING_VERDICT_REASON`] failures or truncate extras so the
    /// row has exactly `test_count` verdicts.
    pub fn fit_to(mut self, test_count: usize) -> Self {
        let got = self.verdicts.len();
        if got > test_count {
            warn!(
                candidate = self.candidate,
                got,
                expected = test_count,
                "judge returned extra verdicts; truncating"
            );
            self.verdicts.truncate(test_count);
        } else if got < test_count {
            warn!(
                candidate = self.candidate,
                got,
                expected = test_count,
                "judge returned too few verdicts; padding with failures"
            );
            self.verdicts
                .resize(test_count, Verdict::fail(MISSING_VERDICT_REASON));
        }
        self
    }

    /// `(test index, reason)` for every failed test.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &str)> {
        self.verdicts
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.reason().map(|r| (i, r)))
    }
}

/// Verdict rows keyed by stable candidate index.
///
/// Rows are stored in a `BTreeMap`, so iteration order is candidate order no
/// matter in which order judge calls completed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictMatrix {
    test_count: usize,
    rows: BTreeMap<usize, VerdictRow>,
    /// Candidates the judge never saw because its circuit was open.
    #[serde(default)]
    unjudged: BTreeSet<usize>,
    #[serde(default)]
    retry_after_ms: Option<u64>,
}

impl VerdictMatrix {
    pub fn new(test_count: usize) -> Self {
        Self {
            test_count,
            rows: BTreeMap::new(),
            unjudged: BTreeSet::new(),
            retry_after_ms: None,
        }
    }

    /// Build a matrix from rows, fitting each to `test_count`.
    pub fn from_rows(test_count: usize, rows: impl IntoIterator<Item = VerdictRow>) -> Self {
        let mut matrix = Self::new(test_count);
        for row in rows {
            matrix.insert(row);
        }
        matrix
    }

    /// Insert (or replace) a row, fitting it to the matrix width.
    pub fn insert(&mut self, row: VerdictRow) {
        let row = row.fit_to(self.test_count);
        self.rows.insert(row.candidate, row);
    }

    pub fn test_count(&self) -> usize {
        self.test_count
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, candidate: usize) -> Option<&VerdictRow> {
        self.rows.get(&candidate)
    }

    pub fn rows(&self) -> impl Iterator<Item = &VerdictRow> {
        self.rows.values()
    }

    pub fn candidates(&self) -> impl Iterator<Item = usize> + '_ {
        self.rows.keys().copied()
    }

    /// Total number of verdicts across all rows.
    pub fn verdict_count(&self) -> usize {
        self.rows.values().map(VerdictRow::total).sum()
    }

    pub fn pass_rates(&self) -> BTreeMap<usize, Option<f64>> {
        self.rows
            .iter()
            .map(|(idx, row)| (*idx, row.pass_rate()))
            .collect()
    }

    /// Record that `candidate` was refused by an open judge circuit. Its row
    /// (all `FAIL`) says nothing about quality. The longest `retry_after`
    /// seen is kept.
    pub fn mark_unjudged(&mut self, candidate: usize, retry_after: Duration) {
        self.unjudged.insert(candidate);
        let ms = retry_after.as_millis() as u64;
        self.retry_after_ms = Some(self.retry_after_ms.map_or(ms, |prev| prev.max(ms)));
    }

    pub fn unjudged(&self) -> impl Iterator<Item = usize> + '_ {
        self.unjudged.iter().copied()
    }

    pub fn unjudged_count(&self) -> usize {
        self.unjudged.len()
    }

    /// How long until the judge circuit admits calls again, if any row was
    /// refused.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(candidate: usize, pattern: &str) -> VerdictRow {
        let verdicts = pattern
            .chars()
            .map(|c| match c {
                'P' => Verdict::Pass,
                _ => Verdict::fail("wrong column"),
            })
            .collect();
        VerdictRow::new(candidate, verdicts)
    }

    #[test]
    fn test_pass_rate_bounds() {
        for pattern in ["PPPPP", "PPFPF", "FFFFF", "P", "F"] {
            let r = row(0, pattern);
            let rate = r.pass_rate().unwrap();
            assert!((0.0..=1.0).contains(&rate));
            assert_eq!(rate == 1.0, r.verdicts.iter().all(Verdict::is_pass));
        }
    }

    #[test]
    fn test_empty_row_has_no_pass_rate() {
        let r = VerdictRow::new(3, vec![]);
        assert_eq!(r.pass_rate(), None);
        assert!(!r.is_perfect());
    }

    #[test]
    fn test_fit_pads_and_truncates() {
        let padded = row(0, "PP").fit_to(4);
        assert_eq!(padded.total(), 4);
        assert_eq!(padded.verdicts[3].reason(), Some(MISSING_VERDICT_REASON));

        let truncated = row(0, "PPPFF").fit_to(3);
        assert_eq!(truncated.total(), 3);
        assert!(truncated.is_perfect());
    }

    #[test]
    fn test_unjudged_rows_keep_longest_retry_after() {
        let mut m = VerdictMatrix::new(2);
        assert_eq!(m.retry_after(), None);
        m.mark_unjudged(1, Duration::from_secs(30));
        m.mark_unjudged(0, Duration::from_secs(90));
        m.mark_unjudged(1, Duration::from_secs(10));
        assert_eq!(m.unjudged().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(m.unjudged_count(), 2);
        assert_eq!(m.retry_after(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_matrix_orders_rows_by_candidate() {
        let m = VerdictMatrix::from_rows(2, vec![row(2, "PF"), row(0, "PP"), row(1, "FF")]);
        let order: Vec<usize> = m.candidates().collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert_eq!(m.verdict_count(), 6);
        assert_eq!(m.pass_rates()[&2], Some(0.5));
    }

    #[test]
    fn test_failures_lists_indices() {
        let r = row(0, "PFPF");
        let failed: Vec<usize> = r.failures().map(|(i, _)| i).collect();
        assert_eq!(failed, vec![1, 3]);
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(Verdict::Pass.to_string(), "OK");
        assert_eq!(Verdict::fail("missing join").to_string(), "KO - missing join");
    }
}
