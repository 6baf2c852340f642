//! Error taxonomy for the decision core.
//!
//! Only [`ArbiterError`] ever escapes a request. Everything else is either
//! absorbed and logged (malformed verdicts, advisor failures, judge call
//! failures) or carried as data inside a `SelectionResult`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;

/// Why a selection attempt produced no SQL. Routed to escalation; all kinds
/// but [`SelectionFailure::JudgeUnavailable`] may consume retry budget.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionFailure {
    #[error("no SQL candidates were produced")]
    NoCandidates,

    #[error("no test assertions survived generation and deduplication")]
    NoTests,

    #[error("the judge returned no verdicts")]
    NoVerdicts,

    #[error("best pass rate {} below threshold {:.0}%", fmt_rate(.best_pass_rate), .threshold * 100.0)]
    BelowThreshold {
        best_pass_rate: Option<f64>,
        threshold: f64,
    },

    /// The judge circuit was open, so some candidates were never judged. Says
    /// nothing about candidate quality.
    #[error("judge unavailable: {unjudged} candidate(s) not judged, retry after {retry_after_secs}s")]
    JudgeUnavailable {
        unjudged: usize,
        retry_after_secs: u64,
    },
}

impl SelectionFailure {
    /// Stable tag for logs and the audit trail.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoCandidates => "no_candidates",
            Self::NoTests => "no_tests",
            Self::NoVerdicts => "no_verdicts",
            Self::BelowThreshold { .. } => "below_threshold",
            Self::JudgeUnavailable { .. } => "judge_unavailable",
        }
    }

    /// Whether a retry at a higher tier could plausibly help.
    pub fn is_escalatable(&self) -> bool {
        !matches!(self, Self::JudgeUnavailable { .. })
    }
}

fn fmt_rate(rate: &Option<f64>) -> String {
    match rate {
        Some(r) => format!("{:.0}%", r * 100.0),
        None => "n/a".to_string(),
    }
}

/// Request-level errors. A failed selection is not an error; see
/// [`SelectionFailure`].
#[derive(Debug, Error)]
pub enum ArbiterError {
    /// The originator cancelled the request; no result is produced.
    #[error("request cancelled")]
    Cancelled,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_threshold_message() {
        let f = SelectionFailure::BelowThreshold {
            best_pass_rate: Some(0.5),
            threshold: 0.9,
        };
        assert_eq!(f.to_string(), "best pass rate 50% below threshold 90%");
        assert_eq!(f.kind(), "below_threshold");

        let f = SelectionFailure::BelowThreshold {
            best_pass_rate: None,
            threshold: 0.9,
        };
        assert!(f.to_string().contains("n/a"));
    }

    #[test]
    fn test_judge_unavailable_is_not_escalatable() {
        let f = SelectionFailure::JudgeUnavailable {
            unjudged: 2,
            retry_after_secs: 95,
        };
        assert_eq!(f.kind(), "judge_unavailable");
        assert!(!f.is_escalatable());
        assert!(f.to_string().contains("retry after 95s"));
        assert!(SelectionFailure::NoVerdicts.is_escalatable());
    }

    #[test]
    fn test_structural_failures_are_distinct() {
        let kinds: Vec<_> = [
            SelectionFailure::NoCandidates,
            SelectionFailure::NoTests,
            SelectionFailure::NoVerdicts,
        ]
        .iter()
        .map(SelectionFailure::kind)
        .collect();
        assert_eq!(kinds, vec!["no_candidates", "no_tests", "no_verdicts"]);
    }
}
