//! Four-way outcome classification of a verdict matrix.
//!
//! ```text
//! perfect = { i : pass_rate(i) = 1.0 }       above = { i : pass_rate(i) ≥ threshold }
//!
//! |perfect| = 1                       → A  GOLD    selected
//! |perfect| > 1                       → B  GOLD    MULTIPLE_PERFECT (finalists = perfect)
//! |perfect| = 0, |above| = 1          → A  SILVER  selected
//! |perfect| = 0, |above| > 1, 1 best  → C  SILVER  selected
//! |perfect| = 0, |above| > 1, n best  → B  SILVER  MULTIPLE_BEST (finalists = best set)
//! |above| = 0                         → D  FAILED  ALL_FAILED (finalists = all)
//! ```
//!
//! The classifier never breaks ties; it only narrows to finalists.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::verdict::VerdictMatrix;

/// Tolerance for pass-rate comparisons.
pub const RATE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeCase {
    /// Single perfect (or single above-threshold) candidate.
    A,
    /// Several candidates tied for the best outcome.
    B,
    /// Borderline: several above threshold, one unique leader.
    C,
    /// Nobody reached the threshold.
    D,
}

impl std::fmt::Display for OutcomeCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
            Self::C => write!(f, "C"),
            Self::D => write!(f, "D"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Gold,
    Silver,
    Failed,
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gold => write!(f, "gold"),
            Self::Silver => write!(f, "silver"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Either a single chosen index or a marker with its finalists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "marker", content = "indices", rename_all = "snake_case")]
pub enum Selection {
    Selected(usize),
    MultiplePerfect(Vec<usize>),
    MultipleBest(Vec<usize>),
    AllFailed(Vec<usize>),
}

/// Result of classifying one attempt's verdict matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub case: OutcomeCase,
    pub tier: QualityTier,
    pub selection: Selection,
    /// `None` for candidates with an empty row.
    pub pass_rates: BTreeMap<usize, Option<f64>>,
    pub best_pass_rate: Option<f64>,
}

impl Classification {
    pub fn selected(&self) -> Option<usize> {
        match self.selection {
            Selection::Selected(i) => Some(i),
            _ => None,
        }
    }

    /// Candidates still in contention (the selected one, if any).
    pub fn finalists(&self) -> Vec<usize> {
        match &self.selection {
            Selection::Selected(i) => vec![*i],
            Selection::MultiplePerfect(v) | Selection::MultipleBest(v) | Selection::AllFailed(v) => {
                v.clone()
            }
        }
    }

    /// B or C: ties to resolve, or a non-perfect leader among several passing.
    pub fn is_borderline(&self) -> bool {
        matches!(self.case, OutcomeCase::B | OutcomeCase::C)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluationClassifier;

impl EvaluationClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, matrix: &VerdictMatrix, threshold_ratio: f64) -> Classification {
        let pass_rates = matrix.pass_rates();
        let best_pass_rate = pass_rates
            .values()
            .flatten()
            .copied()
            .fold(None, |acc: Option<f64>, r| Some(acc.map_or(r, |a| a.max(r))));

        let perfect: Vec<usize> = matrix
            .rows()
            .filter(|r| r.is_perfect())
            .map(|r| r.candidate)
            .collect();
        let above: Vec<(usize, f64)> = pass_rates
            .iter()
            .filter_map(|(i, r)| r.map(|r| (*i, r)))
            .filter(|(_, r)| *r + RATE_EPSILON >= threshold_ratio)
            .collect();

        let perfect_count = perfect.len();
        let (case, tier, selection) = match (perfect_count, above.len()) {
            (1, _) => (OutcomeCase::A, QualityTier::Gold, Selection::Selected(perfect[0])),
            (n, _) if n > 1 => (
                OutcomeCase::B,
                QualityTier::Gold,
                Selection::MultiplePerfect(perfect),
            ),
            (_, 0) => (
                OutcomeCase::D,
                QualityTier::Failed,
                Selection::AllFailed(matrix.candidates().collect()),
            ),
            (_, 1) => (
                OutcomeCase::A,
                QualityTier::Silver,
                Selection::Selected(above[0].0),
            ),
            _ => {
                let best = above.iter().map(|(_, r)| *r).fold(f64::MIN, f64::max);
                let best_set: Vec<usize> = above
                    .iter()
                    .filter(|(_, r)| (best - r).abs() <= RATE_EPSILON)
                    .map(|(i, _)| *i)
                    .collect();
                if best_set.len() == 1 {
                    (
                        OutcomeCase::C,
                        QualityTier::Silver,
                        Selection::Selected(best_set[0]),
                    )
                } else {
                    (
                        OutcomeCase::B,
                        QualityTier::Silver,
                        Selection::MultipleBest(best_set),
                    )
                }
            }
        };

        debug!(
            case = %case,
            tier = %tier,
            perfect = perfect_count,
            above = above.len(),
            threshold = threshold_ratio,
            "classified verdict matrix"
        );

        Classification {
            case,
            tier,
            selection,
            pass_rates,
            best_pass_rate,
        }
    }
}
