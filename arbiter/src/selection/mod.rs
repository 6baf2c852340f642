//! Selection engine: turns a classified verdict matrix into one SQL or a
//! structured failure.
//!
//! ```text
//! preconditions ──fail──▶ NoCandidates | NoTests | NoVerdicts
//!      │
//! classify ──Selected(i)──────────────▶ success (direct)
//!      ├──MultiplePerfect / MultipleBest
//!      │     ├─ enhanced + advisor ──valid choice──▶ success (advisor)
//!      │     └─ complexity tie-break (random among equal scores) ──▶ success
//!      └──AllFailed ─────────────────▶ BelowThreshold + operator failure detail
//! ```

pub mod advisor;
pub mod tie_break;

pub use advisor::{Advisor, AdvisorBrief, AdvisorChoice, AdvisorConsultation, AdvisorError};
pub use tie_break::{TieBreak, TieBreaker};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::SelectionFailure;
use crate::evaluation::{Classification, EvaluationClassifier, OutcomeCase, QualityTier, Selection};
use crate::verdict::VerdictMatrix;

/// A chosen SQL with its index in the attempt's candidate pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub index: usize,
    pub sql: String,
}

/// How the returned candidate was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    /// The classifier named a single candidate.
    Direct,
    /// Enhanced consultation picked a finalist.
    Advisor,
    /// Lowest complexity score among finalists.
    Complexity,
    /// Random draw among finalists sharing the lowest complexity score.
    RandomTieBreak,
    /// Nothing selected.
    None,
}

impl std::fmt::Display for SelectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Advisor => write!(f, "advisor"),
            Self::Complexity => write!(f, "complexity"),
            Self::RandomTieBreak => write!(f, "random_tie_break"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Per-candidate score line in the metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub passed: usize,
    pub total: usize,
    pub pass_rate: Option<f64>,
    /// Set for finalists that went through the complexity tie-break.
    pub complexity: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionMetrics {
    pub total_sqls: usize,
    pub total_tests: usize,
    pub threshold: f64,
    pub finalists: Vec<usize>,
    pub pass_rates: BTreeMap<usize, CandidateScore>,
    pub best_pass_rate: Option<f64>,
}

/// One failed test of the best-performing candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    pub test_index: usize,
    pub description: String,
    pub reason: String,
}

/// Operator-only detail attached to a below-threshold failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub candidate: usize,
    pub sql: String,
    pub pass_rate: Option<f64>,
    pub failures: Vec<TestFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionResult {
    pub success: bool,
    pub selected: Option<Candidate>,
    /// Operator-facing explanation.
    pub reason: String,
    pub failure: Option<SelectionFailure>,
    pub case: Option<OutcomeCase>,
    pub tier: Option<QualityTier>,
    pub method: SelectionMethod,
    pub metrics: SelectionMetrics,
    pub advisor_justification: Option<String>,
    /// Never shown to end users.
    pub failure_detail: Option<FailureDetail>,
}

impl SelectionResult {
    /// Summary safe to show to the end user; never contains judge reasoning.
    pub fn user_message(&self) -> String {
        match &self.failure {
            None => match self.tier {
                Some(QualityTier::Silver) => {
                    "Found a query that passes most validation checks.".to_string()
                }
                _ => "Found a query that passes all validation checks.".to_string(),
            },
            Some(SelectionFailure::NoCandidates) => {
                "No SQL query could be generated for this question.".to_string()
            }
            Some(SelectionFailure::NoTests) => {
                "Validation checks could not be prepared for this question.".to_string()
            }
            Some(SelectionFailure::NoVerdicts) => {
                "The generated queries could not be validated.".to_string()
            }
            Some(SelectionFailure::BelowThreshold {
                best_pass_rate,
                threshold,
            }) => format!(
                "No SQL met the required quality threshold (best {}, required {:.0}%).",
                best_pass_rate
                    .map(|r| format!("{:.0}%", r * 100.0))
                    .unwrap_or_else(|| "n/a".to_string()),
                threshold * 100.0
            ),
            Some(SelectionFailure::JudgeUnavailable {
                retry_after_secs, ..
            }) => format!(
                "Query validation is temporarily unavailable; please retry in about {retry_after_secs}s."
            ),
        }
    }
}

/// Inputs for one selection.
#[derive(Debug, Clone, Copy)]
pub struct SelectionRequest<'a> {
    pub candidates: &'a [String],
    pub tests: &'a [String],
    pub matrix: &'a VerdictMatrix,
    /// Pass-rate threshold in `[0, 1]`.
    pub threshold_ratio: f64,
    pub enhanced_enabled: bool,
    pub question: &'a str,
    pub schema_context: &'a str,
}

#[derive(Debug)]
pub struct SelectionEngine {
    classifier: EvaluationClassifier,
    tie_breaker: TieBreaker,
    advisor: Option<AdvisorConsultation>,
}

impl SelectionEngine {
    pub fn new(tie_break_seed: Option<u64>) -> Self {
        Self {
            classifier: EvaluationClassifier::new(),
            tie_breaker: TieBreaker::new(tie_break_seed),
            advisor: None,
        }
    }

    /// Enable enhanced consultation through `advisor`, bounded by `timeout`.
    pub fn with_advisor(mut self, advisor: Arc<dyn Advisor>, timeout: Duration) -> Self {
        self.advisor = Some(AdvisorConsultation::new(advisor, timeout));
        self
    }

    pub async fn select(&self, req: &SelectionRequest<'_>) -> SelectionResult {
        let mut metrics = SelectionMetrics {
            total_sqls: req.candidates.len(),
            total_tests: req.tests.len(),
            threshold: req.threshold_ratio,
            finalists: Vec::new(),
            pass_rates: score_lines(req.matrix),
            best_pass_rate: None,
        };

        let precondition = if req.candidates.is_empty() {
            Some(SelectionFailure::NoCandidates)
        } else if req.tests.is_empty() {
            Some(SelectionFailure::NoTests)
        } else if req.matrix.verdict_count() == 0 {
            Some(SelectionFailure::NoVerdicts)
        } else {
            None
        };
        if let Some(failure) = precondition {
            warn!(kind = failure.kind(), "selection preconditions not met");
            return failed(failure.to_string(), failure, None, metrics, None);
        }

        let classification = self.classifier.classify(req.matrix, req.threshold_ratio);
        metrics.finalists = classification.finalists();
        metrics.best_pass_rate = classification.best_pass_rate;

        match classification.selection.clone() {
            Selection::Selected(idx) => self.direct(req, &classification, idx, metrics),
            Selection::MultiplePerfect(finalists) | Selection::MultipleBest(finalists) => {
                self.resolve_tie(req, &classification, &finalists, metrics)
                    .await
            }
            Selection::AllFailed(_) if req.matrix.unjudged_count() > 0 => {
                judge_unavailable(req.matrix, &classification, metrics)
            }
            Selection::AllFailed(_) => below_threshold(req, &classification, metrics),
        }
    }

    fn direct(
        &self,
        req: &SelectionRequest<'_>,
        classification: &Classification,
        idx: usize,
        metrics: SelectionMetrics,
    ) -> SelectionResult {
        let reason = format!(
            "case {} ({}): candidate #{} at {}",
            classification.case,
            classification.tier,
            idx,
            rate_label(classification.pass_rates.get(&idx).copied().flatten())
        );
        succeed(req, classification, idx, SelectionMethod::Direct, reason, metrics, None)
    }

    async fn resolve_tie(
        &self,
        req: &SelectionRequest<'_>,
        classification: &Classification,
        finalists: &[usize],
        mut metrics: SelectionMetrics,
    ) -> SelectionResult {
        if req.enhanced_enabled && classification.is_borderline() {
            if let Some(advisor) = &self.advisor {
                let brief = AdvisorBrief::build(
                    req.question,
                    req.schema_context,
                    finalists,
                    req.candidates,
                    req.tests,
                    req.matrix,
                );
                match advisor.consult(brief).await {
                    Ok(choice) => {
                        let reason = format!(
                            "case {} ({}): advisor chose #{} among {:?}",
                            classification.case, classification.tier, choice.index, finalists
                        );
                        return succeed(
                            req,
                            classification,
                            choice.index,
                            SelectionMethod::Advisor,
                            reason,
                            metrics,
                            Some(choice.justification),
                        );
                    }
                    Err(err) => {
                        warn!(error = %err, "enhanced consultation unusable; falling back to tie-break");
                    }
                }
            }
        }

        let scored: Vec<(usize, &str)> = finalists
            .iter()
            .filter_map(|&i| req.candidates.get(i).map(|sql| (i, sql.as_str())))
            .collect();
        let Some(tie) = self.tie_breaker.choose(&scored) else {
            let failure = SelectionFailure::NoCandidates;
            return failed(failure.to_string(), failure, Some(classification), metrics, None);
        };
        for (idx, score) in &tie.scores {
            if let Some(line) = metrics.pass_rates.get_mut(idx) {
                line.complexity = Some(*score);
            }
        }
        let method = if tie.was_random() {
            SelectionMethod::RandomTieBreak
        } else {
            SelectionMethod::Complexity
        };
        let reason = format!(
            "case {} ({}): #{} simplest among {:?} (score {})",
            classification.case,
            classification.tier,
            tie.chosen,
            finalists,
            tie.scores.get(&tie.chosen).copied().unwrap_or_default()
        );
        succeed(req, classification, tie.chosen, method, reason, metrics, None)
    }
}

fn score_lines(matrix: &VerdictMatrix) -> BTreeMap<usize, CandidateScore> {
    matrix
        .rows()
        .map(|row| {
            (
                row.candidate,
                CandidateScore {
                    passed: row.passed(),
                    total: row.total(),
                    pass_rate: row.pass_rate(),
                    complexity: None,
                },
            )
        })
        .collect()
}

fn rate_label(rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!("{:.1}%", r * 100.0),
        None => "n/a".to_string(),
    }
}

fn succeed(
    req: &SelectionRequest<'_>,
    classification: &Classification,
    idx: usize,
    method: SelectionMethod,
    reason: String,
    metrics: SelectionMetrics,
    advisor_justification: Option<String>,
) -> SelectionResult {
    let Some(sql) = req.candidates.get(idx) else {
        warn!(candidate = idx, "verdict row for unknown candidate");
        let failure = SelectionFailure::NoVerdicts;
        return failed(failure.to_string(), failure, Some(classification), metrics, None);
    };
    info!(
        candidate = idx,
        case = %classification.case,
        tier = %classification.tier,
        method = %method,
        "candidate selected"
    );
    SelectionResult {
        success: true,
        selected: Some(Candidate {
            index: idx,
            sql: sql.clone(),
        }),
        reason,
        failure: None,
        case: Some(classification.case),
        tier: Some(classification.tier),
        method,
        metrics,
        advisor_justification,
        failure_detail: None,
    }
}

fn failed(
    reason: String,
    failure: SelectionFailure,
    classification: Option<&Classification>,
    metrics: SelectionMetrics,
    failure_detail: Option<FailureDetail>,
) -> SelectionResult {
    SelectionResult {
        success: false,
        selected: None,
        reason,
        failure: Some(failure),
        case: classification.map(|c| c.case),
        tier: classification.map(|c| c.tier),
        method: SelectionMethod::None,
        metrics,
        advisor_justification: None,
        failure_detail,
    }
}

/// Nothing passed, but some candidates were refused by the judge circuit:
/// report the outage rather than a quality verdict.
fn judge_unavailable(
    matrix: &VerdictMatrix,
    classification: &Classification,
    metrics: SelectionMetrics,
) -> SelectionResult {
    let retry_after_secs = matrix
        .retry_after()
        .map(|d| d.as_millis().div_ceil(1000) as u64)
        .unwrap_or_default();
    let failure = SelectionFailure::JudgeUnavailable {
        unjudged: matrix.unjudged_count(),
        retry_after_secs,
    };
    warn!(
        unjudged = matrix.unjudged_count(),
        retry_after_secs, "judge circuit open; no candidate could be judged to threshold"
    );
    failed(failure.to_string(), failure, Some(classification), metrics, None)
}

fn below_threshold(
    req: &SelectionRequest<'_>,
    classification: &Classification,
    metrics: SelectionMetrics,
) -> SelectionResult {
    let failure = SelectionFailure::BelowThreshold {
        best_pass_rate: classification.best_pass_rate,
        threshold: req.threshold_ratio,
    };

    // Best row: highest pass rate, lowest index on ties.
    let best = req
        .matrix
        .rows()
        .max_by(|a, b| {
            let ra = a.pass_rate().unwrap_or(-1.0);
            let rb = b.pass_rate().unwrap_or(-1.0);
            ra.total_cmp(&rb).then(b.candidate.cmp(&a.candidate))
        })
        .map(|row| FailureDetail {
            candidate: row.candidate,
            sql: req.candidates.get(row.candidate).cloned().unwrap_or_default(),
            pass_rate: row.pass_rate(),
            failures: row
                .failures()
                .map(|(test_index, reason)| TestFailure {
                    test_index,
                    description: req.tests.get(test_index).cloned().unwrap_or_default(),
                    reason: reason.to_string(),
                })
                .collect(),
        });

    if let Some(detail) = &best {
        warn!(
            candidate = detail.candidate,
            pass_rate = ?detail.pass_rate,
            failed_tests = detail.failures.len(),
            threshold = req.threshold_ratio,
            "no candidate reached threshold"
        );
    }
    failed(failure.to_string(), failure, Some(classification), metrics, best)
}
