//! Request pipeline: generate → deduplicate → judge → select → escalate.
//!
//! ```text
//! for tier in start..=Expert (bounded by attempts_budget):
//!     candidates ∥ tests          (producers; errors become empty output)
//!     tests      → TestDeduplicator
//!     candidates × tests → VerdictCollector → VerdictMatrix
//!     matrix     → SelectionEngine → SelectionResult
//!     success    → done
//!     failure    → EscalationManager → next tier with EscalationContext | terminal
//!     judge down → terminal, budget untouched
//! ```
//!
//! Attempts run strictly one after another; only the judge calls inside one
//! attempt are concurrent. Cancellation is checked at every suspension point
//! and ends the request with [`ArbiterError::Cancelled`] and no result.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ArbiterConfig;
use crate::dedup::{DedupReport, TestDeduplicator};
use crate::error::{ArbiterError, SelectionFailure};
use crate::escalation::{
    EscalationContext, EscalationDecision, EscalationManager, EscalationState, EscalationTier,
};
use crate::evaluation::{Judge, VerdictCollector};
use crate::resilience::{CircuitBreaker, CircuitSnapshot, TimeBoundedExecutor};
use crate::selection::{Advisor, Candidate, SelectionEngine, SelectionRequest, SelectionResult};
use crate::verdict::VerdictMatrix;

/// What a producer is asked for in one attempt.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub question: &'a str,
    pub schema_context: &'a str,
    pub evidence: &'a str,
    pub tier: EscalationTier,
    /// Present on retries after an escalation.
    pub escalation: Option<&'a EscalationContext>,
    /// Desired number of test assertions.
    pub test_count: usize,
}

/// Produces SQL candidates. An empty list is a valid answer.
#[async_trait]
pub trait CandidateProducer: Send + Sync {
    async fn generate(&self, request: &GenerationRequest<'_>) -> anyhow::Result<Vec<String>>;
}

/// Produces natural-language test assertions, possibly tagged
/// `[EVIDENCE-CRITICAL]`.
#[async_trait]
pub trait TestProducer: Send + Sync {
    async fn generate_tests(&self, request: &GenerationRequest<'_>)
        -> anyhow::Result<Vec<String>>;
}

/// One user request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterRequest {
    pub question: String,
    pub schema_context: String,
    pub evidence: String,
    pub start_tier: EscalationTier,
}

/// Inputs to [`Arbiter::evaluate_and_select`].
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub candidates: &'a [String],
    pub tests: &'a [String],
    pub question: &'a str,
    pub schema_context: &'a str,
    pub threshold_percent: f64,
    pub enhanced_enabled: bool,
}

/// Selection plus what the judge actually saw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub tests: Vec<String>,
    pub dedup: DedupReport,
    pub result: SelectionResult,
}

/// Record of one attempt, for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub tier: EscalationTier,
    pub candidates: Vec<String>,
    pub evaluation: Evaluation,
    pub decision: Option<EscalationDecision>,
}

/// Final outcome of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub success: bool,
    pub selected: Option<Candidate>,
    pub final_tier: EscalationTier,
    pub attempts: Vec<AttemptRecord>,
    /// Safe to show to the end user.
    pub user_message: String,
    /// Judge breaker at the end of the request, for operators.
    pub judge_circuit: CircuitSnapshot,
}

impl RequestOutcome {
    pub fn final_result(&self) -> Option<&SelectionResult> {
        self.attempts.last().map(|a| &a.evaluation.result)
    }
}

/// Composition root for one process: owns the components, borrows the shared
/// circuit breaker.
pub struct Arbiter {
    config: ArbiterConfig,
    candidate_producer: Arc<dyn CandidateProducer>,
    test_producer: Arc<dyn TestProducer>,
    collector: VerdictCollector,
    deduplicator: TestDeduplicator,
    engine: SelectionEngine,
    escalation: EscalationManager,
}

impl Arbiter {
    /// Fails with [`ArbiterError::Config`] when `config` does not validate.
    pub fn new(
        config: ArbiterConfig,
        candidate_producer: Arc<dyn CandidateProducer>,
        test_producer: Arc<dyn TestProducer>,
        judge: Arc<dyn Judge>,
        judge_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, ArbiterError> {
        config.validate()?;
        let collector = VerdictCollector::new(
            judge,
            judge_breaker,
            TimeBoundedExecutor::from_secs(config.judge.timeout_seconds),
            config.judge.max_concurrency,
        );
        Ok(Self {
            deduplicator: TestDeduplicator::new(config.dedup.clone()),
            engine: SelectionEngine::new(config.selection.tie_break_seed),
            escalation: EscalationManager::new(config.escalation.clone()),
            collector,
            candidate_producer,
            test_producer,
            config,
        })
    }

    /// Enable enhanced consultation (still gated by `enhanced_enabled`).
    pub fn with_advisor(mut self, advisor: Arc<dyn Advisor>) -> Self {
        let timeout = Duration::from_secs(self.config.selection.advisor_timeout_secs);
        self.engine = self.engine.with_advisor(advisor, timeout);
        self
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    pub fn judge_circuit(&self) -> CircuitSnapshot {
        self.collector.breaker().snapshot()
    }

    /// Deduplicate tests, judge every candidate against them and select.
    pub async fn evaluate_and_select(
        &self,
        input: EvaluationInput<'_>,
        cancel: &CancellationToken,
    ) -> Result<Evaluation, ArbiterError> {
        let (tests, dedup) = self.deduplicator.reduce_with_report(input.tests);

        let matrix = if input.candidates.is_empty() || tests.is_empty() {
            VerdictMatrix::new(tests.len())
        } else {
            self.collector
                .collect(input.candidates, &tests, cancel)
                .await?
        };

        let request = SelectionRequest {
            candidates: input.candidates,
            tests: &tests,
            matrix: &matrix,
            threshold_ratio: input.threshold_percent / 100.0,
            enhanced_enabled: input.enhanced_enabled,
            question: input.question,
            schema_context: input.schema_context,
        };
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ArbiterError::Cancelled),
            result = self.engine.select(&request) => result,
        };

        Ok(Evaluation {
            tests,
            dedup,
            result,
        })
    }

    /// Escalation decision for a finished attempt. A successful result never
    /// escalates.
    pub fn decide_escalation(
        &self,
        result: &SelectionResult,
        question: &str,
        candidates: &[String],
        state: EscalationState,
    ) -> EscalationDecision {
        match &result.failure {
            None if result.success => EscalationDecision {
                escalate: false,
                next_tier: None,
                context: None,
                attempts_used: state.attempts_used,
                user_message: None,
            },
            failure => {
                let failure = failure.clone().unwrap_or(SelectionFailure::NoVerdicts);
                self.escalation
                    .decide(&failure, Some(result), question, candidates, state)
            }
        }
    }

    /// Run a request to completion across tiers.
    pub async fn run(
        &self,
        request: &ArbiterRequest,
        cancel: &CancellationToken,
    ) -> Result<RequestOutcome, ArbiterError> {
        let mut state = EscalationState::new(request.start_tier);
        let mut context: Option<EscalationContext> = None;
        let mut attempts: Vec<AttemptRecord> = Vec::new();

        loop {
            if cancel.is_cancelled() {
                return Err(ArbiterError::Cancelled);
            }
            let attempt = attempts.len() as u32;
            info!(attempt, tier = %state.tier, escalated = context.is_some(), "starting attempt");

            let generation = GenerationRequest {
                question: &request.question,
                schema_context: &request.schema_context,
                evidence: &request.evidence,
                tier: state.tier,
                escalation: context.as_ref(),
                test_count: self.config.generation.test_count,
            };
            let (candidates, tests) = self.produce(&generation, cancel).await?;

            let evaluation = self
                .evaluate_and_select(
                    EvaluationInput {
                        candidates: &candidates,
                        tests: &tests,
                        question: &request.question,
                        schema_context: &request.schema_context,
                        threshold_percent: self.config.selection.threshold_percent,
                        enhanced_enabled: self.config.selection.enhanced_enabled,
                    },
                    cancel,
                )
                .await?;

            if evaluation.result.success {
                let user_message = evaluation.result.user_message();
                let selected = evaluation.result.selected.clone();
                attempts.push(AttemptRecord {
                    attempt,
                    tier: state.tier,
                    candidates,
                    evaluation,
                    decision: None,
                });
                info!(attempt, tier = %state.tier, "request satisfied");
                return Ok(RequestOutcome {
                    success: true,
                    selected,
                    final_tier: state.tier,
                    attempts,
                    user_message,
                    judge_circuit: self.judge_circuit(),
                });
            }

            let decision =
                self.decide_escalation(&evaluation.result, &request.question, &candidates, state);
            let escalate = decision.escalate;
            let next_context = decision.context.clone();
            let terminal_message = decision.user_message.clone();
            state.apply(&decision);
            attempts.push(AttemptRecord {
                attempt,
                tier: generation.tier,
                candidates,
                evaluation,
                decision: Some(decision),
            });

            if !escalate {
                return Ok(RequestOutcome {
                    success: false,
                    selected: None,
                    final_tier: state.tier,
                    attempts,
                    user_message: terminal_message
                        .unwrap_or_else(|| crate::escalation::TERMINAL_USER_MESSAGE.to_string()),
                    judge_circuit: self.judge_circuit(),
                });
            }
            // Per-attempt state is dropped here; only the context carries over.
            context = next_context;
        }
    }

    async fn produce(
        &self,
        generation: &GenerationRequest<'_>,
        cancel: &CancellationToken,
    ) -> Result<(Vec<String>, Vec<String>), ArbiterError> {
        let produced = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ArbiterError::Cancelled),
            out = async {
                tokio::join!(
                    self.candidate_producer.generate(generation),
                    self.test_producer.generate_tests(generation),
                )
            } => out,
        };

        let candidates = match produced.0 {
            Ok(raw) => dedup_candidates(raw),
            Err(e) => {
                warn!(tier = %generation.tier, error = %e, "candidate producer failed");
                Vec::new()
            }
        };
        let tests = match produced.1 {
            Ok(tests) => tests,
            Err(e) => {
                warn!(tier = %generation.tier, error = %e, "test producer failed");
                Vec::new()
            }
        };
        info!(
            tier = %generation.tier,
            candidates = candidates.len(),
            tests = tests.len(),
            "generation finished"
        );
        Ok((candidates, tests))
    }
}

/// Trim, drop empties and keep the first occurrence of each exact text.
pub fn dedup_candidates(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_dedup_keeps_first_occurrence() {
        let out = dedup_candidates(vec![
            " SELECT 1 ".to_string(),
            "".to_string(),
            "SELECT 2".to_string(),
            "SELECT 1".to_string(),
        ]);
        assert_eq!(out, vec!["SELECT 1".to_string(), "SELECT 2".to_string()]);
    }
}
