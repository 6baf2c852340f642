//! Escalation decisions: retry at a higher tier or stop.
//!
//! Pure and deterministic. The manager is the only component deciding
//! retry-vs-terminal; the attempt counter lives in [`EscalationState`], owned
//! by one user request and updated serially between attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::tier::EscalationTier;
use crate::error::SelectionFailure;
use crate::selection::SelectionResult;

/// Shown to the user when escalation is exhausted.
pub const TERMINAL_USER_MESSAGE: &str =
    "No SQL met the required quality threshold after all retries.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Maximum escalations per user request.
    pub attempts_budget: u32,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self { attempts_budget: 2 }
    }
}

/// What the next attempt needs to know about the one that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationContext {
    pub reason: SelectionFailure,
    pub originating_tier: EscalationTier,
    pub question: String,
    pub failed_candidates: Vec<String>,
    /// Human-readable summary for the next generation prompt.
    pub failure_analysis: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationDecision {
    pub escalate: bool,
    pub next_tier: Option<EscalationTier>,
    pub context: Option<EscalationContext>,
    /// Escalations consumed, including this one.
    pub attempts_used: u32,
    /// Set on terminal failure.
    pub user_message: Option<String>,
}

/// Per-request escalation position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationState {
    pub tier: EscalationTier,
    pub attempts_used: u32,
}

impl EscalationState {
    pub fn new(tier: EscalationTier) -> Self {
        Self {
            tier,
            attempts_used: 0,
        }
    }

    /// Move to the decision's tier. No-op for a non-escalating decision.
    pub fn apply(&mut self, decision: &EscalationDecision) {
        if let (true, Some(next)) = (decision.escalate, decision.next_tier) {
            self.tier = next;
            self.attempts_used = decision.attempts_used;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EscalationManager {
    config: EscalationConfig,
}

impl EscalationManager {
    pub fn new(config: EscalationConfig) -> Self {
        Self { config }
    }

    pub fn attempts_budget(&self) -> u32 {
        self.config.attempts_budget
    }

    pub fn next_tier(&self, current: EscalationTier) -> Option<EscalationTier> {
        current.next()
    }

    /// True iff the failure is escalatable, a higher tier exists and budget
    /// remains. An unavailable judge is never escalated.
    pub fn should_escalate(
        &self,
        failure: &SelectionFailure,
        attempts_used: u32,
        current: EscalationTier,
    ) -> bool {
        let allowed = failure.is_escalatable()
            && self.next_tier(current).is_some()
            && attempts_used < self.config.attempts_budget;
        info!(
            kind = failure.kind(),
            tier = %current,
            attempts_used,
            budget = self.config.attempts_budget,
            allowed,
            "escalation check"
        );
        allowed
    }

    /// Decide what follows a failed attempt.
    ///
    /// On escalation the caller must discard all per-attempt state and restart
    /// generation at `next_tier`, passing `context` along.
    pub fn decide(
        &self,
        failure: &SelectionFailure,
        result: Option<&SelectionResult>,
        question: &str,
        candidates: &[String],
        state: EscalationState,
    ) -> EscalationDecision {
        if !self.should_escalate(failure, state.attempts_used, state.tier) {
            warn!(
                kind = failure.kind(),
                tier = %state.tier,
                attempts_used = state.attempts_used,
                "escalation exhausted; terminal failure"
            );
            return EscalationDecision {
                escalate: false,
                next_tier: None,
                context: None,
                attempts_used: state.attempts_used,
                user_message: Some(terminal_message(failure)),
            };
        }

        let next = self.next_tier(state.tier);
        let context = EscalationContext {
            reason: failure.clone(),
            originating_tier: state.tier,
            question: question.to_string(),
            failed_candidates: candidates.to_vec(),
            failure_analysis: failure_analysis(failure, result, state.tier),
            created_at: Utc::now(),
        };
        info!(
            from = %state.tier,
            to = ?next,
            attempts_used = state.attempts_used + 1,
            "escalating to next tier"
        );
        EscalationDecision {
            escalate: true,
            next_tier: next,
            context: Some(context),
            attempts_used: state.attempts_used + 1,
            user_message: None,
        }
    }
}

fn terminal_message(failure: &SelectionFailure) -> String {
    match failure {
        SelectionFailure::BelowThreshold {
            best_pass_rate: Some(rate),
            ..
        } => format!(
            "No SQL met the required quality threshold after all retries (best pass rate {:.0}%).",
            rate * 100.0
        ),
        SelectionFailure::JudgeUnavailable {
            retry_after_secs, ..
        } => format!(
            "Query validation is temporarily unavailable; please retry in about {retry_after_secs}s."
        ),
        _ => TERMINAL_USER_MESSAGE.to_string(),
    }
}

fn failure_analysis(
    failure: &SelectionFailure,
    result: Option<&SelectionResult>,
    tier: EscalationTier,
) -> String {
    let mut out = format!("Attempt at tier {tier} failed: {failure}.");
    let Some(detail) = result.and_then(|r| r.failure_detail.as_ref()) else {
        return out;
    };
    out.push_str(&format!(
        "\nBest candidate #{} failed {} test(s):",
        detail.candidate,
        detail.failures.len()
    ));
    for f in &detail.failures {
        out.push_str(&format!(
            "\n- test {} ({}): {}",
            f.test_index + 1,
            f.description,
            f.reason
        ));
    }
    out
}
