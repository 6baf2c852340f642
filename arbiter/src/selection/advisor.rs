//! Enhanced consultation: ask an external advisor to pick among finalists.
//!
//! The advisor only ever sees finalists. Its answer is accepted when it names
//! one of them; anything else (bad index, error, timeout) is an
//! [`AdvisorError`] and the caller falls back to the complexity tie-break.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::resilience::{TimeBoundedExecutor, TimeoutSignal};
use crate::verdict::VerdictMatrix;

/// Everything the advisor is shown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisorBrief {
    pub question: String,
    pub schema_context: String,
    /// Finalist candidate indices, ascending.
    pub finalists: Vec<usize>,
    /// One block per finalist, headed `[#<index>]`.
    pub candidate_list: String,
    /// Per-test failure reasons of each finalist.
    pub failure_detail: String,
}

impl AdvisorBrief {
    /// Build the brief for `finalists` from the attempt's candidates and matrix.
    pub fn build(
        question: &str,
        schema_context: &str,
        finalists: &[usize],
        candidates: &[String],
        tests: &[String],
        matrix: &VerdictMatrix,
    ) -> Self {
        let mut candidate_list = String::new();
        let mut failure_detail = String::new();

        for &idx in finalists {
            let sql = candidates.get(idx).map(String::as_str).unwrap_or_default();
            candidate_list.push_str(&format!("[#{idx}]\n```sql\n{}\n```\n\n", sql.trim()));

            let Some(row) = matrix.get(idx) else {
                continue;
            };
            failure_detail.push_str(&format!(
                "[#{idx}] passed {}/{}\n",
                row.passed(),
                row.total()
            ));
            let mut any = false;
            for (test_idx, reason) in row.failures() {
                let description = tests.get(test_idx).map(String::as_str).unwrap_or("?");
                failure_detail.push_str(&format!(
                    "  - test {} ({}): {}\n",
                    test_idx + 1,
                    description,
                    reason
                ));
                any = true;
            }
            if !any {
                failure_detail.push_str("  - no failed tests\n");
            }
        }

        Self {
            question: question.to_string(),
            schema_context: schema_context.to_string(),
            finalists: finalists.to_vec(),
            candidate_list,
            failure_detail,
        }
    }
}

/// What the advisor picked, by candidate index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisorChoice {
    pub index: usize,
    pub justification: String,
}

#[async_trait]
pub trait Advisor: Send + Sync {
    async fn advise(&self, brief: &AdvisorBrief) -> anyhow::Result<AdvisorChoice>;
}

#[derive(Debug, Error)]
pub enum AdvisorError {
    #[error("advisor chose #{index}, which is not a finalist ({finalists:?})")]
    Invalid { index: usize, finalists: Vec<usize> },

    #[error("advisor call failed: {0:#}")]
    Failed(anyhow::Error),

    #[error(transparent)]
    TimedOut(#[from] TimeoutSignal),
}

/// Advisor behind the bounded-time executor.
#[derive(Clone)]
pub struct AdvisorConsultation {
    advisor: Arc<dyn Advisor>,
    executor: TimeBoundedExecutor,
}

impl AdvisorConsultation {
    pub fn new(advisor: Arc<dyn Advisor>, timeout: Duration) -> Self {
        Self {
            advisor,
            executor: TimeBoundedExecutor::new(timeout),
        }
    }

    pub async fn consult(&self, brief: AdvisorBrief) -> Result<AdvisorChoice, AdvisorError> {
        let finalists = brief.finalists.clone();
        let advisor = self.advisor.clone();
        let choice = self
            .executor
            .run("advisor consultation", async move { advisor.advise(&brief).await })
            .await?
            .map_err(AdvisorError::Failed)?;

        if !finalists.contains(&choice.index) {
            warn!(index = choice.index, ?finalists, "advisor named a non-finalist");
            return Err(AdvisorError::Invalid {
                index: choice.index,
                finalists,
            });
        }
        info!(index = choice.index, "advisor selected finalist");
        Ok(choice)
    }
}

impl std::fmt::Debug for AdvisorConsultation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdvisorConsultation")
            .field("deadline", &self.executor.deadline())
            .finish_non_exhaustive()
    }
}
