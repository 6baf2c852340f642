//! Logging setup and the operator audit log.
//!
//! The audit log is JSONL: one line per attempt, carrying the full
//! [`SelectionResult`] including per-candidate metrics and judge failure
//! reasons. It is for operators only; nothing in it is shown to end users.

use std::io::Write;
use std::path::{Path, PathBuf};

use arbiter::{
    CircuitSnapshot, DedupReport, EscalationDecision, EscalationTier, RequestOutcome,
    SelectionResult,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Install the global subscriber. `RUST_LOG` wins; otherwise `info`.
/// Logs go to stderr so stdout stays machine-readable.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// One attempt of one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub attempt: u32,
    pub tier: EscalationTier,
    pub question: String,
    pub candidates: Vec<String>,
    pub tests: Vec<String>,
    pub dedup: DedupReport,
    pub result: SelectionResult,
    pub decision: Option<EscalationDecision>,
    /// Judge breaker as the request finished.
    pub judge_circuit: CircuitSnapshot,
}

impl AuditRecord {
    /// One record per attempt of `outcome`, all stamped with the same time.
    pub fn from_outcome(request_id: &str, question: &str, outcome: &RequestOutcome) -> Vec<Self> {
        let timestamp = Utc::now();
        outcome
            .attempts
            .iter()
            .map(|a| Self {
                request_id: request_id.to_string(),
                timestamp,
                attempt: a.attempt,
                tier: a.tier,
                question: question.to_string(),
                candidates: a.candidates.clone(),
                tests: a.evaluation.tests.clone(),
                dedup: a.evaluation.dedup.clone(),
                result: a.evaluation.result.clone(),
                decision: a.decision.clone(),
                judge_circuit: outcome.judge_circuit.clone(),
            })
            .collect()
    }
}

/// Append-only JSONL sink. Write failures are logged, never raised.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of records written.
    pub fn append(&self, records: &[AuditRecord]) -> usize {
        let mut file = match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %self.path.display(), "Failed to open audit log: {e}");
                return 0;
            }
        };

        let mut written = 0;
        for record in records {
            let json = match serde_json::to_string(record) {
                Ok(json) => json,
                Err(e) => {
                    warn!(attempt = record.attempt, "Failed to serialize audit record: {e}");
                    continue;
                }
            };
            if let Err(e) = writeln!(file, "{json}") {
                warn!("Failed to append audit record: {e}");
                break;
            }
            written += 1;
        }
        info!(path = %self.path.display(), records = written, "Appended audit records");
        written
    }
}
