//! Judge fan-out: every candidate against every test, concurrently.
//!
//! One judge call per candidate, each carrying the full ordered test list.
//! Calls run on a `JoinSet`, limited by a semaphore, and each one goes through
//! the shared circuit breaker and the bounded-time executor. The matrix is
//! only returned once every call has settled; a call that produced nothing
//! usable yields an all-`FAIL` row, so a timeout is never a pass. Rows
//! refused by an open circuit are also marked unjudged on the matrix, so a
//! suspended judge is not mistaken for low quality.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ArbiterError;
use crate::resilience::{guarded_call, CallError, CircuitBreaker, TimeBoundedExecutor};
use crate::verdict::{parse_response, VerdictMatrix, VerdictRow};

/// Reason recorded when a response contained no usable verdict line.
pub const UNPARSABLE_REASON: &str = "judge output contained no parsable verdict line";

/// External capability deciding whether one SQL satisfies each test.
///
/// Returns the raw response text; it is expected to contain a line of the form
/// `SQL #<n>: OK, KO - <reason>, ...` with one item per test, in order.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn judge(&self, sql: &str, tests: &[String]) -> anyhow::Result<String>;
}

/// Collects a complete verdict matrix for one attempt.
pub struct VerdictCollector {
    judge: Arc<dyn Judge>,
    breaker: Arc<CircuitBreaker>,
    executor: TimeBoundedExecutor,
    max_concurrency: usize,
}

impl VerdictCollector {
    pub fn new(
        judge: Arc<dyn Judge>,
        breaker: Arc<CircuitBreaker>,
        executor: TimeBoundedExecutor,
        max_concurrency: usize,
    ) -> Self {
        Self {
            judge,
            breaker,
            executor,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Judge every candidate against `tests`.
    ///
    /// Returns [`ArbiterError::Cancelled`] if `cancel` fires first; in-flight
    /// calls are aborted and no partial matrix is returned.
    pub async fn collect(
        &self,
        candidates: &[String],
        tests: &[String],
        cancel: &CancellationToken,
    ) -> Result<VerdictMatrix, ArbiterError> {
        let started = Instant::now();
        let test_count = tests.len();
        let sem = Arc::new(Semaphore::new(self.max_concurrency));
        let tests: Arc<Vec<String>> = Arc::new(tests.to_vec());
        let mut join_set: JoinSet<Judged> = JoinSet::new();

        for (idx, sql) in candidates.iter().enumerate() {
            let sem = sem.clone();
            let judge = self.judge.clone();
            let breaker = self.breaker.clone();
            let executor = self.executor;
            let tests = tests.clone();
            let sql = sql.clone();

            join_set.spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return Judged {
                        row: VerdictRow::all_failed(idx, test_count, "judge pool closed"),
                        refused: None,
                    };
                };
                judge_one(judge, &breaker, &executor, idx, sql, tests).await
            });
        }

        let mut matrix = VerdictMatrix::new(test_count);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    join_set.abort_all();
                    info!(pending = join_set.len(), "request cancelled; abandoning judge calls");
                    return Err(ArbiterError::Cancelled);
                }
                next = join_set.join_next() => match next {
                    Some(Ok(judged)) => {
                        if let Some(retry_after) = judged.refused {
                            matrix.mark_unjudged(judged.row.candidate, retry_after);
                        }
                        matrix.insert(judged.row);
                    }
                    Some(Err(e)) => warn!(error = %e, "judge task panicked"),
                    None => break,
                }
            }
        }

        // Panicked tasks leave holes; fill them so the matrix stays complete.
        for idx in 0..candidates.len() {
            if matrix.get(idx).is_none() {
                matrix.insert(VerdictRow::all_failed(idx, test_count, "judge task failed"));
            }
        }

        info!(
            candidates = candidates.len(),
            tests = test_count,
            unjudged = matrix.unjudged_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            breaker = %self.breaker.state(),
            "verdict matrix complete"
        );
        Ok(matrix)
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

/// One settled judge call. `refused` carries the circuit's `retry_after` when
/// the call was never made.
struct Judged {
    row: VerdictRow,
    refused: Option<Duration>,
}

async fn judge_one(
    judge: Arc<dyn Judge>,
    breaker: &CircuitBreaker,
    executor: &TimeBoundedExecutor,
    idx: usize,
    sql: String,
    tests: Arc<Vec<String>>,
) -> Judged {
    let test_count = tests.len();
    let label = format!("judge candidate {idx}");
    let call = async move { judge.judge(&sql, &tests).await };

    let row = match guarded_call(breaker, executor, &label, call).await {
        Ok(text) => {
            let parsed = parse_response(&text);
            match parsed.first_row() {
                Some(verdicts) => {
                    debug!(candidate = idx, verdicts = verdicts.len(), "judge responded");
                    VerdictRow::new(idx, verdicts.to_vec())
                }
                None => {
                    warn!(
                        candidate = idx,
                        malformed = parsed.errors.len(),
                        "judge response had no usable verdict line"
                    );
                    VerdictRow::all_failed(idx, test_count, UNPARSABLE_REASON)
                }
            }
        }
        Err(CallError::CircuitOpen(open)) => {
            warn!(
                candidate = idx,
                retry_after_ms = open.retry_after.as_millis() as u64,
                "judge circuit open; candidate not judged"
            );
            let reason = format!("judge call circuit_open: {open}");
            return Judged {
                row: VerdictRow::all_failed(idx, test_count, &reason),
                refused: Some(open.retry_after),
            };
        }
        Err(err) => {
            warn!(candidate = idx, kind = err.kind(), error = %err, "judge call failed");
            VerdictRow::all_failed(idx, test_count, &format!("judge call {}: {}", err.kind(), err))
        }
    };
    Judged { row, refused: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{CircuitBreakerConfig, CircuitState};
    use crate::verdict::Verdict;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Answers from a per-SQL script; unknown SQL hangs forever.
    struct ScriptedJudge {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Judge for ScriptedJudge {
        async fn judge(&self, sql: &str, tests: &[String]) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match sql {
                "good" => Ok(format!(
                    "Verdicts:\nSQL #1: {}",
                    vec!["OK"; tests.len()].join(", ")
                )),
                "half" => Ok("SQL #1: OK, KO - wrong filter, on year".to_string()),
                "garbage" => Ok("I think they all look fine.".to_string()),
                "error" => Err(anyhow::anyhow!("HTTP 500")),
                _ => std::future::pending().await,
            }
        }
    }

    fn collector(judge: Arc<ScriptedJudge>, breaker: Arc<CircuitBreaker>) -> VerdictCollector {
        VerdictCollector::new(
            judge,
            breaker,
            TimeBoundedExecutor::new(Duration::from_secs(5)),
            2,
        )
    }

    fn breaker(threshold: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "judge",
            &CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout_secs: 120,
            },
        ))
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_matrix_complete_and_keyed_by_index() {
        let judge = Arc::new(ScriptedJudge {
            calls: AtomicUsize::new(0),
        });
        let c = collector(judge.clone(), breaker(10));
        let tests = strings(&["t1", "t2", "t3"]);
        let candidates = strings(&["half", "good", "garbage", "error", "hang"]);

        let m = c
            .collect(&candidates, &tests, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(m.len(), 5);
        assert!(m.get(1).unwrap().is_perfect());

        let half = m.get(0).unwrap();
        assert_eq!(half.total(), 3);
        assert_eq!(half.verdicts[1], Verdict::fail("wrong filter, on year"));
        assert_eq!(half.verdicts[2].reason(), Some(crate::verdict::MISSING_VERDICT_REASON));

        assert_eq!(m.get(2).unwrap().verdicts[0].reason(), Some(UNPARSABLE_REASON));
        assert!(m.get(3).unwrap().verdicts[0]
            .reason()
            .unwrap()
            .starts_with("judge call failed"));
        assert!(m.get(4).unwrap().verdicts[0]
            .reason()
            .unwrap()
            .starts_with("judge call timeout"));
        assert_eq!(judge.calls.load(Ordering::SeqCst), 5);
        assert_eq!(m.unjudged_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_fails_rows_without_calling_judge() {
        let judge = Arc::new(ScriptedJudge {
            calls: AtomicUsize::new(0),
        });
        let cb = breaker(1);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        let c = collector(judge.clone(), cb);
        let m = c
            .collect(&strings(&["good", "good"]), &strings(&["t1"]), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(judge.calls.load(Ordering::SeqCst), 0);
        for row in m.rows() {
            assert_eq!(row.passed(), 0);
            assert!(row.verdicts[0].reason().unwrap().contains("circuit_open"));
        }
        assert_eq!(m.unjudged().collect::<Vec<_>>(), vec![0, 1]);
        let retry_after = m.retry_after().unwrap();
        assert!(retry_after > Duration::ZERO && retry_after <= Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_returns_no_matrix() {
        let judge = Arc::new(ScriptedJudge {
            calls: AtomicUsize::new(0),
        });
        let c = collector(judge, breaker(10));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let out = c
            .collect(&strings(&["hang", "hang"]), &strings(&["t1"]), &cancel)
            .await;
        assert!(matches!(out, Err(ArbiterError::Cancelled)));
    }
}
