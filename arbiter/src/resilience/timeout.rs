//! Bounded-time execution for remote calls.
//!
//! The wrapped future is spawned onto its own Tokio task and raced against a
//! deadline. When the deadline wins, the caller gets a [`TimeoutSignal`] and
//! moves on immediately. The spawned task is *detached*, not aborted: it may
//! still run to completion and produce side effects (an HTTP request that
//! lands, a rate-limit slot consumed). Its result is discarded and must be
//! treated as unobservable.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// A bounded call exceeded its deadline.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("'{label}' exceeded its {deadline_ms}ms deadline")]
pub struct TimeoutSignal {
    /// What was being executed (e.g. `judge:candidate-2`).
    pub label: String,
    /// The deadline that was exceeded, in milliseconds.
    pub deadline_ms: u64,
}

/// Runs one unit of work with a hard wall-clock deadline.
#[derive(Debug, Clone, Copy)]
pub struct TimeBoundedExecutor {
    deadline: Duration,
}

impl TimeBoundedExecutor {
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Run `operation` in an isolated task and wait at most `deadline`.
    ///
    /// A panic inside the operation is resumed on the caller, matching what an
    /// inline `.await` would have done.
    pub async fn run<F, T>(&self, label: &str, operation: F) -> Result<T, TimeoutSignal>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = tokio::spawn(operation);

        match tokio::time::timeout(self.deadline, handle).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(join_err)) if join_err.is_panic() => {
                std::panic::resume_unwind(join_err.into_panic())
            }
            Ok(Err(join_err)) => {
                // Only reachable when the runtime is shutting down.
                debug!(label, error = %join_err, "bounded task cancelled by runtime");
                Err(self.signal(label))
            }
            Err(_) => {
                // Dropping the JoinHandle detaches the task; it is abandoned, not cancelled.
                warn!(
                    label,
                    deadline_ms = self.deadline.as_millis() as u64,
                    "bounded call timed out; abandoning in-flight work"
                );
                Err(self.signal(label))
            }
        }
    }

    fn signal(&self, label: &str) -> TimeoutSignal {
        TimeoutSignal {
            label: label.to_string(),
            deadline_ms: self.deadline.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fast_operation_returns_value() {
        let exec = TimeBoundedExecutor::new(Duration::from_secs(1));
        let out = exec.run("fast", async { 41 + 1 }).await;
        assert_eq!(out, Ok(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_completing_operation_times_out() {
        let exec = TimeBoundedExecutor::new(Duration::from_secs(2));
        let started = tokio::time::Instant::now();

        let out: Result<(), _> = exec.run("stuck", std::future::pending()).await;

        let err = out.unwrap_err();
        assert_eq!(err.label, "stuck");
        assert_eq!(err.deadline_ms, 2000);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_millis(2100), "took {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_operation_may_still_finish() {
        let exec = TimeBoundedExecutor::new(Duration::from_millis(100));
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let out = exec
            .run("slow", async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                flag.store(true, Ordering::SeqCst);
            })
            .await;
        assert!(out.is_err());
        assert!(!finished.load(Ordering::SeqCst));

        // The detached task keeps running after the caller moved on.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_timeout_signal_display() {
        let sig = TimeoutSignal {
            label: "judge:candidate-0".into(),
            deadline_ms: 1500,
        };
        assert_eq!(
            sig.to_string(),
            "'judge:candidate-0' exceeded its 1500ms deadline"
        );
    }
}
