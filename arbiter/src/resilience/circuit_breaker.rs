//! Circuit breaker for a class of remote calls.
//!
//! One breaker instance guards one call class (e.g. "judge calls") and is
//! shared by every call site through an `Arc`. All transitions happen under a
//! single mutex; the lock is never held across an `.await`.
//!
//! ```text
//! Closed ──failures ≥ threshold──▶ Open ──recovery elapsed──▶ HalfOpen
//!   ▲                                ▲                          │
//!   └────────────success─────────────┼──────────────────────────┤
//!                                    └─────────failure──────────┘
//! ```
//!
//! While half-open exactly one trial call is admitted; concurrent callers are
//! rejected until the trial call settles.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Circuit state for one call class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Healthy; calls allowed.
    Closed,
    /// Tripped; calls fail fast until the recovery timeout elapses.
    Open,
    /// Recovery timeout elapsed; one trial call allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// The breaker refused the call without invoking the operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit '{name}' is open; retry in {}s", .retry_after.as_secs())]
pub struct CircuitOpenError {
    pub name: String,
    /// Time left until a trial call will be admitted.
    pub retry_after: Duration,
}

/// Breaker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Seconds after the last failure before Open → HalfOpen.
    pub recovery_timeout_secs: u64,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout_secs: 120,
        }
    }
}

/// Point-in-time view of a breaker, for operators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    /// Milliseconds since the last recorded failure, if any.
    pub since_last_failure_ms: Option<u64>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    trial_in_flight: bool,
}

/// Failure-rate circuit breaker shared across concurrent call sites.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: config.recovery_timeout(),
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                trial_in_flight: false,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `operation` through the breaker.
    ///
    /// Fails fast with a [`CircuitOpenError`] (converted into `E`) while the
    /// circuit is open, without calling `operation`. Any `Err` returned by the
    /// operation counts as a failure.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CircuitOpenError>,
    {
        let mut permit = self.acquire()?;
        let result = operation().await;
        match &result {
            Ok(_) => permit.settle(true),
            Err(_) => permit.settle(false),
        }
        result
    }

    /// Record a success. Resets the circuit to Closed.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        self.on_success(&mut inner, false);
    }

    /// Record a failure. May trip the circuit to Open.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        self.on_failure(&mut inner);
    }

    /// Current state. An open circuit whose recovery timeout has elapsed
    /// reports `HalfOpen` even before the trial call is admitted.
    pub fn state(&self) -> CircuitState {
        let inner = self.lock();
        self.effective_state(&inner)
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.lock();
        CircuitSnapshot {
            name: self.name.clone(),
            state: self.effective_state(&inner),
            failure_count: inner.failure_count,
            since_last_failure_ms: inner
                .last_failure
                .map(|t| t.elapsed().as_millis() as u64),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn effective_state(&self, inner: &BreakerInner) -> CircuitState {
        if inner.state == CircuitState::Open && self.cooldown_remaining(inner).is_zero() {
            CircuitState::HalfOpen
        } else {
            inner.state
        }
    }

    fn cooldown_remaining(&self, inner: &BreakerInner) -> Duration {
        match inner.last_failure {
            Some(at) => self.recovery_timeout.saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        }
    }

    fn acquire(&self) -> Result<Permit<'_>, CircuitOpenError> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Permit::new(self, false)),
            CircuitState::Open => {
                let remaining = self.cooldown_remaining(&inner);
                if !remaining.is_zero() {
                    debug!(breaker = %self.name, retry_after_ms = remaining.as_millis() as u64, "circuit open; failing fast");
                    return Err(CircuitOpenError {
                        name: self.name.clone(),
                        retry_after: remaining,
                    });
                }
                inner.state = CircuitState::HalfOpen;
                inner.trial_in_flight = true;
                info!(breaker = %self.name, "recovery timeout elapsed; admitting trial call");
                Ok(Permit::new(self, true))
            }
            CircuitState::HalfOpen => {
                if inner.trial_in_flight {
                    return Err(CircuitOpenError {
                        name: self.name.clone(),
                        retry_after: Duration::ZERO,
                    });
                }
                inner.trial_in_flight = true;
                Ok(Permit::new(self, true))
            }
        }
    }

    fn on_success(&self, inner: &mut BreakerInner, trial: bool) {
        if trial {
            inner.trial_in_flight = false;
        }
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => {
                if inner.state == CircuitState::HalfOpen {
                    info!(breaker = %self.name, "trial call succeeded; circuit closed");
                }
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
            }
            // A call admitted before the circuit tripped; it says nothing about recovery.
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, inner: &mut BreakerInner) {
        inner.trial_in_flight = false;
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(Instant::now());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                warn!(breaker = %self.name, "trial call failed; circuit re-opened");
            }
            CircuitState::Closed if inner.failure_count >= self.failure_threshold => {
                inner.state = CircuitState::Open;
                warn!(
                    breaker = %self.name,
                    failures = inner.failure_count,
                    recovery_secs = self.recovery_timeout.as_secs(),
                    "failure threshold reached; circuit opened"
                );
            }
            _ => {}
        }
    }
}

/// Admission ticket for one call. A trial permit that is dropped without
/// settling (the caller was cancelled) frees the trial call slot.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl<'a> Permit<'a> {
    fn new(breaker: &'a CircuitBreaker, trial: bool) -> Self {
        Self {
            breaker,
            trial,
            settled: false,
        }
    }

    fn settle(&mut self, success: bool) {
        let mut inner = self.breaker.lock();
        if success {
            self.breaker.on_success(&mut inner, self.trial);
        } else {
            self.breaker.on_failure(&mut inner);
        }
        self.settled = true;
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            self.breaker.lock().trial_in_flight = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, PartialEq)]
    enum TestError {
        Open,
        Boom,
    }

    impl From<CircuitOpenError> for TestError {
        fn from(_: CircuitOpenError) -> Self {
            Self::Open
        }
    }

    fn breaker(threshold: u32, recovery_secs: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "judge",
            &CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout_secs: recovery_secs,
            },
        )
    }

    async fn fail(cb: &CircuitBreaker) -> Result<(), TestError> {
        cb.call(|| async { Err::<(), _>(TestError::Boom) }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> Result<(), TestError> {
        cb.call(|| async { Ok::<(), TestError>(()) }).await
    }

    #[test]
    fn test_default_config() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.recovery_timeout(), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_circuit_starts_closed() {
        let cb = breaker(3, 120);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
        assert!(succeed(&cb).await.is_ok());
    }

    #[tokio::test]
    async fn test_failures_below_threshold_stay_closed() {
        let cb = breaker(3, 120);
        assert_eq!(fail(&cb).await, Err(TestError::Boom));
        assert_eq!(fail(&cb).await, Err(TestError::Boom));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 2);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = breaker(3, 120);
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        succeed(&cb).await.unwrap();
        assert_eq!(cb.failure_count(), 0);
        let _ = fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_never_invokes_operation() {
        let cb = breaker(3, 120);
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        let invoked = AtomicU32::new(0);
        for _ in 0..5 {
            let out: Result<(), TestError> = cb
                .call(|| async {
                    invoked.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .await;
            assert_eq!(out, Err(TestError::Open));
        }
        tokio::time::advance(Duration::from_secs(119)).await;
        assert_eq!(succeed(&cb).await, Err(TestError::Open));
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_success_closes() {
        let cb = breaker(3, 120);
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }
        tokio::time::advance(Duration::from_secs(120)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        succeed(&cb).await.unwrap();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_trial_failure_reopens() {
        let cb = breaker(2, 60);
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(fail(&cb).await, Err(TestError::Boom));
        assert_eq!(cb.state(), CircuitState::Open);
        // Cooldown restarted from the trial call failure.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(succeed(&cb).await, Err(TestError::Open));
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_single_trial() {
        let cb = breaker(1, 10);
        let _ = fail(&cb).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let trial = cb.call(|| async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<(), TestError>(())
        });
        let concurrent = async {
            tokio::task::yield_now().await;
            succeed(&cb).await
        };
        let (trial_out, concurrent_out) = tokio::join!(trial, concurrent);
        assert!(trial_out.is_ok());
        assert_eq!(concurrent_out, Err(TestError::Open));
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_trial_frees_slot() {
        let cb = breaker(1, 10);
        let _ = fail(&cb).await;
        tokio::time::advance(Duration::from_secs(10)).await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(5),
            cb.call(|| async {
                std::future::pending::<()>().await;
                Ok::<(), TestError>(())
            }),
        )
        .await;
        assert!(abandoned.is_err());

        assert!(succeed(&cb).await.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_snapshot_reports_failures() {
        let cb = breaker(3, 120);
        let _ = fail(&cb).await;
        let snap = cb.snapshot();
        assert_eq!(snap.name, "judge");
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.failure_count, 1);
        assert!(snap.since_last_failure_ms.is_some());
    }
}
