//! Resilience primitives gating every remote call.
//!
//! ```text
//! call site
//!   └─ CircuitBreaker::call          (fails fast while open)
//!        └─ TimeBoundedExecutor::run (hard deadline, abandons the loser)
//!             └─ remote operation
//! ```
//!
//! The breaker sits outside the executor so a tripped circuit short-circuits
//! before any task is spawned. Timeouts count as breaker failures.

pub mod circuit_breaker;
pub mod timeout;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitOpenError, CircuitSnapshot, CircuitState,
};
pub use timeout::{TimeBoundedExecutor, TimeoutSignal};

use std::future::Future;

use thiserror::Error;

/// Why a guarded remote call produced no value.
#[derive(Debug, Error)]
pub enum CallError {
    /// The call class is suspended; the operation was never invoked.
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    /// The operation exceeded its deadline.
    #[error(transparent)]
    Timeout(#[from] TimeoutSignal),

    /// The operation itself returned an error.
    #[error("remote call failed: {0:#}")]
    Failed(anyhow::Error),
}

impl CallError {
    /// Short machine-friendly tag for logs and failure reasons.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CircuitOpen(_) => "circuit_open",
            Self::Timeout(_) => "timeout",
            Self::Failed(_) => "failed",
        }
    }
}

/// Run `operation` behind `breaker` with the deadline enforced by `executor`.
pub async fn guarded_call<F, T>(
    breaker: &CircuitBreaker,
    executor: &TimeBoundedExecutor,
    label: &str,
    operation: F,
) -> Result<T, CallError>
where
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    breaker
        .call(|| async move {
            match executor.run(label, operation).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(CallError::Failed(err)),
                Err(signal) => Err(CallError::Timeout(signal)),
            }
        })
        .await
}
