//! Arbiter: choose one SQL from a pool of judged candidates.
//!
//! This library provides:
//! - Near-duplicate collapsing of test assertions before judging
//! - Concurrent judge fan-out behind a circuit breaker and hard deadlines
//! - Four-way outcome classification and tie-break selection
//! - Tier escalation with a bounded retry budget
//!
//! # Flow
//!
//! ```text
//! candidates ─┐
//!             ├─▶ VerdictCollector ─▶ EvaluationClassifier ─▶ SelectionEngine ─▶ SQL
//! tests ─dedup┘        (breaker + timeout)                          │
//!                                                                   └─▶ EscalationManager ─▶ retry | fail
//! ```
//!
//! Remote capabilities (candidate and test producers, the judge and the
//! advisor) are traits; implementations live in `arbiter-agents`.

pub mod complexity;
pub mod config;
pub mod dedup;
pub mod error;
pub mod escalation;
pub mod evaluation;
pub mod pipeline;
pub mod resilience;
pub mod selection;
pub mod verdict;

pub use complexity::{ComplexityBreakdown, ComplexityScorer};
pub use config::{ArbiterConfig, ConfigError};
pub use dedup::{DedupConfig, DedupReport, StopwordLanguage, TestDeduplicator};
pub use error::{ArbiterError, SelectionFailure};
pub use escalation::{
    EscalationConfig, EscalationContext, EscalationDecision, EscalationManager, EscalationState,
    EscalationTier,
};
pub use evaluation::{
    Classification, EvaluationClassifier, Judge, OutcomeCase, QualityTier, Selection,
    VerdictCollector,
};
pub use pipeline::{
    Arbiter, ArbiterRequest, AttemptRecord, CandidateProducer, Evaluation, EvaluationInput,
    GenerationRequest, RequestOutcome, TestProducer,
};
pub use resilience::{
    guarded_call, CallError, CircuitBreaker, CircuitBreakerConfig, CircuitOpenError,
    CircuitSnapshot, CircuitState, TimeBoundedExecutor, TimeoutSignal,
};
pub use selection::{
    Advisor, AdvisorBrief, AdvisorChoice, AdvisorError, Candidate, SelectionEngine,
    SelectionMethod, SelectionRequest, SelectionResult,
};
pub use verdict::{ParseError, Verdict, VerdictMatrix, VerdictRow};
