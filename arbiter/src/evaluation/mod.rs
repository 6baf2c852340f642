//! Verdict collection and outcome classification.

pub mod classifier;
pub mod judge;

pub use classifier::{
    Classification, EvaluationClassifier, OutcomeCase, QualityTier, Selection, RATE_EPSILON,
};
pub use judge::{Judge, VerdictCollector};
