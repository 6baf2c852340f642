//! Escalation across generation tiers.
//!
//! ```text
//! Basic ──fail──▶ Advanced ──fail──▶ Expert ──fail──▶ terminal
//!        (budget: at most `attempts_budget` escalations per request)
//! ```

pub mod manager;
pub mod tier;

pub use manager::{
    EscalationConfig, EscalationContext, EscalationDecision, EscalationManager, EscalationState,
    TERMINAL_USER_MESSAGE,
};
pub use tier::{EscalationTier, UnknownTier};
