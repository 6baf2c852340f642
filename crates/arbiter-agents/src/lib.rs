//! Remote collaborators for the arbiter core.
//!
//! Implements the core's `Judge`, `Advisor`, `CandidateProducer` and
//! `TestProducer` traits against OpenAI-compatible chat-completions
//! endpoints, and wires them into a ready-to-run [`arbiter::Arbiter`].

pub mod advisor;
pub mod config;
pub mod judge;
pub mod llm;
pub mod producers;
pub mod prompts;
pub mod request;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use arbiter::{Arbiter, ArbiterConfig, CircuitBreaker};

pub use advisor::HttpAdvisor;
pub use config::{AgentsConfig, Endpoint};
pub use judge::HttpJudge;
pub use llm::{ChatClient, ChatMessage, LlmError, Sampling};
pub use producers::{HttpCandidateProducer, HttpTestProducer};
pub use telemetry::{AuditLog, AuditRecord};

/// Build an [`Arbiter`] whose collaborators all talk HTTP. The advisor is
/// attached only when enhanced consultation is enabled.
pub fn build_arbiter(config: ArbiterConfig, agents: AgentsConfig) -> Result<Arbiter> {
    let client = ChatClient::new(Duration::from_secs(agents.request_timeout_secs))?;
    let agents = Arc::new(agents);

    let breaker = Arc::new(CircuitBreaker::new("judge", &config.breaker));
    let judge = Arc::new(HttpJudge::new(client.clone(), agents.judge_endpoint.clone()));
    let candidates = Arc::new(HttpCandidateProducer::new(client.clone(), agents.clone()));
    let tests = Arc::new(HttpTestProducer::new(client.clone(), agents.clone()));
    let enhanced = config.selection.enhanced_enabled;

    let arbiter = Arbiter::new(config, candidates, tests, judge, breaker)?;
    if enhanced {
        let advisor = Arc::new(HttpAdvisor::new(client, agents.advisor_endpoint.clone()));
        return Ok(arbiter.with_advisor(advisor));
    }
    Ok(arbiter)
}
