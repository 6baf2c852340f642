//! HTTP-backed candidate and test producers plus their reply parsers.

use std::sync::{Arc, LazyLock};

use anyhow::Context;
use arbiter::{CandidateProducer, GenerationRequest, TestProducer};
use async_trait::async_trait;
use regex::Regex;
use tracing::{info, warn};

use crate::config::AgentsConfig;
use crate::llm::{ChatClient, Sampling};
use crate::prompts;

static SQL_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)```[ \t]*(?:sql)?[ \t]*\r?\n(.*?)```").expect("valid regex")
});

static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d+\s*[.)]|[-*•])\s+(.+?)\s*$").expect("valid regex")
});

static BARE_SQL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:select|with)\b").expect("valid regex"));

/// SQL bodies of every fenced block in `reply`, in order. A reply with no
/// fences that itself looks like a query is taken whole.
pub fn extract_sql_blocks(reply: &str) -> Vec<String> {
    let blocks: Vec<String> = SQL_FENCE
        .captures_iter(reply)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if !blocks.is_empty() {
        return blocks;
    }
    if BARE_SQL.is_match(reply) {
        return vec![reply.trim().to_string()];
    }
    Vec::new()
}

/// Numbered or bulleted lines of `reply`, markers stripped.
pub fn parse_assertions(reply: &str) -> Vec<String> {
    reply
        .lines()
        .filter_map(|line| LIST_ITEM.captures(line))
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

pub struct HttpCandidateProducer {
    client: ChatClient,
    config: Arc<AgentsConfig>,
}

impl HttpCandidateProducer {
    pub fn new(client: ChatClient, config: Arc<AgentsConfig>) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl CandidateProducer for HttpCandidateProducer {
    async fn generate(&self, request: &GenerationRequest<'_>) -> anyhow::Result<Vec<String>> {
        let endpoint = self.config.for_tier(request.tier);
        let messages = prompts::candidate_messages(request, self.config.candidates_per_attempt);
        let reply = self
            .client
            .complete(endpoint, &messages, Sampling::CREATIVE)
            .await
            .with_context(|| format!("candidate generation at tier {}", request.tier))?;

        let candidates = extract_sql_blocks(&reply);
        if candidates.is_empty() {
            warn!(tier = %request.tier, "Generator reply contained no SQL");
        } else {
            info!(tier = %request.tier, count = candidates.len(), "Candidates generated");
        }
        Ok(candidates)
    }
}

pub struct HttpTestProducer {
    client: ChatClient,
    config: Arc<AgentsConfig>,
}

impl HttpTestProducer {
    pub fn new(client: ChatClient, config: Arc<AgentsConfig>) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl TestProducer for HttpTestProducer {
    async fn generate_tests(
        &self,
        request: &GenerationRequest<'_>,
    ) -> anyhow::Result<Vec<String>> {
        let messages = prompts::test_messages(request);
        let reply = self
            .client
            .complete(&self.config.test_endpoint, &messages, Sampling::CREATIVE)
            .await
            .context("test generation")?;

        let tests = parse_assertions(&reply);
        info!(tier = %request.tier, count = tests.len(), "Tests generated");
        Ok(tests)
    }
}
