//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arbiter::{
    Arbiter, ArbiterConfig, CandidateProducer, CircuitBreaker, EscalationTier, GenerationRequest,
    Judge, TestProducer,
};
use async_trait::async_trait;

/// Judge answering from a `sql → pattern` script, `P` = OK, anything else = KO.
pub struct ScriptedJudge {
    script: HashMap<String, String>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedJudge {
    pub fn new(script: &[(&str, &str)]) -> Self {
        Self {
            script: script
                .iter()
                .map(|(sql, p)| (sql.to_string(), p.to_string()))
                .collect(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Judge for ScriptedJudge {
    async fn judge(&self, sql: &str, _tests: &[String]) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(sql.to_string());
        let pattern = self
            .script
            .get(sql)
            .ok_or_else(|| anyhow::anyhow!("unscripted SQL: {sql}"))?;
        let items: Vec<String> = pattern
            .chars()
            .enumerate()
            .map(|(i, c)| {
                if c == 'P' {
                    "OK".to_string()
                } else {
                    format!("KO - assertion {} not satisfied, see filter", i + 1)
                }
            })
            .collect();
        Ok(format!("Evaluation:\nSQL #1: {}\n", items.join(", ")))
    }
}

/// Candidate producer returning a fixed list per tier and recording the
/// escalation context it was given.
#[derive(Default)]
pub struct TierProducer {
    by_tier: HashMap<EscalationTier, Vec<String>>,
    pub seen: Mutex<Vec<(EscalationTier, Option<String>)>>,
}

impl TierProducer {
    pub fn new(by_tier: &[(EscalationTier, &[&str])]) -> Self {
        Self {
            by_tier: by_tier
                .iter()
                .map(|(t, sqls)| (*t, sqls.iter().map(|s| s.to_string()).collect()))
                .collect(),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl CandidateProducer for TierProducer {
    async fn generate(&self, request: &GenerationRequest<'_>) -> anyhow::Result<Vec<String>> {
        self.seen.lock().unwrap().push((
            request.tier,
            request.escalation.map(|c| c.failure_analysis.clone()),
        ));
        Ok(self.by_tier.get(&request.tier).cloned().unwrap_or_default())
    }
}

/// Test producer returning the same assertions every attempt.
pub struct FixedTests(pub Vec<String>);

#[async_trait]
impl TestProducer for FixedTests {
    async fn generate_tests(
        &self,
        _request: &GenerationRequest<'_>,
    ) -> anyhow::Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

/// Producer that always fails.
pub struct BrokenProducer;

#[async_trait]
impl CandidateProducer for BrokenProducer {
    async fn generate(&self, _request: &GenerationRequest<'_>) -> anyhow::Result<Vec<String>> {
        Err(anyhow::anyhow!("upstream 503"))
    }
}

/// `n` assertions that survive deduplication ("check 1", "check 2", ...).
pub fn checks(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("check {i}")).collect()
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn config() -> ArbiterConfig {
    let mut c = ArbiterConfig::default();
    c.selection.tie_break_seed = Some(7);
    c
}

pub fn arbiter(
    config: ArbiterConfig,
    producer: Arc<dyn CandidateProducer>,
    tests: Vec<String>,
    judge: Arc<dyn Judge>,
) -> Arbiter {
    let breaker = Arc::new(CircuitBreaker::new("judge", &config.breaker));
    arbiter_with_breaker(config, producer, tests, judge, breaker)
}

/// Like [`arbiter`], sharing a caller-owned judge breaker.
pub fn arbiter_with_breaker(
    config: ArbiterConfig,
    producer: Arc<dyn CandidateProducer>,
    tests: Vec<String>,
    judge: Arc<dyn Judge>,
    breaker: Arc<CircuitBreaker>,
) -> Arbiter {
    Arbiter::new(config, producer, Arc::new(FixedTests(tests)), judge, breaker)
        .expect("test config is valid")
}
