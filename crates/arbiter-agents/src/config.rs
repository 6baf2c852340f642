//! Endpoint configuration for the remote models.
//!
//! Every endpoint speaks the OpenAI chat-completions protocol. Candidate
//! generation uses one endpoint per escalation tier; the judge, the advisor
//! and the test producer each have their own.

use arbiter::EscalationTier;

/// An OpenAI-compatible chat-completions endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Base URL, e.g. `http://localhost:8080/v1`.
    pub url: String,
    pub model: String,
    /// Sent as a bearer token when present.
    pub api_key: Option<String>,
}

impl Endpoint {
    /// Full URL of the chat-completions route.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.url.trim_end_matches('/'))
    }
}

/// Which model answers which role.
#[derive(Debug, Clone)]
pub struct AgentsConfig {
    pub basic_endpoint: Endpoint,
    pub advanced_endpoint: Endpoint,
    pub expert_endpoint: Endpoint,
    pub judge_endpoint: Endpoint,
    pub advisor_endpoint: Endpoint,
    pub test_endpoint: Endpoint,
    /// Transport timeout for a single HTTP exchange. The core applies its
    /// own, usually tighter, deadline on top.
    pub request_timeout_secs: u64,
    /// Candidates requested from the generator per attempt.
    pub candidates_per_attempt: usize,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl AgentsConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset variables fall back to
    /// local defaults. `ARBITER_API_KEY` is shared by endpoints without their
    /// own `*_API_KEY`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let shared_key = lookup("ARBITER_API_KEY");
        let endpoint = |prefix: &str, url: &str, model: &str| Endpoint {
            url: lookup(&format!("{prefix}_URL")).unwrap_or_else(|| url.into()),
            model: lookup(&format!("{prefix}_MODEL")).unwrap_or_else(|| model.into()),
            api_key: lookup(&format!("{prefix}_API_KEY")).or_else(|| shared_key.clone()),
        };

        Self {
            basic_endpoint: endpoint(
                "ARBITER_BASIC",
                "http://localhost:8080/v1",
                "qwen2.5-coder-7b-instruct",
            ),
            advanced_endpoint: endpoint(
                "ARBITER_ADVANCED",
                "http://localhost:8081/v1",
                "qwen2.5-coder-32b-instruct",
            ),
            expert_endpoint: endpoint(
                "ARBITER_EXPERT",
                "http://localhost:8082/v1",
                "deepseek-r1-distill-llama-70b",
            ),
            judge_endpoint: endpoint(
                "ARBITER_JUDGE",
                "http://localhost:8081/v1",
                "qwen2.5-coder-32b-instruct",
            ),
            advisor_endpoint: endpoint(
                "ARBITER_ADVISOR",
                "http://localhost:8082/v1",
                "deepseek-r1-distill-llama-70b",
            ),
            test_endpoint: endpoint(
                "ARBITER_TESTS",
                "http://localhost:8080/v1",
                "qwen2.5-coder-7b-instruct",
            ),
            request_timeout_secs: lookup("ARBITER_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            candidates_per_attempt: lookup("ARBITER_CANDIDATES_PER_ATTEMPT")
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(3),
        }
    }

    pub fn for_tier(&self, tier: EscalationTier) -> &Endpoint {
        match tier {
            EscalationTier::Basic => &self.basic_endpoint,
            EscalationTier::Advanced => &self.advanced_endpoint,
            EscalationTier::Expert => &self.expert_endpoint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults_are_local_and_keyless() {
        let config = AgentsConfig::default();
        assert!(config.basic_endpoint.url.starts_with("http://localhost"));
        assert!(config.judge_endpoint.api_key.is_none());
        assert_eq!(config.request_timeout_secs, 300);
        assert_eq!(config.candidates_per_attempt, 3);
    }

    #[test]
    fn test_env_overrides_and_shared_key() {
        let config = AgentsConfig::from_lookup(lookup(&[
            ("ARBITER_EXPERT_URL", "https://proxy.example/v1/"),
            ("ARBITER_EXPERT_MODEL", "big-model"),
            ("ARBITER_API_KEY", "shared"),
            ("ARBITER_JUDGE_API_KEY", "judge-only"),
            ("ARBITER_CANDIDATES_PER_ATTEMPT", "0"),
        ]));
        let expert = config.for_tier(EscalationTier::Expert);
        assert_eq!(expert.model, "big-model");
        assert_eq!(
            expert.completions_url(),
            "https://proxy.example/v1/chat/completions"
        );
        assert_eq!(expert.api_key.as_deref(), Some("shared"));
        assert_eq!(config.judge_endpoint.api_key.as_deref(), Some("judge-only"));
        assert_eq!(config.candidates_per_attempt, 3);
    }
}
