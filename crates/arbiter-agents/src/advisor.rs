//! Advisor backed by a chat model.
//!
//! The reply must carry a `CHOICE: <n>` line; `RATIONALE:` is optional and
//! becomes the justification. Whether `n` is actually a finalist is checked
//! by the core.

use std::sync::LazyLock;

use anyhow::anyhow;
use arbiter::{Advisor, AdvisorBrief, AdvisorChoice};
use async_trait::async_trait;
use regex::Regex;

use crate::config::Endpoint;
use crate::llm::{ChatClient, Sampling};
use crate::prompts;

static CHOICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\W*choice\W*:\s*(?:candidate\s*)?\[?#?\s*(\d+)").expect("valid regex")
});

static RATIONALE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)rationale\W*:\s*(.+)").expect("valid regex"));

pub fn parse_choice(reply: &str) -> anyhow::Result<AdvisorChoice> {
    let index = CHOICE
        .captures(reply)
        .and_then(|c| c.get(1))
        .ok_or_else(|| anyhow!("advisor reply has no CHOICE line"))?
        .as_str()
        .parse::<usize>()?;
    let justification = RATIONALE
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();
    Ok(AdvisorChoice {
        index,
        justification,
    })
}

pub struct HttpAdvisor {
    client: ChatClient,
    endpoint: Endpoint,
}

impl HttpAdvisor {
    pub fn new(client: ChatClient, endpoint: Endpoint) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl Advisor for HttpAdvisor {
    async fn advise(&self, brief: &AdvisorBrief) -> anyhow::Result<AdvisorChoice> {
        let messages = prompts::advisor_messages(brief);
        let reply = self
            .client
            .complete(&self.endpoint, &messages, Sampling::STRICT)
            .await?;
        parse_choice(&reply)
    }
}
