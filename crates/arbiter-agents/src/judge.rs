use arbiter::Judge;
use async_trait::async_trait;

use crate::config::Endpoint;
use crate::llm::{ChatClient, Sampling};
use crate::prompts;

/// Judge backed by a chat model. Returns the raw reply; verdict parsing and
/// all failure handling happen in the core.
pub struct HttpJudge {
    client: ChatClient,
    endpoint: Endpoint,
}

impl HttpJudge {
    pub fn new(client: ChatClient, endpoint: Endpoint) -> Self {
        Self { client, endpoint }
    }
}

#[async_trait]
impl Judge for HttpJudge {
    async fn judge(&self, sql: &str, tests: &[String]) -> anyhow::Result<String> {
        let messages = prompts::judge_messages(sql, tests);
        Ok(self
            .client
            .complete(&self.endpoint, &messages, Sampling::STRICT)
            .await?)
    }
}
