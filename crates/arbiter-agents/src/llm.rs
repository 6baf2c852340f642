//! Minimal chat-completions client shared by every remote collaborator.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::Endpoint;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("HTTP request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("LLM API error ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("failed to parse response: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("no content in response")]
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Sampling parameters for one call.
#[derive(Debug, Clone, Copy)]
pub struct Sampling {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Sampling {
    /// Deterministic settings for judging and advising.
    pub const STRICT: Sampling = Sampling {
        max_tokens: 2048,
        temperature: 0.0,
    };
    /// Some diversity for candidate and test generation.
    pub const CREATIVE: Sampling = Sampling {
        max_tokens: 4096,
        temperature: 0.7,
    };
}

/// Cheap to clone; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
}

impl ChatClient {
    pub fn new(timeout: Duration) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(LlmError::Build)?;
        Ok(Self { http })
    }

    /// Send `messages` to `endpoint` and return the first choice's content.
    pub async fn complete(
        &self,
        endpoint: &Endpoint,
        messages: &[ChatMessage],
        sampling: Sampling,
    ) -> Result<String, LlmError> {
        let start = Instant::now();
        let body = ChatRequest {
            model: &endpoint.model,
            messages,
            max_tokens: sampling.max_tokens,
            temperature: sampling.temperature,
        };

        let mut request = self.http.post(endpoint.completions_url()).json(&body);
        if let Some(key) = &endpoint.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(LlmError::Transport)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        let parsed: ChatResponse = response.json().await.map_err(LlmError::Decode)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::Empty)?;

        debug!(
            model = %endpoint.model,
            chars = content.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "chat completion"
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let messages = [ChatMessage::system("be brief"), ChatMessage::user("hi")];
        let body = ChatRequest {
            model: "m",
            messages: &messages,
            max_tokens: 10,
            temperature: 0.0,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 10);
    }

    #[test]
    fn test_response_tolerates_missing_content() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"role":"assistant"}}]}"#).unwrap();
        assert!(parsed.choices[0].message.content.is_none());
    }
}
