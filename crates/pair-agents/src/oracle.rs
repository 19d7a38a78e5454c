//! Content-generation oracle: `generate(system, prompt) -> text`.
//!
//! Roles only depend on the [`TextGenerator`] trait. The production
//! implementation talks to an OpenAI-compatible `/chat/completions` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::AgentsConfig;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM API error ({status}): {body}")]
    Status { status: u16, body: String },

    #[error("no response from LLM")]
    EmptyResponse,
}

/// Opaque text generator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, OracleError>;
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
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
    reasoning_content: Option<String>,
}

/// Chat-completions client bound to one model.
#[derive(Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
}

impl ChatCompletionsClient {
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        Ok(Self {
            http: reqwest::Client::builder().timeout(timeout).build()?,
            url: url.into(),
            model: model.into(),
            api_key,
            max_tokens: 2048,
            temperature: 0.3,
        })
    }

    /// Client for the role model in `config`.
    pub fn from_config(config: &AgentsConfig) -> Result<Self, OracleError> {
        Self::new(
            &config.llm_url,
            &config.model,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Same endpoint and HTTP client, different model.
    pub fn with_model(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, OracleError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let mut builder = self.http.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status { status, body });
        }

        let chat_response: ChatResponse = response.json().await?;
        let message = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or(OracleError::EmptyResponse)?
            .message;

        // Reasoning models may put the whole answer in reasoning_content.
        let content = match (message.content, message.reasoning_content) {
            (Some(answer), _) if !answer.trim().is_empty() => answer,
            (_, Some(reasoning)) => reasoning,
            _ => return Err(OracleError::EmptyResponse),
        };
        debug!(model = %self.model, chars = content.len(), "generation received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = ChatRequest {
            model: "m".into(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: "hi".into(),
            }],
            max_tokens: 10,
            temperature: 0.5,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "m");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 10);
    }

    #[test]
    fn test_response_deserialization() {
        let body = r#"{"choices":[{"message":{"content":"ok","reasoning_content":null}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("ok"));
    }

    #[test]
    fn test_with_model_keeps_endpoint() {
        let client = ChatCompletionsClient::new(
            "http://localhost:8000/v1/chat/completions",
            "role-model",
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        let coordinator = client.with_model("coordinator-model");
        assert_eq!(coordinator.model(), "coordinator-model");
        assert_eq!(coordinator.url, client.url);
    }
}
