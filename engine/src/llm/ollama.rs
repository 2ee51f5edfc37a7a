//! Ollama LLM Provider
//!
//! Talks to a local Ollama server through the non-streaming `/api/chat`
//! endpoint. Every conductor phase expects one JSON object back, so requests
//! set `format: "json"` and a zero temperature.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use super::{LLMError, LLMProvider, Message, Result};

#[derive(Debug, Clone)]
pub struct OllamaProvider {
    /// Server root without trailing slash, e.g. http://localhost:11434
    base_url: String,
    model: String,
    client: Client,
}

impl OllamaProvider {
    /// Build a provider whose requests give up after `timeout`
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LLMError::InvalidRequest(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
        })
    }

    fn chat_request<'a>(&'a self, messages: &'a [Message]) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            stream: false,
            format: "json",
            options: ChatOptions { temperature: 0.0 },
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> LLMError {
        if e.is_timeout() {
            LLMError::Timeout
        } else if e.is_connect() {
            LLMError::ProviderUnavailable(format!("No Ollama server at {}", self.base_url))
        } else {
            LLMError::NetworkError(e.to_string())
        }
    }

    fn status_error(&self, status: StatusCode, body: String) -> LLMError {
        match status {
            StatusCode::TOO_MANY_REQUESTS => LLMError::RateLimitExceeded,
            StatusCode::NOT_FOUND => LLMError::InvalidRequest(format!(
                "Model '{}' is not available; run `ollama pull {}`",
                self.model, self.model
            )),
            _ => LLMError::ProviderUnavailable(format!("Ollama returned {}: {}", status, body)),
        }
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let request = self.chat_request(messages);
        debug!(
            model = %self.model,
            messages = messages.len(),
            chars = messages.iter().map(|m| m.content.len()).sum::<usize>(),
            "Ollama chat request"
        );

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(self.status_error(status, body));
        }

        let reply: ChatResponse = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(format!("Unexpected Ollama reply: {}", e)))?;

        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Ollama chat reply");
        Ok(reply.message.content)
    }

    async fn check_health(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        matches!(self.client.get(url).send().await, Ok(r) if r.status().is_success())
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    format: &'static str,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: String,
}
