//! LLM Provider Abstraction Layer
//!
//! Two layers live here. [`LLMProvider`] is a plain chat-message generator
//! (Ollama ships with the engine). [`Completer`] is the structured request/response
//! boundary every conductor phase talks to: one role, instructions, few-shot
//! examples and an input in, one JSON value out. [`ProviderCompleter`] bridges the
//! two by rendering requests into chat messages and pulling the JSON object back
//! out of the reply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod completer;
pub mod ollama;

pub use completer::{Completer, CompletionRequest, CompletionRole, ProviderCompleter};

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<LLMError> for sdk::errors::EngineError {
    fn from(error: LLMError) -> Self {
        sdk::errors::EngineError::Completion(error.to_string())
    }
}

/// Message in a conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender (user, assistant, system)
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "ollama")
    fn name(&self) -> &str;

    /// Generate the assistant's reply text for a conversation
    async fn generate(&self, messages: &[Message]) -> Result<String>;

    /// Check if the provider is currently healthy and available
    async fn check_health(&self) -> bool {
        true
    }
}

/// Pull a JSON object out of model output
///
/// Models answer with a bare object, an object inside a markdown fence, or an
/// object surrounded by prose. The first candidate that parses as an object wins.
pub fn extract_json_object(content: &str) -> Option<serde_json::Value> {
    let content = content.trim();

    std::iter::once(content)
        .chain(fenced_body(content))
        .chain(content.match_indices('{').filter_map(|(pos, _)| balanced_object(&content[pos..])))
        .find_map(|candidate| {
            serde_json::from_str::<serde_json::Value>(candidate.trim())
                .ok()
                .filter(serde_json::Value::is_object)
        })
}

/// Body of the first ``` fence, minus its language tag line
fn fenced_body(content: &str) -> Option<&str> {
    let (_, rest) = content.split_once("```")?;
    let (_, body) = rest.split_once('\n')?;
    let (body, _) = body.split_once("```")?;
    (!body.trim().is_empty()).then_some(body)
}

/// Prefix of `s` up to the brace closing its leading `{`, skipping braces in strings
fn balanced_object(s: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in s.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
