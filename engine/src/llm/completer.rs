//! Structured completion boundary used by the conductor phases

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::{extract_json_object, LLMError, LLMProvider, Message, Result};

/// Which decision point is asking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionRole {
    TaskExtractor,
    Classifier,
    Orchestrator,
    ApprovalClassifier,
    Responder,
}

impl CompletionRole {
    fn preamble(&self) -> &'static str {
        match self {
            Self::TaskExtractor => {
                "You rewrite the latest user request into one self-contained task description."
            }
            Self::Classifier => {
                "You decide whether a single capability is needed to complete a task."
            }
            Self::Orchestrator => {
                "You plan the ordered capability invocations that complete a task."
            }
            Self::ApprovalClassifier => {
                "You decide whether a human reply approves or rejects a pending action."
            }
            Self::Responder => "You write the final answer to the user from gathered context.",
        }
    }
}

impl fmt::Display for CompletionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TaskExtractor => "task_extractor",
            Self::Classifier => "classifier",
            Self::Orchestrator => "orchestrator",
            Self::ApprovalClassifier => "approval_classifier",
            Self::Responder => "responder",
        };
        write!(f, "{}", name)
    }
}

/// One structured completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub role: CompletionRole,
    pub instructions: String,

    /// Few-shot examples, already rendered
    #[serde(default)]
    pub examples: Vec<String>,

    pub input: String,

    /// JSON schema the reply must follow
    pub output_schema: Value,
}

impl CompletionRequest {
    pub fn new(role: CompletionRole, input: impl Into<String>, output_schema: Value) -> Self {
        Self {
            role,
            instructions: String::new(),
            examples: Vec::new(),
            input: input.into(),
            output_schema,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_examples(mut self, examples: Vec<String>) -> Self {
        self.examples = examples;
        self
    }

    /// Render into the system/user message pair sent to a chat provider
    pub fn to_messages(&self) -> Vec<Message> {
        let mut system = String::from(self.role.preamble());

        if !self.instructions.is_empty() {
            system.push_str("\n\n");
            system.push_str(&self.instructions);
        }

        if !self.examples.is_empty() {
            system.push_str("\n\nExamples:");
            for (i, example) in self.examples.iter().enumerate() {
                system.push_str(&format!("\n{}. {}", i + 1, example));
            }
        }

        system.push_str(&format!(
            "\n\nReply with a single JSON object matching this schema and nothing else:\n{}",
            self.output_schema
        ));

        vec![Message::system(system), Message::user(self.input.clone())]
    }
}

/// Structured request/response completion
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Value>;
}

#[async_trait]
impl<T: Completer + ?Sized> Completer for Arc<T> {
    async fn complete(&self, request: CompletionRequest) -> Result<Value> {
        (**self).complete(request).await
    }
}

/// Adapts a chat provider to the structured [`Completer`] interface
pub struct ProviderCompleter {
    provider: Arc<dyn LLMProvider>,
}

impl ProviderCompleter {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Completer for ProviderCompleter {
    async fn complete(&self, request: CompletionRequest) -> Result<Value> {
        let messages = request.to_messages();
        debug!(
            role = %request.role,
            provider = self.provider.name(),
            chars = messages.iter().map(|m| m.content.len()).sum::<usize>(),
            "Sending completion"
        );

        let reply = self.provider.generate(&messages).await?;

        extract_json_object(&reply).ok_or_else(|| {
            let preview: String = reply.chars().take(200).collect();
            LLMError::ParseError(format!(
                "{} reply contained no JSON object: {}",
                request.role, preview
            ))
        })
    }
}
