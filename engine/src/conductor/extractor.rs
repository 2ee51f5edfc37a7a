//! Task Extractor
//!
//! Compresses the recent conversation and memory into one self-contained task,
//! resolving references like "there" or "do the same for Paris" so later phases
//! never need the raw history.

use sdk::errors::EngineError;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::conductor::cancellation::TurnCancellation;
use crate::conductor::types::ExtractedTask;
use crate::llm::{Completer, CompletionRequest, CompletionRole, Message};

const INSTRUCTIONS: &str = "\
Rewrite the user's latest message as one self-contained task. Replace pronouns and \
references with the concrete things they refer to from the conversation or memory. \
Set depends_on_history to true when earlier messages were needed to understand the \
task, and depends_on_memory to true when a memory entry was needed.";

/// Shape of the extractor's reply
#[derive(Debug, Deserialize)]
struct RawExtraction {
    task: String,
    #[serde(default)]
    depends_on_history: bool,
    #[serde(default)]
    depends_on_memory: bool,
}

pub struct TaskExtractor<'a> {
    completer: &'a dyn Completer,
    history_window: usize,
}

impl<'a> TaskExtractor<'a> {
    pub fn new(completer: &'a dyn Completer, history_window: usize) -> Self {
        Self {
            completer,
            history_window: history_window.max(1),
        }
    }

    pub async fn extract(
        &self,
        history: &[Message],
        memory: &[String],
        bypass: bool,
        cancel: &TurnCancellation,
    ) -> Result<ExtractedTask, EngineError> {
        if history.is_empty() {
            return Err(EngineError::InvalidInput(
                "cannot extract a task from an empty conversation".to_string(),
            ));
        }

        let window = &history[history.len().saturating_sub(self.history_window)..];
        let transcript = format_history(window);

        if bypass {
            debug!("Task extraction bypassed");
            return Ok(ExtractedTask {
                task: transcript,
                depends_on_history: true,
                depends_on_memory: false,
            });
        }

        let mut input = format!("Conversation:\n{}", transcript);
        if !memory.is_empty() {
            input.push_str("\n\nMemory:\n");
            input.push_str(
                &memory
                    .iter()
                    .map(|m| format!("- {}", m))
                    .collect::<Vec<_>>()
                    .join("\n"),
            );
        }

        let request = CompletionRequest::new(
            CompletionRole::TaskExtractor,
            input,
            json!({
                "task": "string",
                "depends_on_history": "boolean",
                "depends_on_memory": "boolean"
            }),
        )
        .with_instructions(INSTRUCTIONS)
        .with_examples(vec![
            "Conversation: user: weather in Paris? / assistant: 18C and sunny. / user: and tomorrow? \
             -> {\"task\": \"Get tomorrow's weather forecast for Paris\", \"depends_on_history\": true, \"depends_on_memory\": false}"
                .to_string(),
        ]);

        let reply = cancel.race(self.completer.complete(request)).await??;
        let raw: RawExtraction = serde_json::from_value(reply).map_err(|e| {
            EngineError::Completion(format!("task_extractor reply was malformed: {}", e))
        })?;

        let task = raw.task.trim().to_string();
        if task.is_empty() {
            return Err(EngineError::Completion(
                "task_extractor returned an empty task".to_string(),
            ));
        }

        info!(
            depends_on_history = raw.depends_on_history,
            depends_on_memory = raw.depends_on_memory,
            "Task extracted"
        );
        debug!(task = %task, "Extracted task");

        Ok(ExtractedTask {
            task,
            depends_on_history: raw.depends_on_history,
            depends_on_memory: raw.depends_on_memory,
        })
    }
}

fn format_history(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Result as LLMResult;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Mutex;

    struct Scripted {
        reply: Value,
        inputs: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(reply: Value) -> Self {
            Self {
                reply,
                inputs: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Completer for Scripted {
        async fn complete(&self, request: CompletionRequest) -> LLMResult<Value> {
            self.inputs.lock().unwrap().push(request.input);
            Ok(self.reply.clone())
        }
    }

    fn conversation() -> Vec<Message> {
        vec![
            Message::user("What's the weather in Paris?"),
            Message::assistant("18C and sunny."),
            Message::user("And in Rome?"),
        ]
    }

    #[tokio::test]
    async fn test_extract_resolves_task() {
        let completer = Scripted::new(json!({
            "task": "Get current weather for Rome",
            "depends_on_history": true,
            "depends_on_memory": false
        }));
        let extractor = TaskExtractor::new(&completer, 10);

        let task = extractor
            .extract(&conversation(), &["Lives in Italy".to_string()], false, &TurnCancellation::new())
            .await
            .unwrap();

        assert_eq!(task.task, "Get current weather for Rome");
        assert!(task.depends_on_history);
        assert!(!task.depends_on_memory);

        let inputs = completer.inputs.lock().unwrap();
        assert!(inputs[0].contains("user: And in Rome?"));
        assert!(inputs[0].contains("- Lives in Italy"));
    }

    #[tokio::test]
    async fn test_bypass_uses_formatted_history() {
        let completer = Scripted::new(json!({}));
        let extractor = TaskExtractor::new(&completer, 2);

        let task = extractor
            .extract(&conversation(), &[], true, &TurnCancellation::new())
            .await
            .unwrap();

        assert_eq!(task.task, "assistant: 18C and sunny.\nuser: And in Rome?");
        assert!(task.depends_on_history);
        assert!(!task.depends_on_memory);
        assert!(completer.inputs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_history_rejected() {
        let completer = Scripted::new(json!({}));
        let extractor = TaskExtractor::new(&completer, 10);

        let err = extractor
            .extract(&[], &[], true, &TurnCancellation::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_malformed_reply_is_completion_error() {
        let completer = Scripted::new(json!({ "depends_on_history": true }));
        let extractor = TaskExtractor::new(&completer, 10);

        let err = extractor
            .extract(&conversation(), &[], false, &TurnCancellation::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Completion(_)));
    }
}
