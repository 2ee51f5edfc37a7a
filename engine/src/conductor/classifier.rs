//! Classifier
//!
//! Decides which registered capabilities a task needs. Each capability is
//! judged by its own completion using that capability's classifier guide;
//! judgements run concurrently under a cap and are joined before returning.
//! The active set is always reported in registry order so the result does not
//! depend on which completion finished first.

use futures::stream::{self, StreamExt};
use sdk::capability::Capability;
use sdk::errors::EngineError;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

use crate::capabilities::CapabilityRegistry;
use crate::conductor::cancellation::TurnCancellation;
use crate::conductor::types::ExtractedTask;
use crate::llm::{Completer, CompletionRequest, CompletionRole};

pub struct Classifier<'a> {
    completer: &'a dyn Completer,
    concurrency: usize,
}

impl<'a> Classifier<'a> {
    pub fn new(completer: &'a dyn Completer, concurrency: usize) -> Self {
        Self {
            completer,
            concurrency: concurrency.max(1),
        }
    }

    /// Names of the capabilities active for `task`, in registry order
    pub async fn classify(
        &self,
        task: &ExtractedTask,
        registry: &CapabilityRegistry,
        bypass: bool,
        cancel: &TurnCancellation,
    ) -> Result<Vec<String>, EngineError> {
        if bypass {
            debug!("Classification bypassed, activating all capabilities");
            return Ok(registry.names());
        }

        let candidates: Vec<(usize, &Arc<dyn Capability>)> = registry
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.always_active())
            .collect();

        let judgements = stream::iter(candidates)
            .map(|(index, capability)| async move {
                let verdict = self.judge(task, capability.as_ref()).await;
                (index, verdict)
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>();

        let mut judgements = cancel.race(judgements).await?;
        judgements.sort_by_key(|(index, _)| *index);

        let mut matched = vec![false; registry.len()];
        for (index, verdict) in judgements {
            matched[index] = verdict?;
        }

        let active: Vec<String> = registry
            .iter()
            .enumerate()
            .filter(|(i, c)| c.always_active() || matched[*i])
            .map(|(_, c)| c.name().to_string())
            .collect();

        info!(active = ?active, "Capabilities classified");
        Ok(active)
    }

    async fn judge(&self, task: &ExtractedTask, capability: &dyn Capability) -> Result<bool, EngineError> {
        let guide = capability.classifier_guide();

        let mut instructions = format!(
            "Capability '{}': {}",
            capability.name(),
            capability.description()
        );
        if !guide.instructions.is_empty() {
            instructions.push_str("\n\n");
            instructions.push_str(&guide.instructions);
        }

        let examples = guide
            .examples
            .iter()
            .map(|e| {
                format!(
                    "Task: {} -> {{\"is_match\": {}}} ({})",
                    e.query, e.is_match, e.reason
                )
            })
            .collect();

        let request = CompletionRequest::new(
            CompletionRole::Classifier,
            format!("Task: {}", task.task),
            json!({ "is_match": "boolean" }),
        )
        .with_instructions(instructions)
        .with_examples(examples);

        let reply = self.completer.complete(request).await.map_err(|e| {
            EngineError::Completion(format!(
                "classifier failed for '{}': {}",
                capability.name(),
                e
            ))
        })?;

        let is_match = reply
            .get("is_match")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| {
                EngineError::Completion(format!(
                    "classifier reply for '{}' had no boolean is_match",
                    capability.name()
                ))
            })?;

        debug!(capability = capability.name(), is_match, "Classifier verdict");
        Ok(is_match)
    }
}
