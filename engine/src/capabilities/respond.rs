//! Built-in terminal capability that writes the final answer
//!
//! Reads the summary view of everything the plan gathered and asks the
//! completion backend for a user-facing reply.

use async_trait::async_trait;
use sdk::capability::{
    AvailableContext, Capability, CapabilityError, CapabilityOutcome, ClassifierGuide,
    ExampleStep, OrchestratorGuide,
};
use sdk::types::{PlannedStep, RetryPolicy};
use serde_json::json;
use std::sync::Arc;

use crate::llm::{Completer, CompletionRequest, CompletionRole, LLMError};

pub struct RespondCapability {
    completer: Arc<dyn Completer>,
    retry: RetryPolicy,
}

impl RespondCapability {
    pub fn new(completer: Arc<dyn Completer>, retry: RetryPolicy) -> Self {
        Self { completer, retry }
    }
}

/// Completion failures seen from inside a capability
fn to_capability_error(error: LLMError) -> CapabilityError {
    match error {
        LLMError::Timeout => CapabilityError::Timeout("response generation timed out".to_string()),
        LLMError::ProviderUnavailable(msg) | LLMError::NetworkError(msg) => {
            CapabilityError::Connection(msg)
        }
        LLMError::RateLimitExceeded => {
            CapabilityError::RateLimited("completion backend rate limited".to_string())
        }
        other => CapabilityError::Failed(other.to_string()),
    }
}

#[async_trait]
impl Capability for RespondCapability {
    fn name(&self) -> &str {
        "respond"
    }

    fn description(&self) -> &str {
        "Writes the final answer to the user from the context gathered by earlier steps"
    }

    fn provides(&self) -> Vec<String> {
        Vec::new()
    }

    fn is_terminal(&self) -> bool {
        true
    }

    fn always_active(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        task_objective: &str,
        context: &AvailableContext,
    ) -> Result<CapabilityOutcome, CapabilityError> {
        let input = json!({
            "objective": task_objective,
            "context": context.summaries,
        });

        let request = CompletionRequest::new(
            CompletionRole::Responder,
            input.to_string(),
            json!({ "response": "string" }),
        )
        .with_instructions(
            "Answer the objective using only the provided context. When the context \
             includes aggregate statistics for a sampled series, quote the statistics \
             rather than the sample.",
        );

        let reply = self
            .completer
            .complete(request)
            .await
            .map_err(to_capability_error)?;

        let text = reply
            .get("response")
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| CapabilityError::Failed("reply had no 'response' text".to_string()))?;

        Ok(CapabilityOutcome::Respond(text.to_string()))
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone()
    }

    fn classifier_guide(&self) -> ClassifierGuide {
        ClassifierGuide {
            instructions: "Always active; ends every plan that can be answered.".to_string(),
            examples: Vec::new(),
        }
    }

    fn orchestrator_guide(&self) -> OrchestratorGuide {
        OrchestratorGuide {
            instructions: "Use as the last step. List every context entry the answer \
                           needs as an input. It has no expected_output."
                .to_string(),
            examples: vec![ExampleStep {
                scenario: "Answer with the weather fetched in step 'weather_sf'".to_string(),
                step: PlannedStep::new("reply", "respond", "Tell the user the current weather")
                    .with_input("CURRENT_WEATHER", "weather_sf")
                    .with_success_criteria("User receives the temperature and conditions"),
            }],
        }
    }
}
