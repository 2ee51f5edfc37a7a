//! Built-in terminal capability that asks the user a question instead of answering

use async_trait::async_trait;
use sdk::capability::{
    AvailableContext, Capability, CapabilityError, CapabilityOutcome, ClassifierGuide,
    ExampleStep, OrchestratorGuide,
};
use sdk::types::{PlannedStep, RetryPolicy};

#[derive(Debug, Default)]
pub struct ClarifyCapability;

impl ClarifyCapability {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Capability for ClarifyCapability {
    fn name(&self) -> &str {
        "clarify"
    }

    fn description(&self) -> &str {
        "Asks the user a follow-up question when the request is ambiguous or missing details"
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

    /// The objective is the question itself
    async fn execute(
        &self,
        task_objective: &str,
        _context: &AvailableContext,
    ) -> Result<CapabilityOutcome, CapabilityError> {
        let question = task_objective.trim();
        if question.is_empty() {
            return Err(CapabilityError::InvalidInput(
                "clarify needs the question as its objective".to_string(),
            ));
        }
        Ok(CapabilityOutcome::Respond(question.to_string()))
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::no_retry()
    }

    fn classifier_guide(&self) -> ClassifierGuide {
        ClassifierGuide {
            instructions: "Always active; used when the task cannot be planned as stated."
                .to_string(),
            examples: Vec::new(),
        }
    }

    fn orchestrator_guide(&self) -> OrchestratorGuide {
        OrchestratorGuide {
            instructions: "Use as the only step when required details are missing. \
                           The task_objective is the exact question to ask."
                .to_string(),
            examples: vec![ExampleStep {
                scenario: "User asked for the weather without naming a place".to_string(),
                step: PlannedStep::new(
                    "ask_location",
                    "clarify",
                    "Which city would you like the weather for?",
                ),
            }],
        }
    }
}
