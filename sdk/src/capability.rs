//! Capability trait and execution context types
//!
//! A capability is a unit of domain logic the conductor can place in a plan.
//! Capabilities never talk to each other directly: they read typed entries from
//! the [`AvailableContext`] handed to them and return a [`CapabilityOutcome`]
//! which the executor writes back to the session's context store.

use crate::context::{ContextEntry, ContextPayload, ContextSummary};
use crate::types::{ErrorClassification, PlannedStep, RetryPolicy};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a capability's `execute`
///
/// The executor never propagates these directly; each one is passed through
/// [`Capability::classify_error`] first.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CapabilityError {
    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing context: {context_type}/{key}")]
    MissingContext { context_type: String, key: String },

    #[error("{0}")]
    Failed(String),
}

/// What a capability produced
#[derive(Debug)]
pub enum CapabilityOutcome {
    /// A payload to be written under the step's context key
    Completed(Box<dyn ContextPayload>),

    /// Final user-facing text; only valid from a terminal step
    Respond(String),

    /// The capability needs a human decision before it can continue
    ApprovalRequired { description: String },
}

impl CapabilityOutcome {
    pub fn completed(payload: impl ContextPayload + 'static) -> Self {
        Self::Completed(Box::new(payload))
    }

    pub fn approval_required(description: impl Into<String>) -> Self {
        Self::ApprovalRequired {
            description: description.into(),
        }
    }
}

/// Context entries visible to a step while it runs
#[derive(Debug, Clone, Default)]
pub struct AvailableContext {
    /// Entries referenced by the step's declared inputs, in declaration order
    pub entries: Vec<ContextEntry>,

    /// Summary view of every entry in the store, filled for terminal steps only
    pub summaries: Vec<ContextSummary>,

    /// Set when the step is being re-run after a human approved it
    pub approved: bool,

    /// Context key the step writes to
    pub step_key: String,
}

impl AvailableContext {
    pub fn new(step_key: impl Into<String>) -> Self {
        Self {
            step_key: step_key.into(),
            ..Default::default()
        }
    }

    pub fn get(&self, context_type: &str, key: &str) -> Option<&ContextEntry> {
        self.entries
            .iter()
            .find(|e| e.context_type == context_type && e.key == key)
    }

    /// First input entry of the given type
    pub fn first_of_type(&self, context_type: &str) -> Option<&ContextEntry> {
        self.entries.iter().find(|e| e.context_type == context_type)
    }

    /// Like [`get`](Self::get) but returns `MissingContext` when absent
    pub fn require(&self, context_type: &str, key: &str) -> Result<&ContextEntry, CapabilityError> {
        self.get(context_type, key)
            .ok_or_else(|| CapabilityError::MissingContext {
                context_type: context_type.to_string(),
                key: key.to_string(),
            })
    }
}

/// Where an error happened, passed to `classify_error`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub capability: String,
    pub step: String,

    /// 1-based invocation count that produced the error
    pub attempt: u32,
}

/// Labeled query shown to the classifier as a few-shot example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledExample {
    pub query: String,
    pub is_match: bool,
    pub reason: String,
}

impl LabeledExample {
    pub fn matching(query: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            is_match: true,
            reason: reason.into(),
        }
    }

    pub fn not_matching(query: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            is_match: false,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierGuide {
    pub instructions: String,
    pub examples: Vec<LabeledExample>,
}

/// Example planned step with the situation it applies to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleStep {
    pub scenario: String,
    pub step: PlannedStep,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorGuide {
    pub instructions: String,
    pub examples: Vec<ExampleStep>,
}

/// Trait every capability implements
///
/// Implementations must be `Send + Sync`; the registry shares them behind `Arc`.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Unique name used in plans
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Context types this capability may write
    fn provides(&self) -> Vec<String>;

    /// Context types this capability reads
    fn requires(&self) -> Vec<String> {
        Vec::new()
    }

    /// Terminal capabilities end a plan and produce the user-facing response
    fn is_terminal(&self) -> bool {
        false
    }

    /// Always-active capabilities skip classification
    fn always_active(&self) -> bool {
        false
    }

    async fn execute(
        &self,
        task_objective: &str,
        context: &AvailableContext,
    ) -> Result<CapabilityOutcome, CapabilityError>;

    /// Map an execution error to a severity
    ///
    /// Transient transport failures are retriable by default; everything else aborts.
    fn classify_error(&self, error: &CapabilityError, ctx: &ErrorContext) -> ErrorClassification {
        let classification = match error {
            CapabilityError::Timeout(_)
            | CapabilityError::Connection(_)
            | CapabilityError::RateLimited(_) => ErrorClassification::retriable(error.to_string()),
            _ => ErrorClassification::critical(error.to_string()),
        };
        classification
            .with_metadata("capability", serde_json::json!(ctx.capability))
            .with_metadata("step", serde_json::json!(ctx.step))
            .with_metadata("attempt", serde_json::json!(ctx.attempt))
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
    }

    fn classifier_guide(&self) -> ClassifierGuide {
        ClassifierGuide::default()
    }

    fn orchestrator_guide(&self) -> OrchestratorGuide {
        OrchestratorGuide::default()
    }
}
