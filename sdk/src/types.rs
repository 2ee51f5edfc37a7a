//! Shared value types for capabilities and plans

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Severity assigned to a capability error by its classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Transient failure, worth another attempt
    Retriable,
    /// Aborts the plan immediately
    Critical,
}

/// Outcome of classifying a capability error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub severity: Severity,

    /// Message safe to show to the user
    pub user_message: String,

    /// Structured detail for logs and failure reports
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl ErrorClassification {
    pub fn retriable(user_message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Retriable,
            user_message: user_message.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn critical(user_message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Critical,
            user_message: user_message.into(),
            metadata: serde_json::Value::Null,
        }
    }

    /// Attach a metadata field, turning `metadata` into an object if needed
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        if !self.metadata.is_object() {
            self.metadata = serde_json::Value::Object(serde_json::Map::new());
        }
        if let Some(map) = self.metadata.as_object_mut() {
            map.insert(key.into(), value);
        }
        self
    }

    pub fn is_retriable(&self) -> bool {
        self.severity == Severity::Retriable
    }
}

/// Bounded exponential backoff configuration
///
/// `max_attempts` counts total invocations, so a policy with `max_attempts = 3`
/// executes a capability at most three times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms: base_delay.as_millis() as u64,
            backoff_multiplier,
            max_delay_ms: default_max_delay_ms(),
        }
    }

    /// A single attempt, no retries
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    /// Retries without waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, 1.0)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay_ms = max_delay.as_millis() as u64;
        self
    }

    /// Delay to wait after the `failed_attempts`-th failure (1-based)
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        if self.base_delay_ms == 0 {
            return Duration::ZERO;
        }
        let exponent = failed_attempts.saturating_sub(1).min(30) as i32;
        let multiplier = self.backoff_multiplier.max(1.0).powi(exponent);
        let cap = self.max_delay_ms.max(self.base_delay_ms) as f64;
        let millis = (self.base_delay_ms as f64 * multiplier).min(cap);
        Duration::from_millis(millis as u64)
    }

    /// Whether another attempt is allowed after `attempts` invocations
    pub fn allows_another(&self, attempts: u32) -> bool {
        attempts < self.max_attempts.max(1)
    }
}

/// Reference from a step to an output written by an earlier step
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepInput {
    pub context_type: String,
    pub source_context_key: String,
}

impl StepInput {
    pub fn new(context_type: impl Into<String>, source_context_key: impl Into<String>) -> Self {
        Self {
            context_type: context_type.into(),
            source_context_key: source_context_key.into(),
        }
    }
}

/// One node of an execution plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedStep {
    /// Output slot name, unique within the plan
    pub context_key: String,

    /// Registered capability name
    pub capability: String,

    /// Natural-language instruction for the capability
    pub task_objective: String,

    /// Context type written by this step; `None` only for terminal steps
    #[serde(default)]
    pub expected_output: Option<String>,

    #[serde(default)]
    pub success_criteria: String,

    #[serde(default)]
    pub inputs: Vec<StepInput>,
}

impl PlannedStep {
    pub fn new(
        context_key: impl Into<String>,
        capability: impl Into<String>,
        task_objective: impl Into<String>,
    ) -> Self {
        Self {
            context_key: context_key.into(),
            capability: capability.into(),
            task_objective: task_objective.into(),
            expected_output: None,
            success_criteria: String::new(),
            inputs: Vec::new(),
        }
    }

    pub fn with_output(mut self, context_type: impl Into<String>) -> Self {
        self.expected_output = Some(context_type.into());
        self
    }

    pub fn with_input(
        mut self,
        context_type: impl Into<String>,
        source_context_key: impl Into<String>,
    ) -> Self {
        self.inputs.push(StepInput::new(context_type, source_context_key));
        self
    }

    pub fn with_success_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.success_criteria = criteria.into();
        self
    }

    /// A step with no inputs; independent of every other root
    pub fn is_root(&self) -> bool {
        self.inputs.is_empty()
    }
}
