//! Conductor Types
//!
//! Data passed between the conductor phases.

use sdk::types::PlannedStep;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::context::ContextStore;

/// Self-contained description of what the user wants this turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedTask {
    pub task: String,

    /// The task could not be understood without earlier messages
    pub depends_on_history: bool,

    /// The task relied on stored memory entries
    pub depends_on_memory: bool,
}

/// Validated, ordered list of planned steps
///
/// Steps form a DAG through their inputs; the list order is a valid
/// topological order and is the order they execute in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    steps: Vec<PlannedStep>,
}

impl ExecutionPlan {
    /// Wrap steps that already passed plan validation
    pub(crate) fn from_validated(steps: Vec<PlannedStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[PlannedStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&PlannedStep> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Steps with no inputs; mutually independent
    pub fn roots(&self) -> Vec<&PlannedStep> {
        self.steps.iter().filter(|s| s.is_root()).collect()
    }

    /// Steps whose inputs are all in the store under their declared type
    /// and whose own output has not been written yet
    pub fn ready_steps(&self, store: &ContextStore) -> Vec<&PlannedStep> {
        self.steps
            .iter()
            .filter(|s| !store.contains_key(&s.context_key))
            .filter(|s| {
                s.inputs
                    .iter()
                    .all(|input| store.contains(&input.context_type, &input.source_context_key))
            })
            .collect()
    }

    pub fn capabilities(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.capability.as_str()).collect()
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            write!(f, "{}. [{}] {}", i + 1, step.capability, step.task_objective)?;
            if let Some(output) = &step.expected_output {
                write!(f, " -> {}/{}", output, step.context_key)?;
            }
            if !step.inputs.is_empty() {
                let inputs: Vec<String> = step
                    .inputs
                    .iter()
                    .map(|i| format!("{}/{}", i.context_type, i.source_context_key))
                    .collect();
                write!(f, " (uses {})", inputs.join(", "))?;
            }
            if i + 1 < self.steps.len() {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// Executor state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExecutionState {
    Idle,
    Running { step: usize },
    AwaitingApproval { step: usize },
    Retrying { step: usize, attempt: u32 },
    Succeeded,
    Failed,
}

impl ExecutionState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::AwaitingApproval { .. })
    }
}

/// One capability invocation made by the executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub step: String,
    pub capability: String,
    pub attempt: u32,
}

/// Trace of one executor run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub transitions: Vec<ExecutionState>,
    pub invocations: Vec<Invocation>,
}

impl ExecutionReport {
    pub fn final_state(&self) -> Option<&ExecutionState> {
        self.transitions.last()
    }

    /// Number of invocations for the given step key
    pub fn attempts_for(&self, step: &str) -> u32 {
        self.invocations.iter().filter(|i| i.step == step).count() as u32
    }
}
