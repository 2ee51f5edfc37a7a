//! Conductor Planner
//!
//! Asks the orchestrator completion for an ordered list of capability steps and
//! checks the candidate against the engine's own rules before accepting it.
//! A rejected candidate is re-requested with the validation error attached, up
//! to the configured number of attempts.

use sdk::errors::EngineError;
use sdk::types::{PlannedStep, StepInput};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::capabilities::CapabilityRegistry;
use crate::conductor::cancellation::TurnCancellation;
use crate::conductor::types::{ExecutionPlan, ExtractedTask};
use crate::context::ContextStore;
use crate::llm::{Completer, CompletionRequest, CompletionRole};

const INSTRUCTIONS: &str = "\
Plan the steps that complete the task using only the capabilities listed. Each step \
writes one context entry under its context_key. A step may only use outputs of earlier \
steps in the same plan. context_key values must be unique and must not reuse a key listed \
in existing_context. \
The last step must be a terminal capability, and only the last step may be terminal.";

/// Intermediate deserialization type for orchestrator JSON output
#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    steps: Vec<RawPlanStep>,
}

#[derive(Debug, Deserialize)]
struct RawPlanStep {
    context_key: String,
    capability: String,
    #[serde(default)]
    task_objective: String,
    expected_output: Option<String>,
    success_criteria: Option<String>,
    #[serde(default)]
    inputs: Vec<RawInput>,
}

/// Inputs arrive either spelled out or as a one-entry `{TYPE: key}` map
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawInput {
    Explicit {
        context_type: String,
        source_context_key: String,
    },
    Pair(HashMap<String, String>),
}

pub struct Planner<'a> {
    completer: &'a dyn Completer,
    registry: &'a CapabilityRegistry,
    max_attempts: u32,
}

impl<'a> Planner<'a> {
    pub fn new(completer: &'a dyn Completer, registry: &'a CapabilityRegistry, max_attempts: u32) -> Self {
        Self {
            completer,
            registry,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Produce a validated plan for `task` using only `active` capabilities
    pub async fn plan(
        &self,
        task: &ExtractedTask,
        active: &[String],
        store: &ContextStore,
        cancel: &TurnCancellation,
    ) -> Result<ExecutionPlan, EngineError> {
        let mut feedback: Option<String> = None;

        for attempt in 1..=self.max_attempts {
            let request = self.build_request(task, active, store, feedback.as_deref());
            let reply = cancel.race(self.completer.complete(request)).await??;

            let candidate = parse_steps(reply).and_then(|steps| {
                validate_plan(&steps, active, self.registry, store)?;
                Ok(steps)
            });

            match candidate {
                Ok(steps) => {
                    let plan = ExecutionPlan::from_validated(steps);
                    info!(
                        steps = plan.len(),
                        roots = plan.roots().len(),
                        attempt,
                        "Plan accepted"
                    );
                    debug!("Plan:\n{}", plan);
                    return Ok(plan);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Rejected plan candidate");
                    feedback = Some(e.to_string());
                }
            }
        }

        Err(EngineError::PlanningFailed {
            attempts: self.max_attempts,
            reason: feedback.unwrap_or_else(|| "no valid plan produced".to_string()),
        })
    }

    fn build_request(
        &self,
        task: &ExtractedTask,
        active: &[String],
        store: &ContextStore,
        feedback: Option<&str>,
    ) -> CompletionRequest {
        let mut capabilities = Vec::new();
        let mut examples = Vec::new();

        for capability in self.registry.iter().filter(|c| active.iter().any(|a| a == c.name())) {
            let guide = capability.orchestrator_guide();
            capabilities.push(json!({
                "name": capability.name(),
                "description": capability.description(),
                "provides": capability.provides(),
                "requires": capability.requires(),
                "terminal": capability.is_terminal(),
                "guide": guide.instructions,
            }));
            for example in guide.examples {
                let step = serde_json::to_string(&example.step).unwrap_or_default();
                examples.push(format!("{}: {}", example.scenario, step));
            }
        }

        let existing: Vec<Value> = store
            .keys()
            .map(|(context_type, key)| json!({ "context_type": context_type, "key": key }))
            .collect();

        let mut input = json!({
            "task": task.task,
            "capabilities": capabilities,
            "existing_context": existing,
        });
        if let Some(feedback) = feedback {
            input["previous_plan_rejected"] = json!(feedback);
        }

        CompletionRequest::new(
            CompletionRole::Orchestrator,
            input.to_string(),
            json!({
                "steps": [{
                    "context_key": "string",
                    "capability": "string",
                    "task_objective": "string",
                    "expected_output": "string or null for the terminal step",
                    "success_criteria": "string",
                    "inputs": [{ "context_type": "string", "source_context_key": "string" }]
                }]
            }),
        )
        .with_instructions(INSTRUCTIONS)
        .with_examples(examples)
    }
}

/// Parse orchestrator output into planned steps
fn parse_steps(reply: Value) -> Result<Vec<PlannedStep>, EngineError> {
    let raw: RawPlan = serde_json::from_value(reply).map_err(|e| EngineError::InvalidPlan {
        step: "<plan>".to_string(),
        reason: format!("malformed plan: {}", e),
    })?;

    raw.steps
        .into_iter()
        .map(|raw| {
            let mut inputs = Vec::with_capacity(raw.inputs.len());
            for input in raw.inputs {
                match input {
                    RawInput::Explicit {
                        context_type,
                        source_context_key,
                    } => inputs.push(StepInput::new(context_type, source_context_key)),
                    RawInput::Pair(map) if map.len() == 1 => {
                        inputs.extend(map.into_iter().map(|(t, k)| StepInput::new(t, k)))
                    }
                    RawInput::Pair(_) => {
                        return Err(EngineError::InvalidPlan {
                            step: raw.context_key.clone(),
                            reason: "input must name exactly one context type".to_string(),
                        })
                    }
                }
            }

            Ok(PlannedStep {
                context_key: raw.context_key,
                capability: raw.capability,
                task_objective: raw.task_objective,
                expected_output: raw.expected_output.filter(|s| !s.trim().is_empty()),
                success_criteria: raw.success_criteria.unwrap_or_default(),
                inputs,
            })
        })
        .collect()
}

/// Check a candidate plan against the registry, the active set and the store
///
/// Rules, per step in order:
/// - the capability is registered and active
/// - the context key is unique in the plan and absent from the store
/// - non-terminal steps declare an output their capability provides
/// - every input refers to an earlier step of the plan, under the type that step declared
/// - the plan is non-empty and exactly its last step is terminal
pub fn validate_plan(
    steps: &[PlannedStep],
    active: &[String],
    registry: &CapabilityRegistry,
    store: &ContextStore,
) -> Result<(), EngineError> {
    let invalid = |step: &str, reason: String| EngineError::InvalidPlan {
        step: step.to_string(),
        reason,
    };

    if steps.is_empty() {
        return Err(invalid("<plan>", "plan has no steps".to_string()));
    }

    let mut produced: HashMap<&str, Option<&str>> = HashMap::new();
    let mut keys: HashSet<&str> = HashSet::new();

    for (index, step) in steps.iter().enumerate() {
        let key = step.context_key.as_str();
        let is_last = index + 1 == steps.len();

        if key.trim().is_empty() {
            return Err(invalid(key, "context_key must not be empty".to_string()));
        }

        let capability = registry
            .get(&step.capability)
            .ok_or_else(|| invalid(key, format!("unknown capability '{}'", step.capability)))?;
        if !active.iter().any(|a| a == &step.capability) {
            return Err(invalid(
                key,
                format!("capability '{}' is not active for this task", step.capability),
            ));
        }

        if !keys.insert(key) {
            return Err(invalid(key, "context_key is used by an earlier step".to_string()));
        }
        if store.contains_key(key) {
            return Err(invalid(key, "context_key already exists in the session context".to_string()));
        }

        match (&step.expected_output, capability.is_terminal()) {
            (Some(output), _) if !capability.provides().contains(output) => {
                return Err(invalid(
                    key,
                    format!(
                        "capability '{}' cannot produce '{}' (provides {:?})",
                        step.capability,
                        output,
                        capability.provides()
                    ),
                ));
            }
            (None, false) => {
                return Err(invalid(key, "non-terminal step must declare expected_output".to_string()));
            }
            _ => {}
        }

        if capability.is_terminal() && !is_last {
            return Err(invalid(
                key,
                format!("terminal capability '{}' must be the last step", step.capability),
            ));
        }
        if is_last && !capability.is_terminal() {
            return Err(invalid(
                key,
                format!("last step uses non-terminal capability '{}'", step.capability),
            ));
        }

        for input in &step.inputs {
            let source = input.source_context_key.as_str();
            let actual = match produced.get(source) {
                Some(output) => *output,
                None if keys.contains(source) => {
                    return Err(invalid(
                        key,
                        format!("step cannot read its own output '{}'", source),
                    ));
                }
                None => {
                    return Err(invalid(
                        key,
                        format!("input '{}' is not produced by an earlier step", source),
                    ));
                }
            };

            if actual != Some(input.context_type.as_str()) {
                return Err(invalid(
                    key,
                    format!(
                        "input '{}' declared as '{}' but is '{}'",
                        source,
                        input.context_type,
                        actual.unwrap_or("<none>")
                    ),
                ));
            }
        }

        produced.insert(key, step.expected_output.as_deref());
    }

    Ok(())
}
