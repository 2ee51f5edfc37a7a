//! Conductor Executor
//!
//! Walks a validated plan in order, invoking each step's capability and writing
//! its output to the session context store. Handles readiness checks, output
//! type checks, approval interrupts and bounded retries. Every state transition
//! is logged and recorded on the [`ExecutionReport`].

use sdk::capability::{AvailableContext, Capability, CapabilityOutcome, ErrorContext};
use sdk::context::ContextEntry;
use sdk::errors::EngineError;
use sdk::types::PlannedStep;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::capabilities::CapabilityRegistry;
use crate::conductor::cancellation::TurnCancellation;
use crate::conductor::types::{ExecutionPlan, ExecutionReport, ExecutionState, Invocation};
use crate::context::ContextStore;

/// How a run ended when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    Succeeded {
        response: String,
    },
    AwaitingApproval {
        step_index: usize,
        capability: String,
        description: String,
    },
}

pub struct Executor<'a> {
    registry: &'a CapabilityRegistry,
    cancel: &'a TurnCancellation,
    sample_points: usize,
    state: ExecutionState,
    report: ExecutionReport,
}

impl<'a> Executor<'a> {
    pub fn new(registry: &'a CapabilityRegistry, cancel: &'a TurnCancellation, sample_points: usize) -> Self {
        Self {
            registry,
            cancel,
            sample_points,
            state: ExecutionState::Idle,
            report: ExecutionReport {
                transitions: vec![ExecutionState::Idle],
                invocations: Vec::new(),
            },
        }
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub fn into_report(self) -> ExecutionReport {
        self.report
    }

    /// Index of the step the executor last ran or stopped at
    pub fn current_step(&self) -> Option<usize> {
        self.report.transitions.iter().rev().find_map(|s| match s {
            ExecutionState::Running { step }
            | ExecutionState::AwaitingApproval { step }
            | ExecutionState::Retrying { step, .. } => Some(*step),
            _ => None,
        })
    }

    fn transition(&mut self, next: ExecutionState) {
        debug!(from = ?self.state, to = ?next, "Executor transition");
        self.state = next.clone();
        self.report.transitions.push(next);
    }

    /// Run `plan` from step `start`
    ///
    /// When `approved` is set the first step runs with approval already granted.
    pub async fn execute(
        &mut self,
        plan: &ExecutionPlan,
        store: &mut ContextStore,
        start: usize,
        approved: bool,
    ) -> Result<ExecutionResult, EngineError> {
        let started = Instant::now();
        let result = self.run_steps(plan, store, start, approved).await;

        match &result {
            Ok(ExecutionResult::Succeeded { .. }) => {
                self.transition(ExecutionState::Succeeded);
                info!(
                    steps = plan.len().saturating_sub(start),
                    "Plan succeeded in {:.1}s",
                    started.elapsed().as_secs_f64()
                );
            }
            Ok(ExecutionResult::AwaitingApproval { step_index, .. }) => {
                self.transition(ExecutionState::AwaitingApproval { step: *step_index });
            }
            Err(e) => {
                self.transition(ExecutionState::Failed);
                error!(error = %e, "Plan failed");
            }
        }

        result
    }

    async fn run_steps(
        &mut self,
        plan: &ExecutionPlan,
        store: &mut ContextStore,
        start: usize,
        approved: bool,
    ) -> Result<ExecutionResult, EngineError> {
        // A resume index comes back from storage, so it may not fit the plan
        if start >= plan.len() {
            return Err(EngineError::InvalidInput(format!(
                "cannot start at step {} of a {}-step plan",
                start,
                plan.len()
            )));
        }

        for (index, step) in plan.steps().iter().enumerate().skip(start) {
            self.transition(ExecutionState::Running { step: index });
            self.cancel.check()?;

            check_readiness(step, store)?;
            let capability = self.registry.resolve(&step.capability)?;

            let mut context = AvailableContext::new(&step.context_key);
            context.approved = approved && index == start;
            for input in &step.inputs {
                let entry = store.get(&input.context_type, &input.source_context_key)?;
                context.entries.push(entry.clone());
            }
            if capability.is_terminal() {
                context.summaries = store.summaries();
            }

            info!(
                step = %step.context_key,
                capability = %step.capability,
                index,
                approved = context.approved,
                "Executing step"
            );

            match self.invoke(index, step, &capability, &context).await? {
                CapabilityOutcome::Completed(payload) => {
                    if capability.is_terminal() {
                        return Err(EngineError::CapabilityFailed {
                            capability: step.capability.clone(),
                            step: step.context_key.clone(),
                            message: "terminal capability returned data instead of a response"
                                .to_string(),
                        });
                    }

                    let expected = step.expected_output.as_deref().unwrap_or_default();
                    if payload.context_type() != expected {
                        return Err(EngineError::OutputTypeMismatch {
                            step: step.context_key.clone(),
                            expected: expected.to_string(),
                            actual: payload.context_type().to_string(),
                        });
                    }

                    let entry = ContextEntry::from_payload(
                        step.context_key.clone(),
                        payload.as_ref(),
                        self.sample_points,
                    );
                    store.put(entry)?;
                }
                CapabilityOutcome::Respond(response) => {
                    if !capability.is_terminal() {
                        return Err(EngineError::CapabilityFailed {
                            capability: step.capability.clone(),
                            step: step.context_key.clone(),
                            message: "only terminal capabilities may respond".to_string(),
                        });
                    }
                    return Ok(ExecutionResult::Succeeded { response });
                }
                CapabilityOutcome::ApprovalRequired { description } => {
                    if context.approved {
                        return Err(EngineError::CapabilityFailed {
                            capability: step.capability.clone(),
                            step: step.context_key.clone(),
                            message: "approval requested again after it was granted".to_string(),
                        });
                    }
                    return Ok(ExecutionResult::AwaitingApproval {
                        step_index: index,
                        capability: step.capability.clone(),
                        description,
                    });
                }
            }
        }

        Err(EngineError::CapabilityFailed {
            capability: plan
                .steps()
                .last()
                .map(|s| s.capability.clone())
                .unwrap_or_default(),
            step: plan
                .steps()
                .last()
                .map(|s| s.context_key.clone())
                .unwrap_or_default(),
            message: "plan finished without a response".to_string(),
        })
    }

    /// Invoke a capability, retrying retriable failures within its policy
    async fn invoke(
        &mut self,
        index: usize,
        step: &PlannedStep,
        capability: &Arc<dyn Capability>,
        context: &AvailableContext,
    ) -> Result<CapabilityOutcome, EngineError> {
        let policy = capability.retry_policy();
        let mut attempt: u32 = 1;

        loop {
            self.report.invocations.push(Invocation {
                step: step.context_key.clone(),
                capability: step.capability.clone(),
                attempt,
            });

            let failure = match capability.execute(&step.task_objective, context).await {
                Ok(outcome) => return Ok(outcome),
                Err(failure) => failure,
            };

            let classification = capability.classify_error(
                &failure,
                &ErrorContext {
                    capability: step.capability.clone(),
                    step: step.context_key.clone(),
                    attempt,
                },
            );

            if !classification.is_retriable() {
                error!(
                    step = %step.context_key,
                    capability = %step.capability,
                    attempt,
                    error = %failure,
                    "Critical capability failure"
                );
                return Err(EngineError::CapabilityFailed {
                    capability: step.capability.clone(),
                    step: step.context_key.clone(),
                    message: classification.user_message,
                });
            }

            if !policy.allows_another(attempt) {
                error!(
                    step = %step.context_key,
                    capability = %step.capability,
                    attempts = attempt,
                    error = %failure,
                    "Retries exhausted"
                );
                return Err(EngineError::RetriesExhausted {
                    capability: step.capability.clone(),
                    step: step.context_key.clone(),
                    attempts: attempt,
                    last_error: classification.user_message,
                });
            }

            let delay = policy.delay_for(attempt);
            warn!(
                step = %step.context_key,
                capability = %step.capability,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Retriable capability failure"
            );

            attempt += 1;
            self.transition(ExecutionState::Retrying {
                step: index,
                attempt,
            });
            self.cancel.sleep(delay).await?;
        }
    }
}

/// Every declared input must be in the store under its declared type
fn check_readiness(step: &PlannedStep, store: &ContextStore) -> Result<(), EngineError> {
    let missing: Vec<String> = step
        .inputs
        .iter()
        .filter(|i| !store.contains(&i.context_type, &i.source_context_key))
        .map(|i| format!("{}/{}", i.context_type, i.source_context_key))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Readiness {
            step: step.context_key.clone(),
            missing,
        })
    }
}
