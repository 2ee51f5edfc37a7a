//! Conductor System
//!
//! Runs one conversational turn through its phases: task extraction,
//! capability classification, planning and plan execution. Plans that need a
//! human decision are suspended through the approval coordinator and continued
//! later with [`Conductor::resume`].

pub mod approval;
pub mod cancellation;
pub mod classifier;
pub mod executor;
pub mod extractor;
pub mod planner;
pub mod session;
pub mod types;

pub use approval::{
    ApprovalCoordinator, ApprovalKind, ApprovalOutcome, ApprovalRecord, InMemoryPlanStore,
    PendingPlan, PlanHandle, PlanStore, Suspension,
};
pub use cancellation::TurnCancellation;
pub use classifier::Classifier;
pub use executor::{ExecutionResult, Executor};
pub use extractor::TaskExtractor;
pub use planner::{validate_plan, Planner};
pub use session::SessionState;
pub use types::{ExecutionPlan, ExecutionReport, ExecutionState, ExtractedTask, Invocation};

use sdk::errors::{CadenceErrorExt, EngineError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::capabilities::CapabilityRegistry;
use crate::config::OrchestrationConfig;
use crate::context::ContextStore;
use crate::llm::Completer;

/// Capability name recorded on plan-level approvals
const ORCHESTRATOR: &str = "orchestrator";

/// Per-turn switches; `None` falls back to the configured default
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnOptions {
    pub bypass_task_extraction: Option<bool>,
    pub bypass_classification: Option<bool>,
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed { response: String },
    AwaitingApproval(ApprovalRecord),
    Rejected { message: String },
    Failed(FailureReport),
    Cancelled,
}

/// User-facing account of a fatal error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureReport {
    pub kind: String,
    pub step: Option<String>,
    pub capability: Option<String>,
    pub message: String,
    pub hint: String,
    pub recoverable: bool,
    pub attempts: Option<u32>,
}

impl FailureReport {
    pub fn from_error(error: &EngineError) -> Self {
        let (step, capability, attempts) = match error {
            EngineError::InvalidPlan { step, .. }
            | EngineError::Readiness { step, .. }
            | EngineError::OutputTypeMismatch { step, .. } => (Some(step.clone()), None, None),
            EngineError::CapabilityFailed {
                capability, step, ..
            } => (Some(step.clone()), Some(capability.clone()), None),
            EngineError::RetriesExhausted {
                capability,
                step,
                attempts,
                ..
            } => (Some(step.clone()), Some(capability.clone()), Some(*attempts)),
            EngineError::UnknownCapability(name) => (None, Some(name.clone()), None),
            EngineError::PlanningFailed { attempts, .. } => (None, None, Some(*attempts)),
            _ => (None, None, None),
        };

        Self {
            kind: error_kind(error).to_string(),
            step,
            capability,
            message: error.to_string(),
            hint: error.user_hint().to_string(),
            recoverable: error.is_recoverable(),
            attempts,
        }
    }
}

fn error_kind(error: &EngineError) -> &'static str {
    match error {
        EngineError::Config(_) => "config",
        EngineError::Database(_) => "database",
        EngineError::Completion(_) => "completion",
        EngineError::Cancelled => "cancelled",
        EngineError::DuplicateKey { .. } => "duplicate_key",
        EngineError::NotFound { .. } => "not_found",
        EngineError::DuplicateCapability(_) => "duplicate_capability",
        EngineError::InvalidCapability { .. } => "invalid_capability",
        EngineError::UnknownCapability(_) => "unknown_capability",
        EngineError::InvalidInput(_) => "invalid_input",
        EngineError::InvalidPlan { .. } => "invalid_plan",
        EngineError::PlanningFailed { .. } => "planning_failed",
        EngineError::Readiness { .. } => "readiness",
        EngineError::OutputTypeMismatch { .. } => "output_type_mismatch",
        EngineError::CapabilityFailed { .. } => "capability_failed",
        EngineError::RetriesExhausted { .. } => "retries_exhausted",
        EngineError::PendingPlanNotFound(_) => "pending_plan_not_found",
        EngineError::Serialization(_) => "serialization",
        EngineError::Io(_) => "io",
    }
}

/// Turn a phase result into the outcome shown to the caller
fn settle(session_id: &str, result: Result<TurnOutcome, EngineError>) -> TurnOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(EngineError::Cancelled) => {
            info!(session_id, "Turn cancelled");
            TurnOutcome::Cancelled
        }
        Err(e) => {
            error!(session_id, error = %e, "Turn failed");
            TurnOutcome::Failed(FailureReport::from_error(&e))
        }
    }
}

pub struct Conductor {
    registry: Arc<CapabilityRegistry>,
    completer: Arc<dyn Completer>,
    approvals: ApprovalCoordinator,
    config: OrchestrationConfig,
}

impl Conductor {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        completer: Arc<dyn Completer>,
        plan_store: Arc<dyn PlanStore>,
        config: OrchestrationConfig,
    ) -> Self {
        Self {
            registry,
            completer,
            approvals: ApprovalCoordinator::new(plan_store),
            config,
        }
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub async fn list_pending(&self) -> Result<Vec<ApprovalRecord>, EngineError> {
        self.approvals.list_pending().await
    }

    /// Run one turn for a new user message
    pub async fn handle_turn(
        &self,
        session: &mut SessionState,
        message: &str,
        options: TurnOptions,
        cancel: &TurnCancellation,
    ) -> TurnOutcome {
        let started = Instant::now();
        session.reset_turn();
        session.add_user_message(message);

        info!(session_id = %session.session_id, "Turn started");
        let result = self.run_turn(session, options, cancel).await;
        info!(
            session_id = %session.session_id,
            "Turn finished in {:.1}s",
            started.elapsed().as_secs_f64()
        );

        settle(&session.session_id, result)
    }

    async fn run_turn(
        &self,
        session: &mut SessionState,
        options: TurnOptions,
        cancel: &TurnCancellation,
    ) -> Result<TurnOutcome, EngineError> {
        let completer = self.completer.as_ref();

        let bypass_extraction = options
            .bypass_task_extraction
            .unwrap_or(self.config.bypass_task_extraction);
        let task = TaskExtractor::new(completer, self.config.history_window)
            .extract(&session.history, &session.memory, bypass_extraction, cancel)
            .await?;
        session.task = Some(task.clone());

        let bypass_classification = options
            .bypass_classification
            .unwrap_or(self.config.bypass_classification);
        let active = Classifier::new(completer, self.config.classifier_concurrency)
            .classify(&task, &self.registry, bypass_classification, cancel)
            .await?;
        session.active_capabilities = active.clone();

        let plan = Planner::new(completer, &self.registry, self.config.max_planning_attempts)
            .plan(&task, &active, &session.store, cancel)
            .await?;

        if self.config.planning_mode {
            let record = self
                .approvals
                .suspend(Suspension {
                    session_id: &session.session_id,
                    kind: ApprovalKind::Plan,
                    capability: ORCHESTRATOR,
                    description: format!("Run this {}-step plan?\n{}", plan.len(), plan),
                    step_index: 0,
                    plan: &plan,
                    task: &task,
                    active_capabilities: &active,
                    context: session.store.snapshot(),
                })
                .await?;

            session.plan = Some(plan);
            session.pending = Some(record.clone());
            return Ok(TurnOutcome::AwaitingApproval(record));
        }

        self.execute_plan(session, plan, task, 0, false, cancel).await
    }

    /// Continue a suspended plan with the human's reply
    pub async fn resume(
        &self,
        session: &mut SessionState,
        handle: &PlanHandle,
        reply: &str,
        cancel: &TurnCancellation,
    ) -> TurnOutcome {
        let result = self.run_resume(session, handle, reply, cancel).await;
        settle(&session.session_id, result)
    }

    async fn run_resume(
        &self,
        session: &mut SessionState,
        handle: &PlanHandle,
        reply: &str,
        cancel: &TurnCancellation,
    ) -> Result<TurnOutcome, EngineError> {
        let pending = self.approvals.load(handle).await?;
        if pending.record.session_id != session.session_id {
            return Err(EngineError::InvalidInput(format!(
                "pending plan {} belongs to another session",
                handle
            )));
        }

        let outcome = self
            .approvals
            .classify_reply(self.completer.as_ref(), &pending.record, reply, cancel)
            .await?;
        self.approvals.decide(handle, outcome).await?;

        session.reset_turn();
        session.add_user_message(reply);

        if outcome != ApprovalOutcome::Approved {
            self.approvals.clear(handle).await?;
            warn!(
                session_id = %session.session_id,
                handle = %handle,
                capability = %pending.record.capability,
                "Approval rejected"
            );
            let message = format!("Not approved: {}", pending.record.description);
            session.add_assistant_message(&message);
            return Ok(TurnOutcome::Rejected { message });
        }

        info!(
            session_id = %session.session_id,
            handle = %handle,
            step = pending.record.step_index,
            "Approval granted, resuming"
        );

        session.store = ContextStore::restore(pending.context)?;
        session.active_capabilities = pending.active_capabilities;
        session.task = Some(pending.task.clone());

        // The approved row stays until the resumed run settles, unlisted and
        // not resumable
        let approved_step = pending.record.kind == ApprovalKind::Step;
        let result = self
            .execute_plan(
                session,
                pending.plan,
                pending.task,
                pending.record.step_index,
                approved_step,
                cancel,
            )
            .await;
        self.approvals.clear(handle).await?;
        result
    }

    async fn execute_plan(
        &self,
        session: &mut SessionState,
        plan: ExecutionPlan,
        task: ExtractedTask,
        start: usize,
        approved: bool,
        cancel: &TurnCancellation,
    ) -> Result<TurnOutcome, EngineError> {
        let mut executor =
            Executor::new(&self.registry, cancel, self.config.summary_sample_points);
        let result = executor
            .execute(&plan, &mut session.store, start, approved)
            .await;
        session.step_index = executor.current_step().unwrap_or(start);
        session.last_report = Some(executor.into_report());

        let outcome = match result? {
            ExecutionResult::Succeeded { response } => {
                session.response = Some(response.clone());
                session.add_assistant_message(&response);
                TurnOutcome::Completed { response }
            }
            ExecutionResult::AwaitingApproval {
                step_index,
                capability,
                description,
            } => {
                let record = self
                    .approvals
                    .suspend(Suspension {
                        session_id: &session.session_id,
                        kind: ApprovalKind::Step,
                        capability: &capability,
                        description,
                        step_index,
                        plan: &plan,
                        task: &task,
                        active_capabilities: &session.active_capabilities,
                        context: session.store.snapshot(),
                    })
                    .await?;
                session.pending = Some(record.clone());
                TurnOutcome::AwaitingApproval(record)
            }
        };

        session.plan = Some(plan);
        Ok(outcome)
    }
}
