//! Approval Coordinator
//!
//! Suspends a plan when a human has to confirm something, persists everything
//! needed to continue it later, and turns the human's free-text reply into an
//! approve/reject decision.

use async_trait::async_trait;
use sdk::context::ContextEntry;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::conductor::cancellation::TurnCancellation;
use crate::conductor::types::{ExecutionPlan, ExtractedTask};
use crate::llm::{Completer, CompletionRequest, CompletionRole};

/// Opaque id of a persisted pending plan
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanHandle(String);

impl PlanHandle {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PlanHandle {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PlanHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for PlanHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What is waiting for approval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    /// A whole plan, before any step runs
    Plan,
    /// A single step that asked for confirmation
    Step,
}

impl ApprovalKind {
    pub fn as_str(&self) -> &str {
        match self {
            ApprovalKind::Plan => "plan",
            ApprovalKind::Step => "step",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "plan" => Some(ApprovalKind::Plan),
            "step" => Some(ApprovalKind::Step),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalOutcome {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalOutcome {
    pub fn as_str(&self) -> &str {
        match self {
            ApprovalOutcome::Pending => "pending",
            ApprovalOutcome::Approved => "approved",
            ApprovalOutcome::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(ApprovalOutcome::Pending),
            "approved" => Some(ApprovalOutcome::Approved),
            "rejected" => Some(ApprovalOutcome::Rejected),
            _ => None,
        }
    }
}

/// Approval request as shown to the human
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub handle: PlanHandle,
    pub session_id: String,
    pub kind: ApprovalKind,

    /// Capability asking, or "orchestrator" for plan approval
    pub capability: String,

    pub description: String,

    /// Step to resume at
    pub step_index: usize,

    pub outcome: ApprovalOutcome,

    /// Unix seconds
    pub created_at: i64,
}

/// Everything needed to continue a suspended plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPlan {
    pub record: ApprovalRecord,
    pub plan: ExecutionPlan,
    pub task: ExtractedTask,
    pub active_capabilities: Vec<String>,
    pub context: Vec<ContextEntry>,
}

/// Durable storage for pending plans
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn save_pending_plan(&self, pending: &PendingPlan) -> Result<PlanHandle, EngineError>;

    /// Fails with `PendingPlanNotFound` for unknown or already decided handles
    async fn load_pending_plan(&self, handle: &PlanHandle) -> Result<PendingPlan, EngineError>;

    /// Settle a pending record as approved or rejected
    ///
    /// Only a record still pending can be settled, so two replies to the same
    /// handle cannot both resume it.
    async fn record_outcome(
        &self,
        handle: &PlanHandle,
        outcome: ApprovalOutcome,
    ) -> Result<(), EngineError>;

    async fn clear_pending_plan(&self, handle: &PlanHandle) -> Result<(), EngineError>;

    /// Pending records, oldest first
    async fn list_pending(&self) -> Result<Vec<ApprovalRecord>, EngineError>;
}

/// Process-local plan store
#[derive(Default)]
pub struct InMemoryPlanStore {
    plans: Mutex<HashMap<PlanHandle, PendingPlan>>,
}

impl InMemoryPlanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanStore for InMemoryPlanStore {
    async fn save_pending_plan(&self, pending: &PendingPlan) -> Result<PlanHandle, EngineError> {
        let handle = pending.record.handle.clone();
        self.plans.lock().await.insert(handle.clone(), pending.clone());
        Ok(handle)
    }

    async fn load_pending_plan(&self, handle: &PlanHandle) -> Result<PendingPlan, EngineError> {
        self.plans
            .lock()
            .await
            .get(handle)
            .filter(|p| p.record.outcome == ApprovalOutcome::Pending)
            .cloned()
            .ok_or_else(|| EngineError::PendingPlanNotFound(handle.to_string()))
    }

    async fn record_outcome(
        &self,
        handle: &PlanHandle,
        outcome: ApprovalOutcome,
    ) -> Result<(), EngineError> {
        let mut plans = self.plans.lock().await;
        match plans.get_mut(handle) {
            Some(pending) if pending.record.outcome == ApprovalOutcome::Pending => {
                pending.record.outcome = outcome;
                Ok(())
            }
            _ => Err(EngineError::PendingPlanNotFound(handle.to_string())),
        }
    }

    async fn clear_pending_plan(&self, handle: &PlanHandle) -> Result<(), EngineError> {
        self.plans.lock().await.remove(handle);
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<ApprovalRecord>, EngineError> {
        let mut records: Vec<ApprovalRecord> = self
            .plans
            .lock()
            .await
            .values()
            .filter(|p| p.record.outcome == ApprovalOutcome::Pending)
            .map(|p| p.record.clone())
            .collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }
}

/// Details of a suspension, gathered by the conductor
pub struct Suspension<'a> {
    pub session_id: &'a str,
    pub kind: ApprovalKind,
    pub capability: &'a str,
    pub description: String,
    pub step_index: usize,
    pub plan: &'a ExecutionPlan,
    pub task: &'a ExtractedTask,
    pub active_capabilities: &'a [String],
    pub context: Vec<ContextEntry>,
}

pub struct ApprovalCoordinator {
    store: Arc<dyn PlanStore>,
}

impl ApprovalCoordinator {
    pub fn new(store: Arc<dyn PlanStore>) -> Self {
        Self { store }
    }

    /// Persist a pending plan and return its record
    pub async fn suspend(&self, suspension: Suspension<'_>) -> Result<ApprovalRecord, EngineError> {
        let record = ApprovalRecord {
            handle: PlanHandle::generate(),
            session_id: suspension.session_id.to_string(),
            kind: suspension.kind,
            capability: suspension.capability.to_string(),
            description: suspension.description,
            step_index: suspension.step_index,
            outcome: ApprovalOutcome::Pending,
            created_at: chrono::Utc::now().timestamp(),
        };

        let pending = PendingPlan {
            record: record.clone(),
            plan: suspension.plan.clone(),
            task: suspension.task.clone(),
            active_capabilities: suspension.active_capabilities.to_vec(),
            context: suspension.context,
        };

        self.store.save_pending_plan(&pending).await?;

        info!(
            handle = %record.handle,
            session_id = %record.session_id,
            capability = %record.capability,
            step = record.step_index,
            "Execution suspended for approval"
        );
        Ok(record)
    }

    pub async fn load(&self, handle: &PlanHandle) -> Result<PendingPlan, EngineError> {
        self.store.load_pending_plan(handle).await
    }

    /// Record the human's decision before acting on it
    pub async fn decide(
        &self,
        handle: &PlanHandle,
        outcome: ApprovalOutcome,
    ) -> Result<(), EngineError> {
        self.store.record_outcome(handle, outcome).await?;
        info!(handle = %handle, outcome = outcome.as_str(), "Approval decided");
        Ok(())
    }

    pub async fn clear(&self, handle: &PlanHandle) -> Result<(), EngineError> {
        self.store.clear_pending_plan(handle).await
    }

    pub async fn list_pending(&self) -> Result<Vec<ApprovalRecord>, EngineError> {
        self.store.list_pending().await
    }

    /// Decide whether a free-text reply approves the pending action
    pub async fn classify_reply(
        &self,
        completer: &dyn Completer,
        record: &ApprovalRecord,
        reply: &str,
        cancel: &TurnCancellation,
    ) -> Result<ApprovalOutcome, EngineError> {
        let request = CompletionRequest::new(
            CompletionRole::ApprovalClassifier,
            json!({
                "pending_action": record.description,
                "requested_by": record.capability,
                "reply": reply,
            })
            .to_string(),
            json!({ "approved": "boolean" }),
        )
        .with_instructions(
            "Set approved to true only if the reply clearly agrees to the pending action. \
             Hesitation, questions, or requests for changes count as not approved.",
        )
        .with_examples(vec![
            "reply: \"yes go ahead\" -> {\"approved\": true}".to_string(),
            "reply: \"sure, but use the other account\" -> {\"approved\": false}".to_string(),
            "reply: \"no\" -> {\"approved\": false}".to_string(),
        ]);

        let value = cancel.race(completer.complete(request)).await??;
        let approved = value
            .get("approved")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| {
                EngineError::Completion("approval reply classification had no boolean 'approved'".to_string())
            })?;

        let outcome = if approved {
            ApprovalOutcome::Approved
        } else {
            ApprovalOutcome::Rejected
        };
        info!(handle = %record.handle, outcome = outcome.as_str(), "Approval reply classified");
        Ok(outcome)
    }
}
