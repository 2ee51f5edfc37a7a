/// Pending plan persistence
///
/// Each row holds the approval record plus the plan, task, active capability
/// set and context snapshot as JSON columns.
use anyhow::{Context, Result};
use async_trait::async_trait;
use sdk::errors::EngineError;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::conductor::approval::{
    ApprovalKind, ApprovalOutcome, ApprovalRecord, PendingPlan, PlanHandle, PlanStore,
};

pub struct SqlitePlanStore {
    pool: SqlitePool,
}

impl SqlitePlanStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, pending: &PendingPlan) -> Result<()> {
        let record = &pending.record;

        sqlx::query(
            "INSERT INTO pending_plans (handle, session_id, kind, capability, description, step_index, outcome, plan_json, task_json, active_json, context_json, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.handle.as_str())
        .bind(&record.session_id)
        .bind(record.kind.as_str())
        .bind(&record.capability)
        .bind(&record.description)
        .bind(record.step_index as i64)
        .bind(record.outcome.as_str())
        .bind(serde_json::to_string(&pending.plan)?)
        .bind(serde_json::to_string(&pending.task)?)
        .bind(serde_json::to_string(&pending.active_capabilities)?)
        .bind(serde_json::to_string(&pending.context)?)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to save pending plan")?;

        Ok(())
    }

    pub async fn get(&self, handle: &PlanHandle) -> Result<Option<PendingPlan>> {
        let row = sqlx::query(
            "SELECT handle, session_id, kind, capability, description, step_index, outcome, plan_json, task_json, active_json, context_json, created_at \
             FROM pending_plans WHERE handle = ?",
        )
        .bind(handle.as_str())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch pending plan")?;

        row.map(|r| -> Result<PendingPlan> {
            let record = record_from_row(&r)?;
            let plan: String = r.get("plan_json");
            let task: String = r.get("task_json");
            let active: String = r.get("active_json");
            let context: String = r.get("context_json");

            Ok(PendingPlan {
                record,
                plan: serde_json::from_str(&plan).context("Corrupt plan_json")?,
                task: serde_json::from_str(&task).context("Corrupt task_json")?,
                active_capabilities: serde_json::from_str(&active)
                    .context("Corrupt active_json")?,
                context: serde_json::from_str(&context).context("Corrupt context_json")?,
            })
        })
        .transpose()
    }

    /// Move a pending row to `outcome`; false when no pending row matched
    pub async fn set_outcome(
        &self,
        handle: &PlanHandle,
        outcome: ApprovalOutcome,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE pending_plans SET outcome = ? WHERE handle = ? AND outcome = 'pending'",
        )
        .bind(outcome.as_str())
        .bind(handle.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to record approval outcome")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, handle: &PlanHandle) -> Result<bool> {
        let result = sqlx::query("DELETE FROM pending_plans WHERE handle = ?")
            .bind(handle.as_str())
            .execute(&self.pool)
            .await
            .context("Failed to delete pending plan")?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn records(&self) -> Result<Vec<ApprovalRecord>> {
        let rows = sqlx::query(
            "SELECT handle, session_id, kind, capability, description, step_index, outcome, created_at \
             FROM pending_plans WHERE outcome = 'pending' ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pending plans")?;

        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(r: &SqliteRow) -> Result<ApprovalRecord> {
    let kind: String = r.get("kind");
    let outcome: String = r.get("outcome");
    let step_index: i64 = r.get("step_index");

    Ok(ApprovalRecord {
        handle: PlanHandle::from(r.get::<String, _>("handle")),
        session_id: r.get("session_id"),
        kind: ApprovalKind::parse(&kind)
            .with_context(|| format!("Unknown approval kind '{}'", kind))?,
        capability: r.get("capability"),
        description: r.get("description"),
        step_index: usize::try_from(step_index).context("Negative step_index")?,
        outcome: ApprovalOutcome::parse(&outcome)
            .with_context(|| format!("Unknown approval outcome '{}'", outcome))?,
        created_at: r.get("created_at"),
    })
}

fn db_error(e: anyhow::Error) -> EngineError {
    EngineError::Database(format!("{:#}", e))
}

#[async_trait]
impl PlanStore for SqlitePlanStore {
    async fn save_pending_plan(&self, pending: &PendingPlan) -> Result<PlanHandle, EngineError> {
        self.insert(pending).await.map_err(db_error)?;
        Ok(pending.record.handle.clone())
    }

    async fn load_pending_plan(&self, handle: &PlanHandle) -> Result<PendingPlan, EngineError> {
        self.get(handle)
            .await
            .map_err(db_error)?
            .filter(|p| p.record.outcome == ApprovalOutcome::Pending)
            .ok_or_else(|| EngineError::PendingPlanNotFound(handle.to_string()))
    }

    async fn record_outcome(
        &self,
        handle: &PlanHandle,
        outcome: ApprovalOutcome,
    ) -> Result<(), EngineError> {
        if self.set_outcome(handle, outcome).await.map_err(db_error)? {
            Ok(())
        } else {
            Err(EngineError::PendingPlanNotFound(handle.to_string()))
        }
    }

    async fn clear_pending_plan(&self, handle: &PlanHandle) -> Result<(), EngineError> {
        self.delete(handle).await.map_err(db_error)?;
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<ApprovalRecord>, EngineError> {
        self.records().await.map_err(db_error)
    }
}
