//! SQLite persistence
//!
//! Holds plans suspended for approval so a later `cadence approve` can pick
//! them up after the process that suspended them has exited.

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub mod pending_plans;

pub use pending_plans::SqlitePlanStore;

/// Embedded migrations, applied in order on every open
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial",
    include_str!("../../migrations/001_initial.sql"),
)];

/// Connections are short-lived: one CLI command holds the pool at a time
const MAX_CONNECTIONS: u32 = 4;

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database at `db_path` and apply migrations
    pub async fn new(db_path: &Path) -> Result<Self> {
        info!(path = %db_path.display(), "Opening plan database");

        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true)
            .disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .context("Failed to connect to plan database")?;

        let database = Self { pool };
        database.migrate().await?;
        Ok(database)
    }

    // Every statement uses IF NOT EXISTS, so reapplying is a no-op
    async fn migrate(&self) -> Result<()> {
        for (name, sql) in MIGRATIONS {
            sqlx::raw_sql(sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("Migration {} failed", name))?;
            debug!(migration = *name, "Migration applied");
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Pending-plan store sharing this pool
    pub fn plans(&self) -> SqlitePlanStore {
        SqlitePlanStore::new(self.pool.clone())
    }

    /// Fold the WAL back into the main file
    pub async fn flush_wal(&self) -> Result<()> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .context("WAL checkpoint failed")?;
        debug!("WAL checkpointed");
        Ok(())
    }

    /// Checkpoint, then close every pooled connection
    pub async fn close(self) -> Result<()> {
        self.flush_wal().await?;
        self.pool.close().await;
        debug!("Plan database closed");
        Ok(())
    }
}
