//! SQLite-backed execution store
//!
//! Node records and correlation entries are serialized as JSON columns;
//! status and deadline are mirrored into their own columns so writes can be
//! guarded and queried without re-reading the JSON.
//!
//! Concurrency model: every write is a single atomic statement. Transitions
//! are optimistic, an `UPDATE ... WHERE status = ?` guarded on the status the
//! writer read, retried when another writer got there first. Takes are
//! `DELETE ... RETURNING`, so exactly one concurrent caller receives an
//! entry. A read-then-write inside a deferred transaction would instead
//! deadlock on SQLite's shared-to-reserved lock upgrade under contention.

use super::{ExecutionStore, NodeRecord, StoreError};
use crate::core::{FailureInfo, Status};
use crate::dispatch::CorrelationEntry;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Execution store backed by SQLite
pub struct SqliteStore {
    pool: SqlitePool,
}

fn backend(err: impl Into<anyhow::Error>) -> StoreError {
    StoreError::Backend(err.into())
}

fn status_label(status: Status) -> Result<String, StoreError> {
    match serde_json::to_value(status).map_err(backend)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(StoreError::Backend(anyhow::anyhow!(
            "unexpected status encoding: {other}"
        ))),
    }
}

fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
    dt.naive_utc()
}

fn decode_entry(row: &sqlx::sqlite::SqliteRow) -> Result<CorrelationEntry, StoreError> {
    serde_json::from_str(&row.get::<String, _>("entry")).map_err(backend)
}

impl SqliteStore {
    /// Connect to the given database path and initialize the schema
    pub async fn new(db_path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))
            .map_err(backend)?
            .create_if_missing(true)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = SqlitePool::connect_with(options).await.map_err(backend)?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// In-memory database, mainly for tests
    ///
    /// Pinned to a single connection; every pooled connection to `:memory:`
    /// would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(backend)?;
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                runtime_id TEXT PRIMARY KEY,
                record TEXT NOT NULL,
                status TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS correlations (
                correlation_id TEXT PRIMARY KEY,
                runtime_id TEXT NOT NULL,
                entry TEXT NOT NULL,
                deadline TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_correlations_runtime
                ON correlations(runtime_id);
            CREATE INDEX IF NOT EXISTS idx_correlations_deadline
                ON correlations(deadline);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    /// Guarded write: replaces the record only while its stored status still
    /// matches `expected`. Returns false when another writer won the race.
    async fn replace_record<'e, E>(
        executor: E,
        record: &NodeRecord,
        expected: Status,
    ) -> Result<bool, StoreError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE nodes SET record = ?2, status = ?3, updated_at = ?4 \
             WHERE runtime_id = ?1 AND status = ?5",
        )
        .bind(record.context.runtime_id.to_string())
        .bind(serde_json::to_string(record).map_err(backend)?)
        .bind(status_label(record.status)?)
        .bind(to_naive(record.updated_at))
        .bind(status_label(expected)?)
        .execute(executor)
        .await
        .map_err(backend)?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ExecutionStore for SqliteStore {
    async fn create_node(&self, record: NodeRecord) -> Result<(), StoreError> {
        let runtime_id = record.context.runtime_id;
        let result = sqlx::query(
            "INSERT OR IGNORE INTO nodes (runtime_id, record, status, updated_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(runtime_id.to_string())
        .bind(serde_json::to_string(&record).map_err(backend)?)
        .bind(status_label(record.status)?)
        .bind(to_naive(record.updated_at))
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NodeExists(runtime_id));
        }
        Ok(())
    }

    async fn get_node(&self, runtime_id: Uuid) -> Result<NodeRecord, StoreError> {
        let row = sqlx::query("SELECT record FROM nodes WHERE runtime_id = ?1")
            .bind(runtime_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or(StoreError::NodeNotFound(runtime_id))?;

        serde_json::from_str(&row.get::<String, _>("record")).map_err(backend)
    }

    async fn transition(
        &self,
        runtime_id: Uuid,
        to: Status,
        failure: Option<FailureInfo>,
    ) -> Result<Status, StoreError> {
        loop {
            let mut record = self.get_node(runtime_id).await?;
            Status::validate_transition(record.status, to)?;
            let from = record.status;
            record.status = to;
            record.failure = failure.clone();
            record.updated_at = Utc::now();
            if Self::replace_record(&self.pool, &record, from).await? {
                return Ok(from);
            }
            // Lost the race; re-validate against the winner's status.
        }
    }

    async fn insert_correlations(
        &self,
        runtime_id: Uuid,
        entries: Vec<CorrelationEntry>,
        wait_status: Status,
    ) -> Result<(), StoreError> {
        loop {
            let mut record = self.get_node(runtime_id).await?;
            Status::validate_transition(record.status, wait_status)?;
            let expected = record.status;
            record.status = wait_status;
            record.failure = None;
            record.updated_at = Utc::now();

            // The guarded update is the transaction's first statement, so it
            // acquires the write lock outright instead of upgrading a read
            // lock mid-transaction.
            let mut tx = self.pool.begin().await.map_err(backend)?;
            if !Self::replace_record(&mut *tx, &record, expected).await? {
                tx.rollback().await.map_err(backend)?;
                continue;
            }
            for entry in &entries {
                sqlx::query(
                    "INSERT INTO correlations (correlation_id, runtime_id, entry, deadline) VALUES (?1, ?2, ?3, ?4)",
                )
                .bind(entry.correlation_id.to_string())
                .bind(runtime_id.to_string())
                .bind(serde_json::to_string(entry).map_err(backend)?)
                .bind(to_naive(entry.deadline))
                .execute(&mut *tx)
                .await
                .map_err(backend)?;
            }
            tx.commit().await.map_err(backend)?;
            return Ok(());
        }
    }

    async fn take_correlation(
        &self,
        correlation_id: Uuid,
    ) -> Result<Option<CorrelationEntry>, StoreError> {
        let row = sqlx::query("DELETE FROM correlations WHERE correlation_id = ?1 RETURNING entry")
            .bind(correlation_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.as_ref().map(decode_entry).transpose()
    }

    async fn take_correlations_for_node(
        &self,
        runtime_id: Uuid,
    ) -> Result<Vec<CorrelationEntry>, StoreError> {
        let rows = sqlx::query("DELETE FROM correlations WHERE runtime_id = ?1 RETURNING entry")
            .bind(runtime_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.iter().map(decode_entry).collect()
    }

    async fn outstanding_for_node(&self, runtime_id: Uuid) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM correlations WHERE runtime_id = ?1")
            .bind(runtime_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.get::<i64, _>("n") as usize)
    }

    async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let rows = sqlx::query("SELECT correlation_id FROM correlations WHERE deadline <= ?1")
            .bind(to_naive(now))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.iter()
            .map(|row| {
                Uuid::parse_str(&row.get::<String, _>("correlation_id")).map_err(backend)
            })
            .collect()
    }
}
