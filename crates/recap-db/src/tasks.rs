//! Processing task repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use recap_core::{
    Error, ProcessingTask, Result, TaskConfig, TaskRepository, TaskStatus, TaskUpdate,
};

const TASK_COLUMNS: &str = "doc_id, status, config, results, created_at, updated_at";

/// PostgreSQL implementation of TaskRepository.
pub struct PgTaskRepository {
    pool: Pool<Postgres>,
}

impl PgTaskRepository {
    /// Create a new PgTaskRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Parse a task row into a ProcessingTask struct.
    ///
    /// Stored config/results JSONB that no longer matches the current record
    /// shape falls back to defaults rather than failing the read.
    fn parse_task_row(row: sqlx::postgres::PgRow) -> ProcessingTask {
        let status: String = row.get("status");
        let config: serde_json::Value = row.get("config");
        let results: serde_json::Value = row.get("results");

        ProcessingTask {
            doc_id: row.get("doc_id"),
            status: TaskStatus::from_str_or_default(&status),
            config: serde_json::from_value(config).unwrap_or_default(),
            results: serde_json::from_value(results).unwrap_or_default(),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl TaskRepository for PgTaskRepository {
    async fn enqueue(&self, doc_id: Uuid, config: &TaskConfig) -> Result<ProcessingTask> {
        let config_json = serde_json::to_value(config)?;

        // Re-enqueue resets the status and replaces the config wholesale but
        // keeps prior results until processing overwrites them.
        let query = format!(
            "INSERT INTO processing_task (doc_id, status, config)
             VALUES ($1, 'created', $2)
             ON CONFLICT (doc_id) DO UPDATE SET
                 status = 'created',
                 config = EXCLUDED.config,
                 updated_at = NOW()
             RETURNING {TASK_COLUMNS}"
        );

        let row = sqlx::query(&query)
            .bind(doc_id)
            .bind(&config_json)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "tasks",
            op = "enqueue",
            doc_id = %doc_id,
            "Enqueued processing task"
        );

        Ok(Self::parse_task_row(row))
    }

    async fn update(&self, doc_id: Uuid, update: &TaskUpdate) -> Result<ProcessingTask> {
        let mut sets: Vec<String> = vec!["updated_at = NOW()".to_string()];
        // $1 = doc_id, dynamic params start at $2
        let mut param_idx = 2;

        if update.status.is_some() {
            sets.push(format!("status = ${param_idx}"));
            param_idx += 1;
        }
        if update.results.is_some() {
            // JSONB concatenation merges field by field; absent fields in the
            // patch leave stored values in place.
            sets.push(format!("results = results || ${param_idx}::jsonb"));
            param_idx += 1;
        }
        if update.config.is_some() {
            sets.push(format!("config = ${param_idx}"));
        }

        let query = format!(
            "UPDATE processing_task SET {} WHERE doc_id = $1 RETURNING {TASK_COLUMNS}",
            sets.join(", ")
        );

        let mut q = sqlx::query(&query).bind(doc_id);
        if let Some(status) = update.status {
            q = q.bind(status.as_str());
        }
        if let Some(results) = &update.results {
            q = q.bind(serde_json::to_value(results)?);
        }
        if let Some(config) = &update.config {
            q = q.bind(serde_json::to_value(config)?);
        }

        let row = q
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or(Error::TaskNotFound(doc_id))?;

        Ok(Self::parse_task_row(row))
    }

    async fn get(&self, doc_id: Uuid) -> Result<Option<ProcessingTask>> {
        let query = format!("SELECT {TASK_COLUMNS} FROM processing_task WHERE doc_id = $1");
        let row = sqlx::query(&query)
            .bind(doc_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_task_row))
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<ProcessingTask>> {
        // Oldest first so the worker drains the queue in FIFO order.
        let query = format!(
            "SELECT {TASK_COLUMNS} FROM processing_task
             WHERE status = $1
             ORDER BY created_at ASC"
        );

        let rows = sqlx::query(&query)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_task_row).collect())
    }

    async fn delete(&self, doc_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM processing_task WHERE doc_id = $1")
            .bind(doc_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn configure_created(&self, config: &TaskConfig) -> Result<u64> {
        let config_json = serde_json::to_value(config)?;

        let result = sqlx::query(
            "UPDATE processing_task
             SET status = 'queued', config = $1, updated_at = NOW()
             WHERE status = 'created'",
        )
        .bind(&config_json)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let released = result.rows_affected();

        debug!(
            subsystem = "db",
            component = "tasks",
            op = "configure_created",
            result_count = released,
            "Released created tasks to the queue"
        );

        Ok(released)
    }
}
