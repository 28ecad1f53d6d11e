//! `TaskContext` (§4.4): the subtask API a task type's callback uses to
//! fan out work and inspect its children's results.

use serde_json::Value;
use sqlx::PgPool;
use vault_db::models::{TaskRecord, TaskStatus};
use vault_db::task::{self, NewTask, ResourceRequirement};

use crate::error::SchedulerError;
use crate::outcome::TaskError;

pub struct TaskContext {
    pool: PgPool,
    task: TaskRecord,
}

impl TaskContext {
    pub fn new(pool: PgPool, task: TaskRecord) -> Self {
        Self { pool, task }
    }

    pub fn task(&self) -> &TaskRecord {
        &self.task
    }

    /// Subtasks inherit the parent's tenant; parent linkage is via
    /// `parent_id` (§4.4).
    pub async fn create_subtask(
        &self,
        task_type: &str,
        input: Value,
        priority: i32,
        resources: Vec<ResourceRequirement>,
    ) -> Result<i64, SchedulerError> {
        let subtask = task::submit(
            &self.pool,
            NewTask {
                tenant_id: &self.task.tenant_id,
                parent_id: Some(self.task.id),
                task_type,
                priority,
                input,
                resources,
            },
        )
        .await?;
        Ok(subtask.id)
    }

    pub async fn get_subtask_result(&self, subtask_id: i64) -> Result<Value, SchedulerError> {
        let subtask = task::find(&self.pool, subtask_id)
            .await?
            .ok_or(SchedulerError::TaskNotFound(subtask_id))?;
        if subtask.status != TaskStatus::Complete {
            return Err(SchedulerError::SubtaskNotComplete(subtask_id));
        }
        Ok(subtask.output.unwrap_or(Value::Null))
    }

    pub async fn get_subtask_error(&self, subtask_id: i64) -> Result<Option<TaskError>, SchedulerError> {
        let subtask = task::find(&self.pool, subtask_id)
            .await?
            .ok_or(SchedulerError::TaskNotFound(subtask_id))?;
        if !matches!(subtask.status, TaskStatus::Error | TaskStatus::Dead) {
            return Ok(None);
        }
        Ok(subtask
            .output
            .and_then(|v| serde_json::from_value(v).ok()))
    }

    pub async fn get_completed_subtasks(&self) -> Result<Vec<TaskRecord>, SchedulerError> {
        let rows = sqlx::query(
            "SELECT t.id, t.tenant_id, t.parent_id, t.task_type, t.status, t.priority, t.input,
                    t.output, t.retryable, t.retry_count, t.executor, t.created_at, t.claimed_at,
                    t.completed_at, t.expires_at
             FROM task_dependency td
             JOIN task t ON t.id = td.subtask_id
             WHERE td.parent_task_id = $1 AND t.status = 'complete'",
        )
        .bind(self.task.id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| TaskRecord::from_row(row).map_err(SchedulerError::from))
            .collect()
    }
}
