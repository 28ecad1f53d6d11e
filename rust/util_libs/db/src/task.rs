//! The durable task queue: submission, the skip-locked claim protocol,
//! outcome write-back, subtask bookkeeping, and the stale-claim/expiry sweep
//! (§4.4).

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::error::IndexError;
use crate::models::{TaskRecord, TaskStatus};

/// A resource a task type declares at submit time. `max_concurrency = None`
/// means the resource must simply be advertised; `Some(n)` additionally caps
/// how many IN_PROGRESS tasks may hold it at once.
#[derive(Debug, Clone)]
pub struct ResourceRequirement {
    pub name: String,
    pub max_concurrency: Option<i32>,
}

pub struct NewTask<'a> {
    pub tenant_id: &'a str,
    pub parent_id: Option<i64>,
    pub task_type: &'a str,
    pub priority: i32,
    pub input: Value,
    pub resources: Vec<ResourceRequirement>,
}

/// Insert the task row and its resource edges in one transaction, per §4.4
/// ("the scheduler inserts the task-resource edges atomically with the task
/// row").
pub async fn submit(pool: &PgPool, new_task: NewTask<'_>) -> Result<TaskRecord, IndexError> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(
        "INSERT INTO task (tenant_id, parent_id, task_type, priority, input)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, tenant_id, parent_id, task_type, status, priority, input,
                   output, retryable, retry_count, executor, created_at,
                   claimed_at, completed_at, expires_at",
    )
    .bind(new_task.tenant_id)
    .bind(new_task.parent_id)
    .bind(new_task.task_type)
    .bind(new_task.priority)
    .bind(&new_task.input)
    .fetch_one(&mut *tx)
    .await?;
    let task = TaskRecord::from_row(&row)?;

    for resource in &new_task.resources {
        sqlx::query(
            "INSERT INTO task_resource (task_id, resource_name, max_concurrency)
             VALUES ($1, $2, $3)",
        )
        .bind(task.id)
        .bind(&resource.name)
        .bind(resource.max_concurrency)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(task)
}

/// Claim the highest-priority claimable OPEN task whose resource
/// dependencies are all satisfied, per §4.4's claim protocol. Returns `None`
/// if no row is currently claimable by this node.
///
/// The gating subquery treats a resource as unsatisfied if nobody currently
/// advertises it, or if it has a `max_concurrency` limit already met by
/// IN_PROGRESS tasks holding it. `FOR UPDATE SKIP LOCKED` is what guarantees
/// at most one winner across N racing workers (§5, "Locking discipline").
pub async fn claim_next(pool: &PgPool, node_id: &str) -> Result<Option<TaskRecord>, IndexError> {
    let row = sqlx::query(
        r#"
        WITH candidate AS (
            SELECT t.id
            FROM task t
            WHERE t.status = 'open' AND t.executor IS NULL
              AND NOT EXISTS (
                  SELECT 1 FROM task_resource tr
                  WHERE tr.task_id = t.id
                    AND (
                        NOT EXISTS (
                            SELECT 1 FROM resource_availability ra
                            WHERE ra.resource_name = tr.resource_name
                        )
                        OR (
                            tr.max_concurrency IS NOT NULL
                            AND (
                                SELECT count(*) FROM task t2
                                JOIN task_resource tr2 ON tr2.task_id = t2.id
                                WHERE tr2.resource_name = tr.resource_name
                                  AND t2.status = 'in_progress'
                            ) >= tr.max_concurrency
                        )
                    )
              )
            ORDER BY t.priority DESC, t.created_at ASC
            FOR UPDATE OF t SKIP LOCKED
            LIMIT 1
        )
        UPDATE task
        SET status = 'in_progress', executor = $1, claimed_at = now()
        FROM candidate
        WHERE task.id = candidate.id
        RETURNING task.id, task.tenant_id, task.parent_id, task.task_type, task.status,
                  task.priority, task.input, task.output, task.retryable, task.retry_count,
                  task.executor, task.created_at, task.claimed_at, task.completed_at,
                  task.expires_at
        "#,
    )
    .bind(node_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(TaskRecord::from_row).transpose()
}

pub async fn find(pool: &PgPool, task_id: i64) -> Result<Option<TaskRecord>, IndexError> {
    let row = sqlx::query(
        "SELECT id, tenant_id, parent_id, task_type, status, priority, input, output,
                retryable, retry_count, executor, created_at, claimed_at, completed_at, expires_at
         FROM task WHERE id = $1",
    )
    .bind(task_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(TaskRecord::from_row).transpose()
}

/// `Outcome::Complete`. If this task has a parent that is BLOCKED on it,
/// decrements the parent's outstanding-dependency count and re-opens the
/// parent when it reaches zero (§4.4, subtask API).
pub async fn complete(pool: &PgPool, task_id: i64, output: Value) -> Result<(), IndexError> {
    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE task SET status = 'complete', output = $2, completed_at = now() WHERE id = $1",
    )
    .bind(task_id)
    .bind(&output)
    .execute(&mut *tx)
    .await?;
    reopen_unblocked_parents(&mut tx, task_id).await?;
    tx.commit().await?;
    Ok(())
}

/// `Outcome::Blocked(subtaskIds)`: record the dependency edges and move the
/// parent to BLOCKED.
pub async fn block_on_subtasks(
    pool: &PgPool,
    parent_task_id: i64,
    subtask_ids: &[i64],
) -> Result<(), IndexError> {
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE task SET status = 'blocked' WHERE id = $1")
        .bind(parent_task_id)
        .execute(&mut *tx)
        .await?;
    for subtask_id in subtask_ids {
        sqlx::query(
            "INSERT INTO task_dependency (parent_task_id, subtask_id) VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(parent_task_id)
        .bind(subtask_id)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// `Outcome::Background(reason, timeout)`. The `reason` is advisory only —
/// callers that want it durable should fold it into `output` themselves.
pub async fn mark_background(
    pool: &PgPool,
    task_id: i64,
    expires_at: DateTime<Utc>,
) -> Result<(), IndexError> {
    sqlx::query("UPDATE task SET status = 'background', expires_at = $2 WHERE id = $1")
        .bind(task_id)
        .bind(expires_at)
        .execute(pool)
        .await?;
    Ok(())
}

/// `Outcome::Failed(error)`. Retryable errors under the retry ceiling return
/// to OPEN with `retry_count` incremented; otherwise the task is DEAD.
/// Either way the failure propagates to a BLOCKED parent via its
/// `onError` callback — that dispatch is the scheduler's job, not this
/// repository's; this function only records the terminal/retry state.
pub async fn fail(
    pool: &PgPool,
    task_id: i64,
    error: Value,
    retryable: bool,
    max_retries: i32,
) -> Result<TaskStatus, IndexError> {
    let current = find(pool, task_id)
        .await?
        .ok_or_else(|| IndexError::NotFound(format!("task {task_id}")))?;

    if retryable && current.retry_count < max_retries {
        sqlx::query(
            "UPDATE task SET status = 'open', executor = NULL, claimed_at = NULL,
                retry_count = retry_count + 1, output = $2
             WHERE id = $1",
        )
        .bind(task_id)
        .bind(&error)
        .execute(pool)
        .await?;
        Ok(TaskStatus::Open)
    } else {
        sqlx::query(
            "UPDATE task SET status = 'dead', output = $2, completed_at = now() WHERE id = $1",
        )
        .bind(task_id)
        .bind(&error)
        .execute(pool)
        .await?;
        Ok(TaskStatus::Dead)
    }
}

pub async fn cancel(pool: &PgPool, task_id: i64) -> Result<(), IndexError> {
    sqlx::query(
        "UPDATE task SET status = 'cancelled', completed_at = now()
         WHERE id = $1 AND status NOT IN ('complete', 'cancelled', 'dead')",
    )
    .bind(task_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// For every BLOCKED parent of `completed_subtask_id`, check whether all of
/// its subtasks are now COMPLETE; if so, re-OPEN it (§4.4).
async fn reopen_unblocked_parents(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    completed_subtask_id: i64,
) -> Result<(), IndexError> {
    let parents: Vec<i64> = sqlx::query_scalar(
        "SELECT parent_task_id FROM task_dependency WHERE subtask_id = $1",
    )
    .bind(completed_subtask_id)
    .fetch_all(&mut **tx)
    .await?;

    for parent_id in parents {
        let outstanding: i64 = sqlx::query_scalar(
            "SELECT count(*) FROM task_dependency td
             JOIN task st ON st.id = td.subtask_id
             WHERE td.parent_task_id = $1 AND st.status != 'complete'",
        )
        .bind(parent_id)
        .fetch_one(&mut **tx)
        .await?;

        if outstanding == 0 {
            sqlx::query("UPDATE task SET status = 'open' WHERE id = $1 AND status = 'blocked'")
                .bind(parent_id)
                .execute(&mut **tx)
                .await?;
        }
    }
    Ok(())
}

/// Periodic stale-claim and background-expiry sweep (§4.4, "Stale
/// recovery"). Returns the number of rows reclaimed and the number expired.
pub async fn sweep_stale(
    pool: &PgPool,
    claim_lease: Duration,
) -> Result<(u64, u64), IndexError> {
    let reclaimed = sqlx::query(
        "UPDATE task
         SET status = 'open', executor = NULL, claimed_at = NULL,
             retry_count = retry_count + 1
         WHERE status = 'in_progress' AND claimed_at < now() - $1::interval",
    )
    .bind(claim_lease)
    .execute(pool)
    .await?
    .rows_affected();

    let expired = sqlx::query(
        "UPDATE task
         SET status = 'dead',
             output = jsonb_build_object('error', 'expired', 'retryable', false),
             completed_at = now()
         WHERE status = 'background' AND expires_at < now()",
    )
    .execute(pool)
    .await?
    .rows_affected();

    Ok((reclaimed, expired))
}

#[cfg(all(test, feature = "tests_integration_postgres"))]
mod tests_integration_postgres {
    use super::*;
    use serde_json::json;

    async fn pool() -> PgPool {
        let url = std::env::var("VAULT_TEST_DATABASE_URL").expect("VAULT_TEST_DATABASE_URL");
        crate::pool::connect_and_migrate(&url).await.unwrap()
    }

    #[tokio::test]
    async fn claim_is_exclusive_across_racers() {
        let pool = pool().await;
        let task = submit(
            &pool,
            NewTask {
                tenant_id: "tenant-claim",
                parent_id: None,
                task_type: "ingest",
                priority: 0,
                input: json!({}),
                resources: vec![],
            },
        )
        .await
        .unwrap();

        let (a, b) = tokio::join!(
            claim_next(&pool, "node-a"),
            claim_next(&pool, "node-b"),
        );
        let winners: Vec<_> = [a.unwrap(), b.unwrap()].into_iter().flatten().collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].id, task.id);
    }

    #[tokio::test]
    async fn resource_without_advertiser_blocks_claim() {
        let pool = pool().await;
        submit(
            &pool,
            NewTask {
                tenant_id: "tenant-res",
                parent_id: None,
                task_type: "needs-gpu",
                priority: 0,
                input: json!({}),
                resources: vec![ResourceRequirement {
                    name: "gpu".to_string(),
                    max_concurrency: None,
                }],
            },
        )
        .await
        .unwrap();

        let claimed = claim_next(&pool, "node-a").await.unwrap();
        assert!(claimed.is_none());
    }
}
