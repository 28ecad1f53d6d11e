//! The worker pool (§4.4, §5): a fixed set of claim loops plus a stale-claim
//! sweep, all joined on one `JoinSet` with a broadcast shutdown signal —
//! the same shape as the teacher's orchestrator service supervisor.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration as ChronoDuration;
use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use vault_db::models::{TaskRecord, TaskStatus};
use vault_db::task;

use crate::context::TaskContext;
use crate::error::SchedulerError;
use crate::notify;
use crate::outcome::{Outcome, TaskError};
use crate::registry::TaskTypeRegistry;

/// Default retry ceiling before a retryable ERROR task is declared DEAD.
/// Task types wanting a different ceiling should surface that in `input`
/// and have their handler classify failures accordingly; this is the
/// scheduler-wide fallback (§4.4 leaves the exact number to the
/// implementation).
const MAX_RETRIES: i32 = 5;

pub struct WorkerPoolConfig {
    pub node_id: String,
    pub worker_count: usize,
    pub poll_interval: StdDuration,
    pub claim_lease: ChronoDuration,
    /// Used to open each claim loop's own `LISTEN` connection (§4.4, §5).
    pub database_url: String,
}

pub struct WorkerPool {
    tasks: JoinSet<Result<(), SchedulerError>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl WorkerPool {
    pub fn start(pool: PgPool, registry: Arc<TaskTypeRegistry>, config: WorkerPoolConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut tasks = JoinSet::new();

        for worker_index in 0..config.worker_count {
            let worker_id = format!("{}-w{worker_index}", config.node_id);
            let pool = pool.clone();
            let registry = registry.clone();
            let poll_interval = config.poll_interval;
            let database_url = config.database_url.clone();
            let shutdown_rx = shutdown_tx.subscribe();
            tasks.spawn(claim_loop(pool, registry, worker_id, poll_interval, database_url, shutdown_rx));
        }

        {
            let pool = pool.clone();
            let claim_lease = config.claim_lease;
            let shutdown_rx = shutdown_tx.subscribe();
            tasks.spawn(sweep_loop(pool, claim_lease, shutdown_rx));
        }

        Self { tasks, shutdown_tx }
    }

    /// Runs until ctrl-c or a worker task exits with an error, then drains
    /// the rest gracefully.
    pub async fn run(mut self) -> Result<(), SchedulerError> {
        log::info!("worker pool started with {} tasks", self.tasks.len());

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("shutdown signal received");
            }
            result = self.tasks.join_next() => {
                if let Some(Err(join_err)) = result {
                    log::error!("worker task panicked: {join_err}");
                } else if let Some(Ok(Err(e))) = result {
                    log::error!("worker task failed: {e}");
                }
            }
        }

        let _ = self.shutdown_tx.send(());
        self.tasks.shutdown().await;
        while let Some(result) = self.tasks.join_next().await {
            match result {
                Ok(Ok(())) => log::debug!("worker task exited cleanly"),
                Ok(Err(e)) => log::warn!("worker task exited with error: {e}"),
                Err(e) => log::error!("worker task join error: {e}"),
            }
        }
        Ok(())
    }
}

async fn claim_loop(
    pool: PgPool,
    registry: Arc<TaskTypeRegistry>,
    worker_id: String,
    poll_interval: StdDuration,
    database_url: String,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), SchedulerError> {
    vault_db::node::register(&pool, &worker_id).await?;

    // The listener is a wake-up hint, not a delivery guarantee (§4.4) — if
    // it can't be established, the loop still makes progress on the poll
    // interval alone.
    let mut listener = match notify::connect(&database_url).await {
        Ok(listener) => Some(listener),
        Err(e) => {
            log::warn!("worker {worker_id} could not connect task-available listener: {e}, falling back to polling only");
            None
        }
    };

    loop {
        match listener.as_mut() {
            Some(listener) => {
                tokio::select! {
                    _ = shutdown_rx.recv() => return Ok(()),
                    _ = tokio::time::sleep(poll_interval) => {}
                    notification = listener.recv() => {
                        if let Err(e) = notification {
                            log::warn!("worker {worker_id} lost task-available listener: {e}");
                        }
                    }
                }
            }
            None => {
                tokio::select! {
                    _ = shutdown_rx.recv() => return Ok(()),
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        }

        while let Some(claimed) = task::claim_next(&pool, &worker_id).await? {
            if let Err(e) = dispatch(&pool, &registry, claimed).await {
                log::error!("dispatch error on worker {worker_id}: {e}");
            }
        }
    }
}

async fn sweep_loop(
    pool: PgPool,
    claim_lease: ChronoDuration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), SchedulerError> {
    const SWEEP_INTERVAL: StdDuration = StdDuration::from_secs(30);
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => return Ok(()),
            _ = tokio::time::sleep(SWEEP_INTERVAL) => {}
        }
        let (reclaimed, expired) = task::sweep_stale(&pool, claim_lease).await?;
        if reclaimed > 0 || expired > 0 {
            log::info!("stale sweep: {reclaimed} reclaimed, {expired} expired to dead");
        }
    }
}

/// Whether this claim is a first start (no subtasks ever recorded) or a
/// resume of a previously BLOCKED task (§4.4 distinguishes `onStart` from
/// `onResume`).
async fn has_recorded_subtasks(pool: &PgPool, task_id: i64) -> Result<bool, SchedulerError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM task_dependency WHERE parent_task_id = $1)",
    )
    .bind(task_id)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

async fn dispatch(
    pool: &PgPool,
    registry: &TaskTypeRegistry,
    claimed: TaskRecord,
) -> Result<(), SchedulerError> {
    let handler = registry
        .get(&claimed.task_type)
        .ok_or_else(|| SchedulerError::NoHandler(claimed.task_type.clone()))?;

    let is_resume = has_recorded_subtasks(pool, claimed.id).await?;
    let input = claimed.input.clone();
    let ctx = TaskContext::new(pool.clone(), claimed.clone());

    let outcome = if is_resume {
        handler.on_resume(input, &ctx).await
    } else {
        handler.on_start(input, &ctx).await
    };

    apply_outcome(pool, registry, &claimed, outcome).await
}

async fn apply_outcome(
    pool: &PgPool,
    registry: &TaskTypeRegistry,
    task: &TaskRecord,
    outcome: Outcome,
) -> Result<(), SchedulerError> {
    match outcome {
        Outcome::Complete(output) => {
            task::complete(pool, task.id, output).await?;
            notify::notify_task_completed(pool, task.id).await?;
            notify::notify_task_available(pool).await?;
        }
        Outcome::Blocked(subtask_ids) => {
            task::block_on_subtasks(pool, task.id, &subtask_ids).await?;
            notify::notify_task_available(pool).await?;
        }
        Outcome::Background { reason: _, timeout } => {
            let expires_at = chrono::Utc::now() + timeout;
            task::mark_background(pool, task.id, expires_at).await?;
        }
        Outcome::Failed(error) => {
            let final_status = task::fail(
                pool,
                task.id,
                error.to_json(),
                error.retryable,
                MAX_RETRIES,
            )
            .await?;
            if final_status == TaskStatus::Open {
                notify::notify_task_available(pool).await?;
            } else if let Some(parent_id) = task.parent_id {
                propagate_failure_to_parent(pool, registry, parent_id, error).await?;
            }
        }
    }
    Ok(())
}

/// §4.4/§7: a subtask's terminal failure is delivered to its parent's
/// `on_error` callback, which decides the parent's own fate.
async fn propagate_failure_to_parent(
    pool: &PgPool,
    registry: &TaskTypeRegistry,
    parent_id: i64,
    subtask_error: TaskError,
) -> Result<(), SchedulerError> {
    let parent = task::find(pool, parent_id)
        .await?
        .ok_or(SchedulerError::TaskNotFound(parent_id))?;
    let handler = registry
        .get(&parent.task_type)
        .ok_or_else(|| SchedulerError::NoHandler(parent.task_type.clone()))?;

    let input: Value = parent.input.clone();
    let ctx = TaskContext::new(pool.clone(), parent.clone());
    let outcome = handler.on_error(input, &ctx, subtask_error).await;
    Box::pin(apply_outcome(pool, registry, &parent, outcome)).await
}
