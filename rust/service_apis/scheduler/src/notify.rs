//! The notification bus (§4.4): `LISTEN`/`NOTIFY` over the database
//! connection wakes workers when new work appears and notifies the host
//! when a task completes. This is the substitute for a custom wire
//! protocol between instances, which is explicitly out of scope (§1).

use sqlx::postgres::PgListener;
use sqlx::PgPool;

pub const TASK_AVAILABLE: &str = "task_available";
pub const TASK_COMPLETED: &str = "task_completed";

pub async fn notify_task_available(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_notify($1, '')")
        .bind(TASK_AVAILABLE)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn notify_task_completed(pool: &PgPool, task_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_notify($1, $2)")
        .bind(TASK_COMPLETED)
        .bind(task_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// A listener subscribed to both channels. Workers fall back to periodic
/// polling if notifications are lost (§4.4) — callers should treat `recv`
/// as a wake-up hint, not a delivery guarantee, and re-poll on a timeout
/// regardless.
pub async fn connect(database_url: &str) -> Result<PgListener, sqlx::Error> {
    let mut listener = PgListener::connect(database_url).await?;
    listener.listen(TASK_AVAILABLE).await?;
    listener.listen(TASK_COMPLETED).await?;
    Ok(listener)
}
