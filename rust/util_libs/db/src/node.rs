//! One row per process instance (§3 `NodeRecord`), used as `executor` of
//! task claims and as the advertiser of resources it owns.

use sqlx::PgPool;

use crate::error::IndexError;
use crate::models::NodeRecord;

pub async fn register(pool: &PgPool, node_id: &str) -> Result<NodeRecord, IndexError> {
    let row = sqlx::query(
        "INSERT INTO node (id) VALUES ($1)
         ON CONFLICT (id) DO UPDATE SET last_heartbeat = now()
         RETURNING id, started_at, last_heartbeat",
    )
    .bind(node_id)
    .fetch_one(pool)
    .await?;
    NodeRecord::from_row(&row)
}

pub async fn heartbeat(pool: &PgPool, node_id: &str) -> Result<(), IndexError> {
    sqlx::query("UPDATE node SET last_heartbeat = now() WHERE id = $1")
        .bind(node_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Advertise a resource as available from this node (§4.4, §4.5 — driven by
/// a managed service's STARTED transition).
pub async fn advertise_resource(
    pool: &PgPool,
    resource_name: &str,
    node_id: &str,
) -> Result<(), IndexError> {
    sqlx::query(
        "INSERT INTO resource_availability (resource_name, advertised_by)
         VALUES ($1, $2)
         ON CONFLICT (resource_name) DO UPDATE SET advertised_by = EXCLUDED.advertised_by,
            updated_at = now()",
    )
    .bind(resource_name)
    .bind(node_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Retract a resource advertisement (§4.5 — FAILED/STOPPED transition).
pub async fn retract_resource(pool: &PgPool, resource_name: &str) -> Result<(), IndexError> {
    sqlx::query("DELETE FROM resource_availability WHERE resource_name = $1")
        .bind(resource_name)
        .execute(pool)
        .await?;
    Ok(())
}
