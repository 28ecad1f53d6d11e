//! Container and entry rows, written together at manifest-build time (§3,
//! §4.6 fan-in completion) and again, one tenant at a time, by rebuild §4.10.

use sqlx::PgPool;

use crate::error::IndexError;
use crate::models::{ContainerRecord, EntryRecord, EntryType, NewEntry};

/// Insert the `container` row and all of its `entry` rows in one
/// transaction. `blob_id` is the owning tenant's `blob` row id for the
/// container's own content — the caller has normally just obtained it from
/// [`crate::blob_registry::register_blob`].
///
/// Entries reference children by `blob_ref_id`, which the caller resolves
/// per-entry (each child has already passed through the dedup gate).
pub async fn insert_container(
    pool: &PgPool,
    blob_id: i64,
    entries: &[(NewEntry, i64)],
) -> Result<ContainerRecord, IndexError> {
    let mut tx = pool.begin().await?;

    let container_row = sqlx::query(
        "INSERT INTO container (blob_id, entry_count) VALUES ($1, $2)
         ON CONFLICT (blob_id) DO UPDATE SET entry_count = EXCLUDED.entry_count
         RETURNING id, blob_id, entry_count, created_at",
    )
    .bind(blob_id)
    .bind(entries.len() as i32)
    .fetch_one(&mut *tx)
    .await?;
    let container = ContainerRecord::from_row(&container_row)?;

    for (entry, blob_ref_id) in entries {
        sqlx::query(
            "INSERT INTO entry (container_id, internal_path, entry_type, blob_ref_id, mtime_ms, metadata)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (container_id, internal_path) DO UPDATE SET
                entry_type = EXCLUDED.entry_type,
                blob_ref_id = EXCLUDED.blob_ref_id,
                mtime_ms = EXCLUDED.mtime_ms,
                metadata = EXCLUDED.metadata",
        )
        .bind(container.id)
        .bind(&entry.internal_path)
        .bind(entry.entry_type)
        .bind(blob_ref_id)
        .bind(entry.mtime_ms)
        .bind(&entry.metadata)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(container)
}

pub async fn find_container_by_blob_id(
    pool: &PgPool,
    blob_id: i64,
) -> Result<Option<ContainerRecord>, IndexError> {
    let row = sqlx::query(
        "SELECT id, blob_id, entry_count, created_at FROM container WHERE blob_id = $1",
    )
    .bind(blob_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(ContainerRecord::from_row).transpose()
}

pub async fn list_entries(pool: &PgPool, container_id: i64) -> Result<Vec<EntryRecord>, IndexError> {
    let rows = sqlx::query(
        "SELECT id, container_id, internal_path, entry_type, blob_ref_id, mtime_ms, metadata
         FROM entry WHERE container_id = $1 ORDER BY internal_path",
    )
    .bind(container_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(EntryRecord::from_row).collect()
}

#[cfg(all(test, feature = "tests_integration_postgres"))]
mod tests_integration_postgres {
    use super::*;
    use crate::blob_registry::register_blob;
    use vault_core::{BlobRef, ContentHash};

    async fn pool() -> PgPool {
        let url = std::env::var("VAULT_TEST_DATABASE_URL").expect("VAULT_TEST_DATABASE_URL");
        crate::pool::connect_and_migrate(&url).await.unwrap()
    }

    #[tokio::test]
    async fn insert_container_round_trips_entry_count() {
        let pool = pool().await;
        let container_ref = BlobRef::new(ContentHash::of(b"container body"), 100, true).unwrap();
        let leaf_ref = BlobRef::new(ContentHash::of(b"leaf body"), 10, false).unwrap();

        let container_outcome = register_blob(&pool, "tenant-x", &container_ref, None, None)
            .await
            .unwrap();
        let leaf_outcome = register_blob(&pool, "tenant-x", &leaf_ref, None, None)
            .await
            .unwrap();

        let entries = vec![(
            NewEntry {
                internal_path: "hello.txt".to_string(),
                entry_type: EntryType::File,
                blob_ref: leaf_ref,
                mtime_ms: None,
                metadata: None,
            },
            leaf_outcome.blob_ref_id,
        )];

        let container = insert_container(&pool, container_outcome.blob_id, &entries)
            .await
            .unwrap();
        assert_eq!(container.entry_count, 1);

        let listed = list_entries(&pool, container.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].internal_path, "hello.txt");
    }
}
