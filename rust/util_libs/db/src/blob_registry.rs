//! The dedup gate (§4.7): the single place every ingest or rebuild write
//! passes through before touching object storage or the `blob_ref`/`blob`
//! tables.

use sqlx::PgPool;
use vault_core::BlobRef;

use crate::error::IndexError;
use crate::models::BlobRefRecord;

/// Outcome of registering a `(tenant, BlobRef)` pair. Tells the caller
/// whether object storage needs a write and whether any rows were newly
/// inserted, without the caller re-deriving it from two separate queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupOutcome {
    pub blob_ref_id: i64,
    pub blob_id: i64,
    /// This content has never been seen by any tenant before.
    pub content_is_new: bool,
    /// This tenant did not already own this content.
    pub ownership_is_new: bool,
}

impl DedupOutcome {
    /// Shape (c) of §4.7: brand new content, never seen by any tenant.
    /// Caller must store the bytes.
    pub fn needs_storage_write(&self) -> bool {
        self.content_is_new
    }
}

/// Upsert the global registry row and the per-tenant ownership row in one
/// round trip each. `mime_hint`/`format_key` are first-writer-wins: an
/// existing non-null value is never overwritten (§3).
pub async fn register_blob(
    pool: &PgPool,
    tenant_id: &str,
    blob_ref: &BlobRef,
    mime_hint: Option<&str>,
    format_key: Option<&str>,
) -> Result<DedupOutcome, IndexError> {
    let hash_bytes = blob_ref.hash().as_bytes().to_vec();
    let leaf_size = blob_ref.leaf_size() as i64;
    let container = blob_ref.is_container();

    let ref_row = sqlx::query(
        r#"
        INSERT INTO blob_ref (hash, leaf_size, container, mime_type, format_key)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (hash, leaf_size, container)
        DO UPDATE SET
            mime_type = COALESCE(blob_ref.mime_type, EXCLUDED.mime_type),
            format_key = COALESCE(blob_ref.format_key, EXCLUDED.format_key)
        RETURNING id, (xmax = 0) AS inserted
        "#,
    )
    .bind(&hash_bytes)
    .bind(leaf_size)
    .bind(container)
    .bind(mime_hint)
    .bind(format_key)
    .fetch_one(pool)
    .await?;
    use sqlx::Row;
    let blob_ref_id: i64 = ref_row.try_get("id")?;
    let content_is_new: bool = ref_row.try_get("inserted")?;

    let blob_row = sqlx::query(
        r#"
        INSERT INTO blob (tenant_id, blob_ref_id)
        VALUES ($1, $2)
        ON CONFLICT (tenant_id, blob_ref_id) DO UPDATE SET tenant_id = EXCLUDED.tenant_id
        RETURNING id, (xmax = 0) AS inserted
        "#,
    )
    .bind(tenant_id)
    .bind(blob_ref_id)
    .fetch_one(pool)
    .await?;
    let blob_id: i64 = blob_row.try_get("id")?;
    let ownership_is_new: bool = blob_row.try_get("inserted")?;

    Ok(DedupOutcome {
        blob_ref_id,
        blob_id,
        content_is_new,
        ownership_is_new,
    })
}

pub async fn find_blob_ref(
    pool: &PgPool,
    blob_ref: &BlobRef,
) -> Result<Option<BlobRefRecord>, IndexError> {
    let hash_bytes = blob_ref.hash().as_bytes().to_vec();
    let row = sqlx::query(
        "SELECT id, hash, leaf_size, container, mime_type, format_key, created_at
         FROM blob_ref WHERE hash = $1 AND leaf_size = $2 AND container = $3",
    )
    .bind(&hash_bytes)
    .bind(blob_ref.leaf_size() as i64)
    .bind(blob_ref.is_container())
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(BlobRefRecord::from_row).transpose()
}

pub async fn blob_id_for(
    pool: &PgPool,
    tenant_id: &str,
    blob_ref_id: i64,
) -> Result<Option<i64>, IndexError> {
    use sqlx::Row;
    let row = sqlx::query("SELECT id FROM blob WHERE tenant_id = $1 AND blob_ref_id = $2")
        .bind(tenant_id)
        .bind(blob_ref_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.try_get("id")).transpose()?)
}

/// Tear down one tenant's structural rows before a rebuild-from-scratch
/// (§4.10). Only `entry`/`container`/`blob` rows scoped to `tenant_id` are
/// removed; a `blob_ref` row is deleted only once no tenant's `blob` row
/// points at it any more, so content another tenant still owns survives.
pub async fn truncate_tenant(pool: &PgPool, tenant_id: &str) -> Result<(), IndexError> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        "DELETE FROM entry WHERE container_id IN (
            SELECT c.id FROM container c
            JOIN blob b ON b.id = c.blob_id
            WHERE b.tenant_id = $1
        )",
    )
    .bind(tenant_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "DELETE FROM container WHERE blob_id IN (
            SELECT id FROM blob WHERE tenant_id = $1
        )",
    )
    .bind(tenant_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM blob WHERE tenant_id = $1")
        .bind(tenant_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        "DELETE FROM blob_ref WHERE id NOT IN (SELECT DISTINCT blob_ref_id FROM blob)",
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

#[cfg(all(test, feature = "tests_integration_postgres"))]
mod tests_integration_postgres {
    use super::*;

    async fn pool() -> PgPool {
        let url = std::env::var("VAULT_TEST_DATABASE_URL").expect("VAULT_TEST_DATABASE_URL");
        let pool = crate::pool::connect_and_migrate(&url).await.unwrap();
        pool
    }

    fn sample_ref() -> BlobRef {
        BlobRef::new(vault_core::ContentHash::of(b"dedup gate sample"), 17, false).unwrap()
    }

    #[tokio::test]
    async fn first_registration_is_new_content_and_new_ownership() {
        let pool = pool().await;
        let r = sample_ref();
        let outcome = register_blob(&pool, "tenant-a", &r, None, None).await.unwrap();
        assert!(outcome.content_is_new);
        assert!(outcome.ownership_is_new);
    }

    #[tokio::test]
    async fn same_tenant_second_registration_is_shape_a() {
        let pool = pool().await;
        let r = BlobRef::new(vault_core::ContentHash::of(b"shape a"), 5, false).unwrap();
        register_blob(&pool, "tenant-b", &r, None, None).await.unwrap();
        let second = register_blob(&pool, "tenant-b", &r, None, None).await.unwrap();
        assert!(!second.content_is_new);
        assert!(!second.ownership_is_new);
    }

    #[tokio::test]
    async fn different_tenant_is_shape_b() {
        let pool = pool().await;
        let r = BlobRef::new(vault_core::ContentHash::of(b"shape b"), 9, false).unwrap();
        register_blob(&pool, "tenant-c1", &r, None, None).await.unwrap();
        let second = register_blob(&pool, "tenant-c2", &r, None, None).await.unwrap();
        assert!(!second.content_is_new);
        assert!(second.ownership_is_new);
    }
}
