//! Index rebuild (§4.10): reconstruct every `blob_ref`/`blob`/`container`/
//! `entry` row for a tenant from object storage alone. Object storage is the
//! only system of record; this crate exists so the relational index can
//! always be thrown away and regrown.

mod error;
mod task_handler;

use std::collections::HashMap;

use sqlx::PgPool;
use vault_core::{BlobRef, TenantId};
use vault_db::blob_registry;
use vault_db::container as container_repo;
use vault_db::models::{EntryType, NewEntry};
use vault_manifest::{Manifest, ManifestEntryType};
use vault_storage::ObjectStorage;

pub use error::RebuildError;
pub use task_handler::{RebuildTaskHandler, TASK_TYPE};

#[derive(Debug, Clone, Copy, Default)]
pub struct RebuildOptions {
    /// Drop the tenant's existing `blob`/`container`/`entry` rows (and any
    /// `blob_ref` rows that become orphaned as a result) before rebuilding,
    /// rather than upserting over whatever is already there.
    pub truncate_first: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildSummary {
    pub containers: usize,
    pub entries: usize,
}

fn entry_type_of(t: ManifestEntryType) -> EntryType {
    match t {
        ManifestEntryType::File => EntryType::File,
        ManifestEntryType::Directory => EntryType::Directory,
        ManifestEntryType::Symlink => EntryType::Symlink,
    }
}

/// Rebuild one tenant's slice of the index. Two passes over every manifest
/// reachable from `storage.list_containers`:
///
/// - Pass 1 (registry): every container's own `blob_ref`/`blob`, then every
///   entry's child `blob_ref`/`blob`, all through the dedup gate. Containers
///   are registered before their entries are, so a container that also shows
///   up as someone else's child entry already has its real `format_key` on
///   file by the time that entry tries to register it without one — the
///   dedup gate's `mime_type`/`format_key` columns are first-writer-wins
///   (§4.7), so the other order would permanently lock in a null.
/// - Pass 2 (structure): for each manifest, look up the container's `blob_id`
///   from pass 1 and insert its `container` row plus every `entry` row in one
///   batch.
pub async fn rebuild_tenant(
    pool: &PgPool,
    storage: &dyn ObjectStorage,
    tenant: &TenantId,
    options: RebuildOptions,
) -> Result<RebuildSummary, RebuildError> {
    if options.truncate_first {
        blob_registry::truncate_tenant(pool, tenant.as_str()).await?;
    }

    let container_keys = storage.list_containers(tenant).await?;
    let mut manifests: Vec<(BlobRef, Manifest)> = Vec::with_capacity(container_keys.len());
    for container_ref in container_keys {
        let manifest = vault_manifest::load(storage, tenant, &container_ref).await?;
        manifests.push((container_ref, manifest));
    }

    let mut blob_ref_ids: HashMap<BlobRef, i64> = HashMap::new();
    let mut blob_ids: HashMap<BlobRef, i64> = HashMap::new();

    for (container_ref, manifest) in &manifests {
        let outcome = blob_registry::register_blob(
            pool,
            tenant.as_str(),
            container_ref,
            Some("application/vnd.vault.manifest"),
            Some(&manifest.format_key),
        )
        .await?;
        blob_ref_ids.insert(*container_ref, outcome.blob_ref_id);
        blob_ids.insert(*container_ref, outcome.blob_id);
    }

    for (_, manifest) in &manifests {
        for entry in &manifest.entries {
            let Some(child_ref) = entry.blob_ref() else {
                return Err(RebuildError::InvalidEntry(entry.path.clone()));
            };
            if blob_ref_ids.contains_key(&child_ref) {
                continue;
            }
            let outcome = blob_registry::register_blob(pool, tenant.as_str(), &child_ref, None, None).await?;
            blob_ref_ids.insert(child_ref, outcome.blob_ref_id);
            blob_ids.insert(child_ref, outcome.blob_id);
        }
    }

    let mut entries_processed = 0usize;
    for (container_ref, manifest) in &manifests {
        let blob_id = *blob_ids
            .get(container_ref)
            .expect("every container was registered in the pass above");

        let mut entry_rows: Vec<(NewEntry, i64)> = Vec::with_capacity(manifest.entries.len());
        for entry in &manifest.entries {
            let child_ref = entry.blob_ref().ok_or_else(|| RebuildError::InvalidEntry(entry.path.clone()))?;
            let blob_ref_id = *blob_ref_ids
                .get(&child_ref)
                .expect("every entry's child was registered in the pass above");
            entry_rows.push((
                NewEntry {
                    internal_path: entry.path.clone(),
                    entry_type: entry_type_of(entry.entry_type),
                    blob_ref: child_ref,
                    mtime_ms: entry.mtime_ms,
                    metadata: None,
                },
                blob_ref_id,
            ));
        }

        entries_processed += entry_rows.len();
        container_repo::insert_container(pool, blob_id, &entry_rows).await?;
    }

    Ok(RebuildSummary {
        containers: manifests.len(),
        entries: entries_processed,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use vault_core::ContentHash;
    use vault_manifest::ManifestEntry;
    use vault_mocks::in_memory_storage::InMemoryStorage;

    use super::*;

    #[test]
    fn rebuild_options_default_does_not_truncate() {
        assert!(!RebuildOptions::default().truncate_first);
    }

    #[tokio::test]
    async fn list_containers_round_trips_through_in_memory_storage() {
        let storage: Arc<dyn ObjectStorage> = Arc::new(InMemoryStorage::new());
        let tenant = TenantId::from("tenant-rebuild-smoke");

        let leaf = b"leaf body".to_vec();
        let leaf_ref = BlobRef::new(ContentHash::of(&leaf), leaf.len() as u64, false).unwrap();
        storage.create(&tenant, &leaf_ref, &leaf, None).await.unwrap();

        let manifest = Manifest::build(
            BlobRef::new(ContentHash::of(b"container body"), 14, true).unwrap(),
            "zip",
            None,
            vec![ManifestEntry {
                path: "hello.txt".to_string(),
                hash: *leaf_ref.hash().as_bytes(),
                leaf_size: leaf_ref.leaf_size(),
                is_container: false,
                entry_type: ManifestEntryType::File,
                mtime_ms: None,
                format_metadata: vec![],
            }],
        );
        vault_manifest::store(storage.as_ref(), &tenant, &manifest).await.unwrap();

        let containers = storage.list_containers(&tenant).await.unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0], manifest.container_blob_ref().unwrap());
    }
}

#[cfg(all(test, feature = "tests_integration_postgres"))]
mod tests_integration_postgres {
    use std::sync::Arc;

    use vault_core::ContentHash;
    use vault_manifest::ManifestEntry;
    use vault_mocks::in_memory_storage::InMemoryStorage;

    use super::*;

    async fn pool() -> PgPool {
        let url = std::env::var("VAULT_TEST_DATABASE_URL").expect("VAULT_TEST_DATABASE_URL");
        vault_db::connect_and_migrate(&url).await.unwrap()
    }

    async fn seed_one_container(storage: &InMemoryStorage, tenant: &TenantId) -> BlobRef {
        let leaf = b"rebuild leaf body".to_vec();
        let leaf_ref = BlobRef::new(ContentHash::of(&leaf), leaf.len() as u64, false).unwrap();
        storage.create(tenant, &leaf_ref, &leaf, None).await.unwrap();

        let manifest = Manifest::build(
            BlobRef::new(ContentHash::of(b"rebuild container body"), 22, true).unwrap(),
            "zip",
            None,
            vec![ManifestEntry {
                path: "a.txt".to_string(),
                hash: *leaf_ref.hash().as_bytes(),
                leaf_size: leaf_ref.leaf_size(),
                is_container: false,
                entry_type: ManifestEntryType::File,
                mtime_ms: None,
                format_metadata: vec![],
            }],
        );
        vault_manifest::store(storage, tenant, &manifest).await.unwrap();
        manifest.container_blob_ref().unwrap()
    }

    #[tokio::test]
    async fn rebuild_populates_container_and_entry_rows() {
        let pool = pool().await;
        let storage = InMemoryStorage::new();
        let tenant = TenantId::from("tenant-rebuild-pg");
        let container_ref = seed_one_container(&storage, &tenant).await;

        let summary = rebuild_tenant(&pool, &storage, &tenant, RebuildOptions::default())
            .await
            .unwrap();
        assert_eq!(summary.containers, 1);
        assert_eq!(summary.entries, 1);

        let container_outcome = blob_registry::register_blob(&pool, tenant.as_str(), &container_ref, None, None)
            .await
            .unwrap();
        assert!(!container_outcome.content_is_new);
        let container = container_repo::find_container_by_blob_id(&pool, container_outcome.blob_id)
            .await
            .unwrap()
            .expect("container row exists after rebuild");
        assert_eq!(container.entry_count, 1);
    }

    #[tokio::test]
    async fn truncate_first_does_not_touch_other_tenants() {
        let pool = pool().await;
        let storage = InMemoryStorage::new();
        let tenant_a = TenantId::from("tenant-rebuild-trunc-a");
        let tenant_b = TenantId::from("tenant-rebuild-trunc-b");
        let ref_a = seed_one_container(&storage, &tenant_a).await;
        let ref_b = seed_one_container(&storage, &tenant_b).await;

        rebuild_tenant(&pool, &storage, &tenant_a, RebuildOptions::default()).await.unwrap();
        rebuild_tenant(&pool, &storage, &tenant_b, RebuildOptions::default()).await.unwrap();

        rebuild_tenant(
            &pool,
            &storage,
            &tenant_a,
            RebuildOptions { truncate_first: true },
        )
        .await
        .unwrap();

        let b_outcome = blob_registry::register_blob(&pool, tenant_b.as_str(), &ref_b, None, None)
            .await
            .unwrap();
        assert!(!b_outcome.content_is_new, "tenant b's content must survive tenant a's truncate");

        let _ = ref_a;
    }
}
