//! Filesystem-backed [`ObjectStorage`] for development and tests.
//!
//! Layout: `{root}/{tenantId}/{hash[0:2]}/{hash[2:4]}/{key}`, no compression —
//! blobs are stored as-is so they stay debuggable with plain file tools. New
//! blobs are written to a temp file under the tenant root and moved into
//! place with `rename`, which is atomic on the same filesystem: a reader can
//! never observe a partially-written blob.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::debug;
use vault_core::{BlobRef, TenantId};

use crate::{error::StorageError, ObjectStorage};

pub struct FilesystemBackend {
    root: PathBuf,
    write_once_check: bool,
}

impl FilesystemBackend {
    /// `write_once_check` gates the existence check that guards `create`
    /// against overwrites — the filesystem has no native create-if-absent
    /// primitive, so when enabled this does a stat before the write. Callers
    /// that can already guarantee non-overwrite (e.g. a dedup gate that only
    /// calls `create` on cache miss) may disable it.
    pub fn new(root: impl Into<PathBuf>, write_once_check: bool) -> Self {
        Self {
            root: root.into(),
            write_once_check,
        }
    }

    fn tenant_dir(&self, tenant: &TenantId) -> PathBuf {
        self.root.join(tenant.as_str())
    }

    fn blob_path(&self, tenant: &TenantId, blob_ref: &BlobRef) -> PathBuf {
        let hex = blob_ref.hash().to_hex();
        self.tenant_dir(tenant)
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(blob_ref.storage_key())
    }
}

#[async_trait]
impl ObjectStorage for FilesystemBackend {
    async fn read(&self, tenant: &TenantId, blob_ref: &BlobRef) -> Result<Vec<u8>, StorageError> {
        let path = self.blob_path(tenant, blob_ref);
        tokio::task::spawn_blocking(move || match std::fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
    }

    async fn create(
        &self,
        tenant: &TenantId,
        blob_ref: &BlobRef,
        data: &[u8],
        _mime_hint: Option<&str>,
    ) -> Result<(), StorageError> {
        let path = self.blob_path(tenant, blob_ref);
        let write_once_check = self.write_once_check;
        let data = data.to_vec();
        let key = blob_ref.storage_key();
        tokio::task::spawn_blocking(move || {
            if write_once_check && path.is_file() {
                return Err(StorageError::AlreadyExists(key));
            }
            let parent = path.parent().expect("blob path always has a parent");
            std::fs::create_dir_all(parent)?;

            // Write to a sibling temp file first and rename into place: a
            // crash or concurrent reader never observes a half-written blob.
            let tmp_path = parent.join(format!(".{}.tmp", key));
            debug!("writing blob to {} via {}", path.display(), tmp_path.display());
            std::fs::write(&tmp_path, &data)?;
            std::fs::rename(&tmp_path, &path)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
    }

    async fn exists(&self, tenant: &TenantId, blob_ref: &BlobRef) -> Result<bool, StorageError> {
        let path = self.blob_path(tenant, blob_ref);
        tokio::task::spawn_blocking(move || path.is_file())
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn delete(&self, tenant: &TenantId, blob_ref: &BlobRef) -> Result<(), StorageError> {
        let path = self.blob_path(tenant, blob_ref);
        let tenant_root = self.tenant_dir(tenant);
        tokio::task::spawn_blocking(move || {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(StorageError::NotFound(path.display().to_string()));
                }
                Err(e) => return Err(StorageError::Io(e)),
            }
            prune_empty_parents(&path, &tenant_root);
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
    }

    async fn delete_tenant(&self, tenant: &TenantId) -> Result<(), StorageError> {
        let dir = self.tenant_dir(tenant);
        tokio::task::spawn_blocking(move || match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
    }

    async fn list_tenants(&self) -> Result<Vec<TenantId>, StorageError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            if !root.is_dir() {
                return Ok(vec![]);
            }
            let mut tenants = vec![];
            for entry in std::fs::read_dir(&root)? {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    if let Some(name) = entry.file_name().to_str() {
                        tenants.push(TenantId::new(name.to_string()));
                    }
                }
            }
            Ok(tenants)
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
    }

    async fn list_containers(&self, tenant: &TenantId) -> Result<Vec<BlobRef>, StorageError> {
        let tenant_dir = self.tenant_dir(tenant);
        tokio::task::spawn_blocking(move || {
            if !tenant_dir.is_dir() {
                return Ok(vec![]);
            }
            let mut containers = vec![];
            for shard_a in std::fs::read_dir(&tenant_dir)? {
                let shard_a = shard_a?.path();
                if !shard_a.is_dir() {
                    continue;
                }
                for shard_b in std::fs::read_dir(&shard_a)? {
                    let shard_b = shard_b?.path();
                    if !shard_b.is_dir() {
                        continue;
                    }
                    for entry in std::fs::read_dir(&shard_b)? {
                        let entry = entry?;
                        let name = entry.file_name();
                        let Some(name) = name.to_str() else { continue };
                        if name.starts_with('.') || !name.ends_with('_') {
                            continue;
                        }
                        if let Some(blob_ref) = BlobRef::parse(name) {
                            containers.push(blob_ref);
                        }
                    }
                }
            }
            Ok(containers)
        })
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
    }
}

/// Remove empty shard directories up to (but not including) `tenant_root`,
/// mirroring the two-tier sharding the write side creates.
fn prune_empty_parents(blob_path: &Path, tenant_root: &Path) {
    let mut dir = blob_path.parent();
    while let Some(d) = dir {
        if d == tenant_root || !d.starts_with(tenant_root) {
            break;
        }
        if std::fs::remove_dir(d).is_err() {
            // Not empty, or already gone — either way, stop climbing.
            break;
        }
        dir = d.parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_core::ContentHash;

    fn sample_ref(bytes: &[u8], container: bool) -> BlobRef {
        BlobRef::new(ContentHash::of(bytes), bytes.len() as u64, container).unwrap()
    }

    #[tokio::test]
    async fn create_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path(), true);
        let tenant = TenantId::new("tenant-a");
        let data = b"hello world";
        let r = sample_ref(data, false);

        backend.create(&tenant, &r, data, None).await.unwrap();
        assert!(backend.exists(&tenant, &r).await.unwrap());
        let read_back = backend.read(&tenant, &r).await.unwrap();
        assert_eq!(read_back, data);
    }

    #[tokio::test]
    async fn create_rejects_overwrite_when_checked() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path(), true);
        let tenant = TenantId::new("tenant-a");
        let data = b"immutable";
        let r = sample_ref(data, false);

        backend.create(&tenant, &r, data, None).await.unwrap();
        let second = backend.create(&tenant, &r, data, None).await;
        assert!(matches!(second, Err(StorageError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn delete_then_read_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path(), true);
        let tenant = TenantId::new("tenant-a");
        let data = b"gone soon";
        let r = sample_ref(data, false);

        backend.create(&tenant, &r, data, None).await.unwrap();
        backend.delete(&tenant, &r).await.unwrap();
        assert!(matches!(
            backend.read(&tenant, &r).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            backend.delete(&tenant, &r).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn list_containers_only_returns_container_refs() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path(), true);
        let tenant = TenantId::new("tenant-a");
        let leaf = sample_ref(b"leaf data", false);
        let container = sample_ref(b"container manifest bytes", true);

        backend.create(&tenant, &leaf, b"leaf data", None).await.unwrap();
        backend
            .create(&tenant, &container, b"container manifest bytes", None)
            .await
            .unwrap();

        let containers = backend.list_containers(&tenant).await.unwrap();
        assert_eq!(containers, vec![container]);
    }

    #[tokio::test]
    async fn delete_tenant_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path(), true);
        let tenant = TenantId::new("tenant-a");
        backend
            .create(&tenant, &sample_ref(b"x", false), b"x", None)
            .await
            .unwrap();

        backend.delete_tenant(&tenant).await.unwrap();
        backend.delete_tenant(&tenant).await.unwrap();
        assert!(backend.list_tenants().await.unwrap().is_empty());
    }
}
