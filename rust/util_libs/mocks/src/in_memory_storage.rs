//! An [`ObjectStorage`] backed by a `Mutex<HashMap>`, for tests that want
//! the real trait contract without touching a filesystem or network.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use vault_core::{BlobRef, TenantId};
use vault_storage::{ObjectStorage, StorageError};

#[derive(Default)]
pub struct InMemoryStorage {
    blobs: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(tenant: &TenantId, blob_ref: &BlobRef) -> (String, String) {
        (tenant.as_str().to_string(), blob_ref.storage_key())
    }
}

#[async_trait]
impl ObjectStorage for InMemoryStorage {
    async fn read(&self, tenant: &TenantId, blob_ref: &BlobRef) -> Result<Vec<u8>, StorageError> {
        let blobs = self.blobs.lock().unwrap();
        blobs
            .get(&Self::key(tenant, blob_ref))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(blob_ref.storage_key()))
    }

    async fn create(
        &self,
        tenant: &TenantId,
        blob_ref: &BlobRef,
        data: &[u8],
        _mime_hint: Option<&str>,
    ) -> Result<(), StorageError> {
        let mut blobs = self.blobs.lock().unwrap();
        let key = Self::key(tenant, blob_ref);
        if let Some(existing) = blobs.get(&key) {
            if existing != data {
                return Err(StorageError::AlreadyExists(blob_ref.storage_key()));
            }
            return Ok(());
        }
        blobs.insert(key, data.to_vec());
        Ok(())
    }

    async fn exists(&self, tenant: &TenantId, blob_ref: &BlobRef) -> Result<bool, StorageError> {
        Ok(self.blobs.lock().unwrap().contains_key(&Self::key(tenant, blob_ref)))
    }

    async fn delete(&self, tenant: &TenantId, blob_ref: &BlobRef) -> Result<(), StorageError> {
        let mut blobs = self.blobs.lock().unwrap();
        blobs
            .remove(&Self::key(tenant, blob_ref))
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(blob_ref.storage_key()))
    }

    async fn delete_tenant(&self, tenant: &TenantId) -> Result<(), StorageError> {
        let mut blobs = self.blobs.lock().unwrap();
        blobs.retain(|(t, _), _| t != tenant.as_str());
        Ok(())
    }

    async fn list_tenants(&self) -> Result<Vec<TenantId>, StorageError> {
        let blobs = self.blobs.lock().unwrap();
        let mut tenants: Vec<String> = blobs.keys().map(|(t, _)| t.clone()).collect();
        tenants.sort();
        tenants.dedup();
        Ok(tenants.into_iter().map(TenantId::new).collect())
    }

    async fn list_containers(&self, tenant: &TenantId) -> Result<Vec<BlobRef>, StorageError> {
        let blobs = self.blobs.lock().unwrap();
        Ok(blobs
            .keys()
            .filter(|(t, _)| t == tenant.as_str())
            .filter(|(_, key)| key.ends_with('_'))
            .filter_map(|(_, key)| BlobRef::parse(key))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vault_core::ContentHash;

    fn sample() -> (TenantId, BlobRef) {
        (
            TenantId::new("tenant-mock"),
            BlobRef::new(ContentHash::of(b"mock payload"), 12, false).unwrap(),
        )
    }

    #[tokio::test]
    async fn create_then_read_round_trips() {
        let store = InMemoryStorage::new();
        let (tenant, blob_ref) = sample();
        store.create(&tenant, &blob_ref, b"mock payload", None).await.unwrap();
        assert_eq!(store.read(&tenant, &blob_ref).await.unwrap(), b"mock payload");
    }

    #[tokio::test]
    async fn repeated_create_of_identical_bytes_is_idempotent() {
        let store = InMemoryStorage::new();
        let (tenant, blob_ref) = sample();
        store.create(&tenant, &blob_ref, b"mock payload", None).await.unwrap();
        assert!(store.create(&tenant, &blob_ref, b"mock payload", None).await.is_ok());
    }

    #[tokio::test]
    async fn create_of_different_bytes_under_same_key_is_rejected() {
        let store = InMemoryStorage::new();
        let (tenant, blob_ref) = sample();
        store.create(&tenant, &blob_ref, b"mock payload", None).await.unwrap();
        let err = store.create(&tenant, &blob_ref, b"different", None).await.unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn list_containers_filters_by_trailing_underscore() {
        let store = InMemoryStorage::new();
        let tenant = TenantId::new("tenant-mock");
        let leaf = BlobRef::new(ContentHash::of(b"leaf"), 4, false).unwrap();
        let container = BlobRef::new(ContentHash::of(b"container"), 9, true).unwrap();
        store.create(&tenant, &leaf, b"leaf", None).await.unwrap();
        store.create(&tenant, &container, b"container", None).await.unwrap();
        let containers = store.list_containers(&tenant).await.unwrap();
        assert_eq!(containers, vec![container]);
    }
}
