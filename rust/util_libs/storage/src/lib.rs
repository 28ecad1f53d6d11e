//! Tenant-scoped, write-once, content-addressed blob storage.
//!
//! [`ObjectStorage`] is the single interface the rest of Vault depends on;
//! [`filesystem::FilesystemBackend`] is the dev/test implementation and
//! [`s3::S3Backend`] is the production one. Compression, if any, is exclusively
//! a backend concern — every caller of [`ObjectStorage`] sees uncompressed
//! bytes, and `BlobRef` carries no extension naming a codec.

mod error;
pub mod filesystem;
pub mod s3;

pub use error::StorageError;

use async_trait::async_trait;
use vault_core::{BlobRef, TenantId};

/// Tenant-scoped, write-once, content-addressed object storage.
///
/// Implementations MUST guarantee that identical `(tenant, BlobRef)` pairs map
/// to identical storage locations, so that a caller retrying a `create` after
/// a crash either writes nothing new (content already present) or writes
/// bytes indistinguishable from what's already there.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Read the full contents of a blob. Fails [`StorageError::NotFound`] if
    /// the key is absent.
    async fn read(&self, tenant: &TenantId, blob_ref: &BlobRef) -> Result<Vec<u8>, StorageError>;

    /// Store `data` under `blob_ref`. Create-new semantics: callers MUST NOT
    /// overwrite. `mime_hint` is accepted for forward compatibility with
    /// callers that want to pass it straight through from detection — the
    /// backend does not interpret it; the first-writer-wins mime-type rule
    /// lives on the `BlobRefRecord` row in the index, not in object storage.
    async fn create(
        &self,
        tenant: &TenantId,
        blob_ref: &BlobRef,
        data: &[u8],
        mime_hint: Option<&str>,
    ) -> Result<(), StorageError>;

    /// Whether `blob_ref` is present for `tenant`.
    async fn exists(&self, tenant: &TenantId, blob_ref: &BlobRef) -> Result<bool, StorageError>;

    /// Remove a blob. Fails [`StorageError::NotFound`] if absent.
    async fn delete(&self, tenant: &TenantId, blob_ref: &BlobRef) -> Result<(), StorageError>;

    /// Remove every blob owned by `tenant`, and the tenant's storage
    /// container itself (directory or bucket). Idempotent: deleting a tenant
    /// that was already removed, or never existed, succeeds.
    async fn delete_tenant(&self, tenant: &TenantId) -> Result<(), StorageError>;

    /// Every tenant with at least one blob stored (or an empty tenant
    /// container that was provisioned but never written to).
    async fn list_tenants(&self) -> Result<Vec<TenantId>, StorageError>;

    /// Every container `BlobRef` owned by `tenant` — keys whose canonical
    /// string ends in `_`. Implementations must do this as a key/name scan,
    /// never by reading blob contents.
    async fn list_containers(&self, tenant: &TenantId) -> Result<Vec<BlobRef>, StorageError>;
}
