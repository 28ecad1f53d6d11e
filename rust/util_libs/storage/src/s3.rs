//! S3-compatible [`ObjectStorage`] backend.
//!
//! One bucket per tenant, named `{prefix}{tenantId}`. Keys equal the
//! canonical `BlobRef` string verbatim — no further encoding. Buckets are
//! created on first use; a race where two processes both try to provision
//! the same tenant's bucket is resolved by treating `BucketAlreadyOwnedByYou`
//! as success, since bucket identity already IS the tenant's identity.

use async_trait::async_trait;
use aws_sdk_s3::{error::SdkError, primitives::ByteStream, Client};
use vault_core::{BlobRef, TenantId};

use crate::{error::StorageError, ObjectStorage};

pub struct S3Backend {
    client: Client,
    bucket_prefix: String,
    write_once_check: bool,
}

impl S3Backend {
    /// `write_once_check` gates an `exists`-then-`put_object` guard in
    /// `create` — S3 has no native create-if-absent either, so this is the
    /// same best-effort check `FilesystemBackend` performs, not an atomic
    /// guarantee: a racing writer can still land between the check and the
    /// put. Callers that can already guarantee non-overwrite may disable it.
    pub fn new(client: Client, bucket_prefix: impl Into<String>, write_once_check: bool) -> Self {
        Self {
            client,
            bucket_prefix: bucket_prefix.into(),
            write_once_check,
        }
    }

    fn bucket_name(&self, tenant: &TenantId) -> String {
        format!("{}{}", self.bucket_prefix, tenant.as_str())
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        match self.client.create_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(SdkError::ServiceError(e)) if e.err().is_bucket_already_owned_by_you() => Ok(()),
            Err(SdkError::ServiceError(e)) if e.err().is_bucket_already_exists() => Ok(()),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Backend {
    async fn read(&self, tenant: &TenantId, blob_ref: &BlobRef) -> Result<Vec<u8>, StorageError> {
        let bucket = self.bucket_name(tenant);
        let key = blob_ref.storage_key();
        let output = self
            .client
            .get_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    StorageError::NotFound(key.clone())
                } else {
                    StorageError::Backend(e.to_string())
                }
            })?;
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn create(
        &self,
        tenant: &TenantId,
        blob_ref: &BlobRef,
        data: &[u8],
        mime_hint: Option<&str>,
    ) -> Result<(), StorageError> {
        let bucket = self.bucket_name(tenant);
        self.ensure_bucket(&bucket).await?;
        let key = blob_ref.storage_key();

        if self.write_once_check && self.exists(tenant, blob_ref).await? {
            return Err(StorageError::AlreadyExists(key));
        }

        let mut request = self
            .client
            .put_object()
            .bucket(&bucket)
            .key(&key)
            .body(ByteStream::from(data.to_vec()));
        if let Some(mime) = mime_hint {
            request = request.content_type(mime);
        }
        request
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn exists(&self, tenant: &TenantId, blob_ref: &BlobRef) -> Result<bool, StorageError> {
        let bucket = self.bucket_name(tenant);
        let key = blob_ref.storage_key();
        match self.client.head_object().bucket(&bucket).key(&key).send().await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }

    async fn delete(&self, tenant: &TenantId, blob_ref: &BlobRef) -> Result<(), StorageError> {
        let bucket = self.bucket_name(tenant);
        let key = blob_ref.storage_key();
        if !self.exists(tenant, blob_ref).await? {
            return Err(StorageError::NotFound(key));
        }
        self.client
            .delete_object()
            .bucket(&bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete_tenant(&self, tenant: &TenantId) -> Result<(), StorageError> {
        let bucket = self.bucket_name(tenant);
        let mut continuation = None;
        loop {
            let mut request = self.client.list_objects_v2().bucket(&bucket);
            if let Some(token) = continuation.take() {
                request = request.continuation_token(token);
            }
            let page = match request.send().await {
                Ok(page) => page,
                Err(e) if is_not_found(&e) => return Ok(()),
                Err(e) => return Err(StorageError::Backend(e.to_string())),
            };
            for object in page.contents() {
                if let Some(key) = object.key() {
                    self.client
                        .delete_object()
                        .bucket(&bucket)
                        .key(key)
                        .send()
                        .await
                        .map_err(|e| StorageError::Backend(e.to_string()))?;
                }
            }
            if page.is_truncated().unwrap_or(false) {
                continuation = page.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }
        match self.client.delete_bucket().bucket(&bucket).send().await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }

    async fn list_tenants(&self) -> Result<Vec<TenantId>, StorageError> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| b.name())
            .filter_map(|name| name.strip_prefix(&self.bucket_prefix))
            .map(TenantId::new)
            .collect())
    }

    async fn list_containers(&self, tenant: &TenantId) -> Result<Vec<BlobRef>, StorageError> {
        let bucket = self.bucket_name(tenant);
        let mut containers = vec![];
        let mut continuation = None;
        loop {
            let mut request = self.client.list_objects_v2().bucket(&bucket);
            if let Some(token) = continuation.take() {
                request = request.continuation_token(token);
            }
            let page = match request.send().await {
                Ok(page) => page,
                Err(e) if is_not_found(&e) => return Ok(vec![]),
                Err(e) => return Err(StorageError::Backend(e.to_string())),
            };
            // Listing keys is metadata-only — no object bodies are fetched —
            // so filtering by the trailing `_` here never reads blob content.
            for object in page.contents() {
                if let Some(key) = object.key() {
                    if key.ends_with('_') {
                        if let Some(blob_ref) = BlobRef::parse(key) {
                            containers.push(blob_ref);
                        }
                    }
                }
            }
            if page.is_truncated().unwrap_or(false) {
                continuation = page.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }
        Ok(containers)
    }
}

fn is_not_found<E, R>(err: &SdkError<E, R>) -> bool {
    let rendered = format!("{err:?}");
    ["NotFound", "NoSuchKey", "NoSuchBucket"]
        .iter()
        .any(|needle| rendered.contains(needle))
}
