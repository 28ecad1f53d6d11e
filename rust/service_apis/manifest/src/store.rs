//! Store/load against object storage. The manifest has no identity of its
//! own: "the manifest" is exactly "the blob at the container's BlobRef key"
//! (§4.8).

use vault_core::TenantId;
use vault_storage::ObjectStorage;

use crate::codec;
use crate::error::ManifestError;
use crate::model::Manifest;

pub async fn store(
    storage: &dyn ObjectStorage,
    tenant: &TenantId,
    manifest: &Manifest,
) -> Result<(), ManifestError> {
    let container_ref = manifest
        .container_blob_ref()
        .expect("Manifest::build always constructs a valid container BlobRef");
    let bytes = codec::encode(manifest)?;
    storage
        .create(tenant, &container_ref, &bytes, Some("application/vnd.vault.manifest"))
        .await?;
    Ok(())
}

pub async fn load(
    storage: &dyn ObjectStorage,
    tenant: &TenantId,
    container_ref: &vault_core::BlobRef,
) -> Result<Manifest, ManifestError> {
    let bytes = storage.read(tenant, container_ref).await?;
    codec::decode(&bytes)
}
