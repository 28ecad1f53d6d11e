//! The manifest record itself (§4.8). Serialized with `postcard` behind a
//! version byte; see [`crate::codec`].

use serde::{Deserialize, Serialize};
use vault_core::BlobRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManifestEntryType {
    File,
    Directory,
    Symlink,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub hash: [u8; 16],
    pub leaf_size: u64,
    pub is_container: bool,
    pub entry_type: ManifestEntryType,
    pub mtime_ms: Option<i64>,
    /// Opaque format-specific bytes, handed back verbatim to
    /// `Handler::reconstruct` (§4.3, §4.9).
    pub format_metadata: Vec<u8>,
}

impl ManifestEntry {
    pub fn blob_ref(&self) -> Option<BlobRef> {
        BlobRef::new(
            vault_core::ContentHash::from_bytes(self.hash),
            self.leaf_size,
            self.is_container,
        )
        .ok()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub container_hash: [u8; 16],
    pub container_size: u64,
    pub format_key: String,
    pub format_metadata: Option<Vec<u8>>,
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn container_blob_ref(&self) -> Option<BlobRef> {
        BlobRef::new(
            vault_core::ContentHash::from_bytes(self.container_hash),
            self.container_size,
            true,
        )
        .ok()
    }

    pub fn build(
        container_ref: BlobRef,
        format_key: impl Into<String>,
        format_metadata: Option<Vec<u8>>,
        entries: Vec<ManifestEntry>,
    ) -> Self {
        debug_assert!(container_ref.is_container());
        Self {
            container_hash: *container_ref.hash().as_bytes(),
            container_size: container_ref.leaf_size(),
            format_key: format_key.into(),
            format_metadata,
            entries,
        }
    }
}
