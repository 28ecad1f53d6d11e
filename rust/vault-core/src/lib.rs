//! Value types shared by every Vault component: content hashing, the
//! `BlobRef` compound identity, tenant identifiers, and the error taxonomy
//! observed at component boundaries.

mod blob_ref;
mod error;
mod hash;
mod tenant;

pub use blob_ref::{BlobRef, ZeroSizeBlob};
pub use error::VaultError;
pub use hash::{ContentHash, HashingWriter};
pub use tenant::TenantId;
