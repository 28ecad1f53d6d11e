use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("manifest encoding error: {0}")]
    Encode(#[from] postcard::Error),

    #[error("unsupported manifest version: {0}")]
    UnsupportedVersion(u8),

    #[error("manifest truncated: no version byte")]
    Empty,

    #[error("storage error: {0}")]
    Storage(#[from] vault_storage::StorageError),
}
