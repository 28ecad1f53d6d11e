use thiserror::Error;

#[derive(Error, Debug)]
pub enum RebuildError {
    #[error("storage error: {0}")]
    Storage(#[from] vault_storage::StorageError),

    #[error("index error: {0}")]
    Index(#[from] vault_db::IndexError),

    #[error("manifest error: {0}")]
    Manifest(#[from] vault_manifest::ManifestError),

    #[error("manifest entry `{0}` carries an invalid blob reference")]
    InvalidEntry(String),
}

impl RebuildError {
    /// §7's default classification: storage and index errors are usually
    /// transient (connection hiccups); a corrupt manifest never becomes
    /// readable on retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RebuildError::Manifest(_) | RebuildError::InvalidEntry(_))
    }
}
