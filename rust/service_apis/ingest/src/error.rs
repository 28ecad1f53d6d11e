use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum IngestError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("index error: {0}")]
    Index(String),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("no handler for this buffer")]
    NoHandler,
}

impl IngestError {
    /// §7's default classification: IO-class errors are retryable, all
    /// others are not. Storage errors are the only IO class this pipeline
    /// produces; format/manifest errors are data problems, not transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Storage(_))
    }
}

impl From<vault_storage::StorageError> for IngestError {
    fn from(e: vault_storage::StorageError) -> Self {
        IngestError::Storage(e.to_string())
    }
}

impl From<vault_db::IndexError> for IngestError {
    fn from(e: vault_db::IndexError) -> Self {
        IngestError::Index(e.to_string())
    }
}

impl From<vault_manifest::ManifestError> for IngestError {
    fn from(e: vault_manifest::ManifestError) -> Self {
        IngestError::Manifest(e.to_string())
    }
}

impl From<vault_format::FormatError> for IngestError {
    fn from(e: vault_format::FormatError) -> Self {
        IngestError::Format(e.to_string())
    }
}
