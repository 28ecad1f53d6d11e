use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconstructError {
    #[error("storage error: {0}")]
    Storage(#[from] vault_storage::StorageError),

    #[error("manifest error: {0}")]
    Manifest(#[from] vault_manifest::ManifestError),

    #[error("format error: {0}")]
    Format(#[from] vault_format::FormatError),

    #[error("no handler registered for format key `{0}`")]
    UnknownFormatKey(String),

    #[error("format `{0}` does not support reconstruction")]
    NotReconstructable(String),

    #[error("manifest entry `{0}` carries an invalid blob reference")]
    InvalidEntry(String),
}
