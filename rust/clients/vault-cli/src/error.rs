use thiserror::Error;
use vault_core::VaultError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("storage error: {0}")]
    Storage(#[from] vault_storage::StorageError),

    #[error("index error: {0}")]
    Index(#[from] vault_db::IndexError),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] vault_scheduler::SchedulerError),

    #[error("manifest error: {0}")]
    Manifest(#[from] vault_manifest::ManifestError),

    #[error("reconstruct error: {0}")]
    Reconstruct(#[from] vault_reconstruct::ReconstructError),

    #[error("rebuild error: {0}")]
    Rebuild(#[from] vault_rebuild::RebuildError),

    #[error("invalid blob reference: {0}")]
    InvalidBlobRef(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The CLI is the boundary `vault_core::VaultError`'s doc comment describes:
/// every narrower per-crate error collapses into this taxonomy right before
/// it reaches the process exit path, so the exit code and logged message
/// both come from one classifier instead of each crate's own wording.
impl From<CliError> for VaultError {
    fn from(err: CliError) -> Self {
        match err {
            CliError::Storage(vault_storage::StorageError::NotFound(key)) => VaultError::BlobNotFound(key),
            CliError::Storage(vault_storage::StorageError::AlreadyExists(key)) => {
                VaultError::BlobAlreadyExists(key)
            }
            CliError::Storage(e) => VaultError::StorageError(e.to_string()),
            CliError::Index(e) => VaultError::StorageError(e.to_string()),
            CliError::Scheduler(vault_scheduler::SchedulerError::NoHandler(task_type)) => {
                VaultError::NoHandlerForFormat(task_type)
            }
            CliError::Scheduler(vault_scheduler::SchedulerError::TaskNotFound(id)) => {
                VaultError::TaskNotFound(id.to_string())
            }
            CliError::Scheduler(vault_scheduler::SchedulerError::SubtaskNotComplete(id)) => {
                VaultError::SubtaskNotComplete(id.to_string())
            }
            CliError::Scheduler(e) => VaultError::StorageError(e.to_string()),
            CliError::Manifest(e) => VaultError::ManifestParseError(e.to_string()),
            CliError::Reconstruct(e) => VaultError::StorageError(e.to_string()),
            CliError::Rebuild(e) => VaultError::StorageError(e.to_string()),
            CliError::InvalidBlobRef(key) => VaultError::BlobNotFound(key),
            CliError::Io(e) => VaultError::StorageError(e.to_string()),
        }
    }
}
