use thiserror::Error;

/// Errors surfaced by an [`crate::ObjectStorage`] backend.
///
/// This is deliberately narrower than [`vault_core::VaultError`]: it only
/// distinguishes the shapes a storage backend itself can produce. Callers at
/// a system boundary (the task scheduler, the CLI) map these into the wider
/// taxonomy.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob already exists: {0}")]
    AlreadyExists(String),

    #[error("backend io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backend error: {0}")]
    Backend(String),
}
