use thiserror::Error;

/// The error taxonomy Vault's components surface at their boundary (§6, §7 of
/// the spec). Internal crates define their own narrower error enums for
/// plumbing reasons (connection failures, serde errors, etc.) and convert into
/// this shape at the seams an external caller actually observes — an API
/// handler, a task outcome, a CLI exit code.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    #[error("blob already exists: {0}")]
    BlobAlreadyExists(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("no handler registered for format: {0}")]
    NoHandlerForFormat(String),

    #[error("manifest parse error: {0}")]
    ManifestParseError(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("subtask not complete: {0}")]
    SubtaskNotComplete(String),
}

impl VaultError {
    /// Best-effort classification used by the ingestion pipeline (§7) when it
    /// collapses a handler exception into a `TaskError`: I/O-shaped failures
    /// are retried, everything else is not. Richer classification is left to
    /// callers that wrap their own errors (open question, §9).
    pub fn is_retryable(&self) -> bool {
        matches!(self, VaultError::StorageError(_))
    }
}
