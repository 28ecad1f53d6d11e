use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("index error: {0}")]
    Index(#[from] vault_db::IndexError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("no handler registered for task type `{0}`")]
    NoHandler(String),

    #[error("task {0} not found")]
    TaskNotFound(i64),

    #[error("subtask {0} has not completed")]
    SubtaskNotComplete(i64),
}
