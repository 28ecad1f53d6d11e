//! What a task type's lifecycle callback hands back to the scheduler
//! (§4.4).

use serde_json::Value;

/// A task's terminal or retryable failure, serialized into `task.output`
/// when the task lands in ERROR or DEAD.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TaskError {
    pub message: String,
    pub retryable: bool,
}

impl TaskError {
    pub fn new(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            message: message.into(),
            retryable,
        }
    }

    /// §7's default classification: IO and timeout errors are retryable,
    /// everything else is not. Callers with richer error types should
    /// construct `TaskError` directly rather than going through this.
    pub fn from_io_error(err: &std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        let retryable = matches!(
            err.kind(),
            TimedOut | Interrupted | WouldBlock | ConnectionReset | ConnectionAborted
        );
        Self::new(err.to_string(), retryable)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).expect("TaskError always serializes")
    }
}

/// Returned by a task type's `on_start`/`on_resume`/`on_error` callback.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Status -> COMPLETE, `output` persisted.
    Complete(Value),
    /// Status -> BLOCKED; edges recorded against the given subtask ids.
    Blocked(Vec<i64>),
    /// Status -> BACKGROUND; `expires_at = now + timeout`. An external actor
    /// must call back in before expiry or the sweep moves it to DEAD.
    Background {
        reason: String,
        timeout: chrono::Duration,
    },
    /// Status -> ERROR (retryable, under the retry ceiling) or DEAD.
    Failed(TaskError),
}
