//! Task type registration (§4.4: "a CDI-discovered singleton per `type`
//! string"). Vault has no DI container, so the registry is a plain map
//! built once at startup and read-only thereafter (§9, "Global state").

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::TaskContext;
use crate::outcome::{Outcome, TaskError};

#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Invoked the first time a task is claimed.
    async fn on_start(&self, input: Value, ctx: &TaskContext) -> Outcome;

    /// Invoked when a BLOCKED task is re-OPENed because all blocking
    /// subtasks completed.
    async fn on_resume(&self, input: Value, ctx: &TaskContext) -> Outcome {
        let _ = (input, ctx);
        Outcome::Failed(TaskError::new("on_resume not implemented", false))
    }

    /// Invoked when a subtask failed. Default re-propagates the failure to
    /// this task (§4.4).
    async fn on_error(&self, input: Value, ctx: &TaskContext, subtask_error: TaskError) -> Outcome {
        let _ = (input, ctx);
        Outcome::Failed(subtask_error)
    }
}

#[derive(Default)]
pub struct TaskTypeRegistry {
    handlers: HashMap<String, Box<dyn TaskHandler>>,
}

impl TaskTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task_type: impl Into<String>, handler: Box<dyn TaskHandler>) {
        self.handlers.insert(task_type.into(), handler);
    }

    pub fn get(&self, task_type: &str) -> Option<&dyn TaskHandler> {
        self.handlers.get(task_type).map(|h| h.as_ref())
    }
}
