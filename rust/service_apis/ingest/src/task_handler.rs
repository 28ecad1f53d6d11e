//! Wires ingestion into the task scheduler as a `task_type` (§4.4, §4.6).
//! Ingestion's own recursion is event-driven, not subtask-driven, so this
//! handler's only scheduler-visible move is `Outcome::Background`: the
//! pipeline becomes the external actor that completes or fails the task
//! once the event graph it kicked off bottoms out.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;
use serde_json::Value;
use vault_core::TenantId;
use vault_scheduler::{Outcome, TaskContext, TaskError, TaskHandler};

use crate::pipeline::IngestionPipeline;

pub const TASK_TYPE: &str = "vault.ingest";

/// The task's `input` column: `{ "storageKey": "<BlobRef>" }` (§6).
#[derive(Debug, Deserialize)]
struct IngestInput {
    #[serde(rename = "storageKey")]
    storage_key: String,
}

/// How long an ingest task may sit in BACKGROUND before the scheduler's
/// expiry sweep gives up on it and marks it DEAD (§4.4). Generous: a deeply
/// nested archive can take a while to fully decompose.
const BACKGROUND_TIMEOUT_MINUTES: i64 = 30;

pub struct IngestTaskHandler {
    pipeline: Arc<IngestionPipeline>,
}

impl IngestTaskHandler {
    pub fn new(pipeline: Arc<IngestionPipeline>) -> Self {
        Self { pipeline }
    }
}

#[async_trait]
impl TaskHandler for IngestTaskHandler {
    async fn on_start(&self, input: Value, ctx: &TaskContext) -> Outcome {
        let parsed: IngestInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return Outcome::Failed(TaskError::new(format!("malformed ingest input: {e}"), false)),
        };
        let task = ctx.task();
        let tenant = TenantId::from(task.tenant_id.as_str());

        if let Err(e) = self
            .pipeline
            .submit_root_ingest(task.id, tenant, &parsed.storage_key)
            .await
        {
            return Outcome::Failed(TaskError::new(e.to_string(), e.is_retryable()));
        }

        Outcome::Background {
            reason: "decomposing container via the event-driven ingestion pipeline".to_string(),
            timeout: Duration::minutes(BACKGROUND_TIMEOUT_MINUTES),
        }
    }

    /// A retried root ingest task re-enters here, not through `on_resume`:
    /// `task::fail`'s retry path reopens straight to OPEN, and `claim_next`
    /// dispatches every OPEN claim through `on_start` (§4.4). Re-walking the
    /// same root blob is safe — every write along the way passes through the
    /// dedup gate, so a retry after partial progress just short-circuits.
}
