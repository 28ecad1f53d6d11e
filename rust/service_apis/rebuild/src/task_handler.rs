//! Wires rebuild into the task scheduler as a `task_type` (§4.4, §4.10).
//! Unlike ingestion, rebuild is a bounded scan with no fan-out of its own —
//! it runs to completion inside a single callback and reports `Complete` or
//! `Failed` directly, never `Background`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use vault_core::TenantId;
use vault_scheduler::{Outcome, TaskContext, TaskError, TaskHandler};
use vault_storage::ObjectStorage;

use crate::{rebuild_tenant, RebuildOptions};

pub const TASK_TYPE: &str = "vault.rebuild";

#[derive(Debug, Deserialize, Default)]
struct RebuildInput {
    #[serde(rename = "truncateFirst", default)]
    truncate_first: bool,
}

pub struct RebuildTaskHandler {
    pool: sqlx::PgPool,
    storage: Arc<dyn ObjectStorage>,
}

impl RebuildTaskHandler {
    pub fn new(pool: sqlx::PgPool, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { pool, storage }
    }
}

#[async_trait]
impl TaskHandler for RebuildTaskHandler {
    async fn on_start(&self, input: Value, ctx: &TaskContext) -> Outcome {
        let parsed: RebuildInput = if input.is_null() {
            RebuildInput::default()
        } else {
            match serde_json::from_value(input) {
                Ok(v) => v,
                Err(e) => return Outcome::Failed(TaskError::new(format!("malformed rebuild input: {e}"), false)),
            }
        };

        let tenant = TenantId::from(ctx.task().tenant_id.as_str());
        let options = RebuildOptions {
            truncate_first: parsed.truncate_first,
        };

        match rebuild_tenant(&self.pool, self.storage.as_ref(), &tenant, options).await {
            Ok(summary) => Outcome::Complete(json!({
                "containers": summary.containers,
                "entries": summary.entries,
            })),
            Err(e) => Outcome::Failed(TaskError::new(e.to_string(), e.is_retryable())),
        }
    }
}
