//! Event types driving the ingestion pipeline (§4.6). Recursion into nested
//! containers is a new event, never a new stack frame — nesting depth is
//! bounded only by the event queue.

use std::sync::Arc;

use vault_core::TenantId;
use vault_format::ContainerChild;

use crate::fanin::FanInContext;

/// A buffer to decompose. The root instance of this event references a blob
/// already present in object storage (the task's input); recursive
/// instances reference an in-memory child buffer that hasn't been stored
/// yet (extraction happens before storage, so a RECONSTRUCTABLE container's
/// bytes are only ever kept in memory).
pub struct IngestFile {
    pub task_id: i64,
    pub tenant: TenantId,
    pub buffer: Vec<u8>,
    pub filename: String,
    pub parent_fan_in: Option<Arc<FanInContext>>,
    /// This event's parent is the `FanInContext` slot this container's
    /// result will occupy once its own fan-in completes.
    pub index_in_parent: usize,
    /// A detached, best-effort decomposition of a STORED container's bytes,
    /// purely for indexing (§4.6 "Bonus ingest"). Never touches a parent
    /// fan-in or the owning task's state.
    pub bonus: bool,
}

/// One child produced by `extractChildren`, on its way through detection,
/// dedup, and storage.
pub struct ChildDiscovered {
    pub child: ContainerChild,
    pub index: usize,
    pub fan_in: Arc<FanInContext>,
}

/// Every child of `fan_in` has reported in; time to assemble and persist
/// the manifest (§4.6 "Fan-in completion").
pub struct AllChildrenComplete {
    pub fan_in: Arc<FanInContext>,
}

/// Advisory notice that a blob was newly written to object storage.
/// Consumed only by observers (indexing/search), never by the pipeline
/// itself.
#[derive(Debug, Clone)]
pub struct ObjectCreated {
    pub tenant: TenantId,
    pub blob_ref: vault_core::BlobRef,
    pub blob_id: i64,
    pub mime_type: Option<String>,
}

pub enum Event {
    IngestFile(IngestFile),
    ChildDiscovered(ChildDiscovered),
    AllChildrenComplete(AllChildrenComplete),
}
