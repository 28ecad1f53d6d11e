//! `FanInContext` (§4.6, §5): the synchronization point a container's
//! children all report back to. The only lock discipline inside one context
//! is the atomic decrement — results are written into pre-sized slots keyed
//! by the child's extraction index, so the manifest this assembles preserves
//! `extractChildren`'s order even though children complete in any order.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use vault_core::{BlobRef, TenantId};
use vault_db::models::EntryType;

/// What one child contributed, once it (and everything beneath it) is fully
/// processed. Carries everything a manifest entry and an `entry` row need.
#[derive(Debug, Clone)]
pub struct ChildResult {
    pub path: String,
    pub blob_ref: BlobRef,
    pub blob_ref_id: i64,
    pub entry_type: EntryType,
    pub mtime_ms: Option<i64>,
    pub format_metadata: Vec<u8>,
}

/// One container's fan-in: a counter plus a concurrent result collector,
/// optionally parented to an enclosing context so completion can bubble up
/// without recursing the call stack (§4.6 "Ordering and concurrency").
pub struct FanInContext {
    remaining: AtomicUsize,
    slots: Mutex<Vec<Option<ChildResult>>>,
    pub parent: Option<Arc<FanInContext>>,
    /// This fan-in's position in `parent`'s slot vector, so completion can
    /// report back without a second lookup.
    pub index_in_parent: usize,
    pub container_ref: BlobRef,
    pub filename: String,
    pub tenant: TenantId,
    pub task_id: i64,
    /// A bonus (detached, STORED-tier) decomposition: failures here must
    /// never fail the primary task, and completion never calls back into
    /// task state (§4.6 point 3, §7).
    pub bonus: bool,
    pub format_key: String,
}

impl FanInContext {
    pub fn new(
        child_count: usize,
        parent: Option<Arc<FanInContext>>,
        index_in_parent: usize,
        container_ref: BlobRef,
        filename: String,
        tenant: TenantId,
        task_id: i64,
        bonus: bool,
        format_key: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicUsize::new(child_count),
            slots: Mutex::new((0..child_count).map(|_| None).collect()),
            parent,
            index_in_parent,
            container_ref,
            filename,
            tenant,
            task_id,
            bonus,
            format_key,
        })
    }

    /// Record child `index`'s result and decrement the outstanding count.
    /// Returns `true` exactly once per `FanInContext`, the instant the last
    /// child lands — that call is the only one that should emit
    /// `AllChildrenComplete`.
    pub fn complete_child(&self, index: usize, result: ChildResult) -> bool {
        {
            let mut slots = self.slots.lock().unwrap();
            slots[index] = Some(result);
        }
        self.remaining.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Only valid to call once [`FanInContext::complete_child`] has
    /// returned `true`: every slot is guaranteed `Some`.
    pub fn take_results(&self) -> Vec<ChildResult> {
        let mut slots = self.slots.lock().unwrap();
        slots
            .drain(..)
            .map(|slot| slot.expect("take_results called before fan-in reached zero"))
            .collect()
    }

    pub fn child_count(&self) -> usize {
        self.slots.lock().unwrap().len()
    }
}
