//! The event-driven ingestion pipeline (§4.6): traversal, fan-in
//! synchronization, the dedup gate, and manifest assembly. No function here
//! recurses into a nested container on the native call stack — recursion is
//! always a new [`crate::events::Event`] placed on the queue.

use std::sync::Arc;

use serde_json::json;
use sqlx::PgPool;
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};

use vault_core::{BlobRef, ContentHash, TenantId};
use vault_db::blob_registry::{self, DedupOutcome};
use vault_db::container as container_repo;
use vault_db::models::{EntryType, NewEntry};
use vault_db::task;
use vault_format::{ContainerChild, EntryKind, FormatRegistry, Handler, ReconstructionTier};
use vault_manifest::{Manifest, ManifestEntry, ManifestEntryType};
use vault_scheduler::{notify, TaskError};
use vault_storage::ObjectStorage;

use crate::error::IngestError;
use crate::events::{AllChildrenComplete, ChildDiscovered, Event, IngestFile, ObjectCreated};
use crate::fanin::{ChildResult, FanInContext};

/// Retry ceiling applied to a root ingest task's own failures. This
/// mirrors the scheduler's worker-pool default (§4.4) because the pipeline,
/// not a worker, is the "external actor" completing a BACKGROUND task and
/// must reproduce the same bookkeeping the scheduler would otherwise do.
const MAX_RETRIES: i32 = 5;

/// A single byte used to derive a degenerate, shared "empty content"
/// `BlobRef`: directory entries and zero-length files still need *a* blob
/// pointer per §3's `EntryRecord` invariant, but `BlobRef` legally rejects
/// size zero. Every tenant lazily registers this marker once; after that
/// it behaves like any other already-stored leaf (§9 open question: the
/// spec is silent on zero-length content, this is the documented policy).
fn empty_content_marker() -> BlobRef {
    BlobRef::new(ContentHash::of(&[0u8]), 1, false).expect("marker blob ref is always valid")
}

struct PipelineContext {
    pool: PgPool,
    storage: Arc<dyn ObjectStorage>,
    formats: Arc<FormatRegistry>,
    tx: mpsc::Sender<Event>,
    created_tx: broadcast::Sender<ObjectCreated>,
}

pub struct PipelineConfig {
    pub queue_capacity: usize,
    pub executor_count: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            executor_count: 4,
        }
    }
}

/// Owns the event queue and the fixed pool of executor tasks draining it
/// (§5 "Scheduling model": ingestion handlers run on the event executor,
/// distinct from the task-scheduler's worker threads).
pub struct IngestionPipeline {
    ctx: Arc<PipelineContext>,
}

impl IngestionPipeline {
    pub fn start(
        pool: PgPool,
        storage: Arc<dyn ObjectStorage>,
        formats: Arc<FormatRegistry>,
        config: PipelineConfig,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let (created_tx, _) = broadcast::channel(256);
        let ctx = Arc::new(PipelineContext {
            pool,
            storage,
            formats,
            tx,
            created_tx,
        });

        let shared_rx = Arc::new(AsyncMutex::new(rx));
        for worker_index in 0..config.executor_count {
            let ctx = ctx.clone();
            let shared_rx = shared_rx.clone();
            tokio::spawn(async move {
                loop {
                    let event = {
                        let mut rx = shared_rx.lock().await;
                        rx.recv().await
                    };
                    match event {
                        Some(event) => process_event(&ctx, event).await,
                        None => {
                            log::debug!("ingest event executor {worker_index} exiting: queue closed");
                            break;
                        }
                    }
                }
            });
        }

        Arc::new(Self { ctx })
    }

    /// Observers (indexing/search) can subscribe to advisory object-created
    /// notices; the pipeline itself never reads this back.
    pub fn subscribe_object_created(&self) -> broadcast::Receiver<ObjectCreated> {
        self.ctx.created_tx.subscribe()
    }

    /// Kick off ingestion of an already-stored root blob (§4.6, §6: task
    /// input is `{ "storageKey": "<BlobRef>" }`). The caller — normally the
    /// `IngestTaskHandler` — is expected to have already put `task_id` into
    /// BACKGROUND; this pipeline is the external actor that will complete or
    /// fail it once the event graph bottoms out.
    pub async fn submit_root_ingest(
        &self,
        task_id: i64,
        tenant: TenantId,
        storage_key: &str,
    ) -> Result<(), IngestError> {
        let blob_ref = BlobRef::parse(storage_key)
            .ok_or_else(|| IngestError::Format(format!("not a valid BlobRef: {storage_key}")))?;
        let buffer = self.ctx.storage.read(&tenant, &blob_ref).await?;

        self.ctx
            .tx
            .send(Event::IngestFile(IngestFile {
                task_id,
                tenant,
                buffer,
                filename: storage_key.to_string(),
                parent_fan_in: None,
                index_in_parent: 0,
                bonus: false,
            }))
            .await
            .map_err(|_| IngestError::Index("ingest event queue closed".to_string()))
    }
}

async fn process_event(ctx: &Arc<PipelineContext>, event: Event) {
    match event {
        Event::IngestFile(ev) => {
            let task_id = ev.task_id;
            let bonus = ev.bonus;
            if let Err(e) = handle_ingest_file(ctx, ev).await {
                handle_failure(ctx, task_id, bonus, e).await;
            }
        }
        Event::ChildDiscovered(ev) => {
            let task_id = ev.fan_in.task_id;
            let bonus = ev.fan_in.bonus;
            if let Err(e) = handle_child_discovered(ctx, ev).await {
                handle_failure(ctx, task_id, bonus, e).await;
            }
        }
        Event::AllChildrenComplete(ev) => {
            let task_id = ev.fan_in.task_id;
            let bonus = ev.fan_in.bonus;
            if let Err(e) = finish_fan_in(ctx, ev.fan_in).await {
                handle_failure(ctx, task_id, bonus, e).await;
            }
        }
    }
}

/// §7's propagation policy, applied from outside the normal worker dispatch
/// loop since the pipeline completes BACKGROUND tasks itself. Bonus-ingest
/// failures are swallowed per §4.6 point 3 / §7: they must never fail the
/// task that already succeeded in storing the primary content.
async fn handle_failure(ctx: &Arc<PipelineContext>, task_id: i64, bonus: bool, err: IngestError) {
    log::error!("ingest pipeline error on task {task_id} (bonus={bonus}): {err}");
    if bonus {
        return;
    }
    let task_error = TaskError::new(err.to_string(), err.is_retryable());
    match task::fail(&ctx.pool, task_id, task_error.to_json(), task_error.retryable, MAX_RETRIES).await {
        Ok(vault_db::models::TaskStatus::Open) => {
            if let Err(e) = notify::notify_task_available(&ctx.pool).await {
                log::warn!("failed to notify task_available after retry: {e}");
            }
        }
        Ok(_) => {
            if let Err(e) = notify::notify_task_completed(&ctx.pool, task_id).await {
                log::warn!("failed to notify task_completed after dead: {e}");
            }
        }
        Err(e) => log::error!("failed to record task {task_id} failure: {e}"),
    }
}

async fn handle_ingest_file(ctx: &Arc<PipelineContext>, ev: IngestFile) -> Result<(), IngestError> {
    let hit = ctx.formats.detect(&ev.buffer, &ev.filename, None);
    let Some(factory) = hit else {
        return finish_leaf(ctx, ev, None).await;
    };
    let format_key = factory.format_key().to_string();
    let handler = factory.create();

    if !handler.has_children() {
        return finish_leaf(ctx, ev, Some(format_key)).await;
    }

    let tier = handler.capabilities().and_then(|c| c.reconstruction_tier.0);
    match tier {
        Some(ReconstructionTier::Reconstructable) => extract_and_fan_out(ctx, handler.as_ref(), format_key, ev).await,
        // CONTENTS_ONLY is not reconstructable either; Vault indexes it the
        // same best-effort way it indexes a STORED container (§9 open
        // question — the spec's traversal algorithm only names the first
        // two tiers explicitly).
        Some(ReconstructionTier::Stored) | Some(ReconstructionTier::ContentsOnly) if !ev.bonus => {
            store_leaf_then_bonus_decompose(ctx, format_key, ev).await
        }
        // The bonus pass: decompose the same bytes for indexing only.
        Some(ReconstructionTier::Stored) | Some(ReconstructionTier::ContentsOnly) => {
            extract_and_fan_out(ctx, handler.as_ref(), format_key, ev).await
        }
        None => {
            log::warn!("handler `{format_key}` declares children but no capabilities; storing as opaque leaf");
            finish_leaf(ctx, ev, Some(format_key)).await
        }
    }
}

async fn finish_leaf(ctx: &Arc<PipelineContext>, ev: IngestFile, format_key: Option<String>) -> Result<(), IngestError> {
    let blob_ref = leaf_blob_ref(&ev.buffer)?;
    let already_in_storage = ev.parent_fan_in.is_none() && !ev.bonus;
    let outcome = ensure_stored(ctx, &ev.tenant, &blob_ref, &ev.buffer, format_key.as_deref(), already_in_storage).await?;

    complete_or_bubble(
        ctx,
        &ev,
        ChildResult {
            path: ev.filename.clone(),
            blob_ref,
            blob_ref_id: outcome.blob_ref_id,
            entry_type: EntryType::File,
            mtime_ms: None,
            format_metadata: Vec::new(),
        },
    )
    .await
}

/// §4.6 point 3 / root-level STORED containers (§9 open question, resolved
/// the same way whether this buffer is the task's root or a child): store
/// the whole container as a leaf (never as a container blob), register it
/// with the parent fan-in (or complete the root task), then fire a
/// detached bonus ingest that decomposes the same buffer anew purely for
/// indexing.
async fn store_leaf_then_bonus_decompose(
    ctx: &Arc<PipelineContext>,
    format_key: String,
    ev: IngestFile,
) -> Result<(), IngestError> {
    let blob_ref = leaf_blob_ref(&ev.buffer)?;
    let already_in_storage = ev.parent_fan_in.is_none();
    let outcome = ensure_stored(ctx, &ev.tenant, &blob_ref, &ev.buffer, Some(&format_key), already_in_storage).await?;

    let bonus_event = Event::IngestFile(IngestFile {
        task_id: ev.task_id,
        tenant: ev.tenant.clone(),
        buffer: ev.buffer.clone(),
        filename: ev.filename.clone(),
        parent_fan_in: None,
        index_in_parent: 0,
        bonus: true,
    });
    if ctx.tx.send(bonus_event).await.is_err() {
        log::warn!("ingest event queue closed; skipping bonus decomposition of {}", ev.filename);
    }

    complete_or_bubble(
        ctx,
        &ev,
        ChildResult {
            path: ev.filename.clone(),
            blob_ref,
            blob_ref_id: outcome.blob_ref_id,
            entry_type: EntryType::File,
            mtime_ms: None,
            format_metadata: Vec::new(),
        },
    )
    .await
}

async fn extract_and_fan_out(
    ctx: &Arc<PipelineContext>,
    handler: &dyn Handler,
    format_key: String,
    ev: IngestFile,
) -> Result<(), IngestError> {
    let children = handler.extract_children(&ev.buffer)?;
    let container_ref = container_blob_ref(&ev.buffer)?;

    let fan_in = FanInContext::new(
        children.len(),
        ev.parent_fan_in,
        ev.index_in_parent,
        container_ref,
        ev.filename,
        ev.tenant,
        ev.task_id,
        ev.bonus,
        format_key,
    );

    if children.is_empty() {
        return finish_fan_in(ctx, fan_in).await;
    }

    for (index, child) in children.into_iter().enumerate() {
        let event = Event::ChildDiscovered(ChildDiscovered {
            child,
            index,
            fan_in: fan_in.clone(),
        });
        if ctx.tx.send(event).await.is_err() {
            return Err(IngestError::Index("ingest event queue closed".to_string()));
        }
    }
    Ok(())
}

async fn handle_child_discovered(ctx: &Arc<PipelineContext>, ev: ChildDiscovered) -> Result<(), IngestError> {
    let ChildDiscovered { child, index, fan_in } = ev;

    // §4.6 point 1, broadened: any zero-length child (not just directories
    // implied by a trailing `/`) needs the shared marker blob, since a real
    // `BlobRef` cannot have size zero.
    if child.content.is_empty() {
        let marker = empty_content_marker();
        let outcome = ensure_stored(ctx, &fan_in.tenant, &marker, &[0u8], None, false).await?;
        let entry_type = if child.path.ends_with('/') {
            EntryType::Directory
        } else {
            entry_type_of(child.kind)
        };
        return finish_one_child(
            ctx,
            fan_in,
            index,
            ChildResult {
                path: child.path,
                blob_ref: marker,
                blob_ref_id: outcome.blob_ref_id,
                entry_type,
                mtime_ms: child.metadata.mtime_ms,
                format_metadata: child.format_metadata,
            },
        )
        .await;
    }

    let hit = ctx.formats.detect(&child.content, &child.path, None);
    let resolved = hit.map(|f| (f.create(), f.format_key().to_string()));
    let is_container = resolved.as_ref().map(|(h, _)| h.has_children()).unwrap_or(false);

    if !is_container {
        return finish_leaf_child(ctx, fan_in, index, child, resolved.map(|(_, k)| k)).await;
    }

    let (handler, format_key) = resolved.expect("is_container implies a resolved handler");
    let tier = handler.capabilities().and_then(|c| c.reconstruction_tier.0);
    match tier {
        Some(ReconstructionTier::Reconstructable) | None => {
            // Point 4: recursion is a new `IngestFile` event, not a deeper
            // call stack.
            let event = Event::IngestFile(IngestFile {
                task_id: fan_in.task_id,
                tenant: fan_in.tenant.clone(),
                buffer: child.content,
                filename: child.path,
                parent_fan_in: Some(fan_in),
                index_in_parent: index,
                bonus: false,
            });
            ctx.tx
                .send(event)
                .await
                .map_err(|_| IngestError::Index("ingest event queue closed".to_string()))
        }
        Some(ReconstructionTier::Stored) | Some(ReconstructionTier::ContentsOnly) => {
            // Point 5: store the child's envelope as a leaf now, decrement
            // this fan-in, and fire a detached bonus decomposition.
            store_child_leaf_then_bonus(ctx, fan_in, index, child, format_key).await
        }
    }
}

async fn finish_leaf_child(
    ctx: &Arc<PipelineContext>,
    fan_in: Arc<FanInContext>,
    index: usize,
    child: ContainerChild,
    format_key: Option<String>,
) -> Result<(), IngestError> {
    let blob_ref = leaf_blob_ref(&child.content)?;
    let outcome = ensure_stored(ctx, &fan_in.tenant, &blob_ref, &child.content, format_key.as_deref(), false).await?;
    finish_one_child(
        ctx,
        fan_in,
        index,
        ChildResult {
            path: child.path,
            blob_ref,
            blob_ref_id: outcome.blob_ref_id,
            entry_type: entry_type_of(child.kind),
            mtime_ms: child.metadata.mtime_ms,
            format_metadata: child.format_metadata,
        },
    )
    .await
}

async fn store_child_leaf_then_bonus(
    ctx: &Arc<PipelineContext>,
    fan_in: Arc<FanInContext>,
    index: usize,
    child: ContainerChild,
    format_key: String,
) -> Result<(), IngestError> {
    let blob_ref = leaf_blob_ref(&child.content)?;
    let outcome = ensure_stored(ctx, &fan_in.tenant, &blob_ref, &child.content, Some(&format_key), false).await?;

    let bonus_event = Event::IngestFile(IngestFile {
        task_id: fan_in.task_id,
        tenant: fan_in.tenant.clone(),
        buffer: child.content.clone(),
        filename: child.path.clone(),
        parent_fan_in: None,
        index_in_parent: 0,
        bonus: true,
    });
    if ctx.tx.send(bonus_event).await.is_err() {
        log::warn!("ingest event queue closed; skipping bonus decomposition of {}", child.path);
    }

    finish_one_child(
        ctx,
        fan_in,
        index,
        ChildResult {
            path: child.path,
            blob_ref,
            blob_ref_id: outcome.blob_ref_id,
            entry_type: entry_type_of(child.kind),
            mtime_ms: child.metadata.mtime_ms,
            format_metadata: child.format_metadata,
        },
    )
    .await
}

/// Record one child's result against its fan-in; when it was the last one
/// outstanding, enqueue `AllChildrenComplete`.
async fn finish_one_child(
    ctx: &Arc<PipelineContext>,
    fan_in: Arc<FanInContext>,
    index: usize,
    result: ChildResult,
) -> Result<(), IngestError> {
    if fan_in.complete_child(index, result) {
        ctx.tx
            .send(Event::AllChildrenComplete(AllChildrenComplete { fan_in }))
            .await
            .map_err(|_| IngestError::Index("ingest event queue closed".to_string()))?;
    }
    Ok(())
}

/// A root-level buffer (no parent fan-in) that turned out to be a leaf, or
/// a STORED container's envelope/bonus result, reports back the same way:
/// push into the parent fan-in if there is one, otherwise this was the
/// root and the owning task is done.
async fn complete_or_bubble(ctx: &Arc<PipelineContext>, ev: &IngestFile, result: ChildResult) -> Result<(), IngestError> {
    match &ev.parent_fan_in {
        Some(parent) => finish_one_child(ctx, parent.clone(), ev.index_in_parent, result).await,
        None if ev.bonus => Ok(()),
        None => complete_root_task(ctx, ev.task_id, &result.blob_ref).await,
    }
}

async fn complete_root_task(ctx: &Arc<PipelineContext>, task_id: i64, blob_ref: &BlobRef) -> Result<(), IngestError> {
    let output = json!({ "blobRef": blob_ref.to_string() });
    task::complete(&ctx.pool, task_id, output).await?;
    notify::notify_task_completed(&ctx.pool, task_id).await.ok();
    notify::notify_task_available(&ctx.pool).await.ok();
    Ok(())
}

/// Fan-in completion (§4.6): assemble the manifest in extraction order,
/// register and (if new) persist it, upsert the `container`/`entry` rows,
/// then report up the tree or complete the root task.
async fn finish_fan_in(ctx: &Arc<PipelineContext>, fan_in: Arc<FanInContext>) -> Result<(), IngestError> {
    let results = fan_in.take_results();

    let entries: Vec<ManifestEntry> = results
        .iter()
        .map(|r| ManifestEntry {
            path: r.path.clone(),
            hash: *r.blob_ref.hash().as_bytes(),
            leaf_size: r.blob_ref.leaf_size(),
            is_container: r.blob_ref.is_container(),
            entry_type: manifest_entry_type_of(r.entry_type),
            mtime_ms: r.mtime_ms,
            format_metadata: r.format_metadata.clone(),
        })
        .collect();
    let manifest = Manifest::build(fan_in.container_ref, fan_in.format_key.clone(), None, entries);

    let outcome = blob_registry::register_blob(
        &ctx.pool,
        fan_in.tenant.as_str(),
        &fan_in.container_ref,
        Some("application/vnd.vault.manifest"),
        Some(&fan_in.format_key),
    )
    .await?;
    if outcome.content_is_new {
        vault_manifest::store(ctx.storage.as_ref(), &fan_in.tenant, &manifest).await?;
    }
    broadcast_created(ctx, &fan_in.tenant, &fan_in.container_ref, outcome.blob_id, Some("application/vnd.vault.manifest"));

    let entry_rows: Vec<(NewEntry, i64)> = results
        .into_iter()
        .map(|r| {
            (
                NewEntry {
                    internal_path: r.path,
                    entry_type: r.entry_type,
                    blob_ref: r.blob_ref,
                    mtime_ms: r.mtime_ms,
                    metadata: None,
                },
                r.blob_ref_id,
            )
        })
        .collect();
    container_repo::insert_container(&ctx.pool, outcome.blob_id, &entry_rows).await?;

    match fan_in.parent.clone() {
        Some(parent) => {
            let index = fan_in.index_in_parent;
            let result = ChildResult {
                path: fan_in.filename.clone(),
                blob_ref: fan_in.container_ref,
                blob_ref_id: outcome.blob_ref_id,
                entry_type: EntryType::File,
                mtime_ms: None,
                format_metadata: Vec::new(),
            };
            finish_one_child(ctx, parent, index, result).await
        }
        None if fan_in.bonus => {
            log::debug!("bonus index of {} complete ({} entries)", fan_in.container_ref, fan_in.child_count());
            Ok(())
        }
        None => complete_root_task(ctx, fan_in.task_id, &fan_in.container_ref).await,
    }
}

async fn ensure_stored(
    ctx: &Arc<PipelineContext>,
    tenant: &TenantId,
    blob_ref: &BlobRef,
    bytes: &[u8],
    format_key: Option<&str>,
    already_in_storage: bool,
) -> Result<DedupOutcome, IngestError> {
    let outcome = blob_registry::register_blob(&ctx.pool, tenant.as_str(), blob_ref, None, format_key).await?;
    if outcome.needs_storage_write() && !already_in_storage {
        ctx.storage.create(tenant, blob_ref, bytes, format_key).await?;
    }
    broadcast_created(ctx, tenant, blob_ref, outcome.blob_id, format_key);
    Ok(outcome)
}

fn broadcast_created(ctx: &Arc<PipelineContext>, tenant: &TenantId, blob_ref: &BlobRef, blob_id: i64, mime_type: Option<&str>) {
    let _ = ctx.created_tx.send(ObjectCreated {
        tenant: tenant.clone(),
        blob_ref: *blob_ref,
        blob_id,
        mime_type: mime_type.map(|s| s.to_string()),
    });
}

/// A leaf's `BlobRef`. Zero-length content maps to the shared
/// [`empty_content_marker`] instead of a real hash — a literal empty-bytes
/// `BlobRef` cannot exist (§3: `leafSize > 0`), so this is the one escape
/// hatch, applied uniformly rather than faked per call site.
fn leaf_blob_ref(bytes: &[u8]) -> Result<BlobRef, IngestError> {
    if bytes.is_empty() {
        return Ok(empty_content_marker());
    }
    BlobRef::new(ContentHash::of(bytes), bytes.len() as u64, false)
        .map_err(|e| IngestError::Format(e.to_string()))
}

/// A container's own `BlobRef`. Containers are never zero bytes in
/// practice (a format handler that detects on an empty buffer would have
/// nothing to extract), so this surfaces `ZeroSizeBlob` as a real error
/// rather than silently substituting the marker.
fn container_blob_ref(bytes: &[u8]) -> Result<BlobRef, IngestError> {
    BlobRef::new(ContentHash::of(bytes), bytes.len() as u64, true)
        .map_err(|e| IngestError::Format(e.to_string()))
}

fn entry_type_of(kind: EntryKind) -> EntryType {
    match kind {
        EntryKind::File => EntryType::File,
        EntryKind::Directory => EntryType::Directory,
        EntryKind::Symlink => EntryType::Symlink,
    }
}

fn manifest_entry_type_of(entry_type: EntryType) -> ManifestEntryType {
    match entry_type {
        EntryType::File => ManifestEntryType::File,
        EntryType::Directory => ManifestEntryType::Directory,
        EntryType::Symlink => ManifestEntryType::Symlink,
    }
}
