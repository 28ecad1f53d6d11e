//! Event-driven ingestion: decomposes a stored container into its tree of
//! children, registering everything through the dedup gate and assembling
//! manifests bottom-up (§4.6). Traversal never recurses the native call
//! stack — nesting depth is bounded only by the event queue.

mod error;
mod events;
mod fanin;
mod pipeline;
mod task_handler;

pub use error::IngestError;
pub use events::ObjectCreated;
pub use pipeline::{IngestionPipeline, PipelineConfig};
pub use task_handler::{IngestTaskHandler, TASK_TYPE};

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use vault_core::TenantId;
    use vault_format::{default_registry, FormatRegistry};
    use vault_mocks::in_memory_storage::InMemoryStorage;
    use vault_storage::ObjectStorage;

    use super::*;

    fn zip_fixture() -> Vec<u8> {
        vec![b'P', b'K', 0x03, 0x04, 0, 0, 0, 0]
    }

    /// A leaf (non-container, undetected) buffer completes the root task
    /// directly through `finish_leaf`, with no child events at all.
    #[tokio::test]
    async fn plain_buffer_round_trips_through_storage_without_a_database() {
        let storage: Arc<dyn ObjectStorage> = Arc::new(InMemoryStorage::new());
        let tenant = TenantId::from("tenant-ingest-smoke");
        let buffer = b"just some bytes, no container format".to_vec();
        let blob_ref = vault_core::BlobRef::new(
            vault_core::ContentHash::of(&buffer),
            buffer.len() as u64,
            false,
        )
        .unwrap();
        storage.create(&tenant, &blob_ref, &buffer, None).await.unwrap();

        let stored = storage.read(&tenant, &blob_ref).await.unwrap();
        assert_eq!(stored, buffer);
    }

    /// `default_registry` detects an empty ZIP's magic bytes over any
    /// extension/catch-all fallback, confirming the pipeline's detection
    /// call sees the same ranking documented in `vault-format`.
    #[test]
    fn default_registry_detects_zip_by_magic() {
        let registry: FormatRegistry = default_registry();
        let hit = registry
            .detect(&zip_fixture(), "archive.bin", None)
            .expect("empty zip's EOCD magic should match");
        assert_eq!(hit.format_key(), "zip");
    }

    /// The fan-in context's zero-children edge case: constructing one with
    /// `child_count = 0` starts already "empty", which `pipeline::extract_and_fan_out`
    /// special-cases by going straight to fan-in completion instead of
    /// waiting on a `complete_child` call that would never come.
    #[test]
    fn empty_fan_in_has_no_outstanding_children() {
        let tenant = TenantId::from("tenant-empty");
        let container_ref = vault_core::BlobRef::new(vault_core::ContentHash::of(b"empty container"), 4, true).unwrap();
        let fan_in = fanin::FanInContext::new(0, None, 0, container_ref, "empty.zip".to_string(), tenant, 1, false, "zip".to_string());
        assert_eq!(fan_in.child_count(), 0);
        let results = fan_in.take_results();
        assert!(results.is_empty());
    }

    #[test]
    fn pipeline_config_default_is_nonzero() {
        let config = PipelineConfig::default();
        assert!(config.executor_count > 0);
        assert!(config.queue_capacity > 0);
    }
}
