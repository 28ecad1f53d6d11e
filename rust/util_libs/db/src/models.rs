//! Row types for the relational index. These mirror `migrations/0001_init.sql`
//! table-for-table; see §3 for the authoritative field list.

use chrono::{DateTime, Utc};
use serde_json::Value;
use vault_core::{BlobRef, ContentHash};

use crate::error::IndexError;

/// Global content registry row, unique on `(hash, leaf_size, container)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRefRecord {
    pub id: i64,
    pub blob_ref: BlobRef,
    pub mime_type: Option<String>,
    pub format_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl BlobRefRecord {
    pub fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, IndexError> {
        use sqlx::Row;
        let hash_bytes: Vec<u8> = row.try_get("hash")?;
        let hash = decode_hash(&hash_bytes)?;
        let leaf_size: i64 = row.try_get("leaf_size")?;
        let container: bool = row.try_get("container")?;
        let blob_ref = BlobRef::new(hash, leaf_size as u64, container)
            .map_err(|e| IndexError::Corrupt(e.to_string()))?;
        Ok(Self {
            id: row.try_get("id")?,
            blob_ref,
            mime_type: row.try_get("mime_type")?,
            format_key: row.try_get("format_key")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Per-tenant ownership row, unique on `(tenant_id, blob_ref_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRecord {
    pub id: i64,
    pub tenant_id: String,
    pub blob_ref_id: i64,
    pub created_at: DateTime<Utc>,
}

impl BlobRecord {
    pub fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, IndexError> {
        use sqlx::Row;
        Ok(Self {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            blob_ref_id: row.try_get("blob_ref_id")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRecord {
    pub id: i64,
    pub blob_id: i64,
    pub entry_count: i32,
    pub created_at: DateTime<Utc>,
}

impl ContainerRecord {
    pub fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, IndexError> {
        use sqlx::Row;
        Ok(Self {
            id: row.try_get("id")?,
            blob_id: row.try_get("blob_id")?,
            entry_count: row.try_get("entry_count")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "entry_type", rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
    Symlink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub id: i64,
    pub container_id: i64,
    pub internal_path: String,
    pub entry_type: EntryType,
    pub blob_ref_id: i64,
    pub mtime_ms: Option<i64>,
    pub metadata: Option<Value>,
}

impl EntryRecord {
    pub fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, IndexError> {
        use sqlx::Row;
        Ok(Self {
            id: row.try_get("id")?,
            container_id: row.try_get("container_id")?,
            internal_path: row.try_get("internal_path")?,
            entry_type: row.try_get("entry_type")?,
            blob_ref_id: row.try_get("blob_ref_id")?,
            mtime_ms: row.try_get("mtime_ms")?,
            metadata: row.try_get("metadata")?,
        })
    }
}

/// A new entry to be inserted, addressed by the blob's content identity
/// rather than a surrogate id — the caller rarely has the latter in hand
/// when assembling a manifest's children.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub internal_path: String,
    pub entry_type: EntryType,
    pub blob_ref: BlobRef,
    pub mtime_ms: Option<i64>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Blocked,
    Background,
    Complete,
    Error,
    Cancelled,
    Dead,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub id: i64,
    pub tenant_id: String,
    pub parent_id: Option<i64>,
    pub task_type: String,
    pub status: TaskStatus,
    pub priority: i32,
    pub input: Value,
    pub output: Option<Value>,
    pub retryable: bool,
    pub retry_count: i32,
    pub executor: Option<String>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, IndexError> {
        use sqlx::Row;
        Ok(Self {
            id: row.try_get("id")?,
            tenant_id: row.try_get("tenant_id")?,
            parent_id: row.try_get("parent_id")?,
            task_type: row.try_get("task_type")?,
            status: row.try_get("status")?,
            priority: row.try_get("priority")?,
            input: row.try_get("input")?,
            output: row.try_get("output")?,
            retryable: row.try_get("retryable")?,
            retry_count: row.try_get("retry_count")?,
            executor: row.try_get("executor")?,
            created_at: row.try_get("created_at")?,
            claimed_at: row.try_get("claimed_at")?,
            completed_at: row.try_get("completed_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

impl NodeRecord {
    pub fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, IndexError> {
        use sqlx::Row;
        Ok(Self {
            id: row.try_get("id")?,
            started_at: row.try_get("started_at")?,
            last_heartbeat: row.try_get("last_heartbeat")?,
        })
    }
}

pub(crate) fn decode_hash(bytes: &[u8]) -> Result<ContentHash, IndexError> {
    let arr: [u8; 16] = bytes
        .try_into()
        .map_err(|_| IndexError::Corrupt(format!("hash column has {} bytes, expected 16", bytes.len())))?;
    Ok(ContentHash::from_bytes(arr))
}
