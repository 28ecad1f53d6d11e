//! Configuration assembled from environment variables (and an optional
//! `.env` file for local development), per §6's "Config loading". Every
//! knob has a sensible default so `vault-cli serve` runs against a local
//! Postgres and a `./data` filesystem store with no flags at all.

use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ObjectStoreKind {
    Filesystem,
    S3,
}

#[derive(Parser, Debug, Clone)]
pub struct Config {
    #[arg(long, env = "VAULT_DATABASE_URL", default_value = "postgres://localhost/vault")]
    pub database_url: String,

    #[arg(long, env = "VAULT_OBJECT_STORE_KIND", value_enum, default_value = "filesystem")]
    pub object_store_kind: ObjectStoreKind,

    #[arg(long, env = "VAULT_OBJECT_STORE_ROOT", default_value = "./data/blobs")]
    pub object_store_root: String,

    #[arg(long, env = "VAULT_OBJECT_STORE_BUCKET_PREFIX", default_value = "vault-")]
    pub object_store_bucket_prefix: String,

    #[arg(long, env = "VAULT_OBJECT_STORE_WRITE_ONCE_CHECK", default_value_t = true)]
    pub object_store_write_once_check: bool,

    #[arg(long, env = "VAULT_TASKS_WORKER_COUNT", default_value_t = 4)]
    pub tasks_worker_count: usize,

    #[arg(long, env = "VAULT_TASKS_POLL_INTERVAL_SECS", default_value_t = 2)]
    pub tasks_poll_interval_secs: u64,

    #[arg(long, env = "VAULT_TASKS_CLAIM_LEASE_SECS", default_value_t = 300)]
    pub tasks_claim_lease_secs: i64,

    #[arg(long, env = "VAULT_CLUSTER_NODE_ID", default_value = "vault-node-1")]
    pub cluster_node_id: String,
}
