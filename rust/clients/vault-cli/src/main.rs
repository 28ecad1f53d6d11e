//! `vault-cli`: the one binary Vault ships (§6, AMBIENT J). Scaled down to a
//! single process compared to the teacher's per-service client binaries,
//! since Vault's Non-goals rule out a multi-service topology — but the
//! shape of `main` (dotenv, env_logger, clap, a thin dispatch into
//! per-subcommand functions) is the same.

mod config;
mod error;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use clap::{Parser, Subcommand};
use config::{Config, ObjectStoreKind};
use error::CliError;
use vault_core::{BlobRef, TenantId};
use vault_db::models::TaskStatus;
use vault_db::task::{self, NewTask};
use vault_ingest::{IngestTaskHandler, IngestionPipeline, PipelineConfig};
use vault_rebuild::{RebuildOptions, RebuildTaskHandler};
use vault_scheduler::{TaskTypeRegistry, WorkerPool, WorkerPoolConfig};
use vault_storage::filesystem::FilesystemBackend;
use vault_storage::s3::S3Backend;
use vault_storage::ObjectStorage;

#[derive(Parser)]
#[command(
    version,
    about,
    author,
    long_about = "Command line interface for Vault, a content-addressed storage and knowledge-graph system"
)]
struct Cli {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run migrations and start the worker pool plus the ingestion event
    /// executor, blocking until shutdown.
    Serve,
    /// One-shot ingest of a local file, for operators and tests.
    Ingest {
        tenant: String,
        path: PathBuf,
    },
    /// Reconstruct a previously ingested container back to a file.
    Reconstruct {
        tenant: String,
        blob_ref: String,
        out_path: PathBuf,
    },
    /// Rebuild one tenant's slice of the relational index from object
    /// storage alone.
    Rebuild {
        tenant: String,
        #[arg(long)]
        truncate_first: bool,
    },
}

async fn build_storage(config: &Config) -> Result<Arc<dyn ObjectStorage>, CliError> {
    match config.object_store_kind {
        ObjectStoreKind::Filesystem => Ok(Arc::new(FilesystemBackend::new(
            &config.object_store_root,
            config.object_store_write_once_check,
        ))),
        ObjectStoreKind::S3 => {
            let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest()).load().await;
            let client = aws_sdk_s3::Client::new(&aws_config);
            Ok(Arc::new(S3Backend::new(
                client,
                config.object_store_bucket_prefix.clone(),
                config.object_store_write_once_check,
            )))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve => serve(&cli.config).await,
        Command::Ingest { tenant, path } => ingest(&cli.config, &tenant, &path).await,
        Command::Reconstruct {
            tenant,
            blob_ref,
            out_path,
        } => reconstruct(&cli.config, &tenant, &blob_ref, &out_path).await,
        Command::Rebuild { tenant, truncate_first } => rebuild(&cli.config, &tenant, truncate_first).await,
    };

    if let Err(cli_error) = result {
        let vault_error: vault_core::VaultError = cli_error.into();
        log::error!("retryable={} {vault_error}", vault_error.is_retryable());
        return Err(vault_error.into());
    }
    Ok(())
}

async fn serve(config: &Config) -> Result<(), CliError> {
    let pool = vault_db::connect_and_migrate(&config.database_url).await?;
    let storage = build_storage(config).await?;
    let formats = Arc::new(vault_format::default_registry());

    let pipeline = IngestionPipeline::start(pool.clone(), storage.clone(), formats, PipelineConfig::default());

    let mut registry = TaskTypeRegistry::new();
    registry.register(vault_ingest::TASK_TYPE, Box::new(IngestTaskHandler::new(pipeline)));
    registry.register(
        vault_rebuild::TASK_TYPE,
        Box::new(RebuildTaskHandler::new(pool.clone(), storage.clone())),
    );

    let worker_pool = WorkerPool::start(
        pool,
        Arc::new(registry),
        WorkerPoolConfig {
            node_id: config.cluster_node_id.clone(),
            worker_count: config.tasks_worker_count,
            poll_interval: StdDuration::from_secs(config.tasks_poll_interval_secs),
            claim_lease: chrono::Duration::seconds(config.tasks_claim_lease_secs),
            database_url: config.database_url.clone(),
        },
    );

    log::info!("vault-cli serving as node {}", config.cluster_node_id);
    worker_pool.run().await?;
    Ok(())
}

/// Stores the file as the root blob, submits a `vault.ingest` task, then
/// drives that one task's own pipeline and worker loop inline — a one-shot
/// process has no separately running `serve` to hand the background task
/// off to.
async fn ingest(config: &Config, tenant_id: &str, path: &PathBuf) -> Result<(), CliError> {
    let pool = vault_db::connect_and_migrate(&config.database_url).await?;
    let storage = build_storage(config).await?;
    let formats = Arc::new(vault_format::default_registry());
    let tenant = TenantId::from(tenant_id);

    let bytes = std::fs::read(path)?;
    let blob_ref = BlobRef::new(vault_core::ContentHash::of(&bytes), bytes.len() as u64, false)
        .map_err(|e| CliError::InvalidBlobRef(e.to_string()))?;
    if !storage.exists(&tenant, &blob_ref).await? {
        storage.create(&tenant, &blob_ref, &bytes, None).await?;
    }

    let submitted = task::submit(
        &pool,
        NewTask {
            tenant_id: tenant.as_str(),
            parent_id: None,
            task_type: vault_ingest::TASK_TYPE,
            priority: 0,
            input: serde_json::json!({ "storageKey": blob_ref.storage_key() }),
            resources: vec![],
        },
    )
    .await?;

    // `submit_root_ingest` expects the task already parked in BACKGROUND —
    // normally `IngestTaskHandler::on_start`'s job — since the pipeline may
    // complete it before this function would otherwise get around to it.
    task::mark_background(&pool, submitted.id, chrono::Utc::now() + chrono::Duration::minutes(30)).await?;
    let pipeline = IngestionPipeline::start(pool.clone(), storage.clone(), formats, PipelineConfig::default());
    pipeline
        .submit_root_ingest(submitted.id, tenant, &blob_ref.storage_key())
        .await
        .map_err(|e| CliError::InvalidBlobRef(e.to_string()))?;

    loop {
        tokio::time::sleep(StdDuration::from_millis(200)).await;
        let current = task::find(&pool, submitted.id).await?.expect("task just submitted");
        match current.status {
            TaskStatus::Complete => {
                println!("ingested as {}", blob_ref.storage_key());
                return Ok(());
            }
            TaskStatus::Dead | TaskStatus::Error => {
                log::error!("ingest task {} ended in {:?}: {:?}", submitted.id, current.status, current.output);
                return Ok(());
            }
            _ => continue,
        }
    }
}

async fn reconstruct(config: &Config, tenant_id: &str, blob_ref: &str, out_path: &PathBuf) -> Result<(), CliError> {
    let storage = build_storage(config).await?;
    let formats = vault_format::default_registry();
    let tenant = TenantId::from(tenant_id);
    let container_ref =
        BlobRef::parse(blob_ref).ok_or_else(|| CliError::InvalidBlobRef(blob_ref.to_string()))?;

    let bytes = vault_reconstruct::reconstruct(storage.as_ref(), &formats, &tenant, &container_ref).await?;
    std::fs::write(out_path, bytes)?;
    println!("reconstructed to {}", out_path.display());
    Ok(())
}

async fn rebuild(config: &Config, tenant_id: &str, truncate_first: bool) -> Result<(), CliError> {
    let pool = vault_db::connect_and_migrate(&config.database_url).await?;
    let storage = build_storage(config).await?;
    let tenant = TenantId::from(tenant_id);

    let summary = vault_rebuild::rebuild_tenant(&pool, storage.as_ref(), &tenant, RebuildOptions { truncate_first }).await?;
    println!("rebuilt {} containers, {} entries", summary.containers, summary.entries);
    Ok(())
}
