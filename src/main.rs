//! Scheduled MySQL backup tool
//!
//! Dumps one database with mysqldump, compresses it with bzip2, streams the
//! result into S3-compatible storage and prunes old backups.

// dbbackup/src/main.rs
mod backup;
mod cli;
mod config;
mod errors;
mod retention;
mod storage;
mod utils;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use cli::Cli;
use config::{BackupRequest, StorageConfig};
use std::process::ExitCode;
use storage::S3Store;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use utils::Toolchain;

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse_from(cli::normalize_args(std::env::args_os()));
    match run_app(cli).await {
        Ok(_) => {
            info!("Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

async fn run_app(cli: Cli) -> Result<()> {
    let storage = StorageConfig::load_from_json(&cli.storage_config).with_context(|| {
        format!(
            "Failed to load storage configuration from {}",
            cli.storage_config.display()
        )
    })?;

    let request = BackupRequest::new(cli.database, cli.config, cli.bucket, cli.keep, &storage)
        .context("Invalid backup request")?;

    let toolchain = Toolchain::locate().context("Required backup tools are missing")?;
    info!(
        dump = %toolchain.dump.display(),
        compress = %toolchain.compress.display(),
        "Located backup tools"
    );

    let name = backup::backup_object_name(&request.database, &Local::now());
    let key = backup::object_key(request.folder_prefix.as_deref(), &name);

    // Each phase gets its own client.
    let store = S3Store::connect(&storage, &request.bucket, request.folder_prefix.as_deref()).await;
    let report = backup::run_backup_flow(&store, &toolchain, &request, &key)
        .await
        .context("Backup process failed")?;
    info!(key = %report.key, size_bytes = report.size_bytes, "Backup uploaded");
    drop(store);

    let store = S3Store::connect(&storage, &request.bucket, request.folder_prefix.as_deref()).await;
    let sweep = retention::run_cleanup_flow(&store, request.keep)
        .await
        .context("Failed to clean up old backups")?;
    info!(
        listed = sweep.listed,
        deleted = sweep.deleted.len(),
        keep = request.keep,
        "Retention sweep finished"
    );

    Ok(())
}
