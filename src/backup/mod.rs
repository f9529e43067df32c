pub(crate) mod db_dump;
pub(crate) mod pipeline;

use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::BackupRequest;
use crate::errors::Result;
use crate::storage::ObjectStore;
use crate::utils::Toolchain;

/// Object names sort chronologically because of this fixed-width stamp.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Debug, Clone)]
pub struct BackupReport {
    pub key: String,
    pub size_bytes: u64,
}

/// `backup-<database>-<YYYYMMDD-HHMMSS>.sql.bz2`
pub fn backup_object_name<Tz>(database: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    format!("backup-{}-{}.sql.bz2", database, at.format(TIMESTAMP_FORMAT))
}

pub fn object_key(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}/{}", prefix, name),
        None => name.to_string(),
    }
}

/// Public entry point for the backup process: dumps `request.database` with
/// the located tools and streams it to `key` in `store`.
pub async fn run_backup_flow(
    store: &dyn ObjectStore,
    toolchain: &Toolchain,
    request: &BackupRequest,
    key: &str,
) -> Result<BackupReport> {
    info!(
        database = %request.database,
        bucket = %request.bucket,
        key = key,
        "Starting backup"
    );
    upload_backup(
        store,
        key,
        db_dump::dump_command(toolchain, request),
        db_dump::compress_command(toolchain),
    )
    .await
}

/// Opens the upload, runs the pipeline into it, then completes the upload on
/// success. Any failure, including a failed completion, aborts the upload.
pub(crate) async fn upload_backup(
    store: &dyn ObjectStore,
    key: &str,
    dump: Command,
    compress: Command,
) -> Result<BackupReport> {
    let mut writer = store.open_writer(key).await?;

    let outcome = match pipeline::stream_pipeline(dump, compress, writer.as_mut()).await {
        Ok(_) => writer.finish().await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(size_bytes) => Ok(BackupReport {
            key: key.to_string(),
            size_bytes,
        }),
        Err(e) => {
            if let Err(abort_err) = writer.abort().await {
                warn!(key = key, error = %abort_err, "Failed to abort upload");
            }
            Err(e)
        }
    }
}
