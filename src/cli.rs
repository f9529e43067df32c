//! Command-line interface definition.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

const LONG_FLAGS: [&str; 5] = ["database", "bucket", "config", "keep", "storage-config"];

#[derive(Parser, Debug)]
#[command(
    name = "dbbackup",
    about = "Dump a MySQL database, compress it with bzip2 and stream it to S3-compatible storage",
    version
)]
pub struct Cli {
    /// Name of the database to back up.
    #[arg(long)]
    pub database: String,

    /// Destination bucket. Falls back to `s3_storage.bucket_name` from the
    /// storage config.
    #[arg(long)]
    pub bucket: Option<String>,

    /// MySQL option file holding the connection credentials, passed to
    /// mysqldump as `--defaults-extra-file`.
    #[arg(long, default_value = "./.my.cnf")]
    pub config: PathBuf,

    /// Number of backups to keep in the bucket; older ones are deleted.
    #[arg(long, default_value_t = 5)]
    pub keep: usize,

    /// JSON file with an `s3_storage` section (endpoint, region, credentials,
    /// folder prefix). Ignored when the file does not exist.
    #[arg(long, default_value = "config.json")]
    pub storage_config: PathBuf,
}

fn single_dash_long(arg: &str) -> Option<String> {
    let rest = arg.strip_prefix('-').filter(|rest| !rest.starts_with('-'))?;
    let name = rest.split_once('=').map_or(rest, |(name, _)| name);
    LONG_FLAGS.contains(&name).then(|| format!("-{}", arg))
}

/// Rewrites `-database shop` and `-keep=3` to their `--` forms so both
/// spellings parse. Arguments after a bare `--` are left alone.
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut normalized = Vec::new();
    let mut literal = false;
    for arg in args.into_iter().map(Into::into) {
        if literal {
            normalized.push(arg);
            continue;
        }
        if arg == "--" {
            literal = true;
        }
        let long = arg.to_str().and_then(single_dash_long);
        match long {
            Some(long) => normalized.push(OsString::from(long)),
            None => normalized.push(arg),
        }
    }
    normalized
}
