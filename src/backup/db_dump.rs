// dbbackup/src/backup/db_dump.rs
use std::ffi::OsString;

use tokio::process::Command;

use crate::config::BackupRequest;
use crate::utils::Toolchain;

/// Ceiling for a single row/packet in the dump output.
pub const MAX_ALLOWED_PACKET: &str = "32M";

/// Arguments passed to mysqldump.
///
/// `--defaults-extra-file` has to come first or mysqldump ignores it.
pub fn dump_args(request: &BackupRequest) -> Vec<OsString> {
    let mut defaults_file = OsString::from("--defaults-extra-file=");
    defaults_file.push(request.credentials_file.as_os_str());

    vec![
        defaults_file,
        "--opt".into(),
        "--complete-insert".into(), // column names in every INSERT
        "--single-transaction".into(), // consistent InnoDB snapshot without locking
        format!("--max_allowed_packet={}", MAX_ALLOWED_PACKET).into(),
        "--databases".into(),
        request.database.clone().into(),
    ]
}

pub fn dump_command(toolchain: &Toolchain, request: &BackupRequest) -> Command {
    let mut cmd = Command::new(&toolchain.dump);
    cmd.args(dump_args(request));
    cmd
}

/// bzip2 at its highest compression level, filtering stdin to stdout.
pub fn compress_command(toolchain: &Toolchain) -> Command {
    let mut cmd = Command::new(&toolchain.compress);
    cmd.arg("-9");
    cmd
}
