use std::path::PathBuf;

use tracing::debug;
use which::which;

use crate::errors::{AppError, Result};

pub const DUMP_EXECUTABLE: &str = "mysqldump";
pub const COMPRESS_EXECUTABLE: &str = "bzip2";

/// Finds an executable in the system PATH.
///
/// On Windows the lookup honours `PATHEXT`, so `bzip2` resolves to `bzip2.exe`.
pub fn find_executable(name: &str) -> Result<PathBuf> {
    let path = which(name).map_err(|source| AppError::ExecutableNotFound {
        name: name.to_string(),
        source,
    })?;
    debug!(executable = name, path = %path.display(), "Resolved executable");
    Ok(path)
}

/// Resolved paths of the external programs the backup pipeline spawns.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub dump: PathBuf,
    pub compress: PathBuf,
}

impl Toolchain {
    /// Resolves `mysqldump` and `bzip2`, failing on the first one missing.
    pub fn locate() -> Result<Self> {
        Ok(Toolchain {
            dump: find_executable(DUMP_EXECUTABLE)?,
            compress: find_executable(COMPRESS_EXECUTABLE)?,
        })
    }
}
