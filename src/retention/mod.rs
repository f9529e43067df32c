// dbbackup/src/retention/mod.rs
use tracing::info;

use crate::errors::Result;
use crate::storage::ObjectStore;

#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub listed: usize,
    pub deleted: Vec<String>,
}

/// Returns the names to delete so that only the `keep` lexically greatest
/// remain, oldest first.
///
/// Every name takes part in the sort, including names that do not follow the
/// `backup-<db>-<timestamp>` scheme.
pub fn select_expired(mut names: Vec<String>, keep: usize) -> Vec<String> {
    names.sort();
    let excess = names.len().saturating_sub(keep);
    names.truncate(excess);
    names
}

/// Public entry point for the retention sweep.
///
/// Deletes one object at a time in ascending order and stops at the first
/// failure; later objects are left in place.
pub async fn run_cleanup_flow(store: &dyn ObjectStore, keep: usize) -> Result<SweepReport> {
    let names = store.list_names().await?;
    let listed = names.len();
    let expired = select_expired(names, keep);

    if expired.is_empty() {
        info!(listed, keep, "No old backups to delete");
        return Ok(SweepReport {
            listed,
            deleted: Vec::new(),
        });
    }

    info!(listed, keep, expired = expired.len(), "Deleting old backups");
    let mut deleted = Vec::with_capacity(expired.len());
    for name in expired {
        store.delete(&name).await?;
        info!(key = %name, "Deleted old backup");
        deleted.push(name);
    }

    Ok(SweepReport { listed, deleted })
}
