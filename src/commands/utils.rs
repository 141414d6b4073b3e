use anyhow::Result;
use std::path::PathBuf;

use crate::execution::paths::LOG_FILE;

pub fn ensure_root() -> Result<()> {
    if let sudo::RunningAs::User = sudo::check() {
        sudo::with_env(&["RUST_BACKTRACE", "RUST_LOG", "XDG_CONFIG_HOME"])
            .map_err(|e| anyhow::anyhow!("Failed to escalate privileges: {}", e))?;
    }
    Ok(())
}

pub fn running_as_root() -> bool {
    matches!(sudo::check(), sudo::RunningAs::Root)
}

/// Install log for a run: the explicit path, else the system log when root.
/// Dry runs never log to a file.
pub fn log_file_for(explicit: Option<PathBuf>, dry_run: bool, root: bool) -> Option<PathBuf> {
    if dry_run {
        return None;
    }
    explicit.or_else(|| root.then(|| PathBuf::from(LOG_FILE)))
}
