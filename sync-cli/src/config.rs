//! Configuration file resolution for the tablesync CLI.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tablesync_client::SyncConfig;

/// Load the configuration.
///
/// An explicit path must exist. Without one, the default location is used
/// if a file is there, otherwise built-in defaults apply.
pub fn load(explicit: Option<&Path>) -> Result<SyncConfig> {
    if let Some(path) = explicit {
        return SyncConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()));
    }

    match default_path() {
        Some(path) if path.exists() => {
            tracing::debug!("Using config {}", path.display());
            SyncConfig::from_file(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))
        }
        _ => Ok(SyncConfig::default()),
    }
}

/// Default config file location for tablesync.
fn default_path() -> Option<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "smarttableindicator", "tablesync")?;
    Some(dirs.config_dir().join("tablesync.toml"))
}
