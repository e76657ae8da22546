//! XDG and platform directory lookups.

use crate::error::ApiError;
use std::path::PathBuf;

/// Get XDG config home directory
///
/// Returns `$XDG_CONFIG_HOME` if set, otherwise defaults to `$HOME/.config`
pub fn config_home() -> Option<PathBuf> {
    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        if !xdg_config_home.is_empty() {
            return Some(PathBuf::from(xdg_config_home));
        }
    }

    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config"))
}

/// `$XDG_CONFIG_HOME/dedupfs/config.toml`
pub fn global_config_path() -> Option<PathBuf> {
    config_home().map(|dir| dir.join("dedupfs").join("config.toml"))
}

fn project_dirs() -> Result<directories::ProjectDirs, ApiError> {
    directories::ProjectDirs::from("", "dedupfs", "dedupfs").ok_or_else(|| {
        ApiError::ConfigError("Could not determine platform directories (HOME not set)".to_string())
    })
}

/// Store root used when none is configured: `<platform data dir>/store`.
pub fn default_root() -> Result<PathBuf, ApiError> {
    Ok(project_dirs()?.data_dir().join("store"))
}

/// Default log file: platform state directory, falling back to the data directory.
pub fn default_log_file() -> Result<PathBuf, ApiError> {
    let dirs = project_dirs()?;
    let base = dirs
        .state_dir()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| dirs.data_dir().to_path_buf());
    Ok(base.join("dedupfs.log"))
}
