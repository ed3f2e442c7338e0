//! Configuration loading for the mail sync core
//!
//! Settings live as JSON files in a shared config directory
//! (`~/.config/mail-sync/` by default). Mobile hosts have no XDG config
//! directory, so the location can be pinned with `MAIL_SYNC_CONFIG_DIR`.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Environment variable that overrides the config directory
pub const CONFIG_DIR_ENV: &str = "MAIL_SYNC_CONFIG_DIR";

const APP_DIR_NAME: &str = "mail-sync";

/// Get the config directory, honoring `MAIL_SYNC_CONFIG_DIR`
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|p| p.join(APP_DIR_NAME))
}

/// Get the path to a config file within the config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Load a JSON config file, falling back to `T::default()` when it is absent
///
/// A file that exists but fails to parse is still an error.
pub fn load_json_or_default<T: DeserializeOwned + Default>(filename: &str) -> Result<T> {
    match config_path(filename) {
        Some(path) if path.exists() => load_json_file(&path),
        _ => Ok(T::default()),
    }
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}
