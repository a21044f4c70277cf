//! Persistent client settings.
//!
//! Values are stored as JSON files in the platform-appropriate config
//! directory:
//!   - Linux: `~/.config/pawnhub/`
//!   - macOS: `~/Library/Application Support/pawnhub/`
//!   - Windows: `%APPDATA%\pawnhub\`
//!
//! `PAWNHUB_CONFIG_DIR` overrides the location.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Key under which [`ClientSettings`] are stored.
pub const SETTINGS_KEY: &str = "settings";

/// Settings that survive restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Connect to the local development server instead of production.
    #[serde(default)]
    pub debug_local_server: bool,
}

impl ClientSettings {
    pub fn load() -> Self {
        load(SETTINGS_KEY).unwrap_or_default()
    }

    pub fn save(&self) -> bool {
        save(SETTINGS_KEY, self)
    }
}

/// Save a value to persistent storage.
///
/// Returns `true` if the operation succeeded.
pub fn save<T: Serialize>(key: &str, value: &T) -> bool {
    match config_dir() {
        Some(dir) => save_in(&dir, key, value),
        None => false,
    }
}

/// Load a value from persistent storage.
///
/// Returns `None` if the key doesn't exist or deserialization fails.
pub fn load<T: DeserializeOwned>(key: &str) -> Option<T> {
    load_in(&config_dir()?, key)
}

fn config_dir() -> Option<PathBuf> {
    let app_dir = match std::env::var_os("PAWNHUB_CONFIG_DIR") {
        Some(dir) => PathBuf::from(dir),
        None => dirs::config_dir()?.join("pawnhub"),
    };

    if !app_dir.exists() {
        std::fs::create_dir_all(&app_dir).ok()?;
    }

    Some(app_dir)
}

/// Turn a key into a file name that is valid on every platform.
fn sanitize_key(key: &str) -> String {
    key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_")
}

fn file_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{}.json", sanitize_key(key)))
}

fn save_in<T: Serialize>(dir: &Path, key: &str, value: &T) -> bool {
    match serde_json::to_string(value) {
        Ok(json) => std::fs::write(file_path(dir, key), json).is_ok(),
        Err(_) => false,
    }
}

fn load_in<T: DeserializeOwned>(dir: &Path, key: &str) -> Option<T> {
    let json = std::fs::read_to_string(file_path(dir, key)).ok()?;
    serde_json::from_str(&json).ok()
}
