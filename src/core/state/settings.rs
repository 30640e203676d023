use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::error::{WeaveError, WeaveResult};

const SKINS_BASE_URL: &str = "https://raw.githubusercontent.com/Alban1911/LeagueSkins/main/skins";
const SKIN_NAMES_URL: &str =
    "https://raw.githubusercontent.com/Alban1911/LeagueSkins/refs/heads/main/resources/en/skin_ids.json";
const RELEASE_URL: &str = "https://api.github.com/repos/skinweave/skinweave/releases/latest";
const TOOLS_URL: &str = "https://raw.githubusercontent.com/Alban1911/Rose/main/injection/tools";
const PLUGIN_URL: &str = "https://github.com/skinweave/skinweave/releases/latest/download/plugin.zip";
const PENGU_URL: &str =
    "https://github.com/PenguLoader/PenguLoader/releases/download/v1.1.6/pengu-loader-v1.1.6.zip";

#[cfg(windows)]
const RELEASE_ASSET_NAME: &str = "skinweave.exe";
#[cfg(not(windows))]
const RELEASE_ASSET_NAME: &str = "skinweave";

/// Persisted configuration, `settings.json` under the data root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub game_path: Option<PathBuf>,
    pub skins_base_url: String,
    pub skin_names_url: String,
    pub release_url: String,
    pub release_asset_name: String,
    pub tools_url: String,
    pub plugin_url: String,
    pub pengu_url: String,
    /// Minutes between background update checks; 0 disables the periodic task.
    pub update_check_interval_mins: u64,
    pub last_update_check: Option<DateTime<Utc>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            game_path: None,
            skins_base_url: SKINS_BASE_URL.into(),
            skin_names_url: SKIN_NAMES_URL.into(),
            release_url: RELEASE_URL.into(),
            release_asset_name: RELEASE_ASSET_NAME.into(),
            tools_url: TOOLS_URL.into(),
            plugin_url: PLUGIN_URL.into(),
            pengu_url: PENGU_URL.into(),
            update_check_interval_mins: 360,
            last_update_check: None,
        }
    }
}

/// Durable key-value store backed by the settings file.
///
/// Reads happen once at construction; every setter writes through.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    settings: Mutex<Settings>,
}

impl ConfigStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = load_settings_from_disk(&path).unwrap_or_default();
        Self {
            path,
            settings: Mutex::new(settings),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Settings {
        self.lock().clone()
    }

    pub fn game_path(&self) -> Option<PathBuf> {
        self.lock()
            .game_path
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn set_game_path(&self, dir: &Path) -> WeaveResult<()> {
        let mut settings = self.lock();
        if settings.game_path.as_deref() == Some(dir) {
            return Ok(());
        }
        settings.game_path = Some(dir.to_path_buf());
        save_settings(&self.path, &settings)
    }

    pub fn record_update_check(&self, at: DateTime<Utc>) -> WeaveResult<()> {
        let mut settings = self.lock();
        settings.last_update_check = Some(at);
        save_settings(&self.path, &settings)
    }

    pub fn save(&self) -> WeaveResult<()> {
        let settings = self.lock();
        save_settings(&self.path, &settings)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Settings> {
        self.settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn load_settings_from_disk(path: &Path) -> Option<Settings> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(settings) => Some(settings),
        Err(err) => {
            warn!("Ignoring unreadable settings at {:?}: {}", path, err);
            None
        }
    }
}

fn save_settings(path: &Path, settings: &Settings) -> WeaveResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| WeaveError::io(parent, source))?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json).map_err(|source| WeaveError::io(path, source))
}
