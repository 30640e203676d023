pub mod locator;
pub mod sources;

use std::path::{Path, PathBuf};

pub use locator::{InstallCache, InstallationCandidate, Locator};
pub use sources::{RegistrySource, SystemRegistry, SystemVolumes, VolumeSource};

/// What "the game" means to discovery: which file proves an install is real,
/// where to look for it and which processes belong to it.
#[derive(Debug, Clone)]
pub struct GameTarget {
    pub exe_name: String,
    pub leaf_dir: String,
    /// Case-insensitive substring that marks a manifest entry as ours.
    pub name_hint: String,
    pub client_image: String,
    pub manifest_path: Option<PathBuf>,
    pub common_suffixes: Vec<PathBuf>,
}

impl Default for GameTarget {
    fn default() -> Self {
        let suffix = |parts: &[&str]| parts.iter().collect::<PathBuf>();
        Self {
            exe_name: "League of Legends.exe".into(),
            leaf_dir: "Game".into(),
            name_hint: "league".into(),
            client_image: "LeagueClientUx.exe".into(),
            manifest_path: default_manifest_path(),
            common_suffixes: vec![
                suffix(&["Riot Games", "League of Legends", "Game"]),
                suffix(&["Riot", "Riot Games", "League of Legends", "Game"]),
                suffix(&["Games", "League of Legends", "Game"]),
                suffix(&["Program Files", "Riot Games", "League of Legends", "Game"]),
                suffix(&["Program Files (x86)", "Riot Games", "League of Legends", "Game"]),
            ],
        }
    }
}

impl GameTarget {
    pub fn exe_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.exe_name)
    }

    /// A directory is an installation iff the game executable is present.
    pub fn is_valid_dir(&self, dir: &Path) -> bool {
        !dir.as_os_str().is_empty() && self.exe_path(dir).is_file()
    }
}

fn default_manifest_path() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        Some(PathBuf::from(
            r"C:\ProgramData\Riot Games\RiotClientInstalls.json",
        ))
    } else if cfg!(target_os = "macos") {
        Some(PathBuf::from(
            "/Users/Shared/Riot Games/RiotClientInstalls.json",
        ))
    } else {
        None
    }
}
