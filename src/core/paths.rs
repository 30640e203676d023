use std::path::{Component, Path, PathBuf};

use crate::core::error::{WeaveError, WeaveResult};

const APP_DIR_NAME: &str = "skinweave";
pub const HOME_ENV: &str = "SKINWEAVE_HOME";

#[cfg(windows)]
const EXE_SUFFIX: &str = ".exe";
#[cfg(not(windows))]
const EXE_SUFFIX: &str = "";

/// Every on-disk location the pipeline touches, rooted at one data directory.
#[derive(Debug, Clone)]
pub struct AppPaths {
    root: PathBuf,
}

impl AppPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$SKINWEAVE_HOME` when set, otherwise the platform local data dir.
    pub fn from_env() -> Self {
        if let Some(home) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            return Self::new(PathBuf::from(home));
        }
        let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join(APP_DIR_NAME))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tools_dir(&self) -> PathBuf {
        self.root.join("tools")
    }

    pub fn skins_dir(&self) -> PathBuf {
        self.root.join("skins")
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.root.join("mods")
    }

    pub fn overlay_dir(&self) -> PathBuf {
        self.root.join("overlay")
    }

    pub fn plugin_dir(&self) -> PathBuf {
        self.root.join("plugin")
    }

    pub fn pengu_dir(&self) -> PathBuf {
        self.root.join("pengu")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("settings.json")
    }

    pub fn version_file(&self) -> PathBuf {
        self.root.join("version.txt")
    }

    pub fn update_file(&self) -> PathBuf {
        self.root.join(format!("skinweave_update{EXE_SUFFIX}"))
    }

    pub fn core_file(&self) -> PathBuf {
        self.root.join(format!("skinweave_core{EXE_SUFFIX}"))
    }

    pub fn ensure_layout(&self) -> WeaveResult<()> {
        for dir in [
            self.root.clone(),
            self.tools_dir(),
            self.skins_dir(),
            self.mods_dir(),
            self.overlay_dir(),
            self.plugin_dir(),
            self.pengu_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|source| WeaveError::Io { path: dir, source })?;
        }
        Ok(())
    }
}

/// Resolves `.` and `..` components without touching the filesystem.
/// A `..` that would climb above the root (or above the start of a relative
/// path) is kept, so escaping paths stay detectable.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out.iter().map(|c| c.as_os_str()).collect()
}

/// Case-insensitive comparison of two normalized paths.
pub fn same_path(left: &Path, right: &Path) -> bool {
    normalize_lexically(left)
        .to_string_lossy()
        .eq_ignore_ascii_case(&normalize_lexically(right).to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_parent_components() {
        assert_eq!(
            normalize_lexically(Path::new("/riot/League of Legends/../Game")),
            PathBuf::from("/riot/Game")
        );
        assert_eq!(
            normalize_lexically(Path::new("/riot/./League/")),
            PathBuf::from("/riot/League")
        );
    }

    #[test]
    fn normalize_keeps_escaping_relative_parents() {
        assert_eq!(
            normalize_lexically(Path::new("../../evil")),
            PathBuf::from("../../evil")
        );
        assert_eq!(normalize_lexically(Path::new("/../etc")), PathBuf::from("/etc"));
    }

    #[test]
    fn same_path_ignores_case_and_dots() {
        assert!(same_path(
            Path::new("/Riot Games/League of Legends/Game"),
            Path::new("/riot games/league of legends/./game/")
        ));
        assert!(!same_path(Path::new("/a/Game"), Path::new("/b/Game")));
    }

    #[test]
    fn layout_is_created_under_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(temp.path().join("home"));
        paths.ensure_layout().expect("layout");

        assert!(paths.tools_dir().is_dir());
        assert!(paths.skins_dir().is_dir());
        assert!(paths.overlay_dir().is_dir());
        assert!(paths.core_file().starts_with(paths.root()));
        assert_ne!(paths.core_file(), paths.update_file());
    }
}
