// ─── Installation Locator ───
// Finds the game directory. Cheap sources are pooled into a candidate set and
// the most recently patched install wins; expensive sources only run when the
// pool is empty.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use tracing::{debug, info, instrument, warn};

use super::sources::{manifest_roots, RegistrySource, VolumeSource};
use super::GameTarget;
use crate::core::error::{WeaveError, WeaveResult};
use crate::core::paths::{normalize_lexically, same_path};
use crate::core::process::ProcessTable;
use crate::core::state::ConfigStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationCandidate {
    pub path: PathBuf,
    pub is_valid: bool,
    pub exe_modified: Option<SystemTime>,
}

/// Process-wide memory of the resolved directory. Cleared only by `reset`
/// (tests) or process restart; revalidated on every read.
#[derive(Debug, Default)]
pub struct InstallCache {
    path: Mutex<Option<PathBuf>>,
}

impl InstallCache {
    pub fn get(&self) -> Option<PathBuf> {
        self.lock().clone()
    }

    pub fn set(&self, path: PathBuf) {
        *self.lock() = Some(path);
    }

    pub fn reset(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PathBuf>> {
        self.path
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Valid, de-duplicated candidates in discovery order.
struct CandidateSet<'a> {
    target: &'a GameTarget,
    items: Vec<InstallationCandidate>,
}

impl<'a> CandidateSet<'a> {
    fn new(target: &'a GameTarget) -> Self {
        Self {
            target,
            items: Vec::new(),
        }
    }

    fn add(&mut self, dir: &Path) {
        let dir = normalize_lexically(dir);
        if self.items.iter().any(|c| same_path(&c.path, &dir)) {
            return;
        }
        let candidate = probe_candidate(self.target, dir);
        if candidate.is_valid {
            debug!("Installation candidate {:?}", candidate.path);
            self.items.push(candidate);
        }
    }

    /// Latest executable modification time; the first discovered wins ties.
    fn newest(&self) -> Option<&InstallationCandidate> {
        let mut best: Option<&InstallationCandidate> = None;
        for candidate in &self.items {
            match best {
                Some(current) if candidate.exe_modified <= current.exe_modified => {}
                _ => best = Some(candidate),
            }
        }
        best
    }
}

fn probe_candidate(target: &GameTarget, path: PathBuf) -> InstallationCandidate {
    let exe_modified = std::fs::metadata(target.exe_path(&path))
        .ok()
        .filter(|m| m.is_file())
        .and_then(|m| m.modified().ok());
    InstallationCandidate {
        is_valid: exe_modified.is_some() || target.is_valid_dir(&path),
        exe_modified,
        path,
    }
}

type CandidateStrategy = fn(&Locator, &mut CandidateSet<'_>);
type FallbackStrategy = fn(&Locator) -> Option<PathBuf>;

pub struct Locator {
    target: GameTarget,
    cache: Arc<InstallCache>,
    config: Arc<ConfigStore>,
    processes: Arc<dyn ProcessTable>,
    volumes: Arc<dyn VolumeSource>,
    registry: Arc<dyn RegistrySource>,
}

impl Locator {
    pub fn new(
        target: GameTarget,
        cache: Arc<InstallCache>,
        config: Arc<ConfigStore>,
        processes: Arc<dyn ProcessTable>,
        volumes: Arc<dyn VolumeSource>,
        registry: Arc<dyn RegistrySource>,
    ) -> Self {
        Self {
            target,
            cache,
            config,
            processes,
            volumes,
            registry,
        }
    }

    pub fn target(&self) -> &GameTarget {
        &self.target
    }

    /// Resolve the installation directory, or `None` when every source came
    /// up empty and the user has to supply a path.
    #[instrument(skip(self))]
    pub fn resolve(&self) -> Option<PathBuf> {
        if let Some(cached) = self.cache.get() {
            if self.target.is_valid_dir(&cached) {
                return Some(cached);
            }
            debug!("Cached game directory {:?} went stale", cached);
            self.cache.reset();
        }

        let pooled: [(&str, CandidateStrategy); 3] = [
            ("saved", Self::collect_saved),
            ("manifest", Self::collect_manifest),
            ("volumes", Self::collect_volumes),
        ];

        let mut candidates = CandidateSet::new(&self.target);
        for (name, strategy) in pooled {
            let before = candidates.items.len();
            strategy(self, &mut candidates);
            debug!(
                "Strategy {} added {} candidate(s)",
                name,
                candidates.items.len() - before
            );
        }

        if let Some(best) = candidates.newest() {
            let best = best.path.clone();
            info!(
                "Game directory {:?} (newest of {})",
                best,
                candidates.items.len()
            );
            self.remember(&best);
            return Some(best);
        }

        let fallbacks: [(&str, FallbackStrategy); 2] = [
            ("process", Self::from_running_client),
            ("registry", Self::from_registry),
        ];
        for (name, strategy) in fallbacks {
            if let Some(dir) = strategy(self) {
                info!("Game directory {:?} (from {})", dir, name);
                self.remember(&dir);
                return Some(dir);
            }
        }

        warn!("Game directory not found by any strategy");
        None
    }

    /// Like `resolve`, but a miss becomes `NotFound` for callers that must
    /// stop and ask for a manual path.
    pub fn require(&self) -> WeaveResult<PathBuf> {
        self.resolve()
            .ok_or_else(|| WeaveError::NotFound("game directory (set it with `locate --set <path>`)".into()))
    }

    /// Accept a user-entered directory. Surrounding whitespace and quotes are
    /// ignored; the directory must contain the game executable.
    pub fn accept_manual(&self, input: &str) -> WeaveResult<PathBuf> {
        let trimmed = input.trim().trim_matches(|c| c == '"' || c == '\'');
        let dir = normalize_lexically(Path::new(trimmed));
        if !self.target.is_valid_dir(&dir) {
            return Err(WeaveError::NotFound(format!(
                "{} in {}",
                self.target.exe_name,
                dir.display()
            )));
        }
        self.remember(&dir);
        Ok(dir)
    }

    fn collect_saved(&self, set: &mut CandidateSet<'_>) {
        if let Some(saved) = self.config.game_path() {
            set.add(&saved);
        }
    }

    fn collect_manifest(&self, set: &mut CandidateSet<'_>) {
        let Some(manifest) = &self.target.manifest_path else {
            return;
        };
        for root in manifest_roots(manifest, &self.target.name_hint) {
            let leaf_already = root
                .file_name()
                .map(|name| {
                    name.to_string_lossy()
                        .eq_ignore_ascii_case(&self.target.leaf_dir)
                })
                .unwrap_or(false);
            if leaf_already {
                set.add(&root);
                continue;
            }
            set.add(&root.join(&self.target.leaf_dir));
            set.add(&root.join("..").join(&self.target.leaf_dir));
        }
    }

    fn collect_volumes(&self, set: &mut CandidateSet<'_>) {
        for volume in self.volumes.fixed_volumes() {
            for suffix in &self.target.common_suffixes {
                set.add(&volume.join(suffix));
            }
        }
    }

    fn from_running_client(&self) -> Option<PathBuf> {
        let leaf = &self.target.leaf_dir;
        self.processes
            .find(&self.target.client_image)
            .into_iter()
            .filter_map(|entry| entry.exe)
            .find_map(|exe| {
                let exe_dir = exe.parent()?.to_path_buf();
                [exe_dir.join(leaf), exe_dir.join("..").join(leaf)]
                    .into_iter()
                    .map(|dir| normalize_lexically(&dir))
                    .find(|dir| self.target.is_valid_dir(dir))
            })
    }

    fn from_registry(&self) -> Option<PathBuf> {
        let location = self.registry.install_location()?;
        let dir = normalize_lexically(&Path::new(location.trim()).join(&self.target.leaf_dir));
        self.target.is_valid_dir(&dir).then_some(dir)
    }

    fn remember(&self, dir: &Path) {
        self.cache.set(dir.to_path_buf());
        if let Err(err) = self.config.set_game_path(dir) {
            warn!("Could not persist game directory: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::game::sources::testing::{FakeRegistry, FakeVolumes};
    use crate::core::process::testing::FakeProcessTable;
    use crate::core::process::ProcessEntry;
    use std::time::Duration;

    const EXE: &str = "League of Legends.exe";

    struct Fixture {
        _temp: tempfile::TempDir,
        root: PathBuf,
        cache: Arc<InstallCache>,
        config: Arc<ConfigStore>,
        processes: Arc<FakeProcessTable>,
        volumes: Arc<FakeVolumes>,
        registry: Arc<FakeRegistry>,
        manifest: PathBuf,
    }

    impl Fixture {
        fn new(volume_names: &[&str]) -> Self {
            Self::with_registry(volume_names, None)
        }

        fn with_registry(volume_names: &[&str], registry: Option<String>) -> Self {
            let temp = tempfile::tempdir().expect("tempdir");
            let root = temp.path().to_path_buf();
            let volumes = volume_names.iter().map(|v| root.join(v)).collect();
            Self {
                cache: Arc::new(InstallCache::default()),
                config: Arc::new(ConfigStore::open(root.join("settings.json"))),
                processes: Arc::new(FakeProcessTable::default()),
                volumes: Arc::new(FakeVolumes::new(volumes)),
                registry: Arc::new(FakeRegistry {
                    location: registry,
                    ..Default::default()
                }),
                manifest: root.join("RiotClientInstalls.json"),
                root,
                _temp: temp,
            }
        }

        fn locator(&self) -> Locator {
            let target = GameTarget {
                manifest_path: Some(self.manifest.clone()),
                ..GameTarget::default()
            };
            Locator::new(
                target,
                self.cache.clone(),
                self.config.clone(),
                self.processes.clone(),
                self.volumes.clone(),
                self.registry.clone(),
            )
        }

        /// Creates `<root>/<rel>/League of Legends.exe` with the given age.
        fn install(&self, rel: &str, age_secs: u64) -> PathBuf {
            let dir = self.root.join(rel);
            std::fs::create_dir_all(&dir).expect("mkdir");
            let exe = dir.join(EXE);
            std::fs::write(&exe, b"MZ").expect("write exe");
            set_age(&exe, age_secs);
            normalize_lexically(&dir)
        }
    }

    fn set_age(exe: &Path, age_secs: u64) {
        let file = std::fs::File::options()
            .write(true)
            .open(exe)
            .expect("open exe");
        let when = SystemTime::now() - Duration::from_secs(age_secs);
        file.set_modified(when).expect("set mtime");
    }

    const VOLUME_SUFFIX: &str = "Riot Games/League of Legends/Game";

    #[test]
    fn newest_executable_wins_across_volumes() {
        let fx = Fixture::new(&["C", "D"]);
        fx.install(&format!("C/{VOLUME_SUFFIX}"), 3_600);
        let fresh = fx.install(&format!("D/{VOLUME_SUFFIX}"), 10);

        assert_eq!(fx.locator().resolve(), Some(fresh.clone()));
        assert_eq!(fx.config.game_path(), Some(fresh));
    }

    #[test]
    fn swapping_modification_times_swaps_the_winner() {
        let fx = Fixture::new(&["C", "D"]);
        let c = fx.install(&format!("C/{VOLUME_SUFFIX}"), 10);
        let d = fx.install(&format!("D/{VOLUME_SUFFIX}"), 3_600);
        assert_eq!(fx.locator().resolve(), Some(c.clone()));

        set_age(&c.join(EXE), 3_600);
        set_age(&d.join(EXE), 10);
        fx.cache.reset();
        assert_eq!(fx.locator().resolve(), Some(d));
    }

    #[test]
    fn ties_resolve_to_first_discovered() {
        let fx = Fixture::new(&["C", "D"]);
        let c = fx.install(&format!("C/{VOLUME_SUFFIX}"), 100);
        let d = fx.install(&format!("D/{VOLUME_SUFFIX}"), 100);
        let when = std::fs::metadata(c.join(EXE))
            .and_then(|m| m.modified())
            .expect("mtime");
        std::fs::File::options()
            .write(true)
            .open(d.join(EXE))
            .and_then(|f| f.set_modified(when))
            .expect("align mtime");

        assert_eq!(fx.locator().resolve(), Some(c));
    }

    #[test]
    fn second_resolve_is_served_from_cache_without_scanning() {
        let fx = Fixture::new(&["C"]);
        let dir = fx.install(&format!("C/{VOLUME_SUFFIX}"), 10);
        let locator = fx.locator();

        assert_eq!(locator.resolve(), Some(dir.clone()));
        assert_eq!(locator.resolve(), Some(dir));
        assert_eq!(fx.volumes.scans(), 1);
        assert_eq!(fx.processes.finds(), 0);
    }

    #[test]
    fn stale_cache_triggers_rescan() {
        let fx = Fixture::new(&["C", "D"]);
        let first = fx.install(&format!("C/{VOLUME_SUFFIX}"), 10);
        let second = fx.install(&format!("D/{VOLUME_SUFFIX}"), 3_600);
        let locator = fx.locator();
        assert_eq!(locator.resolve(), Some(first.clone()));

        std::fs::remove_file(first.join(EXE)).expect("remove exe");
        assert_eq!(locator.resolve(), Some(second));
        assert_eq!(fx.volumes.scans(), 2);
    }

    #[test]
    fn saved_path_competes_with_newer_installs() {
        let fx = Fixture::new(&["D"]);
        let saved = fx.install("Custom/Game", 7_200);
        fx.config.set_game_path(&saved).expect("save");
        let fresh = fx.install(&format!("D/{VOLUME_SUFFIX}"), 10);

        assert_eq!(fx.locator().resolve(), Some(fresh));
    }

    #[test]
    fn saved_path_equal_to_volume_path_counts_once() {
        let fx = Fixture::new(&["C"]);
        let dir = fx.install(&format!("C/{VOLUME_SUFFIX}"), 10);
        fx.config.set_game_path(&dir.join(".")).expect("save dot form");

        let locator = fx.locator();
        let mut set = CandidateSet::new(locator.target());
        set.add(&fx.config.game_path().expect("saved"));
        locator.collect_volumes(&mut set);
        assert_eq!(set.items.len(), 1);
    }

    #[test]
    fn manifest_roots_probe_child_and_sibling_without_double_suffix() {
        let fx = Fixture::new(&[]);
        let child = fx.install("D/Riot Games/League of Legends/Game", 50);
        let explicit = fx.install("E/League/Game", 10);
        let root = fx.root.display().to_string().replace('\\', "/");
        std::fs::write(
            &fx.manifest,
            format!(
                r#"{{
                    "associated_client": {{ "{root}/D/Riot Games/League of Legends/": "x" }},
                    "rc_live": "{root}/E/League/Game"
                }}"#
            ),
        )
        .expect("manifest");

        let locator = fx.locator();
        let mut set = CandidateSet::new(locator.target());
        locator.collect_manifest(&mut set);
        let found: Vec<_> = set.items.iter().map(|c| c.path.clone()).collect();
        assert_eq!(found, vec![child, explicit.clone()]);
        assert_eq!(locator.resolve(), Some(explicit));
    }

    #[test]
    fn running_client_is_consulted_only_when_pool_is_empty() {
        let fx = Fixture::new(&["C"]);
        let pooled = fx.install(&format!("C/{VOLUME_SUFFIX}"), 10);
        let via_process = fx.install("Elsewhere/League of Legends/Game", 1);
        fx.processes.insert(
            "LeagueClientUx.exe",
            ProcessEntry {
                pid: 42,
                exe: Some(via_process.parent().expect("parent").join("LeagueClientUx.exe")),
                cmdline: Vec::new(),
            },
        );

        assert_eq!(fx.locator().resolve(), Some(pooled));
        assert_eq!(fx.processes.finds(), 0);
        assert_eq!(fx.registry.queries(), 0);
    }

    #[test]
    fn running_client_locates_game_next_to_its_executable() {
        let fx = Fixture::new(&[]);
        let game = fx.install("Elsewhere/League of Legends/Game", 1);
        fx.processes.insert(
            "LeagueClientUx.exe",
            ProcessEntry {
                pid: 42,
                exe: Some(game.parent().expect("parent").join("LeagueClientUx.exe")),
                cmdline: Vec::new(),
            },
        );

        assert_eq!(fx.locator().resolve(), Some(game.clone()));
        assert_eq!(fx.registry.queries(), 0);
        assert_eq!(fx.cache.get(), Some(game));
    }

    #[test]
    fn registry_is_the_last_resort() {
        let fx = Fixture::new(&[]);
        let game = fx.install("Registry/League of Legends/Game", 1);
        let location = game.parent().expect("parent").display().to_string();
        let fx = Fixture {
            registry: Arc::new(FakeRegistry {
                location: Some(location),
                ..Default::default()
            }),
            ..fx
        };

        assert_eq!(fx.locator().resolve(), Some(game.clone()));
        assert_eq!(fx.processes.finds(), 1);
        assert_eq!(fx.config.game_path(), Some(game));
    }

    #[test]
    fn nothing_found_returns_none() {
        let fx = Fixture::with_registry(&["C"], Some("/nowhere".into()));
        let locator = fx.locator();
        assert_eq!(locator.resolve(), None);
        assert!(matches!(locator.require(), Err(WeaveError::NotFound(_))));
        assert_eq!(fx.config.game_path(), None);
    }

    #[test]
    fn manual_entry_strips_quotes_and_validates() {
        let fx = Fixture::new(&[]);
        let game = fx.install("Manual/Game", 1);
        let locator = fx.locator();

        let quoted = format!("  \"{}\"  ", game.display());
        assert_eq!(locator.accept_manual(&quoted).expect("valid"), game);
        assert_eq!(fx.cache.get(), Some(game));

        let missing = fx.root.join("Nope");
        assert!(locator.accept_manual(&missing.display().to_string()).is_err());
    }
}
