use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

/// Lifecycle of one overlay build-and-run invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayPhase {
    Idle,
    KillingStale,
    Building,
    Built,
    Launching,
    Running,
    Failed,
}

impl fmt::Display for OverlayPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OverlayPhase::Idle => "idle",
            OverlayPhase::KillingStale => "killing stale overlay",
            OverlayPhase::Building => "building overlay",
            OverlayPhase::Built => "overlay built",
            OverlayPhase::Launching => "launching overlay",
            OverlayPhase::Running => "overlay running",
            OverlayPhase::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// One invocation; never persisted.
#[derive(Debug, Clone)]
pub struct OverlayJob {
    pub mods_dir: PathBuf,
    pub overlay_dir: PathBuf,
    pub game_dir: PathBuf,
    pub mod_name: String,
    phase: OverlayPhase,
    history: Vec<OverlayPhase>,
}

impl OverlayJob {
    pub fn new(
        mods_dir: impl Into<PathBuf>,
        overlay_dir: impl Into<PathBuf>,
        game_dir: impl Into<PathBuf>,
        mod_name: impl Into<String>,
    ) -> Self {
        Self {
            mods_dir: mods_dir.into(),
            overlay_dir: overlay_dir.into(),
            game_dir: game_dir.into(),
            mod_name: mod_name.into(),
            phase: OverlayPhase::Idle,
            history: vec![OverlayPhase::Idle],
        }
    }

    pub fn phase(&self) -> OverlayPhase {
        self.phase
    }

    /// Every phase the job has been in, starting with `Idle`.
    pub fn history(&self) -> &[OverlayPhase] {
        &self.history
    }

    pub fn config_path(&self) -> PathBuf {
        self.overlay_dir.join("cslol-config.json")
    }

    pub(crate) fn advance(&mut self, next: OverlayPhase) {
        tracing::debug!("Overlay job: {} -> {}", self.phase, next);
        self.phase = next;
        self.history.push(next);
    }

    pub(crate) fn fail(&mut self) {
        self.advance(OverlayPhase::Failed);
    }
}
