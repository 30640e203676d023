// ─── Apply pipeline ───
// One "apply mod" action: locate the game, get the archive, stage it under
// mods/, then hand over to the overlay orchestrator. Callers serialize
// actions; there is no internal job queue.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, instrument};

use crate::core::error::{WeaveError, WeaveResult};
use crate::core::game::Locator;
use crate::core::overlay::{OverlayJob, OverlayOrchestrator, OverlayPhase};
use crate::core::paths::AppPaths;
use crate::core::skins::{extract_archive_async, AssetIdentity, AssetStore};

#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub game_dir: PathBuf,
    pub archive: PathBuf,
    pub mod_name: String,
    pub phases: Vec<OverlayPhase>,
    pub pid: u32,
    pub confirmed: bool,
}

pub struct Pipeline {
    paths: AppPaths,
    locator: Locator,
    assets: AssetStore,
    orchestrator: OverlayOrchestrator,
}

impl Pipeline {
    pub fn new(
        paths: AppPaths,
        locator: Locator,
        assets: AssetStore,
        orchestrator: OverlayOrchestrator,
    ) -> Self {
        Self {
            paths,
            locator,
            assets,
            orchestrator,
        }
    }

    #[instrument(skip(self), fields(category = identity.category_id, variant = identity.variant_id))]
    pub async fn apply(&self, identity: &AssetIdentity) -> WeaveResult<ApplyReport> {
        let game_dir = self.locator.require()?;
        self.orchestrator.tools().ensure_present()?;

        let asset = self.assets.obtain(identity).await?;
        let mod_name = format!("skin_{}", identity.variant_id);
        let mods_dir = self.paths.mods_dir();
        reset_dir(&mods_dir)?;
        extract_archive_async(asset.local_path.clone(), mods_dir.join(&mod_name)).await?;

        let mut job = OverlayJob::new(
            mods_dir,
            self.paths.overlay_dir(),
            game_dir.clone(),
            mod_name.clone(),
        );
        let launch = self.orchestrator.run(&mut job).await?;
        info!("Applied {} (overlay pid {})", mod_name, launch.pid);

        Ok(ApplyReport {
            game_dir,
            archive: asset.local_path,
            mod_name,
            phases: job.history().to_vec(),
            pid: launch.pid,
            confirmed: launch.confirmed,
        })
    }

    pub fn cleanup(&self) -> WeaveResult<()> {
        self.orchestrator.cleanup(&self.paths.overlay_dir())
    }
}

fn reset_dir(dir: &std::path::Path) -> WeaveResult<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|source| WeaveError::io(dir, source))?;
    }
    std::fs::create_dir_all(dir).map_err(|source| WeaveError::io(dir, source))
}
