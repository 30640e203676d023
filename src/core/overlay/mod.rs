// ─── Overlay Orchestrator ───
// Drives one overlay job through kill-stale, build, launch and confirmation.
// The external tool does not tolerate a second writer on the overlay
// directory, so every job starts by terminating the previous instance.

pub mod job;
pub mod tools;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, instrument, warn};

pub use job::{OverlayJob, OverlayPhase};
pub use tools::{ModTools, MOD_TOOLS_IMAGE, TOOL_FILES};

use crate::core::error::{WeaveError, WeaveResult};
use crate::core::process::ProcessTable;

const SETTLE_DELAY: Duration = Duration::from_millis(300);
const CONFIRM_DELAY: Duration = Duration::from_secs(1);

/// Result of a job that reached `Running`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverlayLaunch {
    pub pid: u32,
    /// Whether the tool was seen in the process table after launch.
    pub confirmed: bool,
}

pub struct OverlayOrchestrator {
    tools: ModTools,
    processes: Arc<dyn ProcessTable>,
    settle_delay: Duration,
    confirm_delay: Duration,
}

impl OverlayOrchestrator {
    pub fn new(tools: ModTools, processes: Arc<dyn ProcessTable>) -> Self {
        Self {
            tools,
            processes,
            settle_delay: SETTLE_DELAY,
            confirm_delay: CONFIRM_DELAY,
        }
    }

    pub fn with_delays(mut self, settle: Duration, confirm: Duration) -> Self {
        self.settle_delay = settle;
        self.confirm_delay = confirm;
        self
    }

    pub fn tools(&self) -> &ModTools {
        &self.tools
    }

    /// Terminate any running overlay tool. Nothing running is fine.
    pub fn kill_stale(&self) -> usize {
        let killed = self.processes.kill(MOD_TOOLS_IMAGE);
        if killed > 0 {
            info!("Stopped {} stale overlay process(es)", killed);
        }
        killed
    }

    /// Run `job` to `Running`, or leave it `Failed` and return the cause.
    #[instrument(skip(self, job), fields(mod_name = %job.mod_name))]
    pub async fn run(&self, job: &mut OverlayJob) -> WeaveResult<OverlayLaunch> {
        job.advance(OverlayPhase::KillingStale);
        self.kill_stale();
        tokio::time::sleep(self.settle_delay).await;

        job.advance(OverlayPhase::Building);
        if let Err(err) = self.build(job).await {
            job.fail();
            return Err(err);
        }
        job.advance(OverlayPhase::Built);

        job.advance(OverlayPhase::Launching);
        let pid = match self
            .tools
            .runoverlay(&job.overlay_dir, &job.config_path(), &job.game_dir)
        {
            Ok(pid) => pid,
            Err(err) => {
                job.fail();
                return Err(err);
            }
        };

        tokio::time::sleep(self.confirm_delay).await;
        let confirmed = self.processes.is_running(MOD_TOOLS_IMAGE);
        if !confirmed {
            warn!("Overlay launched (pid {}) but is not visible in the process table", pid);
        }
        job.advance(OverlayPhase::Running);
        Ok(OverlayLaunch { pid, confirmed })
    }

    async fn build(&self, job: &OverlayJob) -> WeaveResult<()> {
        self.tools.ensure_present()?;
        reset_dir(&job.overlay_dir)?;
        self.tools
            .mkoverlay(&job.mods_dir, &job.overlay_dir, &job.game_dir, &job.mod_name)
            .await
    }

    /// Stop the tool and drop the overlay workspace.
    pub fn cleanup(&self, overlay_dir: &Path) -> WeaveResult<()> {
        self.kill_stale();
        if overlay_dir.exists() {
            std::fs::remove_dir_all(overlay_dir)
                .map_err(|source| WeaveError::io(overlay_dir, source))?;
        }
        info!("Overlay cleaned up");
        Ok(())
    }
}

fn reset_dir(dir: &Path) -> WeaveResult<()> {
    if dir.exists() {
        std::fs::remove_dir_all(dir).map_err(|source| WeaveError::io(dir, source))?;
    }
    std::fs::create_dir_all(dir).map_err(|source| WeaveError::io(dir, source))
}
