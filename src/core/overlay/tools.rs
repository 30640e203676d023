use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::error::{WeaveError, WeaveResult};
use crate::core::process::spawn_detached;

/// Image name of the overlay tool, used for kill and liveness checks.
pub const MOD_TOOLS_IMAGE: &str = "mod-tools.exe";

/// Files that make up a working tool installation.
pub const TOOL_FILES: [&str; 5] = [
    "mod-tools.exe",
    "cslol-diag.exe",
    "cslol-dll.dll",
    "wad-extract.exe",
    "wad-make.exe",
];

/// The external overlay tool: `mkoverlay` builds, `runoverlay` serves.
#[derive(Debug, Clone)]
pub struct ModTools {
    dir: PathBuf,
}

impl ModTools {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn exe_path(&self) -> PathBuf {
        self.dir.join(MOD_TOOLS_IMAGE)
    }

    pub fn exists(&self) -> bool {
        self.exe_path().is_file()
    }

    pub fn ensure_present(&self) -> WeaveResult<()> {
        if self.exists() {
            Ok(())
        } else {
            Err(WeaveError::ToolMissing(self.exe_path()))
        }
    }

    pub fn build_args(
        mods_dir: &Path,
        overlay_dir: &Path,
        game_dir: &Path,
        mod_name: &str,
    ) -> Vec<OsString> {
        vec![
            "mkoverlay".into(),
            mods_dir.as_os_str().to_os_string(),
            overlay_dir.as_os_str().to_os_string(),
            game_flag(game_dir),
            format!("--mods:{mod_name}").into(),
            "--noTFT".into(),
            "--ignoreConflict".into(),
        ]
    }

    pub fn run_args(overlay_dir: &Path, config_path: &Path, game_dir: &Path) -> Vec<OsString> {
        vec![
            "runoverlay".into(),
            overlay_dir.as_os_str().to_os_string(),
            config_path.as_os_str().to_os_string(),
            game_flag(game_dir),
            "--opts:configless".into(),
        ]
    }

    /// Run the build step to completion. Exit code 0 is success; a process
    /// killed by a signal reports -1.
    pub async fn mkoverlay(
        &self,
        mods_dir: &Path,
        overlay_dir: &Path,
        game_dir: &Path,
        mod_name: &str,
    ) -> WeaveResult<()> {
        self.ensure_present()?;
        let args = Self::build_args(mods_dir, overlay_dir, game_dir, mod_name);
        info!("Running {:?} {:?}", self.exe_path(), args);

        let output = tokio::process::Command::new(self.exe_path())
            .args(&args)
            .current_dir(&self.dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| WeaveError::Launch(format!("{}: {e}", MOD_TOOLS_IMAGE)))?;

        log_tool_output("mkoverlay", &output.stdout, &output.stderr);
        if output.status.success() {
            return Ok(());
        }
        Err(WeaveError::ToolExit {
            step: "build",
            code: output.status.code().unwrap_or(-1),
        })
    }

    /// Start the run step detached and return its PID.
    pub fn runoverlay(&self, overlay_dir: &Path, config_path: &Path, game_dir: &Path) -> WeaveResult<u32> {
        self.ensure_present()?;
        let args = Self::run_args(overlay_dir, config_path, game_dir);
        info!("Running {:?} {:?}", self.exe_path(), args);

        let mut cmd = std::process::Command::new(self.exe_path());
        cmd.args(&args).current_dir(&self.dir);
        let pid = spawn_detached(cmd)?;
        info!("runoverlay started with PID {}", pid);
        Ok(pid)
    }
}

fn game_flag(game_dir: &Path) -> OsString {
    let mut flag = OsString::from("--game:");
    flag.push(game_dir.as_os_str());
    flag
}

fn log_tool_output(step: &str, stdout: &[u8], stderr: &[u8]) {
    for line in String::from_utf8_lossy(stdout).lines() {
        debug!("[{}] {}", step, line);
    }
    for line in String::from_utf8_lossy(stderr).lines() {
        debug!("[{} stderr] {}", step, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_arguments_follow_tool_contract() {
        let args = ModTools::build_args(
            Path::new("/d/mods"),
            Path::new("/d/overlay"),
            Path::new("/g/League of Legends/Game"),
            "skin_1001",
        );
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "mkoverlay",
                "/d/mods",
                "/d/overlay",
                "--game:/g/League of Legends/Game",
                "--mods:skin_1001",
                "--noTFT",
                "--ignoreConflict",
            ]
        );
    }

    #[test]
    fn run_arguments_select_configless_mode() {
        let args = ModTools::run_args(
            Path::new("/d/overlay"),
            Path::new("/d/overlay/cslol-config.json"),
            Path::new("/g/Game"),
        );
        assert_eq!(args.first().map(|a| a.to_string_lossy().into_owned()).as_deref(), Some("runoverlay"));
        assert_eq!(args.last().map(|a| a.to_string_lossy().into_owned()).as_deref(), Some("--opts:configless"));
        assert_eq!(args[3], OsString::from("--game:/g/Game"));
    }

    #[tokio::test]
    async fn missing_tool_is_reported_distinctly() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tools = ModTools::new(temp.path());
        let err = tools
            .mkoverlay(temp.path(), temp.path(), temp.path(), "skin_1")
            .await
            .expect_err("missing");
        assert!(matches!(err, WeaveError::ToolMissing(_)));
        assert!(matches!(
            tools.runoverlay(temp.path(), temp.path(), temp.path()),
            Err(WeaveError::ToolMissing(_))
        ));
    }
}
