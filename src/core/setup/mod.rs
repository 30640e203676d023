// ─── Dependency installation ───
// Overlay tool set, client plugin and loader. Each step is a no-op when its
// marker file is already present, except the plugin which is refreshed on
// demand after an update.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::core::downloader::Downloader;
use crate::core::error::{WeaveError, WeaveResult};
use crate::core::overlay::{ModTools, TOOL_FILES};
use crate::core::paths::AppPaths;
use crate::core::skins::extract_archive_async;
use crate::core::state::Settings;

pub const PENGU_EXE: &str = "Pengu Loader.exe";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SetupReport {
    pub tools_installed: bool,
    pub pengu_installed: bool,
    pub plugin_files: Option<usize>,
}

pub struct Setup {
    paths: AppPaths,
    downloader: Downloader,
    tools_url: String,
    plugin_url: String,
    pengu_url: String,
}

impl Setup {
    pub fn new(paths: AppPaths, downloader: Downloader, settings: &Settings) -> Self {
        Self {
            paths,
            downloader,
            tools_url: settings.tools_url.trim_end_matches('/').to_string(),
            plugin_url: settings.plugin_url.clone(),
            pengu_url: settings.pengu_url.clone(),
        }
    }

    /// Layout, tools, loader, and the plugin when it has never been installed.
    pub async fn run(&self) -> WeaveResult<SetupReport> {
        self.paths.ensure_layout()?;
        let tools_installed = self.ensure_tools().await?;
        let pengu_installed = self.ensure_pengu().await?;
        let plugin_files = if self.plugin_installed() {
            None
        } else {
            Some(self.install_plugin().await?)
        };
        Ok(SetupReport {
            tools_installed,
            pengu_installed,
            plugin_files,
        })
    }

    /// Download the tool set unless the overlay tool is present. Every file
    /// is attempted; any failure fails the step. Returns whether anything
    /// was downloaded.
    pub async fn ensure_tools(&self) -> WeaveResult<bool> {
        let tools = ModTools::new(self.paths.tools_dir());
        if tools.exists() {
            info!("mod-tools already installed");
            return Ok(false);
        }

        info!("Downloading mod-tools from {}", self.tools_url);
        let mut first_error: Option<WeaveError> = None;
        for file in TOOL_FILES {
            let url = format!("{}/{}", self.tools_url, file);
            let dest = self.paths.tools_dir().join(file);
            if let Err(err) = self.downloader.download_file(&url, &dest).await {
                warn!("Failed to download {}: {}", file, err);
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                info!("mod-tools installed");
                Ok(true)
            }
        }
    }

    pub fn plugin_installed(&self) -> bool {
        std::fs::read_dir(self.paths.plugin_dir())
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }

    /// Replace the plugin directory with a fresh copy of the plugin archive.
    /// Returns the number of files installed.
    pub async fn install_plugin(&self) -> WeaveResult<usize> {
        info!("Installing plugin");
        let archive = self.paths.root().join("plugin.zip");
        self.downloader.download_file(&self.plugin_url, &archive).await?;

        let plugin_dir = self.paths.plugin_dir();
        if plugin_dir.exists() {
            std::fs::remove_dir_all(&plugin_dir)
                .map_err(|source| WeaveError::io(&plugin_dir, source))?;
        }
        let result = extract_archive_async(archive.clone(), plugin_dir).await;
        remove_quietly(archive);
        let files = result?;
        info!("Plugin installed ({} files)", files);
        Ok(files)
    }

    pub fn pengu_exe(&self) -> PathBuf {
        self.paths.pengu_dir().join(PENGU_EXE)
    }

    /// Download and unpack the loader unless its executable exists.
    pub async fn ensure_pengu(&self) -> WeaveResult<bool> {
        if self.pengu_exe().is_file() {
            info!("Pengu Loader already installed");
            return Ok(false);
        }

        info!("Downloading Pengu Loader");
        let archive = self.paths.root().join("pengu.zip");
        self.downloader.download_file(&self.pengu_url, &archive).await?;
        let result = extract_archive_async(archive.clone(), self.paths.pengu_dir()).await;
        remove_quietly(archive);
        result?;
        info!("Pengu Loader installed");
        Ok(true)
    }
}

fn remove_quietly(path: PathBuf) {
    if let Err(err) = std::fs::remove_file(&path) {
        warn!("Could not remove {:?}: {}", path, err);
    }
}
