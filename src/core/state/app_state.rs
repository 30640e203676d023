use std::sync::Arc;

use tracing::info;

use crate::core::client::{ClientLiaison, ProcessCredentialSource};
use crate::core::downloader::Downloader;
use crate::core::error::WeaveResult;
use crate::core::game::{GameTarget, InstallCache, Locator, SystemRegistry, SystemVolumes};
use crate::core::http::{build_http_client, build_loopback_client};
use crate::core::overlay::{ModTools, OverlayOrchestrator};
use crate::core::paths::AppPaths;
use crate::core::pipeline::Pipeline;
use crate::core::process::{ProcessTable, SystemProcessTable};
use crate::core::setup::Setup;
use crate::core::skins::{AssetStore, HttpNameSource, NameCache};
use crate::core::updater::Updater;

use super::settings::ConfigStore;

/// Version of the running binary, compared against release tags.
pub const CURRENT_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

/// Process-wide services. The caches live here, so every component built
/// from one `AppState` shares them.
pub struct AppState {
    pub paths: AppPaths,
    pub config: Arc<ConfigStore>,
    pub processes: Arc<dyn ProcessTable>,
    pub install_cache: Arc<InstallCache>,
    pub names: Arc<NameCache>,
    pub downloader: Downloader,
}

impl AppState {
    pub fn new(paths: AppPaths) -> WeaveResult<Self> {
        paths.ensure_layout()?;
        let config = Arc::new(ConfigStore::open(paths.settings_file()));
        let downloader = Downloader::new(build_http_client()?);
        let settings = config.snapshot();
        let names = Arc::new(NameCache::new(Arc::new(HttpNameSource::new(
            downloader.clone(),
            settings.skin_names_url,
        ))));

        info!("Data directory: {:?}", paths.root());
        Ok(Self {
            paths,
            config,
            processes: Arc::new(SystemProcessTable),
            install_cache: Arc::new(InstallCache::default()),
            names,
            downloader,
        })
    }

    pub fn locator(&self) -> Locator {
        Locator::new(
            GameTarget::default(),
            self.install_cache.clone(),
            self.config.clone(),
            self.processes.clone(),
            Arc::new(SystemVolumes),
            Arc::new(SystemRegistry),
        )
    }

    pub fn assets(&self) -> AssetStore {
        AssetStore::new(
            self.paths.skins_dir(),
            self.config.snapshot().skins_base_url,
            self.downloader.clone(),
            self.names.clone(),
        )
    }

    pub fn orchestrator(&self) -> OverlayOrchestrator {
        OverlayOrchestrator::new(ModTools::new(self.paths.tools_dir()), self.processes.clone())
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.paths.clone(),
            self.locator(),
            self.assets(),
            self.orchestrator(),
        )
    }

    pub fn liaison(&self) -> WeaveResult<ClientLiaison> {
        let credentials = ProcessCredentialSource::new(self.processes.clone())?;
        Ok(ClientLiaison::new(
            self.processes.clone(),
            Arc::new(credentials),
            build_loopback_client()?,
        ))
    }

    pub fn updater(&self) -> Updater {
        let settings = self.config.snapshot();
        Updater::new(
            &self.paths,
            self.downloader.clone(),
            settings.release_url,
            settings.release_asset_name,
        )
    }

    pub fn setup(&self) -> Setup {
        Setup::new(
            self.paths.clone(),
            self.downloader.clone(),
            &self.config.snapshot(),
        )
    }
}
