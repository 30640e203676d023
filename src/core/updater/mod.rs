// ─── Update & Bootstrap ───
// The launcher process swaps a staged download into the core executable
// before starting it; the core process checks for and stages new releases.
// A pending update is never flagged explicitly: a staged file of plausible
// size is the flag.

pub mod release;
pub mod version;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::downloader::Downloader;
use crate::core::error::{WeaveError, WeaveResult};
use crate::core::paths::AppPaths;

pub use version::{is_newer, needs_reinstall};

/// Smallest file accepted as a real executable.
pub const MIN_ARTIFACT_SIZE: u64 = 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateCheck {
    pub available: bool,
    pub current_version: String,
    pub latest_version: String,
    pub download_url: Option<String>,
    pub downloaded: bool,
}

pub struct Updater {
    downloader: Downloader,
    release_url: String,
    asset_name: String,
    version_file: PathBuf,
    update_file: PathBuf,
    staged_tag_file: PathBuf,
    core_file: PathBuf,
    min_artifact_size: u64,
}

impl Updater {
    pub fn new(
        paths: &AppPaths,
        downloader: Downloader,
        release_url: impl Into<String>,
        asset_name: impl Into<String>,
    ) -> Self {
        Self {
            downloader,
            release_url: release_url.into(),
            asset_name: asset_name.into(),
            version_file: paths.version_file(),
            update_file: paths.update_file(),
            staged_tag_file: staged_tag_path(&paths.update_file()),
            core_file: paths.core_file(),
            min_artifact_size: MIN_ARTIFACT_SIZE,
        }
    }

    pub fn with_min_artifact_size(mut self, bytes: u64) -> Self {
        self.min_artifact_size = bytes;
        self
    }

    pub fn core_path(&self) -> &Path {
        &self.core_file
    }

    pub fn update_path(&self) -> &Path {
        &self.update_file
    }

    // ── Version file ────────────────────────────────────

    pub fn saved_version(&self) -> Option<String> {
        let raw = std::fs::read_to_string(&self.version_file).ok()?;
        let version = raw.trim();
        (!version.is_empty()).then(|| version.to_string())
    }

    pub fn save_version(&self, version: &str) -> WeaveResult<()> {
        if let Some(parent) = self.version_file.parent() {
            std::fs::create_dir_all(parent).map_err(|source| WeaveError::io(parent, source))?;
        }
        std::fs::write(&self.version_file, version.trim())
            .map_err(|source| WeaveError::io(&self.version_file, source))
    }

    pub fn needs_reinstall(&self, current_version: &str) -> bool {
        needs_reinstall(self.saved_version().as_deref(), current_version)
    }

    // ── Check & stage ───────────────────────────────────

    /// Query the release index and, when it is newer, stage its artifact.
    #[instrument(skip(self))]
    pub async fn check_for_update(&self, current_version: &str) -> WeaveResult<UpdateCheck> {
        let release =
            release::fetch_latest_release(self.downloader.client(), &self.release_url).await?;
        let asset = release.asset(&self.asset_name);
        let mut check = UpdateCheck {
            available: is_newer(current_version, &release.tag_name),
            current_version: current_version.to_string(),
            latest_version: release.tag_name.clone(),
            download_url: asset.map(|a| a.browser_download_url.clone()),
            downloaded: false,
        };

        if !check.available {
            debug!("Up to date ({} >= {})", current_version, release.tag_name);
            return Ok(check);
        }
        let Some(asset) = asset else {
            warn!(
                "Release {} has no asset named {}",
                release.tag_name, self.asset_name
            );
            return Ok(check);
        };

        if self.staged_version().as_deref() == Some(release.tag_name.as_str()) {
            debug!("Update {} already staged", release.tag_name);
            check.downloaded = true;
            return Ok(check);
        }

        info!("Downloading update {}", release.tag_name);
        let written = self
            .downloader
            .download_file(&asset.browser_download_url, &self.update_file)
            .await?;
        if written < self.min_artifact_size {
            self.cleanup_update_file();
            return Err(WeaveError::Integrity(format!(
                "update artifact is only {written} bytes"
            )));
        }

        if let Some(sums) = release.asset(release::CHECKSUMS_ASSET) {
            if let Err(err) = self.verify_checksum(&sums.browser_download_url).await {
                self.cleanup_update_file();
                return Err(err);
            }
        }

        std::fs::write(&self.staged_tag_file, &release.tag_name)
            .map_err(|source| WeaveError::io(&self.staged_tag_file, source))?;
        check.downloaded = true;
        info!("Update {} staged at {:?}", release.tag_name, self.update_file);
        Ok(check)
    }

    async fn verify_checksum(&self, sums_url: &str) -> WeaveResult<()> {
        let body = self.downloader.fetch_text(sums_url).await?;
        let sums = release::parse_checksums(&body);
        let expected = sums.get(&self.asset_name).ok_or_else(|| {
            WeaveError::Integrity(format!("no checksum published for {}", self.asset_name))
        })?;
        let actual = Downloader::sha256_file(&self.update_file).await?;
        if &actual != expected {
            return Err(WeaveError::Integrity(format!(
                "checksum mismatch for {}",
                self.asset_name
            )));
        }
        debug!("Checksum verified for {}", self.asset_name);
        Ok(())
    }

    /// A staged artifact exists and is large enough to be an executable.
    pub fn verify_update_file(&self) -> bool {
        std::fs::metadata(&self.update_file)
            .map(|m| m.is_file() && m.len() >= self.min_artifact_size)
            .unwrap_or(false)
    }

    /// Release tag of the staged artifact, if one is staged and valid.
    pub fn staged_version(&self) -> Option<String> {
        if !self.verify_update_file() {
            return None;
        }
        let raw = std::fs::read_to_string(&self.staged_tag_file).ok()?;
        let tag = raw.trim();
        (!tag.is_empty()).then(|| tag.to_string())
    }

    pub fn cleanup_update_file(&self) {
        for path in [&self.update_file, &self.staged_tag_file] {
            if let Err(err) = std::fs::remove_file(path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not remove {:?}: {}", path, err);
                }
            }
        }
    }

    // ── Apply & bootstrap ───────────────────────────────

    /// Move the staged artifact onto the core executable. Must run while
    /// core is not executing. Returns whether anything was applied.
    #[instrument(skip(self))]
    pub fn apply_pending_update(&self) -> WeaveResult<bool> {
        if !self.verify_update_file() {
            return Ok(false);
        }

        if let Err(err) = std::fs::remove_file(&self.core_file) {
            if err.kind() != std::io::ErrorKind::NotFound {
                return Err(WeaveError::io(&self.core_file, err));
            }
        }

        if let Err(err) = std::fs::rename(&self.update_file, &self.core_file) {
            debug!("Rename failed ({}), copying instead", err);
            std::fs::copy(&self.update_file, &self.core_file)
                .map_err(|source| WeaveError::io(&self.core_file, source))?;
        }
        self.cleanup_update_file();
        set_executable(&self.core_file)?;

        info!("Applied pending update to {:?}", self.core_file);
        Ok(true)
    }

    /// Copy `src_exe` to the core path unless a core already exists.
    /// Returns whether a copy was made.
    pub fn bootstrap_core(&self, src_exe: &Path) -> WeaveResult<bool> {
        if self.core_file.is_file() {
            return Ok(false);
        }
        if let Some(parent) = self.core_file.parent() {
            std::fs::create_dir_all(parent).map_err(|source| WeaveError::io(parent, source))?;
        }
        std::fs::copy(src_exe, &self.core_file)
            .map_err(|source| WeaveError::io(&self.core_file, source))?;
        set_executable(&self.core_file)?;
        info!("Bootstrapped core executable from {:?}", src_exe);
        Ok(true)
    }
}

/// `<update file>.tag`, holding the release tag of the staged artifact.
fn staged_tag_path(update_file: &Path) -> PathBuf {
    let mut name = update_file.file_name().unwrap_or_default().to_os_string();
    name.push(".tag");
    update_file.with_file_name(name)
}

fn set_executable(path: &Path) -> WeaveResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)
            .map_err(|source| WeaveError::io(path, source))?
            .permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms).map_err(|source| WeaveError::io(path, source))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;
    use sha2::{Digest, Sha256};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ASSET: &str = "skinweave-test-asset";
    const MIN: u64 = 2048;

    fn updater(server: &MockServer, root: &Path) -> Updater {
        Updater::new(
            &AppPaths::new(root),
            Downloader::new(Client::new()),
            format!("{}/releases/latest", server.uri()),
            ASSET,
        )
        .with_min_artifact_size(MIN)
    }

    async fn mount_release(server: &MockServer, tag: &str, with_sums: bool) {
        let mut assets = vec![serde_json::json!({
            "name": ASSET,
            "browser_download_url": format!("{}/download/{ASSET}", server.uri()),
        })];
        if with_sums {
            assets.push(serde_json::json!({
                "name": release::CHECKSUMS_ASSET,
                "browser_download_url": format!("{}/download/sums", server.uri()),
            }));
        }
        Mock::given(method("GET"))
            .and(path("/releases/latest"))
            .and(header("accept", "application/vnd.github.v3+json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tag_name": tag,
                "assets": assets,
            })))
            .mount(server)
            .await;
    }

    async fn mount_artifact(server: &MockServer, body: Vec<u8>, hits: u64) {
        Mock::given(method("GET"))
            .and(path(format!("/download/{ASSET}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .expect(hits)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn newer_release_is_downloaded_and_staged() {
        let server = MockServer::start().await;
        mount_release(&server, "v1.3.0", false).await;
        mount_artifact(&server, vec![1u8; 4096], 1).await;
        let temp = tempfile::tempdir().expect("tempdir");
        let updater = updater(&server, temp.path());

        let check = updater.check_for_update("v1.2.0").await.expect("check");

        assert!(check.available && check.downloaded);
        assert_eq!(check.latest_version, "v1.3.0");
        assert!(updater.verify_update_file());
    }

    #[tokio::test]
    async fn staged_release_is_not_downloaded_again() {
        let server = MockServer::start().await;
        mount_release(&server, "v1.3.0", false).await;
        mount_artifact(&server, vec![1u8; 4096], 1).await;
        let temp = tempfile::tempdir().expect("tempdir");
        let updater = updater(&server, temp.path());

        assert!(updater.check_for_update("v1.2.0").await.expect("first").downloaded);
        assert_eq!(updater.staged_version().as_deref(), Some("v1.3.0"));

        let again = updater.check_for_update("v1.2.0").await.expect("second");
        assert!(again.available && again.downloaded);
        assert!(updater.verify_update_file());
    }

    #[tokio::test]
    async fn staged_file_of_another_release_is_replaced() {
        let server = MockServer::start().await;
        mount_release(&server, "v1.4.0", false).await;
        mount_artifact(&server, vec![4u8; 4096], 1).await;
        let temp = tempfile::tempdir().expect("tempdir");
        let updater = updater(&server, temp.path());
        std::fs::write(updater.update_path(), vec![3u8; 4096]).expect("old staged");
        std::fs::write(staged_tag_path(updater.update_path()), "v1.3.0").expect("old tag");

        assert!(updater.check_for_update("v1.2.0").await.expect("check").downloaded);
        assert_eq!(updater.staged_version().as_deref(), Some("v1.4.0"));
        assert_eq!(std::fs::read(updater.update_path()).expect("staged")[0], 4u8);
    }

    #[tokio::test]
    async fn current_release_downloads_nothing() {
        let server = MockServer::start().await;
        mount_release(&server, "v1.2.0", false).await;
        mount_artifact(&server, vec![1u8; 4096], 0).await;
        let temp = tempfile::tempdir().expect("tempdir");

        let check = updater(&server, temp.path())
            .check_for_update("v1.2.0")
            .await
            .expect("check");
        assert!(!check.available);
        assert!(!check.downloaded);
    }

    #[tokio::test]
    async fn undersized_artifact_is_rejected_as_corrupt() {
        let server = MockServer::start().await;
        mount_release(&server, "v2.0.0", false).await;
        mount_artifact(&server, vec![1u8; 100], 1).await;
        let temp = tempfile::tempdir().expect("tempdir");
        let updater = updater(&server, temp.path());

        let err = updater.check_for_update("v1.0.0").await.expect_err("too small");

        assert!(matches!(err, WeaveError::Integrity(_)));
        assert!(!updater.update_path().exists());
        assert!(!updater.apply_pending_update().expect("apply"));
    }

    #[tokio::test]
    async fn published_checksum_must_match() {
        let server = MockServer::start().await;
        mount_release(&server, "v2.0.0", true).await;
        let body = vec![9u8; 4096];
        mount_artifact(&server, body.clone(), 2).await;
        let good = hex::encode(Sha256::digest(&body));
        Mock::given(method("GET"))
            .and(path("/download/sums"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("{good}  {ASSET}\n")))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/download/sums"))
            .respond_with(ResponseTemplate::new(200).set_body_string(format!("{}  {ASSET}\n", "0".repeat(64))))
            .mount(&server)
            .await;
        let temp = tempfile::tempdir().expect("tempdir");
        let updater = updater(&server, temp.path());

        assert!(updater.check_for_update("v1.0.0").await.expect("first").downloaded);

        updater.cleanup_update_file();
        let err = updater.check_for_update("v1.0.0").await.expect_err("mismatch");
        assert!(matches!(err, WeaveError::Integrity(_)));
        assert!(!updater.update_path().exists());
    }

    #[test]
    fn pending_update_replaces_core() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(temp.path());
        let updater = Updater::new(&paths, Downloader::new(Client::new()), "unused", ASSET)
            .with_min_artifact_size(MIN);
        std::fs::write(paths.core_file(), b"old core").expect("core");
        std::fs::write(paths.update_file(), vec![2u8; MIN as usize]).expect("staged");
        std::fs::write(staged_tag_path(&paths.update_file()), "v9.0.0").expect("tag");

        assert!(updater.apply_pending_update().expect("apply"));
        assert_eq!(std::fs::read(paths.core_file()).expect("core").len(), MIN as usize);
        assert!(!paths.update_file().exists());
        assert_eq!(updater.staged_version(), None);
        assert!(!staged_tag_path(&paths.update_file()).exists());
        assert!(!updater.apply_pending_update().expect("nothing left"));
    }

    #[test]
    fn undersized_staged_file_is_not_applied() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(temp.path());
        let updater = Updater::new(&paths, Downloader::new(Client::new()), "unused", ASSET);
        std::fs::write(paths.update_file(), vec![2u8; 4096]).expect("staged");

        assert!(!updater.verify_update_file());
        assert!(!updater.apply_pending_update().expect("apply"));
        assert!(!paths.core_file().exists());
    }

    #[test]
    fn bootstrap_copies_only_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(temp.path().join("data"));
        let updater = Updater::new(&paths, Downloader::new(Client::new()), "unused", ASSET);
        let exe = temp.path().join("skinweave-bin");
        std::fs::write(&exe, b"binary v1").expect("exe");

        assert!(updater.bootstrap_core(&exe).expect("bootstrap"));
        std::fs::write(&exe, b"binary v2").expect("exe");
        assert!(!updater.bootstrap_core(&exe).expect("second"));
        assert_eq!(std::fs::read(updater.core_path()).expect("core"), b"binary v1");
    }

    #[test]
    fn saved_version_drives_reinstall() {
        let temp = tempfile::tempdir().expect("tempdir");
        let updater = Updater::new(
            &AppPaths::new(temp.path()),
            Downloader::new(Client::new()),
            "unused",
            ASSET,
        );
        assert_eq!(updater.saved_version(), None);
        assert!(!updater.needs_reinstall("v1.1.0"));

        updater.save_version("v1.0.0\n").expect("save");
        assert_eq!(updater.saved_version().as_deref(), Some("v1.0.0"));
        assert!(updater.needs_reinstall("v1.1.0"));
        assert!(!updater.needs_reinstall("v1.0.0"));
    }
}
