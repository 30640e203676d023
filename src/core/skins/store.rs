use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, instrument};

use super::names::{NameCache, ResolvedNames};
use crate::core::downloader::Downloader;
use crate::core::error::{WeaveError, WeaveResult};

/// Archive formats the asset host serves, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Fantome,
}

impl ArchiveKind {
    pub const PREFERENCE: [ArchiveKind; 2] = [ArchiveKind::Zip, ArchiveKind::Fantome];

    pub fn extension(self) -> &'static str {
        match self {
            ArchiveKind::Zip => "zip",
            ArchiveKind::Fantome => "fantome",
        }
    }
}

/// One downloadable asset. The optional names are hints from the caller;
/// names found in the directory take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetIdentity {
    pub category_id: u32,
    pub variant_id: u32,
    pub base_variant_id: Option<u32>,
    /// Name of the variant (the skin).
    pub display_name: Option<String>,
    /// Name of the category the variant belongs to (the champion).
    pub parent_display_name: Option<String>,
    /// Name of the sub-variant when `base_variant_id` is set (the chroma).
    pub sub_variant_display_name: Option<String>,
}

impl AssetIdentity {
    pub fn new(category_id: u32, variant_id: u32) -> Self {
        Self {
            category_id,
            variant_id,
            ..Default::default()
        }
    }

    pub fn with_base(mut self, base_variant_id: u32) -> Self {
        self.base_variant_id = Some(base_variant_id);
        self
    }

    /// Base variant, with `0` treated as absent.
    pub fn base(&self) -> Option<u32> {
        self.base_variant_id.filter(|base| *base != 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAssetFile {
    pub category_id: u32,
    pub variant_id: u32,
    pub local_path: PathBuf,
    pub kind: ArchiveKind,
}

/// Names that end up in the remote path after merging directory and caller
/// names.
#[derive(Debug, Default)]
struct RemoteNames {
    category: String,
    variant: String,
    sub_variant: String,
}

impl RemoteNames {
    fn merge(resolved: ResolvedNames, identity: &AssetIdentity) -> Self {
        let pick = |authoritative: String, hint: &Option<String>| {
            if authoritative.is_empty() {
                hint.clone().unwrap_or_default()
            } else {
                authoritative
            }
        };
        Self {
            category: pick(resolved.category, &identity.parent_display_name),
            variant: pick(resolved.variant, &identity.display_name),
            sub_variant: pick(resolved.sub_variant, &identity.sub_variant_display_name),
        }
    }

    fn is_usable(&self) -> bool {
        !self.category.is_empty() && !self.variant.is_empty()
    }
}

/// Local cache of asset archives backed by the remote asset host.
pub struct AssetStore {
    skins_dir: PathBuf,
    base_url: String,
    downloader: Downloader,
    names: Arc<NameCache>,
}

impl AssetStore {
    pub fn new(
        skins_dir: impl Into<PathBuf>,
        base_url: impl Into<String>,
        downloader: Downloader,
        names: Arc<NameCache>,
    ) -> Self {
        Self {
            skins_dir: skins_dir.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            downloader,
            names,
        }
    }

    /// `skins/<category>/<variant>/<variant>.<ext>`
    pub fn local_path(&self, category_id: u32, variant_id: u32, kind: ArchiveKind) -> PathBuf {
        self.skins_dir
            .join(category_id.to_string())
            .join(variant_id.to_string())
            .join(format!("{variant_id}.{}", kind.extension()))
    }

    /// Filesystem-only check for a previously downloaded archive.
    pub fn cached_path(&self, category_id: u32, variant_id: u32) -> Option<CachedAssetFile> {
        ArchiveKind::PREFERENCE.into_iter().find_map(|kind| {
            let local_path = self.local_path(category_id, variant_id, kind);
            local_path.is_file().then_some(CachedAssetFile {
                category_id,
                variant_id,
                local_path,
                kind,
            })
        })
    }

    /// Cached archive if present, otherwise a fresh download.
    pub async fn obtain(&self, identity: &AssetIdentity) -> WeaveResult<CachedAssetFile> {
        if let Some(cached) = self.cached_path(identity.category_id, identity.variant_id) {
            debug!("Using cached asset {:?}", cached.local_path);
            return Ok(cached);
        }
        self.download(identity).await
    }

    /// Try every layout and extension in order; the first HTTP 200 wins.
    #[instrument(skip(self), fields(category = identity.category_id, variant = identity.variant_id))]
    pub async fn download(&self, identity: &AssetIdentity) -> WeaveResult<CachedAssetFile> {
        let resolved = self
            .names
            .resolve(identity.category_id, identity.variant_id, identity.base())
            .await;
        let names = RemoteNames::merge(resolved, identity);

        for (url, kind) in self.candidate_urls(identity, &names) {
            let dest = self.local_path(identity.category_id, identity.variant_id, kind);
            match self.downloader.download_file(&url, &dest).await {
                Ok(bytes) => {
                    info!("Downloaded asset from {} ({} bytes)", url, bytes);
                    return Ok(CachedAssetFile {
                        category_id: identity.category_id,
                        variant_id: identity.variant_id,
                        local_path: dest,
                        kind,
                    });
                }
                Err(err) if err.is_recoverable() => debug!("{} unavailable: {}", url, err),
                Err(err) => return Err(err),
            }
        }

        Err(WeaveError::NotFound(format!(
            "asset {}/{} on the asset host",
            identity.category_id, identity.variant_id
        )))
    }

    /// Named layout first (when both names are known), then the numeric one;
    /// each with every archive kind.
    fn candidate_urls(
        &self,
        identity: &AssetIdentity,
        names: &RemoteNames,
    ) -> Vec<(String, ArchiveKind)> {
        let mut urls = Vec::with_capacity(4);
        if names.is_usable() {
            for kind in ArchiveKind::PREFERENCE {
                urls.push((self.named_url(names, kind), kind));
            }
        }
        for kind in ArchiveKind::PREFERENCE {
            urls.push((self.numeric_url(identity, kind), kind));
        }
        urls
    }

    fn named_url(&self, names: &RemoteNames, kind: ArchiveKind) -> String {
        let seg = |s: &str| urlencoding::encode(s).into_owned();
        let ext = kind.extension();
        if names.sub_variant.is_empty() {
            format!(
                "{}/{}/{}/{}.{ext}",
                self.base_url,
                seg(&names.category),
                seg(&names.variant),
                seg(&names.variant),
            )
        } else {
            format!(
                "{}/{}/{}/{}/{}.{ext}",
                self.base_url,
                seg(&names.category),
                seg(&names.variant),
                seg(&names.sub_variant),
                seg(&names.sub_variant),
            )
        }
    }

    fn numeric_url(&self, identity: &AssetIdentity, kind: ArchiveKind) -> String {
        let ext = kind.extension();
        let (cat, var) = (identity.category_id, identity.variant_id);
        match identity.base() {
            Some(base) => format!("{}/{cat}/{base}/{var}/{var}.{ext}", self.base_url),
            None => format!("{}/{cat}/{var}/{var}.{ext}", self.base_url),
        }
    }
}
