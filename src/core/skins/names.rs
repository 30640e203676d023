use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::core::downloader::Downloader;
use crate::core::error::WeaveResult;

/// Identifier string (`"1000"`, `"1001"`, ...) to English display name.
pub type NameDirectory = HashMap<String, String>;

/// Where the name directory comes from.
#[async_trait]
pub trait NameSource: Send + Sync {
    async fn fetch(&self) -> WeaveResult<NameDirectory>;
}

/// Remote JSON object served over HTTP.
pub struct HttpNameSource {
    downloader: Downloader,
    url: String,
}

impl HttpNameSource {
    pub fn new(downloader: Downloader, url: impl Into<String>) -> Self {
        Self {
            downloader,
            url: url.into(),
        }
    }
}

#[async_trait]
impl NameSource for HttpNameSource {
    async fn fetch(&self) -> WeaveResult<NameDirectory> {
        let body = self.downloader.fetch_text(&self.url).await?;
        let directory: NameDirectory = serde_json::from_str(&body)?;
        debug!("Fetched {} skin names from {}", directory.len(), self.url);
        Ok(directory)
    }
}

/// Names looked up for one asset. Empty strings mean "not in the directory".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedNames {
    pub category: String,
    pub variant: String,
    pub sub_variant: String,
}

/// Process-lifetime cache of the name directory.
///
/// The first successful fetch is kept; concurrent first callers share a
/// single in-flight fetch. A failed fetch leaves the cache empty so the next
/// call tries again.
pub struct NameCache {
    source: Arc<dyn NameSource>,
    cell: Mutex<Arc<OnceCell<Arc<NameDirectory>>>>,
}

impl NameCache {
    pub fn new(source: Arc<dyn NameSource>) -> Self {
        Self {
            source,
            cell: Mutex::new(Arc::new(OnceCell::new())),
        }
    }

    pub async fn directory(&self) -> WeaveResult<Arc<NameDirectory>> {
        let cell = self.current_cell();
        let directory = cell
            .get_or_try_init(|| async { self.source.fetch().await.map(Arc::new) })
            .await?;
        Ok(directory.clone())
    }

    /// Forget the cached directory.
    pub fn reset(&self) {
        *self.lock() = Arc::new(OnceCell::new());
    }

    /// Category name comes from `category_id * 1000`. With a non-zero base
    /// variant the pair is (parent, child): the variant name is the base's
    /// and the sub-variant name is `variant_id`'s.
    pub async fn resolve(
        &self,
        category_id: u32,
        variant_id: u32,
        base_variant_id: Option<u32>,
    ) -> ResolvedNames {
        let directory = match self.directory().await {
            Ok(directory) => directory,
            Err(err) => {
                warn!("Skin names unavailable, using caller names: {}", err);
                return ResolvedNames::default();
            }
        };
        resolve_from(&directory, category_id, variant_id, base_variant_id)
    }

    fn current_cell(&self) -> Arc<OnceCell<Arc<NameDirectory>>> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Arc<OnceCell<Arc<NameDirectory>>>> {
        self.cell
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn resolve_from(
    directory: &NameDirectory,
    category_id: u32,
    variant_id: u32,
    base_variant_id: Option<u32>,
) -> ResolvedNames {
    let lookup = |id: u64| directory.get(&id.to_string()).cloned().unwrap_or_default();
    let category = lookup(u64::from(category_id) * 1000);
    match base_variant_id.filter(|base| *base != 0) {
        Some(base) => ResolvedNames {
            category,
            variant: lookup(u64::from(base)),
            sub_variant: lookup(u64::from(variant_id)),
        },
        None => ResolvedNames {
            category,
            variant: lookup(u64::from(variant_id)),
            sub_variant: String::new(),
        },
    }
}
