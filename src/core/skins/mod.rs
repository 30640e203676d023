pub mod extract;
pub mod names;
pub mod store;

pub use extract::{extract_archive, extract_archive_async};
pub use names::{HttpNameSource, NameCache, NameDirectory, NameSource, ResolvedNames};
pub use store::{ArchiveKind, AssetIdentity, AssetStore, CachedAssetFile};
