use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::core::error::{WeaveError, WeaveResult};
use crate::core::paths::normalize_lexically;

/// Unpack a zip-compatible archive (`.zip`, `.fantome`) into `dest`.
///
/// Every entry is checked before anything is written: a single entry whose
/// normalized destination falls outside `dest` rejects the whole archive.
/// Returns the number of files written.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> WeaveResult<usize> {
    let file = std::fs::File::open(archive_path)
        .map_err(|source| WeaveError::io(archive_path, source))?;
    let mut archive = zip::ZipArchive::new(file)?;
    let root = normalize_lexically(dest);

    let mut plan: Vec<(usize, PathBuf, bool)> = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        if let Some(target) = entry_target(&root, entry.name(), entry.is_dir())? {
            plan.push((index, target, entry.is_dir()));
        }
    }

    std::fs::create_dir_all(&root).map_err(|source| WeaveError::io(&root, source))?;

    let mut written = 0;
    for (index, target, is_dir) in plan {
        if is_dir {
            std::fs::create_dir_all(&target).map_err(|source| WeaveError::io(&target, source))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|source| WeaveError::io(parent, source))?;
        }
        let mut entry = archive.by_index(index)?;
        let mut out =
            std::fs::File::create(&target).map_err(|source| WeaveError::io(&target, source))?;
        std::io::copy(&mut entry, &mut out).map_err(|source| WeaveError::io(&target, source))?;
        written += 1;
    }

    debug!("Extracted {} file(s) from {:?} into {:?}", written, archive_path, root);
    Ok(written)
}

/// Async wrapper running the extraction on the blocking pool.
pub async fn extract_archive_async(archive_path: PathBuf, dest: PathBuf) -> WeaveResult<usize> {
    tokio::task::spawn_blocking(move || extract_archive(&archive_path, &dest))
        .await
        .map_err(|e| WeaveError::Other(format!("extraction task failed: {e}")))?
}

/// Destination of one entry, or `None` for a directory entry naming the
/// destination itself (`./`).
fn entry_target(root: &Path, name: &str, is_dir: bool) -> WeaveResult<Option<PathBuf>> {
    let relative = PathBuf::from(name.replace('\\', "/"));
    let rooted = relative
        .components()
        .any(|c| matches!(c, Component::RootDir | Component::Prefix(_)));
    let target = normalize_lexically(&root.join(&relative));
    if !rooted && is_dir && target == root {
        return Ok(None);
    }
    if rooted || !target.starts_with(root) || target == root {
        return Err(WeaveError::Integrity(format!(
            "archive entry {name:?} escapes the destination directory"
        )));
    }
    Ok(Some(target))
}
