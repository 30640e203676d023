use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::core::error::{WeaveError, WeaveResult};

/// Streaming downloader shared by the asset cache, setup and the updater.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    // ── Single file download ────────────────────────────

    /// Stream `url` into `dest` and return the number of bytes written.
    ///
    /// Only HTTP 200 counts as success. The body goes to a uniquely named
    /// sibling file that is renamed onto `dest` after a complete write, so a
    /// failed transfer never leaves a file under the final name.
    pub async fn download_file(&self, url: &str, dest: &Path) -> WeaveResult<u64> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| WeaveError::io(parent, source))?;
        }

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(WeaveError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let partial = partial_path(dest);
        let written = match stream_to_file(response, &partial).await {
            Ok(written) => written,
            Err(err) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(err);
            }
        };

        if let Err(source) = tokio::fs::rename(&partial, dest).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(WeaveError::io(dest, source));
        }

        debug!("Downloaded: {} -> {:?} ({} bytes)", url, dest, written);
        Ok(written)
    }

    /// GET `url` and return the body as text; any non-200 status is an error.
    pub async fn fetch_text(&self, url: &str) -> WeaveResult<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(WeaveError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }

    /// Hex-encoded SHA-256 of a file on disk.
    pub async fn sha256_file(path: &Path) -> WeaveResult<String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| WeaveError::io(path, source))?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dest.with_file_name(format!(".{name}.{}.part", uuid::Uuid::new_v4()))
}

async fn stream_to_file(response: reqwest::Response, path: &Path) -> WeaveResult<u64> {
    // Scoped so the handle is closed before the rename (Windows refuses to
    // rename open files).
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|source| WeaveError::io(path, source))?;
    let mut written = 0u64;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|source| WeaveError::io(path, source))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|source| WeaveError::io(path, source))?;
    Ok(written)
}
