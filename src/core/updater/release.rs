use std::collections::HashMap;

use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::core::error::{WeaveError, WeaveResult};

pub const CHECKSUMS_ASSET: &str = "SHA256SUMS.txt";
const UPDATER_AGENT: &str = "skinweave-updater";

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
}

impl Release {
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|asset| asset.name == name)
    }
}

pub async fn fetch_latest_release(client: &Client, url: &str) -> WeaveResult<Release> {
    let response = client
        .get(url)
        .header(ACCEPT, "application/vnd.github.v3+json")
        .header(USER_AGENT, UPDATER_AGENT)
        .send()
        .await?;
    let status = response.status();
    if status != StatusCode::OK {
        return Err(WeaveError::DownloadFailed {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response.json::<Release>().await?)
}

/// `<hex>  <file name>` lines, as written by `sha256sum`.
pub fn parse_checksums(body: &str) -> HashMap<String, String> {
    body.lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let hash = parts.next()?;
            let name = parts.next()?.trim_start_matches('*');
            Some((name.to_string(), hash.to_lowercase()))
        })
        .collect()
}
