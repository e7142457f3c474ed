//! GitHub release lookup.

use crate::config::RepoId;
use crate::error::{Error, Result};
use crate::upgrade::{parse_version, ReleaseAsset};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info};

/// Resolves the download URL of a release archive.
pub trait ReleaseLocator {
    /// Find `archive_name` in the latest release of `repo`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReleaseNotFound`] if the query fails or no asset
    /// matches.
    fn locate(&self, repo: &RepoId, archive_name: &str) -> Result<ReleaseAsset>;
}

/// Subset of the GitHub "latest release" payload.
#[derive(Debug, Clone, Deserialize)]
pub struct LatestRelease {
    /// Release tag, e.g. `v1.2.0`.
    pub tag_name: String,
    /// Published assets.
    #[serde(default)]
    pub assets: Vec<AssetEntry>,
}

/// One published asset.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetEntry {
    /// Display name of the asset.
    pub name: String,
    /// Direct download URL.
    pub browser_download_url: String,
}

/// Pick the first asset whose download URL ends in exactly `archive_name`.
#[must_use]
pub fn select_asset_url<'a>(release: &'a LatestRelease, archive_name: &str) -> Option<&'a str> {
    release
        .assets
        .iter()
        .map(|asset| asset.browser_download_url.as_str())
        .find(|url| url_file_name(url).as_deref() == Some(archive_name))
}

fn url_file_name(url: &str) -> Option<String> {
    match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(Iterator::last)
            .map(str::to_string),
        Err(_) => url.rsplit('/').next().map(str::to_string),
    }
}

/// Queries the GitHub REST API for the latest release.
pub struct GitHubReleaseLocator {
    api_base_url: String,
    client: Client,
}

impl GitHubReleaseLocator {
    /// Create a locator against `api_base_url` using an existing client.
    #[must_use]
    pub fn new(api_base_url: impl Into<String>, client: Client) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            client,
        }
    }

    fn latest_release_url(&self, repo: &RepoId) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base_url.trim_end_matches('/'),
            repo.owner(),
            repo.name()
        )
    }
}

impl ReleaseLocator for GitHubReleaseLocator {
    fn locate(&self, repo: &RepoId, archive_name: &str) -> Result<ReleaseAsset> {
        let api_url = self.latest_release_url(repo);
        debug!("Fetching latest release from {api_url}");

        let response = self
            .client
            .get(&api_url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .map_err(|e| Error::ReleaseNotFound(format!("query to {api_url} failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::ReleaseNotFound(format!(
                "{repo} has no published release"
            )));
        }

        let release: LatestRelease = response
            .error_for_status()
            .map_err(|e| Error::ReleaseNotFound(e.to_string()))?
            .json()
            .map_err(|e| Error::ReleaseNotFound(format!("unreadable release metadata: {e}")))?;

        let download_url = select_asset_url(&release, archive_name).ok_or_else(|| {
            Error::ReleaseNotFound(format!(
                "release {} of {repo} has no asset named {archive_name}",
                release.tag_name
            ))
        })?;

        info!("Latest release {} provides {archive_name}", release.tag_name);

        Ok(ReleaseAsset {
            archive_name: archive_name.to_string(),
            download_url: download_url.to_string(),
            version: parse_version(&release.tag_name),
            tag: release.tag_name,
        })
    }
}
