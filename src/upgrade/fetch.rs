//! Archive download.

use crate::config::UpdaterConfig;
use crate::error::{Error, Result};
use reqwest::blocking::Client;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Retrieves a URL to a local file.
pub trait Fetcher {
    /// Download `url` to `dest`, following redirects and overwriting any
    /// existing file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DownloadFailed`] on any transport or HTTP error.
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Build the blocking HTTP client shared by the locator and fetcher.
pub(crate) fn http_client(config: &UpdaterConfig) -> Result<Client> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .build()
        .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))
}

/// Downloads over HTTP(S) with reqwest.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher using an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        info!("Downloading {url}");

        let mut response = self
            .client
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|e| Error::DownloadFailed(e.to_string()))?;

        let file = File::create(dest).map_err(|e| {
            Error::DownloadFailed(format!("cannot create {}: {e}", dest.display()))
        })?;
        let mut writer = BufWriter::new(file);

        let bytes = response
            .copy_to(&mut writer)
            .map_err(|e| Error::DownloadFailed(format!("transfer interrupted: {e}")))?;
        writer
            .flush()
            .map_err(|e| Error::DownloadFailed(format!("cannot write {}: {e}", dest.display())))?;

        debug!("Wrote {bytes} bytes to {}", dest.display());
        Ok(())
    }
}
