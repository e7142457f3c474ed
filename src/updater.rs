//! The install/update pipeline.
//!
//! Stages run strictly in order. Everything up to and including the backup
//! phase only touches the staging area, so any failure there leaves the
//! installed bundle exactly as it was.

use crate::bundle::AppBundle;
use crate::config::UpdaterConfig;
use crate::error::{Error, Result};
use crate::staging::StagingArea;
use crate::upgrade::{
    extractor_for, http_client, platform_login_items, platform_provenance_cleaner, Extractor,
    Fetcher, Finalizer, GitHubReleaseLocator, HttpFetcher, InstallMode, LoginItemRegistrar,
    ProvenanceCleaner, ReleaseLocator, StatePreserver, UpdateOutcome, UpdateReport,
};
use reqwest::blocking::Client;
use tracing::{error, info};

/// Builder for constructing an [`Updater`].
///
/// Collaborators that are not supplied fall back to the real
/// implementations: GitHub over HTTPS, the extractor matching the archive
/// name, and the platform's quarantine and login-item mechanisms.
pub struct UpdaterBuilder {
    config: UpdaterConfig,
    locator: Option<Box<dyn ReleaseLocator>>,
    fetcher: Option<Box<dyn Fetcher>>,
    extractor: Option<Box<dyn Extractor>>,
    cleaner: Option<Box<dyn ProvenanceCleaner>>,
    login_items: Option<Box<dyn LoginItemRegistrar>>,
}

impl UpdaterBuilder {
    /// Create a new builder with the given configuration.
    #[must_use]
    pub fn new(config: UpdaterConfig) -> Self {
        Self {
            config,
            locator: None,
            fetcher: None,
            extractor: None,
            cleaner: None,
            login_items: None,
        }
    }

    /// Use a custom release locator.
    #[must_use]
    pub fn locator(mut self, locator: impl ReleaseLocator + 'static) -> Self {
        self.locator = Some(Box::new(locator));
        self
    }

    /// Use a custom fetcher.
    #[must_use]
    pub fn fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Some(Box::new(fetcher));
        self
    }

    /// Use a custom extractor.
    #[must_use]
    pub fn extractor(mut self, extractor: impl Extractor + 'static) -> Self {
        self.extractor = Some(Box::new(extractor));
        self
    }

    /// Use a custom provenance cleaner.
    #[must_use]
    pub fn provenance_cleaner(mut self, cleaner: impl ProvenanceCleaner + 'static) -> Self {
        self.cleaner = Some(Box::new(cleaner));
        self
    }

    /// Use a custom login-item registrar.
    #[must_use]
    pub fn login_items(mut self, login_items: impl LoginItemRegistrar + 'static) -> Self {
        self.login_items = Some(Box::new(login_items));
        self
    }

    /// Validate the configuration and assemble the updater.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn build(self) -> Result<Updater> {
        self.config.validate()?;

        let mut client = None;
        let locator: Box<dyn ReleaseLocator> = match self.locator {
            Some(locator) => locator,
            None => Box::new(GitHubReleaseLocator::new(
                self.config.api_base_url.clone(),
                shared_client(&mut client, &self.config)?,
            )),
        };
        let fetcher: Box<dyn Fetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Box::new(HttpFetcher::new(shared_client(
                &mut client,
                &self.config,
            )?)),
        };
        let extractor = self
            .extractor
            .unwrap_or_else(|| extractor_for(&self.config.archive_name));
        let finalizer = Finalizer::new(
            self.cleaner.unwrap_or_else(platform_provenance_cleaner),
            self.login_items.unwrap_or_else(platform_login_items),
            self.config.register_login_item,
        );

        Ok(Updater {
            config: self.config,
            locator,
            fetcher,
            extractor,
            finalizer,
        })
    }
}

/// Build the HTTP client once and hand out clones.
fn shared_client(slot: &mut Option<Client>, config: &UpdaterConfig) -> Result<Client> {
    if let Some(client) = slot {
        return Ok(client.clone());
    }
    let client = http_client(config)?;
    *slot = Some(client.clone());
    Ok(client)
}

/// A configured updater ready to run.
pub struct Updater {
    config: UpdaterConfig,
    locator: Box<dyn ReleaseLocator>,
    fetcher: Box<dyn Fetcher>,
    extractor: Box<dyn Extractor>,
    finalizer: Finalizer,
}

impl Updater {
    /// The configuration this updater runs with.
    #[must_use]
    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// Install or update the bundle from the latest release.
    ///
    /// # Errors
    ///
    /// - [`Error::ReleaseNotFound`], [`Error::Staging`],
    ///   [`Error::DownloadFailed`], [`Error::MalformedArchive`] and
    ///   [`Error::Backup`] are raised before the installed bundle is touched.
    /// - [`Error::Swap`] means the old bundle may already be gone; the
    ///   preserved files remain in the staging backup directory.
    /// - [`Error::Restore`] means the new bundle is installed but some
    ///   preserved files still only exist in the staging backup directory.
    pub fn run(&self) -> Result<UpdateOutcome> {
        let config = &self.config;
        let bundle = AppBundle::from_config(config);

        info!("Looking up the latest release of {}", config.repository);
        let asset = self.locator.locate(&config.repository, &config.archive_name)?;
        info!("Latest release: {}", asset.tag);

        if config.skip_if_current {
            if let (Some(installed), Some(latest)) = (bundle.installed_version(), &asset.version) {
                if installed == *latest {
                    info!("Installed version {installed} is already the latest");
                    return Ok(UpdateOutcome::UpToDate { version: installed });
                }
            }
        }

        let staging = StagingArea::prepare(&config.staging_dir)?;
        let archive = staging.archive_path(&config.archive_name);
        self.fetcher.fetch(&asset.download_url, &archive)?;

        info!("Extracting {}", config.archive_name);
        let extract_dir = staging.extract_dir();
        self.extractor.extract(&archive, &extract_dir)?;

        let staged_bundle = extract_dir.join(&config.bundle_name);
        if !staged_bundle.is_dir() {
            return Err(Error::MalformedArchive(format!(
                "{} does not contain {}",
                config.archive_name, config.bundle_name
            )));
        }

        let mode = if bundle.exists() {
            InstallMode::Update
        } else {
            InstallMode::FirstInstall
        };
        info!("Starting {mode} of {}", bundle.path().display());

        let preserver = StatePreserver::new(&config.preserved_files);
        let backup = preserver.backup(bundle.path(), &staging.backup_dir())?;

        if let Err(e) = StatePreserver::swap(&staged_bundle, bundle.path()) {
            error!(
                "Bundle replacement failed; preserved files are kept in {}",
                backup.dir().display()
            );
            return Err(e);
        }

        let restore = preserver.restore(&backup, bundle.path());
        let finalize = self.finalizer.finalize(bundle.path(), mode);

        if !restore.failed.is_empty() {
            error!(
                "Some preserved files were not restored; copies are kept in {}",
                backup.dir().display()
            );
            return Err(Error::Restore {
                failed: restore.failed,
                backup_dir: backup.dir().to_path_buf(),
            });
        }

        let skipped = backup
            .skipped()
            .iter()
            .map(|p| p.as_path().to_path_buf())
            .collect();
        staging.cleanup();

        Ok(UpdateOutcome::Applied(UpdateReport {
            release_tag: asset.tag,
            mode,
            restored: restore.restored,
            skipped,
            finalize,
        }))
    }
}
