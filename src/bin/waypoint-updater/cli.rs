//! Command-line interface definition.

use clap::Parser;
use std::path::PathBuf;
use waypoint_updater::{RepoId, UpdaterConfig};

/// Install or update the WayPointDB AirTags app, keeping its settings and
/// unsent location data.
#[derive(Parser, Debug)]
#[command(name = "waypoint-updater")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Repository to take releases from (owner/name).
    #[arg(long, env = "WAYPOINT_UPDATER_REPOSITORY")]
    pub repository: Option<String>,

    /// Directory the app bundle is installed into.
    #[arg(long, env = "WAYPOINT_UPDATER_INSTALL_DIR")]
    pub install_dir: Option<PathBuf>,

    /// Scratch directory for downloads and backups.
    #[arg(long, env = "WAYPOINT_UPDATER_STAGING_DIR")]
    pub staging_dir: Option<PathBuf>,

    /// Do not register the app as a login item on first install.
    #[arg(long)]
    pub no_login_item: bool,

    /// Do nothing when the installed version matches the latest release.
    #[arg(long)]
    pub skip_if_current: bool,

    /// Log level (defaults to the config file's `log_level`, then "info").
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Convert CLI arguments into an `UpdaterConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded,
    /// or the repository is not in `owner/name` form.
    pub fn into_config(self) -> color_eyre::Result<UpdaterConfig> {
        // Start with compiled-in defaults or load from file
        let mut config = if let Some(ref path) = self.config {
            UpdaterConfig::from_file(path)?
        } else {
            UpdaterConfig::default()
        };

        // Override with CLI arguments
        if let Some(repository) = self.repository {
            config.repository = repository.parse::<RepoId>()?;
        }
        if let Some(install_dir) = self.install_dir {
            config.install_dir = install_dir;
        }
        if let Some(staging_dir) = self.staging_dir {
            config.staging_dir = staging_dir;
        }
        if self.no_login_item {
            config.register_login_item = false;
        }
        if self.skip_if_current {
            config.skip_if_current = true;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }

        Ok(config)
    }
}
