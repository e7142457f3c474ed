//! The installed application bundle.

use crate::config::UpdaterConfig;
use crate::upgrade::parse_version;
use semver::Version;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Version marker shipped inside the bundle, relative to the bundle root.
const VERSION_FILE: &str = "Contents/Resources/VERSION";

/// The application bundle at its canonical install path.
#[derive(Debug, Clone)]
pub struct AppBundle {
    path: PathBuf,
}

impl AppBundle {
    /// Bundle named `bundle_name` inside `install_dir`.
    #[must_use]
    pub fn new(install_dir: &Path, bundle_name: &str) -> Self {
        Self {
            path: install_dir.join(bundle_name),
        }
    }

    /// Bundle described by the updater configuration.
    #[must_use]
    pub fn from_config(config: &UpdaterConfig) -> Self {
        Self {
            path: config.bundle_path(),
        }
    }

    /// Path of the bundle root.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether anything is installed at the bundle path.
    ///
    /// Uses `symlink_metadata` so a dangling symlink still counts as present
    /// and gets replaced.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.symlink_metadata().is_ok()
    }

    /// Version recorded in the bundle's `VERSION` file, if readable.
    #[must_use]
    pub fn installed_version(&self) -> Option<Version> {
        let marker = self.path.join(VERSION_FILE);
        let raw = match std::fs::read_to_string(&marker) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("No version marker at {}: {e}", marker.display());
                return None;
            }
        };
        parse_version(&raw)
    }
}
