//! Scratch area owned by a single update run.
//!
//! Layout under the staging root:
//!
//! ```text
//! <root>/<archive_name>   downloaded release archive
//! <root>/extract/         unpacked archive contents
//! <root>/backup/          copies of preserved files
//! ```

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Staging directory for downloads, extraction and backups.
#[derive(Debug)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    /// Clear and recreate the staging area at `root`.
    ///
    /// Anything left behind by an earlier (possibly failed) run is removed
    /// first so it cannot leak into this one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Staging`] if the old tree cannot be removed or the
    /// new directories cannot be created.
    pub fn prepare(root: &Path) -> Result<Self> {
        let staging_err = |source| Error::Staging {
            path: root.to_path_buf(),
            source,
        };

        if root.symlink_metadata().is_ok() {
            debug!("Clearing stale staging area at {}", root.display());
            remove_path(root).map_err(staging_err)?;
        }

        let staging = Self {
            root: root.to_path_buf(),
        };
        std::fs::create_dir_all(staging.extract_dir()).map_err(staging_err)?;
        std::fs::create_dir_all(staging.backup_dir()).map_err(staging_err)?;
        Ok(staging)
    }

    /// Root of the staging area.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the downloaded archive is written.
    #[must_use]
    pub fn archive_path(&self, archive_name: &str) -> PathBuf {
        self.root.join(archive_name)
    }

    /// Destination for the unpacked archive.
    #[must_use]
    pub fn extract_dir(&self) -> PathBuf {
        self.root.join("extract")
    }

    /// Holding area for preserved-file backups.
    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.root.join("backup")
    }

    /// Remove the staging area. Failures are logged, not returned.
    pub fn cleanup(self) {
        if let Err(e) = std::fs::remove_dir_all(&self.root) {
            warn!(
                "Could not remove staging area {}: {e}",
                self.root.display()
            );
        }
    }
}

/// Remove a file, symlink or directory tree at `path`.
pub(crate) fn remove_path(path: &Path) -> std::io::Result<()> {
    let meta = path.symlink_metadata()?;
    if meta.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}
