//! Error types for waypoint-updater.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during an install or update run.
#[derive(Error, Debug)]
pub enum Error {
    /// No matching release asset could be resolved.
    #[error("release not found: {0}")]
    ReleaseNotFound(String),

    /// The release archive could not be downloaded.
    #[error("download failed: {0}")]
    DownloadFailed(String),

    /// The archive could not be unpacked or lacks the expected bundle.
    #[error("malformed archive: {0}")]
    MalformedArchive(String),

    /// The staging area could not be cleared or created.
    #[error("cannot prepare staging area {}: {source}", path.display())]
    Staging {
        /// Staging root.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An existing preserved file could not be backed up.
    #[error("failed to back up preserved file {}: {source}", path.display())]
    Backup {
        /// Path of the preserved file, relative to the bundle root.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Replacing the installed bundle failed.
    #[error("bundle swap failed: {0}")]
    Swap(String),

    /// One or more preserved files could not be restored.
    #[error(
        "failed to restore {} preserved file(s); backups kept in {}",
        failed.len(),
        backup_dir.display()
    )]
    Restore {
        /// Preserved paths whose restore failed.
        failed: Vec<PathBuf>,
        /// Directory still holding the backed-up copies.
        backup_dir: PathBuf,
    },

    /// A best-effort finalization step failed.
    #[error("finalize error: {0}")]
    Finalize(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error was raised before the installed bundle was touched.
    ///
    /// When `true` the bundle at the install path is exactly as it was before
    /// the run started.
    #[must_use]
    pub fn is_pre_destructive(&self) -> bool {
        matches!(
            self,
            Self::ReleaseNotFound(_)
                | Self::DownloadFailed(_)
                | Self::MalformedArchive(_)
                | Self::Staging { .. }
                | Self::Backup { .. }
                | Self::Config(_)
        )
    }
}
