//! Release discovery, download, extraction and the preserving bundle swap.
//!
//! This module handles:
//! - Resolving the latest release archive on GitHub
//! - Downloading and unpacking it into the staging area
//! - Replacing the installed bundle while carrying user state across
//! - Clearing quarantine metadata and registering the login item

mod extract;
mod fetch;
mod finalize;
mod preserve;
mod release;

pub use extract::{extractor_for, Extractor, TarGzExtractor, ZipExtractor};
pub(crate) use fetch::http_client;
pub use fetch::{Fetcher, HttpFetcher};
pub use finalize::{
    platform_login_items, platform_provenance_cleaner, AppleScriptLoginItems, FinalizeReport,
    Finalizer, LoginItemRegistrar, ProvenanceCleaner, StepStatus, Unsupported, XattrCleaner,
};
pub use preserve::{BackupSet, RestoreReport, StatePreserver};
pub use release::{
    select_asset_url, AssetEntry, GitHubReleaseLocator, LatestRelease, ReleaseLocator,
};

use semver::Version;
use std::fmt;
use std::path::PathBuf;

/// A downloadable archive for the latest release.
#[derive(Debug, Clone)]
pub struct ReleaseAsset {
    /// Expected archive filename.
    pub archive_name: String,
    /// Resolved download URL.
    pub download_url: String,
    /// Release tag as published.
    pub tag: String,
    /// Version parsed from the tag, when it is semver.
    pub version: Option<Version>,
}

/// Whether the run installs from scratch or replaces an existing bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    /// No bundle existed at the install path.
    FirstInstall,
    /// An existing bundle was replaced.
    Update,
}

impl fmt::Display for InstallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirstInstall => write!(f, "first install"),
            Self::Update => write!(f, "update"),
        }
    }
}

/// Summary of a completed run.
#[derive(Debug)]
pub struct UpdateReport {
    /// Tag of the installed release.
    pub release_tag: String,
    /// Install or update.
    pub mode: InstallMode,
    /// Preserved files carried over from the old bundle.
    pub restored: Vec<PathBuf>,
    /// Preserved files that did not exist in the old bundle.
    pub skipped: Vec<PathBuf>,
    /// Outcome of the best-effort finalization steps.
    pub finalize: FinalizeReport,
}

/// Result of an updater run.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// The bundle was installed or replaced.
    Applied(UpdateReport),
    /// The installed version already matches the latest release.
    UpToDate {
        /// The current version.
        version: Version,
    },
}

/// Parse a version string leniently: surrounding whitespace and a leading
/// `v` are ignored.
#[must_use]
pub fn parse_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(trimmed).ok()
}
