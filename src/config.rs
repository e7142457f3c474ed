//! Configuration for waypoint-updater.
//!
//! The compiled-in [`UpdaterConfig::default`] is the fixed configuration the
//! updater ships with. A TOML file and CLI flags may override it; the result
//! is built once at startup and passed by reference to every component.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

/// Directory name of the installed application bundle.
const DEFAULT_BUNDLE_NAME: &str = "WayPointDB AirTags.app";

/// Release asset holding the zipped bundle.
const DEFAULT_ARCHIVE_NAME: &str = "WayPointDB-AirTags.zip";

/// User state carried across updates, relative to the bundle root.
const DEFAULT_PRESERVED_FILES: &[&str] = &[
    "Contents/Resources/waypointdb_findmy_config.json",
    "Contents/Resources/pending_data.json",
];

/// A GitHub repository identifier in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId {
    owner: String,
    name: String,
}

impl RepoId {
    /// Repository owner (user or organisation).
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for RepoId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.split_once('/') {
            Some((owner, name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(crate::Error::Config(format!(
                "repository must be in owner/name form, got '{s}'"
            ))),
        }
    }
}

impl TryFrom<String> for RepoId {
    type Error = crate::Error;

    fn try_from(s: String) -> crate::Result<Self> {
        s.parse()
    }
}

impl From<RepoId> for String {
    fn from(repo: RepoId) -> Self {
        repo.to_string()
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A file path, relative to the bundle root, whose content survives updates.
///
/// Only plain relative paths are accepted: no root, no drive prefix, no `.`
/// or `..` components. This keeps every backup and restore inside the bundle
/// and the staging area.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "PathBuf", into = "PathBuf")]
pub struct PreservedPath(PathBuf);

impl PreservedPath {
    /// Validate and wrap a relative path.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the path is empty or contains
    /// anything other than normal components.
    pub fn new(path: impl Into<PathBuf>) -> crate::Result<Self> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(crate::Error::Config(
                "preserved path must not be empty".to_string(),
            ));
        }
        if !path.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(crate::Error::Config(format!(
                "preserved path must be a plain relative path: {}",
                path.display()
            )));
        }
        Ok(Self(path))
    }

    /// The relative path.
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Resolve this path under `root`.
    #[must_use]
    pub fn under(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }
}

impl TryFrom<PathBuf> for PreservedPath {
    type Error = crate::Error;

    fn try_from(path: PathBuf) -> crate::Result<Self> {
        Self::new(path)
    }
}

impl From<PreservedPath> for PathBuf {
    fn from(p: PreservedPath) -> Self {
        p.0
    }
}

impl fmt::Display for PreservedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.display().fmt(f)
    }
}

/// Updater configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    /// Repository publishing the releases.
    pub repository: RepoId,

    /// Directory name of the application bundle under `install_dir`.
    pub bundle_name: String,

    /// Exact filename of the release asset to download.
    pub archive_name: String,

    /// Directory the bundle is installed into.
    pub install_dir: PathBuf,

    /// Scratch directory owned by a single run.
    pub staging_dir: PathBuf,

    /// Files carried over from the old bundle into the new one.
    pub preserved_files: Vec<PreservedPath>,

    /// Base URL of the release-hosting API.
    pub api_base_url: String,

    /// User-Agent header sent with every request.
    pub user_agent: String,

    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds (covers the archive download).
    pub request_timeout_secs: u64,

    /// Register the bundle as a login item on first install.
    pub register_login_item: bool,

    /// Stop before downloading when the installed version matches the release.
    pub skip_if_current: bool,

    /// Log level.
    pub log_level: String,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            repository: RepoId {
                owner: "waypointdb".to_string(),
                name: "waypointdb-airtags".to_string(),
            },
            bundle_name: DEFAULT_BUNDLE_NAME.to_string(),
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            install_dir: default_install_dir(),
            staging_dir: default_staging_dir(),
            preserved_files: DEFAULT_PRESERVED_FILES
                .iter()
                .map(|p| PreservedPath(PathBuf::from(p)))
                .collect(),
            api_base_url: default_api_base_url(),
            user_agent: default_user_agent(),
            connect_timeout_secs: 15,
            request_timeout_secs: 300,
            register_login_item: true,
            skip_if_current: false,
            log_level: default_log_level(),
        }
    }
}

fn default_install_dir() -> PathBuf {
    PathBuf::from("/Applications")
}

fn default_staging_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "waypoint-updater")
        .map(|dirs| dirs.cache_dir().join("staging"))
        .unwrap_or_else(|| std::env::temp_dir().join("waypoint-updater-staging"))
}

fn default_api_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_user_agent() -> String {
    format!("waypoint-updater/{}", env!("CARGO_PKG_VERSION"))
}

fn default_log_level() -> String {
    "info".to_string()
}

impl UpdaterConfig {
    /// Path of the installed bundle (`install_dir/bundle_name`).
    #[must_use]
    pub fn bundle_path(&self) -> PathBuf {
        self.install_dir.join(&self.bundle_name)
    }

    /// Check the invariants the pipeline relies on.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the bundle or archive name is not a
    /// single path component, or if the staging area overlaps the bundle.
    pub fn validate(&self) -> crate::Result<()> {
        ensure_file_name("bundle_name", &self.bundle_name)?;
        ensure_file_name("archive_name", &self.archive_name)?;

        let bundle = self.bundle_path();
        if self.staging_dir.starts_with(&bundle) || bundle.starts_with(&self.staging_dir) {
            return Err(crate::Error::Config(format!(
                "staging dir {} overlaps the installed bundle {}",
                self.staging_dir.display(),
                bundle.display()
            )));
        }
        Ok(())
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn ensure_file_name(field: &str, value: &str) -> crate::Result<()> {
    let mut components = Path::new(value).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(crate::Error::Config(format!(
            "{field} must be a single file name, got '{value}'"
        ))),
    }
}
