//! # waypoint-updater
//!
//! Installs and updates the WayPointDB AirTags application bundle from its
//! latest GitHub release.
//!
//! A run is a single linear pipeline:
//!
//! 1. Locate the latest release archive ([`upgrade::ReleaseLocator`])
//! 2. Download it into the staging area ([`upgrade::Fetcher`])
//! 3. Unpack the new bundle ([`upgrade::Extractor`])
//! 4. Back up the preserved files, swap the bundle, restore them
//!    ([`upgrade::StatePreserver`])
//! 5. Clear quarantine metadata and, on first install, register the bundle
//!    as a login item ([`upgrade::Finalizer`])
//!
//! Every network and extraction step happens inside the staging area, so a
//! failure in steps 1-3 leaves the installed bundle untouched.
//!
//! ## Example
//!
//! ```rust,ignore
//! use waypoint_updater::{UpdaterBuilder, UpdaterConfig};
//!
//! let updater = UpdaterBuilder::new(UpdaterConfig::default()).build()?;
//! let outcome = updater.run()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod bundle;
pub mod config;
pub mod error;
pub mod staging;
pub mod updater;
pub mod upgrade;

pub use bundle::AppBundle;
pub use config::{PreservedPath, RepoId, UpdaterConfig};
pub use error::{Error, Result};
pub use staging::StagingArea;
pub use updater::{Updater, UpdaterBuilder};
pub use upgrade::{InstallMode, ReleaseAsset, UpdateOutcome, UpdateReport};
