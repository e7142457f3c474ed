//! Carries user state across a bundle replacement.
//!
//! The replacement runs in three strictly ordered phases:
//!
//! 1. **Backup**: copy every preserved file that exists in the installed
//!    bundle into the staging backup directory. Missing files are skipped.
//!    Copy failures for files that *do* exist abort the run here, before
//!    anything is deleted.
//! 2. **Swap**: remove the installed bundle and move the freshly extracted
//!    one into its place. This is the only destructive step.
//! 3. **Restore**: copy each backed-up file over whatever the new bundle
//!    shipped at the same relative path.
//!
//! Paths that were absent before the update stay untouched afterwards: no
//! backup entry is produced for them, so the new bundle's default (if any)
//! is left as shipped.

use crate::config::PreservedPath;
use crate::error::{Error, Result};
use crate::staging::remove_path;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Preserved files captured from the old bundle.
#[derive(Debug)]
pub struct BackupSet {
    dir: PathBuf,
    entries: Vec<PreservedPath>,
    skipped: Vec<PreservedPath>,
}

impl BackupSet {
    /// Directory holding the backed-up copies.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths that were backed up.
    #[must_use]
    pub fn entries(&self) -> &[PreservedPath] {
        &self.entries
    }

    /// Paths that did not exist as regular files in the old bundle.
    #[must_use]
    pub fn skipped(&self) -> &[PreservedPath] {
        &self.skipped
    }
}

/// Outcome of the restore phase.
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Paths restored into the new bundle.
    pub restored: Vec<PathBuf>,
    /// Paths whose restore failed.
    pub failed: Vec<PathBuf>,
}

/// Backs up, swaps and restores around a bundle replacement.
#[derive(Debug, Clone, Copy)]
pub struct StatePreserver<'a> {
    preserved: &'a [PreservedPath],
}

impl<'a> StatePreserver<'a> {
    /// Create a preserver for a fixed set of relative paths.
    #[must_use]
    pub fn new(preserved: &'a [PreservedPath]) -> Self {
        Self { preserved }
    }

    /// Phase 1: copy existing preserved files from `bundle_root` into
    /// `backup_dir`.
    ///
    /// Performs no writes under `bundle_root`. A missing bundle (first
    /// install) yields an empty backup set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backup`] if a preserved file exists but cannot be
    /// inspected or copied.
    pub fn backup(&self, bundle_root: &Path, backup_dir: &Path) -> Result<BackupSet> {
        let mut entries = Vec::new();
        let mut skipped = Vec::new();

        for preserved in self.preserved {
            let source = preserved.under(bundle_root);
            let backup_err = |err| Error::Backup {
                path: preserved.as_path().to_path_buf(),
                source: err,
            };

            match std::fs::metadata(&source) {
                Ok(meta) if meta.is_file() => {
                    copy_file(&source, &preserved.under(backup_dir)).map_err(backup_err)?;
                    debug!("Backed up {preserved}");
                    entries.push(preserved.clone());
                }
                Ok(_) => {
                    warn!("{preserved} is not a regular file, not preserving it");
                    skipped.push(preserved.clone());
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("{preserved} not present, nothing to back up");
                    skipped.push(preserved.clone());
                }
                Err(e) => return Err(backup_err(e)),
            }
        }

        info!(
            "Backed up {} preserved file(s), {} absent",
            entries.len(),
            skipped.len()
        );

        Ok(BackupSet {
            dir: backup_dir.to_path_buf(),
            entries,
            skipped,
        })
    }

    /// Phase 2: replace `installed` with `staged`.
    ///
    /// Removes the installed tree (if any) and moves the staged bundle into
    /// its place. When a plain rename is not possible, for instance because
    /// staging lives on another volume, the staged tree is copied instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Swap`] if the staged bundle is missing, the old
    /// bundle cannot be removed, or the new one cannot be put in place.
    pub fn swap(staged: &Path, installed: &Path) -> Result<()> {
        if !staged.is_dir() {
            return Err(Error::Swap(format!(
                "staged bundle {} is not a directory",
                staged.display()
            )));
        }

        if installed.symlink_metadata().is_ok() {
            remove_path(installed).map_err(|e| {
                Error::Swap(format!("cannot remove {}: {e}", installed.display()))
            })?;
            debug!("Removed old bundle at {}", installed.display());
        }

        if let Some(parent) = installed.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Swap(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        if let Err(e) = std::fs::rename(staged, installed) {
            debug!("Rename failed ({e}), copying bundle into place instead");
            copy_tree(staged, installed).map_err(|e| {
                Error::Swap(format!(
                    "cannot copy {} to {}: {e}",
                    staged.display(),
                    installed.display()
                ))
            })?;
            if let Err(e) = std::fs::remove_dir_all(staged) {
                warn!("Could not remove staged bundle {}: {e}", staged.display());
            }
        }

        info!("Installed new bundle at {}", installed.display());
        Ok(())
    }

    /// Phase 3: copy every backed-up file into `bundle_root`, overwriting
    /// what the new bundle shipped.
    ///
    /// Every entry is attempted; failures are collected in the report rather
    /// than stopping the phase.
    #[must_use]
    pub fn restore(&self, backup: &BackupSet, bundle_root: &Path) -> RestoreReport {
        let mut report = RestoreReport::default();

        let backed_up = self
            .preserved
            .iter()
            .filter(|p| backup.entries.contains(p));

        for preserved in backed_up {
            let source = preserved.under(&backup.dir);
            let target = preserved.under(bundle_root);

            match copy_file(&source, &target) {
                Ok(()) => {
                    debug!("Restored {preserved}");
                    report.restored.push(preserved.as_path().to_path_buf());
                }
                Err(e) => {
                    warn!("Failed to restore {preserved}: {e}");
                    report.failed.push(preserved.as_path().to_path_buf());
                }
            }
        }

        report
    }
}

/// Copy a regular file, creating parent directories and replacing whatever
/// occupies `to`.
fn copy_file(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if let Ok(meta) = to.symlink_metadata() {
        if !meta.is_file() {
            remove_path(to)?;
        }
    }
    std::fs::copy(from, to)?;
    Ok(())
}

/// Recursively copy a directory tree, keeping symlinks as symlinks.
fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    std::fs::create_dir_all(to)?;

    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let source = entry.path();
        let target = to.join(entry.file_name());
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            copy_tree(&source, &target)?;
        } else if file_type.is_symlink() {
            copy_symlink(&source, &target)?;
        } else {
            std::fs::copy(&source, &target)?;
        }
    }

    let perms = std::fs::metadata(from)?.permissions();
    std::fs::set_permissions(to, perms)
}

#[cfg(unix)]
fn copy_symlink(source: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(std::fs::read_link(source)?, target)
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, target: &Path) -> io::Result<()> {
    std::fs::copy(source, target).map(|_| ())
}
