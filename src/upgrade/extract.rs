//! Archive extraction.

use crate::error::{Error, Result};
use crate::staging::remove_path;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::{debug, warn};

/// Unix file-type bits for a symbolic link.
const S_IFLNK: u32 = 0o120_000;
const S_IFMT: u32 = 0o170_000;

/// Unpacks a release archive.
pub trait Extractor {
    /// Unpack every entry of `archive` into `dest`, replacing conflicting
    /// entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedArchive`] if the archive cannot be read or
    /// an entry cannot be written.
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;
}

/// Pick an extractor from the archive filename.
///
/// `.tar.gz` and `.tgz` use [`TarGzExtractor`]; everything else is treated
/// as zip.
#[must_use]
pub fn extractor_for(archive_name: &str) -> Box<dyn Extractor> {
    let lower = archive_name.to_ascii_lowercase();
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        Box::new(TarGzExtractor)
    } else {
        Box::new(ZipExtractor)
    }
}

/// Zip archives, the format the application is published in.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipExtractor;

impl Extractor for ZipExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let file = File::open(archive).map_err(|e| {
            Error::MalformedArchive(format!("cannot open {}: {e}", archive.display()))
        })?;
        let mut zip = zip::ZipArchive::new(file)
            .map_err(|e| Error::MalformedArchive(format!("{}: {e}", archive.display())))?;

        debug!("Extracting {} entries into {}", zip.len(), dest.display());

        for index in 0..zip.len() {
            let mut entry = zip
                .by_index(index)
                .map_err(|e| Error::MalformedArchive(format!("entry {index}: {e}")))?;

            let Some(relative) = entry.enclosed_name() else {
                warn!("Skipping entry with unsafe path: {}", entry.name());
                continue;
            };
            let name = entry.name().to_string();
            reject_symlink_ancestors(dest, &relative)
                .map_err(|e| Error::MalformedArchive(format!("cannot extract {name}: {e}")))?;
            let target = dest.join(&relative);
            let mode = entry.unix_mode();

            let written = if entry.is_dir() {
                ensure_dir(&target)
            } else if mode.is_some_and(|m| m & S_IFMT == S_IFLNK) {
                let mut link = String::new();
                io::Read::read_to_string(&mut entry, &mut link)
                    .and_then(|_| write_symlink(&target, &link))
            } else {
                write_file(&target, &mut entry, mode)
            };

            written.map_err(|e| Error::MalformedArchive(format!("cannot extract {name}: {e}")))?;
        }

        Ok(())
    }
}

/// Gzip-compressed tarballs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarGzExtractor;

impl Extractor for TarGzExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let file = File::open(archive).map_err(|e| {
            Error::MalformedArchive(format!("cannot open {}: {e}", archive.display()))
        })?;

        let mut tarball = tar::Archive::new(GzDecoder::new(file));
        tarball.set_overwrite(true);
        tarball.set_preserve_permissions(true);
        tarball
            .unpack(dest)
            .map_err(|e| Error::MalformedArchive(format!("{}: {e}", archive.display())))
    }
}

/// Entries may not be written through a symlink created by an earlier
/// entry, otherwise they could land outside `dest`.
fn reject_symlink_ancestors(dest: &Path, relative: &Path) -> io::Result<()> {
    for ancestor in relative.ancestors().skip(1) {
        if ancestor.as_os_str().is_empty() {
            continue;
        }
        let path = dest.join(ancestor);
        if path
            .symlink_metadata()
            .is_ok_and(|meta| meta.file_type().is_symlink())
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a symlink", ancestor.display()),
            ));
        }
    }
    Ok(())
}

fn ensure_dir(target: &Path) -> io::Result<()> {
    if let Ok(meta) = target.symlink_metadata() {
        if meta.is_dir() {
            return Ok(());
        }
        remove_path(target)?;
    }
    std::fs::create_dir_all(target)
}

fn clear_target(target: &Path) -> io::Result<()> {
    if target.symlink_metadata().is_ok() {
        remove_path(target)?;
    }
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn write_file(target: &Path, reader: &mut impl io::Read, mode: Option<u32>) -> io::Result<()> {
    clear_target(target)?;
    let mut out = File::create(target)?;
    io::copy(reader, &mut out)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Some(mode) = mode.filter(|m| m & 0o777 != 0) {
            std::fs::set_permissions(target, std::fs::Permissions::from_mode(mode & 0o7777))?;
        }
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

#[cfg(unix)]
fn write_symlink(target: &Path, link: &str) -> io::Result<()> {
    clear_target(target)?;
    std::os::unix::fs::symlink(link, target)
}

#[cfg(not(unix))]
fn write_symlink(target: &Path, link: &str) -> io::Result<()> {
    // Without symlink support, store the link target as file content.
    write_file(target, &mut link.as_bytes(), None)
}
