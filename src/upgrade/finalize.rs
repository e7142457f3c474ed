//! Post-install steps: quarantine clearing and login-item registration.
//!
//! Both steps are best-effort. By the time they run the new bundle is already
//! in place, so their failures are recorded in [`FinalizeReport`] and logged
//! instead of being returned as errors.

use crate::error::{Error, Result};
use crate::upgrade::InstallMode;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info, warn};

/// Removes OS provenance metadata (e.g. the quarantine flag) from a bundle.
pub trait ProvenanceCleaner {
    /// Clear provenance metadata recursively under `bundle`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Finalize`] if the metadata could not be cleared.
    fn clear(&self, bundle: &Path) -> Result<()>;
}

/// Registers a bundle to launch at user login.
pub trait LoginItemRegistrar {
    /// Register `bundle` as a login item.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Finalize`] if registration failed.
    fn register(&self, bundle: &Path) -> Result<()>;
}

/// Clears extended attributes with `xattr -cr`.
#[derive(Debug, Default, Clone, Copy)]
pub struct XattrCleaner;

impl ProvenanceCleaner for XattrCleaner {
    fn clear(&self, bundle: &Path) -> Result<()> {
        let path = bundle.to_string_lossy();
        run_command("xattr", &["-cr", path.as_ref()])
    }
}

/// Adds a login item through System Events via `osascript`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AppleScriptLoginItems;

impl LoginItemRegistrar for AppleScriptLoginItems {
    fn register(&self, bundle: &Path) -> Result<()> {
        let script = login_item_script(bundle);
        run_command("osascript", &["-e", script.as_str()])
    }
}

/// Stand-in for platforms without either mechanism.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unsupported;

impl ProvenanceCleaner for Unsupported {
    fn clear(&self, _bundle: &Path) -> Result<()> {
        Err(Error::Finalize(
            "provenance clearing is not supported on this platform".to_string(),
        ))
    }
}

impl LoginItemRegistrar for Unsupported {
    fn register(&self, _bundle: &Path) -> Result<()> {
        Err(Error::Finalize(
            "login items are not supported on this platform".to_string(),
        ))
    }
}

/// Provenance cleaner for the current platform.
#[must_use]
pub fn platform_provenance_cleaner() -> Box<dyn ProvenanceCleaner> {
    if cfg!(target_os = "macos") {
        Box::new(XattrCleaner)
    } else {
        Box::new(Unsupported)
    }
}

/// Login-item registrar for the current platform.
#[must_use]
pub fn platform_login_items() -> Box<dyn LoginItemRegistrar> {
    if cfg!(target_os = "macos") {
        Box::new(AppleScriptLoginItems)
    } else {
        Box::new(Unsupported)
    }
}

fn login_item_script(bundle: &Path) -> String {
    let escaped = bundle
        .to_string_lossy()
        .replace('\\', "\\\\")
        .replace('"', "\\\"");
    format!(
        "tell application \"System Events\" to make login item at end \
         with properties {{path:\"{escaped}\", hidden:false}}"
    )
}

fn run_command(program: &str, args: &[&str]) -> Result<()> {
    debug!("Running {program} {}", args.join(" "));

    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| Error::Finalize(format!("cannot run {program}: {e}")))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(Error::Finalize(format!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// Outcome of one best-effort step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// The step ran and succeeded.
    Done,
    /// The step did not apply to this run.
    Skipped,
    /// The step ran and failed; the run still counts as successful.
    Failed(String),
}

/// What the finalizer did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeReport {
    /// Quarantine / provenance clearing.
    pub provenance: StepStatus,
    /// Login-item registration.
    pub login_item: StepStatus,
}

/// Runs the post-install steps against the installed bundle.
pub struct Finalizer {
    cleaner: Box<dyn ProvenanceCleaner>,
    login_items: Box<dyn LoginItemRegistrar>,
    register_login_item: bool,
}

impl Finalizer {
    /// Create a finalizer from its collaborators.
    #[must_use]
    pub fn new(
        cleaner: Box<dyn ProvenanceCleaner>,
        login_items: Box<dyn LoginItemRegistrar>,
        register_login_item: bool,
    ) -> Self {
        Self {
            cleaner,
            login_items,
            register_login_item,
        }
    }

    /// Clear provenance metadata and, on first install, register the login
    /// item. Never fails.
    #[must_use]
    pub fn finalize(&self, bundle: &Path, mode: InstallMode) -> FinalizeReport {
        let provenance = match self.cleaner.clear(bundle) {
            Ok(()) => {
                debug!("Cleared provenance metadata on {}", bundle.display());
                StepStatus::Done
            }
            Err(e) => {
                warn!("Could not clear provenance metadata: {e}");
                StepStatus::Failed(e.to_string())
            }
        };

        let login_item = if mode == InstallMode::FirstInstall && self.register_login_item {
            match self.login_items.register(bundle) {
                Ok(()) => {
                    info!("Registered {} to open at login", bundle.display());
                    StepStatus::Done
                }
                Err(e) => {
                    warn!("Could not register login item: {e}");
                    StepStatus::Failed(e.to_string())
                }
            }
        } else {
            StepStatus::Skipped
        };

        FinalizeReport {
            provenance,
            login_item,
        }
    }
}
