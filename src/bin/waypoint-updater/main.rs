//! waypoint-updater CLI entry point.

mod cli;

use clap::Parser;
use cli::Cli;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use waypoint_updater::upgrade::StepStatus;
use waypoint_updater::{UpdateOutcome, UpdaterBuilder};

fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments and build configuration
    let config = Cli::parse().into_config()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    info!("waypoint-updater v{}", env!("CARGO_PKG_VERSION"));

    let updater = UpdaterBuilder::new(config).build()?;

    match updater.run()? {
        UpdateOutcome::UpToDate { version } => {
            info!("Already up to date ({version})");
        }
        UpdateOutcome::Applied(report) => {
            for path in &report.restored {
                info!("Kept {}", path.display());
            }
            for path in &report.skipped {
                info!("Not present before the update, left as shipped: {}", path.display());
            }
            if let StepStatus::Failed(reason) = &report.finalize.provenance {
                warn!("Quarantine flag may still be set: {reason}");
            }
            match &report.finalize.login_item {
                StepStatus::Done => info!("Registered as a login item"),
                StepStatus::Failed(reason) => warn!("Login item not registered: {reason}"),
                StepStatus::Skipped => {}
            }
            info!("Finished {} to {}", report.mode, report.release_tag);
        }
    }

    Ok(())
}
