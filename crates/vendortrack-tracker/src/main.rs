//! # vendortrack-tracker
//!
//! Connects to a vendor's BLE beacon and records the vendor's location in a
//! PostGIS table at a fixed interval.
//!
//! ## Running
//!
//! ```bash
//! # Development (no BlueZ required)
//! cargo run --package vendortrack-tracker --no-default-features --features mock-bluetooth
//!
//! # Production
//! VENDORTRACK_CONFIG=/etc/vendortrack/config.toml ./vendortrack-tracker
//! ```
//!
//! Exits with status 0 after Ctrl-C/SIGTERM and 1 on any initialization failure.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use tracing::{error, info};
use vendortrack_core::TrackerConfig;
use vendortrack_tracker::{app, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = TrackerConfig::load()?;

    logging::init(&config.logging)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        target_address = %config.bluetooth.target_address,
        database = ?config.database,
        "Starting vendortrack-tracker"
    );

    // Registered before the scan so an early Ctrl-C still ends in a clean shutdown.
    let shutdown = app::ShutdownSignal::install()?;

    match app::run(&config, shutdown.recv()).await {
        Ok(stats) => {
            info!(
                writes_succeeded = stats.writes_succeeded,
                writes_failed = stats.writes_failed,
                "vendortrack-tracker exiting"
            );
            Ok(())
        }
        Err(err) => {
            error!(
                error = %err,
                code = err.error_code(),
                "{}",
                app::failure_stage(&err)
            );
            Err(err.into())
        }
    }
}
