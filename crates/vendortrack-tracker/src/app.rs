//! Wiring of configuration, radio, store and tracking loop.

use std::future::Future;

use tracing::info;
#[cfg(all(feature = "mock-bluetooth", not(feature = "bluetooth")))]
use tracing::warn;
use vendortrack_core::{
    BluetoothConfig, BluetoothResult, FixedLocationSource, PgLocationStore, Result, TrackerConfig,
    Tracker, TrackerError, TrackerStats,
};

#[cfg(not(any(feature = "bluetooth", feature = "mock-bluetooth")))]
compile_error!("enable either the `bluetooth` or the `mock-bluetooth` feature");

/// Validate `config`, initialize the tracker and run it until `shutdown` resolves.
///
/// # Errors
///
/// Returns the first configuration, radio or database error hit before the
/// loop starts. Errors inside the loop are logged and never returned.
pub async fn run<F>(config: &TrackerConfig, shutdown: F) -> Result<TrackerStats>
where
    F: Future<Output = ()>,
{
    config.validate()?;

    let adapter = open_adapter(&config.bluetooth).await?;
    let tracker = Tracker::initialize(
        adapter,
        &config.bluetooth,
        || PgLocationStore::open(&config.database),
        FixedLocationSource::new(config.tracking.fixed_location),
        &config.tracking,
    )
    .await?;

    Ok(tracker.run_until(shutdown).await)
}

#[cfg(feature = "bluetooth")]
async fn open_adapter(config: &BluetoothConfig) -> BluetoothResult<vendortrack_core::BluerAdapter> {
    vendortrack_core::BluerAdapter::open(config.adapter.as_deref()).await
}

// Development hosts without BlueZ: pretend the configured beacon is in range.
#[cfg(all(feature = "mock-bluetooth", not(feature = "bluetooth")))]
async fn open_adapter(config: &BluetoothConfig) -> BluetoothResult<vendortrack_core::MockAdapter> {
    warn!("using mock bluetooth adapter");
    Ok(vendortrack_core::MockAdapter::new(vec![
        vendortrack_core::DiscoveredDevice::with_address(config.target_address.clone()),
    ]))
}

/// Termination signals, registered when constructed.
///
/// Install this before initialization so a Ctrl-C or SIGTERM arriving during
/// the scan is held until the loop next checks for shutdown instead of killing
/// the process with the beacon still connected.
pub struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: tokio::signal::windows::CtrlC,
}

impl ShutdownSignal {
    /// Register the signal handlers. Must be called inside the tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if a handler cannot be registered.
    #[cfg(unix)]
    pub fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Register the signal handlers. Must be called inside the tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if a handler cannot be registered.
    #[cfg(windows)]
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    /// Resolves on the first Ctrl-C, or SIGTERM on Unix.
    #[cfg(unix)]
    pub async fn recv(mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => info!("received ctrl-c"),
            _ = self.terminate.recv() => info!("received SIGTERM"),
        }
    }

    /// Resolves on the first Ctrl-C.
    #[cfg(windows)]
    pub async fn recv(mut self) {
        self.ctrl_c.recv().await;
        info!("received ctrl-c");
    }
}

/// Short description of where a fatal error came from, for the exit log line.
#[must_use]
pub const fn failure_stage(err: &TrackerError) -> &'static str {
    if err.is_config_error() {
        "invalid configuration"
    } else if err.is_bluetooth_error() {
        "bluetooth setup failed"
    } else if err.is_database_error() {
        "database setup failed"
    } else {
        "initialization failed"
    }
}
