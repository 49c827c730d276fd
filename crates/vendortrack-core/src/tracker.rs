//! The tracking loop.
//!
//! Acquires the radio session, then the location store, then writes one
//! location row per interval until asked to stop:
//!
//! ```text
//! Initializing ──ok──▶ Running ──shutdown──▶ Terminated
//!      │                  │ ▲
//!      │ fatal error      └─┘ tick: read, write, sleep (write errors logged)
//!      ▼
//!  Terminated (session released if the store failed)
//! ```
//!
//! There is no path back to `Initializing`: a connection lost mid-loop shows
//! up as repeated write errors until the process is stopped.

use std::fmt;
use std::future::Future;

use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::bluetooth::{RadioAdapter, RadioSession};
use crate::config::{BluetoothConfig, TrackingConfig};
use crate::error::{Result, TrackerError};
use crate::location::LocationSource;
use crate::storage::{LocationStore, StoreResult};
use crate::types::{VendorLocationRecord, WriteAck};

/// Lifecycle of a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Acquiring the radio session and the store.
    Initializing,
    /// Writing locations.
    Running,
    /// Resources released.
    Terminated,
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Terminated => "terminated",
        })
    }
}

/// Counters accumulated while running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    /// Rows inserted.
    pub writes_succeeded: u64,
    /// Inserts rejected by the store.
    pub writes_failed: u64,
    /// Iterations skipped because no reading was available.
    pub reads_failed: u64,
}

/// What a single iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The row was inserted.
    Written(WriteAck),
    /// The store rejected the row.
    WriteFailed,
    /// No reading was available, nothing was written.
    ReadFailed,
}

/// A running tracker holding the radio session and the store.
pub struct Tracker<A: RadioAdapter, S: LocationStore, L: LocationSource> {
    session: RadioSession<A>,
    store: S,
    source: L,
    vendor_name: String,
    interval: Duration,
    stats: TrackerStats,
}

impl<A, S, L> Tracker<A, S, L>
where
    A: RadioAdapter,
    S: LocationStore,
    L: LocationSource,
{
    /// Open the radio session, then the store.
    ///
    /// If the store cannot be opened the radio session is closed before the
    /// error is returned, so a failed initialization holds nothing.
    ///
    /// # Errors
    ///
    /// Any radio or database error raised while acquiring the resources. All
    /// of them are fatal.
    pub async fn initialize<F, Fut>(
        adapter: A,
        bluetooth: &BluetoothConfig,
        open_store: F,
        source: L,
        tracking: &TrackingConfig,
    ) -> Result<Self>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<S>>,
    {
        info!(state = %TrackerState::Initializing, "acquiring radio session and store");

        let session = RadioSession::open(adapter, bluetooth).await?;

        let store = match open_store().await {
            Ok(store) => store,
            Err(err) => {
                release_session(session).await;
                return Err(err.into());
            }
        };

        info!(
            state = %TrackerState::Running,
            vendor = %tracking.vendor_name,
            interval_secs = tracking.interval_secs,
            "tracker initialized"
        );

        Ok(Self {
            session,
            store,
            source,
            vendor_name: tracking.vendor_name.clone(),
            interval: tracking.interval(),
            stats: TrackerStats::default(),
        })
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> TrackerStats {
        self.stats
    }

    /// The connected radio session.
    #[must_use]
    pub const fn session(&self) -> &RadioSession<A> {
        &self.session
    }

    /// Read one location and write it. Failures are logged and counted.
    pub async fn tick(&mut self) -> TickOutcome {
        let reading = match self.source.read() {
            Ok(reading) => reading,
            Err(err) => {
                self.stats.reads_failed += 1;
                let err = TrackerError::from(err);
                warn!(error = %err, code = err.error_code(), "no location reading");
                return TickOutcome::ReadFailed;
            }
        };

        let record = VendorLocationRecord {
            name: self.vendor_name.clone(),
            reading,
        };

        match self.store.write(&record).await {
            Ok(ack) => {
                self.stats.writes_succeeded += 1;
                info!(
                    vendor = %record.name,
                    latitude = reading.latitude,
                    longitude = reading.longitude,
                    "vendor location stored"
                );
                TickOutcome::Written(ack)
            }
            Err(err) => {
                self.stats.writes_failed += 1;
                let err = TrackerError::from(err);
                warn!(
                    error = %err,
                    code = err.error_code(),
                    failures = self.stats.writes_failed,
                    "error storing vendor location"
                );
                TickOutcome::WriteFailed
            }
        }
    }

    /// Tick, then sleep for the interval, until `shutdown` resolves.
    ///
    /// `shutdown` is only observed between ticks. Both resources are
    /// released before returning.
    pub async fn run_until<F>(mut self, shutdown: F) -> TrackerStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            self.tick().await;

            tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }
                () = sleep(self.interval) => {}
            }
        }

        self.terminate().await
    }

    /// Release the store, then the radio session.
    pub async fn terminate(self) -> TrackerStats {
        let Self {
            session,
            store,
            stats,
            ..
        } = self;

        store.close().await;
        release_session(session).await;

        info!(
            state = %TrackerState::Terminated,
            writes_succeeded = stats.writes_succeeded,
            writes_failed = stats.writes_failed,
            reads_failed = stats.reads_failed,
            "tracker stopped"
        );
        stats
    }
}

/// Close the radio session, logging a failed disconnect.
async fn release_session<A: RadioAdapter>(session: RadioSession<A>) {
    if let Err(err) = session.close().await {
        let err = TrackerError::from(err);
        warn!(error = %err, code = err.error_code(), "failed to release radio session");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::bluetooth::MockAdapter;
    use crate::config::FixedLocation;
    use crate::location::{FixedLocationSource, LocationError, LocationReading, LocationResult};
    use crate::storage::mock::MockLocationStore;
    use crate::storage::StoreError;
    use crate::types::DiscoveredDevice;

    const TARGET: &str = "AA:BB:CC:DD:EE:FF";

    fn bluetooth() -> BluetoothConfig {
        BluetoothConfig {
            target_address: TARGET.to_string(),
            ..BluetoothConfig::default()
        }
    }

    fn adapter() -> MockAdapter {
        MockAdapter::new(vec![
            DiscoveredDevice::with_address("11:22:33:44:55:66"),
            DiscoveredDevice::with_address(TARGET),
        ])
    }

    fn source() -> FixedLocationSource {
        FixedLocationSource::new(FixedLocation::default())
    }

    struct SilentSource;

    impl LocationSource for SilentSource {
        fn read(&mut self) -> LocationResult<LocationReading> {
            Err(LocationError::Unavailable {
                message: "no advertisement yet".into(),
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_write_vendor_location() {
        let store = MockLocationStore::new();
        let log = store.log();

        let mut tracker = Tracker::initialize(
            adapter(),
            &bluetooth(),
            move || async move { Ok(store) },
            source(),
            &TrackingConfig::default(),
        )
        .await
        .unwrap();

        assert!(matches!(
            tracker.tick().await,
            TickOutcome::Written(WriteAck { rows_affected: 1 })
        ));
        tracker.tick().await;

        let rows = log.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Vendor Name");
        assert!((rows[0].reading.latitude - 40.7128).abs() < f64::EPSILON);
        assert!((rows[0].reading.longitude + 74.0060).abs() < f64::EPSILON);
        assert_eq!(tracker.stats().writes_succeeded, 2);
        assert_eq!(tracker.session().device().address, TARGET);

        tracker.terminate().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_failures_do_not_stop_the_loop() {
        let store = MockLocationStore::failing();
        let store_log = store.log();
        let adapter = adapter();
        let radio_log = adapter.log();

        let tracker = Tracker::initialize(
            adapter,
            &bluetooth(),
            move || async move { Ok(store) },
            source(),
            &TrackingConfig::default(),
        )
        .await
        .unwrap();

        // Writes at t=0, 10 and 20; shutdown at 25.
        let stats = tracker
            .run_until(sleep(Duration::from_secs(25)))
            .await;

        assert_eq!(store_log.attempts(), 3);
        assert_eq!(stats.writes_failed, 3);
        assert_eq!(stats.writes_succeeded, 0);
        assert_eq!(store_log.close_count(), 1);
        assert_eq!(radio_log.disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_write_waits_for_interval() {
        let store = MockLocationStore::failing();
        let store_log = store.log();

        let tracker = Tracker::initialize(
            adapter(),
            &bluetooth(),
            move || async move { Ok(store) },
            source(),
            &TrackingConfig::default(),
        )
        .await
        .unwrap();

        tracker.run_until(sleep(Duration::from_secs(9))).await;
        assert_eq!(store_log.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_disconnect_still_terminates() {
        let store = MockLocationStore::new();
        let store_log = store.log();
        let adapter = adapter().failing_disconnect();
        let radio_log = adapter.log();

        let tracker = Tracker::initialize(
            adapter,
            &bluetooth(),
            move || async move { Ok(store) },
            source(),
            &TrackingConfig::default(),
        )
        .await
        .unwrap();

        let stats = tracker.run_until(std::future::ready(())).await;
        assert_eq!(stats.writes_succeeded, 1);
        assert_eq!(store_log.close_count(), 1);
        assert_eq!(radio_log.disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_reading_skips_write() {
        let store = MockLocationStore::new();
        let store_log = store.log();

        let mut tracker = Tracker::initialize(
            adapter(),
            &bluetooth(),
            move || async move { Ok(store) },
            SilentSource,
            &TrackingConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(tracker.tick().await, TickOutcome::ReadFailed);
        assert_eq!(store_log.attempts(), 0);
        assert_eq!(tracker.terminate().await.reads_failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_releases_radio_session_once() {
        let adapter = adapter();
        let radio_log = adapter.log();

        let result = Tracker::<_, MockLocationStore, _>::initialize(
            adapter,
            &bluetooth(),
            || async { Err(StoreError::ConnectionError(sqlx::Error::PoolTimedOut)) },
            source(),
            &TrackingConfig::default(),
        )
        .await;

        let err = result.err().expect("initialization should fail");
        assert!(matches!(err, TrackerError::DatabaseConnectionFailed(_)));
        assert!(err.is_fatal());
        assert_eq!(radio_log.connect_attempts().len(), 1);
        assert_eq!(radio_log.disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_radio_failure_never_opens_store() {
        let opened = Cell::new(false);
        let adapter = MockAdapter::new(vec![DiscoveredDevice::with_address("AA:BB")]);
        let radio_log = adapter.log();

        let result = Tracker::initialize(
            adapter,
            &bluetooth(),
            || {
                opened.set(true);
                async { Ok(MockLocationStore::new()) }
            },
            source(),
            &TrackingConfig::default(),
        )
        .await;

        assert!(matches!(result.err(), Some(TrackerError::DeviceNotFound(_))));
        assert!(!opened.get());
        assert_eq!(radio_log.disconnect_count(), 0);
    }
}
