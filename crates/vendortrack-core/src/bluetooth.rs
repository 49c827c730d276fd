//! Bluetooth Low Energy beacon discovery and connection.
//!
//! This module provides functionality to:
//! - Scan for advertising BLE peers for a bounded window
//! - Pick the configured beacon out of the scan results by hardware address
//! - Hold a connected [`RadioSession`] until it is explicitly closed
//!
//! The radio itself sits behind [`RadioAdapter`]. On Linux the `bluetooth`
//! feature provides [`BluerAdapter`] (BlueZ over D-Bus); the `mock-bluetooth`
//! feature provides a scripted [`MockAdapter`] for tests and development hosts.

use std::future::Future;

use thiserror::Error;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::config::BluetoothConfig;
use crate::types::DiscoveredDevice;

#[cfg(feature = "bluetooth")]
pub use bluez::{BluerAdapter, BluerLink};
#[cfg(any(test, feature = "mock-bluetooth"))]
pub use mock::{MockAdapter, MockLink, MockRadioLog};

/// Errors raised by the radio session.
#[derive(Debug, Error)]
pub enum BluetoothError {
    /// The local adapter could not be initialized.
    #[error("could not initialize bluetooth adapter: {message}")]
    AdapterError {
        /// Underlying failure.
        message: String,
    },

    /// Radio I/O failed while scanning.
    #[error("error scanning bluetooth devices: {message}")]
    ScanError {
        /// Underlying failure.
        message: String,
    },

    /// No scanned device carried the target address.
    #[error("device {address} not found")]
    DeviceNotFound {
        /// Address that was searched for.
        address: String,
    },

    /// The handshake with the matched device failed.
    #[error("could not connect to device {address}: {message}")]
    ConnectError {
        /// Address of the device.
        address: String,
        /// Underlying failure.
        message: String,
    },

    /// Releasing the connection failed.
    #[error("could not disconnect from device {address}: {message}")]
    DisconnectError {
        /// Address of the device.
        address: String,
        /// Underlying failure.
        message: String,
    },
}

/// Result alias for Bluetooth operations.
pub type BluetoothResult<T> = std::result::Result<T, BluetoothError>;

/// An open connection to one peer.
pub trait RadioLink {
    /// Address of the connected peer.
    fn address(&self) -> &str;

    /// Close the connection, consuming the link.
    ///
    /// # Errors
    ///
    /// Returns [`BluetoothError::DisconnectError`] if the radio rejects the request.
    fn disconnect(self) -> impl Future<Output = BluetoothResult<()>>;
}

/// A local radio capable of scanning and connecting.
pub trait RadioAdapter {
    /// Connection type produced by [`RadioAdapter::connect`].
    type Link: RadioLink;

    /// Collect every advertising peer seen within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`BluetoothError::ScanError`] on radio I/O failure.
    fn scan(&self, timeout: Duration) -> impl Future<Output = BluetoothResult<Vec<DiscoveredDevice>>>;

    /// Connect to a previously discovered peer.
    ///
    /// # Errors
    ///
    /// Returns [`BluetoothError::ConnectError`] on handshake failure.
    fn connect(&self, device: &DiscoveredDevice) -> impl Future<Output = BluetoothResult<Self::Link>>;
}

/// Return the first device whose address equals `address`.
///
/// Addresses compare ASCII case-insensitively, a deliberate widening of a
/// byte-exact comparison: BlueZ reports upper-case hex while configured
/// addresses are often lower case. There is no prefix or partial matching.
///
/// # Errors
///
/// Returns [`BluetoothError::DeviceNotFound`] if nothing matches, including for
/// an empty device list.
pub fn select_target<'a>(
    devices: &'a [DiscoveredDevice],
    address: &str,
) -> BluetoothResult<&'a DiscoveredDevice> {
    devices
        .iter()
        .find(|device| device.address.eq_ignore_ascii_case(address))
        .ok_or_else(|| BluetoothError::DeviceNotFound {
            address: address.to_string(),
        })
}

/// A connected beacon.
///
/// Holds the adapter and the link for as long as the session lives. Call
/// [`RadioSession::close`] to release the connection.
pub struct RadioSession<A: RadioAdapter> {
    adapter: A,
    device: DiscoveredDevice,
    link: Option<A::Link>,
}

impl<A: RadioAdapter> RadioSession<A> {
    /// Scan, pick the configured beacon and connect to it.
    ///
    /// # Errors
    ///
    /// - [`BluetoothError::ScanError`] if the scan fails
    /// - [`BluetoothError::DeviceNotFound`] if the beacon was not seen in the window
    /// - [`BluetoothError::ConnectError`] if the handshake fails
    pub async fn open(adapter: A, config: &BluetoothConfig) -> BluetoothResult<Self> {
        let timeout = config.scan_timeout();
        info!(
            target_address = %config.target_address,
            timeout_secs = timeout.as_secs(),
            "scanning for beacon"
        );

        let devices = adapter.scan(timeout).await?;
        debug!(count = devices.len(), "scan finished");

        let device = select_target(&devices, &config.target_address)?.clone();
        info!(
            address = %device.address,
            name = device.name.as_deref().unwrap_or("<unnamed>"),
            rssi_dbm = ?device.rssi_dbm,
            "beacon found, connecting"
        );

        let link = adapter.connect(&device).await?;
        info!(address = %link.address(), "beacon connected");

        Ok(Self {
            adapter,
            device,
            link: Some(link),
        })
    }

    /// The device this session is connected to.
    #[must_use]
    pub const fn device(&self) -> &DiscoveredDevice {
        &self.device
    }

    /// The adapter the session was opened on.
    #[must_use]
    pub const fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Disconnect from the beacon.
    ///
    /// # Errors
    ///
    /// Returns [`BluetoothError::DisconnectError`] if the radio rejects the request.
    pub async fn close(mut self) -> BluetoothResult<()> {
        match self.link.take() {
            Some(link) => {
                link.disconnect().await?;
                info!(address = %self.device.address, "beacon disconnected");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl<A: RadioAdapter> Drop for RadioSession<A> {
    fn drop(&mut self) {
        if self.link.is_some() {
            warn!(
                address = %self.device.address,
                "radio session dropped without close; connection left to the adapter"
            );
        }
    }
}

#[cfg(feature = "bluetooth")]
mod bluez {
    use bluer::{Adapter, AdapterEvent, Address, Device, Session};
    use futures::StreamExt;
    use tokio::time::{sleep, Duration};
    use tracing::{debug, info};

    use super::{BluetoothError, BluetoothResult, RadioAdapter, RadioLink};
    use crate::types::DiscoveredDevice;

    /// BlueZ-backed adapter.
    pub struct BluerAdapter {
        // Keeps the D-Bus connection alive for the adapter's lifetime.
        _session: Session,
        adapter: Adapter,
    }

    impl BluerAdapter {
        /// Open the named adapter, or the system default, and power it on.
        ///
        /// # Errors
        ///
        /// Returns [`BluetoothError::AdapterError`] if bluetoothd is unreachable,
        /// the adapter is absent, or it cannot be powered on.
        pub async fn open(name: Option<&str>) -> BluetoothResult<Self> {
            let session = Session::new().await.map_err(adapter_error)?;
            let adapter = match name {
                Some(name) => session.adapter(name).map_err(adapter_error)?,
                None => session.default_adapter().await.map_err(adapter_error)?,
            };
            adapter.set_powered(true).await.map_err(adapter_error)?;
            info!(adapter = adapter.name(), "bluetooth adapter ready");

            Ok(Self {
                _session: session,
                adapter,
            })
        }

        async fn describe(&self, address: Address) -> BluetoothResult<DiscoveredDevice> {
            let device = self.adapter.device(address).map_err(scan_error)?;
            Ok(DiscoveredDevice {
                address: address.to_string(),
                name: device.name().await.ok().flatten(),
                rssi_dbm: device.rssi().await.ok().flatten(),
            })
        }
    }

    impl RadioAdapter for BluerAdapter {
        type Link = BluerLink;

        async fn scan(&self, timeout: Duration) -> BluetoothResult<Vec<DiscoveredDevice>> {
            let mut events = Box::pin(self.adapter.discover_devices().await.map_err(scan_error)?);
            let deadline = sleep(timeout);
            tokio::pin!(deadline);

            let mut seen: Vec<Address> = Vec::new();
            loop {
                tokio::select! {
                    () = &mut deadline => break,
                    event = events.next() => match event {
                        Some(AdapterEvent::DeviceAdded(address)) => {
                            if !seen.contains(&address) {
                                debug!(%address, "peer advertised");
                                seen.push(address);
                            }
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
            // Dropping the stream ends discovery.
            drop(events);

            let mut devices = Vec::with_capacity(seen.len());
            for address in seen {
                devices.push(self.describe(address).await?);
            }
            Ok(devices)
        }

        async fn connect(&self, target: &DiscoveredDevice) -> BluetoothResult<BluerLink> {
            let connect_error = |message: String| BluetoothError::ConnectError {
                address: target.address.clone(),
                message,
            };

            let address: Address = target
                .address
                .parse()
                .map_err(|e| connect_error(format!("invalid address: {e}")))?;
            let device = self
                .adapter
                .device(address)
                .map_err(|e| connect_error(e.to_string()))?;

            if !device.is_connected().await.unwrap_or(false) {
                device
                    .connect()
                    .await
                    .map_err(|e| connect_error(e.to_string()))?;
            }

            Ok(BluerLink {
                address: address.to_string(),
                device,
            })
        }
    }

    /// A BlueZ device connection.
    pub struct BluerLink {
        address: String,
        device: Device,
    }

    impl RadioLink for BluerLink {
        fn address(&self) -> &str {
            &self.address
        }

        async fn disconnect(self) -> BluetoothResult<()> {
            self.device
                .disconnect()
                .await
                .map_err(|e| BluetoothError::DisconnectError {
                    address: self.address.clone(),
                    message: e.to_string(),
                })
        }
    }

    fn adapter_error(err: bluer::Error) -> BluetoothError {
        BluetoothError::AdapterError {
            message: err.to_string(),
        }
    }

    fn scan_error(err: bluer::Error) -> BluetoothError {
        BluetoothError::ScanError {
            message: err.to_string(),
        }
    }
}

#[cfg(any(test, feature = "mock-bluetooth"))]
mod mock {
    use std::sync::{Arc, Mutex, PoisonError};

    use tokio::time::{sleep, Duration};

    use super::{BluetoothError, BluetoothResult, RadioAdapter, RadioLink};
    use crate::types::DiscoveredDevice;

    /// Calls observed by a [`MockAdapter`] and its links.
    #[derive(Debug, Default, Clone)]
    pub struct MockRadioLog {
        inner: Arc<Mutex<MockRadioCalls>>,
    }

    #[derive(Debug, Default)]
    struct MockRadioCalls {
        scans: usize,
        connects: Vec<String>,
        disconnects: usize,
    }

    impl MockRadioLog {
        fn with<R>(&self, f: impl FnOnce(&mut MockRadioCalls) -> R) -> R {
            let mut calls = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut calls)
        }

        /// Number of scans performed.
        #[must_use]
        pub fn scan_count(&self) -> usize {
            self.with(|c| c.scans)
        }

        /// Addresses connect was attempted on, in order.
        #[must_use]
        pub fn connect_attempts(&self) -> Vec<String> {
            self.with(|c| c.connects.clone())
        }

        /// Number of links disconnected.
        #[must_use]
        pub fn disconnect_count(&self) -> usize {
            self.with(|c| c.disconnects)
        }
    }

    /// Scripted adapter reporting a fixed device list.
    #[derive(Debug, Clone, Default)]
    pub struct MockAdapter {
        devices: Vec<DiscoveredDevice>,
        fail_scan: bool,
        fail_connect: bool,
        fail_disconnect: bool,
        log: MockRadioLog,
    }

    impl MockAdapter {
        /// An adapter whose scans report `devices`.
        #[must_use]
        pub fn new(devices: Vec<DiscoveredDevice>) -> Self {
            Self {
                devices,
                ..Self::default()
            }
        }

        /// Make every scan fail.
        #[must_use]
        pub fn failing_scan(mut self) -> Self {
            self.fail_scan = true;
            self
        }

        /// Make every connect fail.
        #[must_use]
        pub fn failing_connect(mut self) -> Self {
            self.fail_connect = true;
            self
        }

        /// Make every disconnect fail.
        #[must_use]
        pub fn failing_disconnect(mut self) -> Self {
            self.fail_disconnect = true;
            self
        }

        /// Handle on the calls this adapter records.
        #[must_use]
        pub fn log(&self) -> MockRadioLog {
            self.log.clone()
        }
    }

    impl RadioAdapter for MockAdapter {
        type Link = MockLink;

        async fn scan(&self, timeout: Duration) -> BluetoothResult<Vec<DiscoveredDevice>> {
            self.log.with(|c| c.scans += 1);
            if self.fail_scan {
                return Err(BluetoothError::ScanError {
                    message: "mock radio I/O failure".to_string(),
                });
            }
            sleep(timeout).await;
            Ok(self.devices.clone())
        }

        async fn connect(&self, device: &DiscoveredDevice) -> BluetoothResult<MockLink> {
            self.log.with(|c| c.connects.push(device.address.clone()));
            if self.fail_connect {
                return Err(BluetoothError::ConnectError {
                    address: device.address.clone(),
                    message: "mock handshake failure".to_string(),
                });
            }
            Ok(MockLink {
                address: device.address.clone(),
                fail_disconnect: self.fail_disconnect,
                log: self.log.clone(),
            })
        }
    }

    /// Connection handed out by [`MockAdapter`].
    #[derive(Debug)]
    pub struct MockLink {
        address: String,
        fail_disconnect: bool,
        log: MockRadioLog,
    }

    impl RadioLink for MockLink {
        fn address(&self) -> &str {
            &self.address
        }

        async fn disconnect(self) -> BluetoothResult<()> {
            self.log.with(|c| c.disconnects += 1);
            if self.fail_disconnect {
                return Err(BluetoothError::DisconnectError {
                    address: self.address,
                    message: "mock link busy".to_string(),
                });
            }
            Ok(())
        }
    }
}
