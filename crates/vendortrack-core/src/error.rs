//! Unified error types for the vendortrack core library.
//!
//! This module provides a unified error type [`TrackerError`] that covers all failure
//! modes across the tracker. Each module also has its own specific error type
//! (`ConfigError`, `BluetoothError`, `StoreError`, `LocationError`) for internal use.
//!
//! # Error tiers
//!
//! - **Fatal**: raised while the tracker is initializing (adapter, scan, device lookup,
//!   connect, database connect). The binary logs these and exits with status 1.
//! - **Recoverable**: raised while the loop is running (location read, row insert).
//!   The loop logs these and keeps going.
//!
//! # Example
//!
//! ```rust
//! use vendortrack_core::error::{TrackerError, Result};
//!
//! fn find(address: &str, seen: &[&str]) -> Result<()> {
//!     if !seen.contains(&address) {
//!         return Err(TrackerError::DeviceNotFound(address.to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// The unified error type for all tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    // =========================================================================
    // BLUETOOTH ERRORS
    // =========================================================================
    /// The local Bluetooth adapter could not be initialized.
    #[error("Bluetooth adapter unavailable: {0}. Ensure bluetoothd is running and the adapter is present.")]
    BluetoothAdapterUnavailable(String),

    /// Scanning for advertising peers failed.
    #[error("Bluetooth scan failed: {0}")]
    BluetoothScanFailed(String),

    /// The target device was not seen during the scan window.
    #[error("Device not found: '{0}'. Ensure the beacon is powered on and within range.")]
    DeviceNotFound(String),

    /// The handshake with the target device failed.
    #[error("Could not connect to device '{address}': {message}")]
    DeviceConnectFailed {
        /// Address of the device.
        address: String,
        /// Underlying failure.
        message: String,
    },

    /// The connected device could not be released cleanly.
    #[error("Could not disconnect from device '{address}': {message}")]
    DeviceDisconnectFailed {
        /// Address of the device.
        address: String,
        /// Underlying failure.
        message: String,
    },

    // =========================================================================
    // DATABASE ERRORS
    // =========================================================================
    /// The database is unreachable or rejected the credentials.
    #[error("Could not connect to the database: {0}")]
    DatabaseConnectionFailed(String),

    /// The database rejected an insert.
    #[error("Could not insert vendor location: {0}")]
    DatabaseWriteFailed(String),

    // =========================================================================
    // LOCATION ERRORS
    // =========================================================================
    /// No location reading could be produced.
    #[error("Location reading unavailable: {0}")]
    LocationUnavailable(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration sources could not be read or parsed.
    #[error("Failed to load configuration: {0}")]
    ConfigLoadError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),
}

/// A specialized [`Result`] type for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Short alias for [`TrackerError`].
pub type Error = TrackerError;

impl TrackerError {
    /// Returns `true` if this error is related to Bluetooth operations.
    #[inline]
    #[must_use]
    pub const fn is_bluetooth_error(&self) -> bool {
        matches!(
            self,
            Self::BluetoothAdapterUnavailable(_)
                | Self::BluetoothScanFailed(_)
                | Self::DeviceNotFound(_)
                | Self::DeviceConnectFailed { .. }
                | Self::DeviceDisconnectFailed { .. }
        )
    }

    /// Returns `true` if this error is related to the database.
    #[inline]
    #[must_use]
    pub const fn is_database_error(&self) -> bool {
        matches!(
            self,
            Self::DatabaseConnectionFailed(_) | Self::DatabaseWriteFailed(_)
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoadError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if this error ends the process when raised during initialization.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }

    /// Returns `true` if the tracking loop logs this error and keeps running.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DatabaseWriteFailed(_) | Self::LocationUnavailable(_)
        )
    }

    /// Returns a machine-readable error code for structured logs.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::BluetoothAdapterUnavailable(_) => "BLUETOOTH_ADAPTER_UNAVAILABLE",
            Self::BluetoothScanFailed(_) => "BLUETOOTH_SCAN_FAILED",
            Self::DeviceNotFound(_) => "DEVICE_NOT_FOUND",
            Self::DeviceConnectFailed { .. } => "DEVICE_CONNECT_FAILED",
            Self::DeviceDisconnectFailed { .. } => "DEVICE_DISCONNECT_FAILED",
            Self::DatabaseConnectionFailed(_) => "DATABASE_CONNECTION_FAILED",
            Self::DatabaseWriteFailed(_) => "DATABASE_WRITE_FAILED",
            Self::LocationUnavailable(_) => "LOCATION_UNAVAILABLE",
            Self::ConfigLoadError(_) => "CONFIG_LOAD_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for TrackerError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::Load(e) => Self::ConfigLoadError(e.to_string()),
            err @ ConfigError::ValidationError { .. } => {
                Self::ConfigValidationError(err.to_string())
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

impl From<crate::bluetooth::BluetoothError> for TrackerError {
    fn from(err: crate::bluetooth::BluetoothError) -> Self {
        use crate::bluetooth::BluetoothError;
        match err {
            BluetoothError::AdapterError { message } => Self::BluetoothAdapterUnavailable(message),
            BluetoothError::ScanError { message } => Self::BluetoothScanFailed(message),
            BluetoothError::DeviceNotFound { address } => Self::DeviceNotFound(address),
            BluetoothError::ConnectError { address, message } => {
                Self::DeviceConnectFailed { address, message }
            }
            BluetoothError::DisconnectError { address, message } => {
                Self::DeviceDisconnectFailed { address, message }
            }
        }
    }
}

impl From<crate::storage::StoreError> for TrackerError {
    fn from(err: crate::storage::StoreError) -> Self {
        use crate::storage::StoreError;
        match err {
            StoreError::ConnectionError(e) => Self::DatabaseConnectionFailed(e.to_string()),
            StoreError::SchemaError(e) => {
                Self::DatabaseConnectionFailed(format!("schema setup failed: {e}"))
            }
            err @ (StoreError::InvalidSslMode(_) | StoreError::InvalidTable(_)) => {
                Self::ConfigValidationError(err.to_string())
            }
            StoreError::WriteError(e) => Self::DatabaseWriteFailed(e.to_string()),
        }
    }
}

impl From<crate::location::LocationError> for TrackerError {
    fn from(err: crate::location::LocationError) -> Self {
        Self::LocationUnavailable(err.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::BluetoothError;
    use crate::storage::StoreError;

    #[test]
    fn test_bluetooth_error_classification() {
        assert!(TrackerError::BluetoothAdapterUnavailable("x".into()).is_bluetooth_error());
        assert!(TrackerError::BluetoothScanFailed("x".into()).is_bluetooth_error());
        assert!(TrackerError::DeviceNotFound("AA:BB".into()).is_bluetooth_error());
        assert!(!TrackerError::DatabaseWriteFailed("x".into()).is_bluetooth_error());
    }

    #[test]
    fn test_database_error_classification() {
        assert!(TrackerError::DatabaseConnectionFailed("refused".into()).is_database_error());
        assert!(TrackerError::DatabaseWriteFailed("constraint".into()).is_database_error());
        assert!(!TrackerError::DeviceNotFound("AA:BB".into()).is_database_error());
    }

    #[test]
    fn test_config_error_classification() {
        assert!(TrackerError::ConfigLoadError("bad toml".into()).is_config_error());
        assert!(TrackerError::ConfigValidationError("bad address".into()).is_config_error());
        assert!(!TrackerError::DatabaseConnectionFailed("refused".into()).is_config_error());
    }

    #[test]
    fn test_initialization_errors_are_fatal() {
        assert!(TrackerError::BluetoothAdapterUnavailable("x".into()).is_fatal());
        assert!(TrackerError::BluetoothScanFailed("x".into()).is_fatal());
        assert!(TrackerError::DeviceNotFound("x".into()).is_fatal());
        assert!(TrackerError::DatabaseConnectionFailed("x".into()).is_fatal());
        assert!(TrackerError::DeviceConnectFailed {
            address: "x".into(),
            message: "y".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_loop_errors_are_recoverable() {
        assert!(TrackerError::DatabaseWriteFailed("x".into()).is_recoverable());
        assert!(TrackerError::LocationUnavailable("x".into()).is_recoverable());
        assert!(!TrackerError::DatabaseWriteFailed("x".into()).is_fatal());
    }

    #[test]
    fn test_from_bluetooth_error() {
        let err: TrackerError = BluetoothError::DeviceNotFound {
            address: "MAC_ADDRESS".into(),
        }
        .into();
        assert!(matches!(err, TrackerError::DeviceNotFound(ref a) if a == "MAC_ADDRESS"));
        assert_eq!(err.error_code(), "DEVICE_NOT_FOUND");
    }

    #[test]
    fn test_from_store_error() {
        let err: TrackerError = StoreError::WriteError(sqlx::Error::PoolClosed).into();
        assert!(matches!(err, TrackerError::DatabaseWriteFailed(_)));

        let err: TrackerError = StoreError::ConnectionError(sqlx::Error::PoolTimedOut).into();
        assert_eq!(err.error_code(), "DATABASE_CONNECTION_FAILED");
    }

    #[test]
    fn test_from_disconnect_error() {
        let err: TrackerError = BluetoothError::DisconnectError {
            address: "AA:BB:CC:DD:EE:FF".into(),
            message: "link busy".into(),
        }
        .into();
        assert!(matches!(err, TrackerError::DeviceDisconnectFailed { .. }));
        assert!(err.is_bluetooth_error());
        assert_eq!(err.error_code(), "DEVICE_DISCONNECT_FAILED");
    }

    #[test]
    fn test_error_display_messages() {
        let err = TrackerError::DeviceNotFound("AA:BB:CC:DD:EE:FF".into());
        assert!(err.to_string().contains("AA:BB:CC:DD:EE:FF"));

        let err = TrackerError::DatabaseWriteFailed("connection reset".into());
        assert!(err.to_string().contains("Could not insert vendor location"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<TrackerError>();
        assert_sync::<TrackerError>();
    }
}
