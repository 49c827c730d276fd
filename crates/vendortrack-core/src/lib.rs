//! # vendortrack-core
//!
//! Core logic for the vendortrack beacon tracker.
//!
//! This crate provides:
//! - Bluetooth Low Energy discovery of a beacon by hardware address
//! - A PostGIS-backed store for vendor location rows
//! - The tracking loop tying the two together
//! - Layered configuration and a typed error taxonomy
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`bluetooth`] - Scanning, target selection and the connected [`RadioSession`]
//! - [`config`] - Configuration loading (defaults, TOML file, environment) and validation
//! - [`location`] - Location readings and the sources producing them
//! - [`storage`] - The [`LocationStore`] trait and its PostgreSQL implementation
//! - [`tracker`] - The `Initializing → Running → Terminated` tracking loop
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared types

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod bluetooth;
pub mod config;
pub mod error;
pub mod location;
pub mod storage;
pub mod tracker;
pub mod types;

// Re-export primary types for convenience
#[cfg(feature = "bluetooth")]
pub use bluetooth::{BluerAdapter, BluerLink};
#[cfg(any(test, feature = "mock-bluetooth"))]
pub use bluetooth::{MockAdapter, MockLink, MockRadioLog};
pub use bluetooth::{
    select_target, BluetoothError, BluetoothResult, RadioAdapter, RadioLink, RadioSession,
};
pub use config::{
    is_valid_mac_address, is_valid_table_name, BluetoothConfig, ConfigError, ConfigResult,
    DatabaseConfig, FixedLocation, LoggingConfig, TrackerConfig, TrackingConfig,
};
pub use error::{Error, Result, TrackerError};
pub use location::{
    FixedLocationSource, LocationError, LocationReading, LocationResult, LocationSource,
    WGS84_SRID,
};
pub use storage::{
    bind_values, connect_options, insert_sql, LocationStore, PgLocationStore, StoreError,
    StoreResult,
};
pub use tracker::{TickOutcome, Tracker, TrackerState, TrackerStats};
pub use types::{DiscoveredDevice, VendorLocationRecord, WriteAck};
