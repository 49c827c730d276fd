//! Location readings and the sources that produce them.
//!
//! A [`LocationSource`] yields the coordinates written on each loop iteration.
//! Decoding coordinates out of beacon payloads is not implemented; the only
//! source is [`FixedLocationSource`], which reports configured coordinates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::FixedLocation;

/// Spatial reference identifier of WGS-84, used for every stored point.
pub const WGS84_SRID: i32 = 4326;

/// Errors raised while producing a location reading.
#[derive(Debug, Error)]
pub enum LocationError {
    /// The source has nothing to report right now.
    #[error("no reading available: {message}")]
    Unavailable {
        /// Why no reading could be produced.
        message: String,
    },
}

/// Result alias for location operations.
pub type LocationResult<T> = std::result::Result<T, LocationError>;

/// One geographic point observed at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationReading {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// When the reading was taken (UTC).
    pub observed_at: DateTime<Utc>,
}

impl LocationReading {
    /// Create a reading stamped with the current time.
    #[must_use]
    pub fn now(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            observed_at: Utc::now(),
        }
    }
}

/// Produces location readings for the tracking loop.
pub trait LocationSource {
    /// Take the next reading.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError::Unavailable`] when no reading can be produced.
    fn read(&mut self) -> LocationResult<LocationReading>;
}

/// Reports the same configured coordinates every time.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocationSource {
    location: FixedLocation,
}

impl FixedLocationSource {
    /// Create a source reporting `location`.
    #[must_use]
    pub const fn new(location: FixedLocation) -> Self {
        Self { location }
    }
}

impl LocationSource for FixedLocationSource {
    fn read(&mut self) -> LocationResult<LocationReading> {
        Ok(LocationReading::now(
            self.location.latitude,
            self.location.longitude,
        ))
    }
}
