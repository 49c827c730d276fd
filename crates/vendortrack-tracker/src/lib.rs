//! # vendortrack-tracker
//!
//! Tracking daemon library for the vendortrack beacon tracker.
//!
//! This library provides logging setup and the wiring between configuration,
//! the Bluetooth adapter, the PostGIS store and the tracking loop.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod app;
pub mod logging;
