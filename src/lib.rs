//! # Ground Link Library
//!
//! Ground-station endpoint for a point-to-point radio telemetry link.
//!
//! This library provides the framing codec for the radio module's serial
//! protocol, the typed telemetry store fed by it, the link configuration
//! session and the testing/arming protocol driven over the link.

pub mod clock;
pub mod config;
pub mod error;
pub mod link;
pub mod serial;
pub mod telemetry;
pub mod wire;
