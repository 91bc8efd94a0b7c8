//! # Telemetry Module
//!
//! Telemetry received from the radio module.
//!
//! This module handles:
//! - Typed values for remote data, link info, GNSS location and time
//! - Records with sequence numbers, timestamps and an updated flag
//! - Per-reader cursors for independent "seen" tracking
//! - Dispatching verified frames to their records

pub mod types;
pub mod record;
pub mod store;

pub use record::{ReadCursor, Record};
pub use store::{RecordKind, TelemetryStore};
