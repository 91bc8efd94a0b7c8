//! # Telemetry Value Types
//!
//! Values carried by the four telemetry records.

use chrono::NaiveTime;
use serde::Serialize;

use crate::wire::protocol::REMOTE_STATE_TESTING_ARMED;

/// Telemetry reported by the remote device (`CMD_RX`)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RemoteData {
    /// Flight state; in testing mode `1` means testing is armed
    pub state: u8,

    /// Remote timestamp (wraps at 15 bits)
    pub timestamp: u16,

    /// Error flags
    pub errors: u8,

    /// Latitude in degrees
    pub latitude: f64,

    /// Longitude in degrees
    pub longitude: f64,

    /// Altitude in meters
    pub altitude: i32,

    /// Vertical velocity in m/s
    pub velocity: i16,

    /// Battery voltage in volts
    pub voltage: f32,

    /// Pyro channel continuity bits
    pub pyro_continuity: u8,

    /// Remote has testing mode enabled
    pub testing_mode: bool,
}

impl RemoteData {
    /// Remote confirms that testing mode is armed
    pub fn is_testing_armed(&self) -> bool {
        self.state == REMOTE_STATE_TESTING_ARMED
    }
}

/// Link quality of the radio module (`CMD_INFO`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LinkInfo {
    /// RSSI in -dBm
    pub rssi: u8,

    /// Link quality (0-100%)
    pub lq: u8,

    /// SNR in dB
    pub snr: i8,
}

/// Position of the radio module's own GNSS receiver
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct GnssLocation {
    /// Latitude in degrees
    pub latitude: f32,

    /// Longitude in degrees
    pub longitude: f32,

    /// Satellites in view
    pub satellites: u8,

    /// Receiver reports a position fix
    pub fix: bool,
}

impl GnssLocation {
    pub fn is_valid(&self) -> bool {
        self.fix && (self.latitude != 0.0 || self.longitude != 0.0)
    }
}

/// GNSS receiver status (`CMD_GNSS_INFO`), merged into [`GnssLocation`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GnssInfo {
    pub satellites: u8,
    pub fix: Option<bool>,
}

/// UTC time of day from the GNSS receiver (`CMD_GNSS_TIME`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct GnssTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl GnssTime {
    /// Convert to a `chrono` time, `None` if the receiver sent an invalid time
    pub fn to_naive_time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour as u32, self.minute as u32, self.second as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_armed_state() {
        let mut data = RemoteData::default();
        assert!(!data.is_testing_armed());

        data.state = 1;
        assert!(data.is_testing_armed());

        data.state = 3;
        assert!(!data.is_testing_armed());
    }

    #[test]
    fn test_location_validity() {
        let mut loc = GnssLocation::default();
        assert!(!loc.is_valid());

        loc.latitude = 47.2;
        assert!(!loc.is_valid(), "no fix yet");

        loc.fix = true;
        assert!(loc.is_valid());
    }

    #[test]
    fn test_gnss_time_conversion() {
        let time = GnssTime { hour: 23, minute: 59, second: 58 };
        assert_eq!(time.to_naive_time(), NaiveTime::from_hms_opt(23, 59, 58));

        let invalid = GnssTime { hour: 25, minute: 0, second: 0 };
        assert!(invalid.to_naive_time().is_none());
    }
}
