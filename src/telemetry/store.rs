//! # Telemetry Store and Command Handlers
//!
//! Routes verified inbound frames to the record they update.
//!
//! | Opcode | Handler | Record |
//! |--------|---------|--------|
//! | `CMD_RX` | remote telemetry | `data` |
//! | `CMD_INFO` | link quality | `info` |
//! | `CMD_GNSS_LOC` | GNSS position | `location` |
//! | `CMD_GNSS_TIME` | GNSS time | `time` |
//! | `CMD_GNSS_INFO` | GNSS satellites/fix | `location` |
//!
//! Any other opcode is consumed without effect. A payload too short for its
//! opcode leaves every record untouched.

use serde::Serialize;

use super::record::Record;
use super::types::{GnssLocation, GnssTime, LinkInfo, RemoteData};
use crate::wire::decoder::{
    decode_gnss_info, decode_gnss_location, decode_gnss_time, decode_link_info,
    decode_remote_data,
};
use crate::wire::protocol::*;

/// Identifies one of the four telemetry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Data,
    Info,
    Location,
    Time,
}

/// Latest telemetry received on one link
///
/// Cloning produces an independent snapshot for readers outside the link task.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TelemetryStore {
    pub data: Record<RemoteData>,
    pub info: Record<LinkInfo>,
    pub location: Record<GnssLocation>,
    pub time: Record<GnssTime>,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch a verified frame to its handler
    ///
    /// # Returns
    ///
    /// * `Some(RecordKind)` - the record that was updated
    /// * `None` - unknown opcode or malformed payload, nothing changed
    pub fn apply(&mut self, frame: &Frame, now_ms: u64) -> Option<RecordKind> {
        let payload = frame.payload();

        match frame.opcode {
            CMD_RX => self.handle_remote_data(payload, now_ms),
            CMD_INFO => self.handle_link_info(payload, now_ms),
            CMD_GNSS_LOC => self.handle_gnss_location(payload, now_ms),
            CMD_GNSS_TIME => self.handle_gnss_time(payload, now_ms),
            CMD_GNSS_INFO => self.handle_gnss_info(payload, now_ms),
            _ => None,
        }
    }

    /// Clear the updated flag of one record
    pub fn acknowledge(&mut self, kind: RecordKind) {
        match kind {
            RecordKind::Data => self.data.acknowledge(),
            RecordKind::Info => self.info.acknowledge(),
            RecordKind::Location => self.location.acknowledge(),
            RecordKind::Time => self.time.acknowledge(),
        }
    }

    /// Sum of all record sequence numbers; changes whenever any record is written
    pub fn generation(&self) -> u64 {
        self.data.sequence() + self.info.sequence() + self.location.sequence() + self.time.sequence()
    }

    fn handle_remote_data(&mut self, payload: &[u8], now_ms: u64) -> Option<RecordKind> {
        let data = decode_remote_data(payload)?;
        self.data.update(now_ms, |v| *v = data);
        Some(RecordKind::Data)
    }

    fn handle_link_info(&mut self, payload: &[u8], now_ms: u64) -> Option<RecordKind> {
        let info = decode_link_info(payload)?;
        self.info.update(now_ms, |v| *v = info);
        Some(RecordKind::Info)
    }

    fn handle_gnss_location(&mut self, payload: &[u8], now_ms: u64) -> Option<RecordKind> {
        let (lat, lon) = decode_gnss_location(payload)?;
        self.location.update(now_ms, |v| {
            v.latitude = lat;
            v.longitude = lon;
        });
        Some(RecordKind::Location)
    }

    fn handle_gnss_time(&mut self, payload: &[u8], now_ms: u64) -> Option<RecordKind> {
        let time = decode_gnss_time(payload)?;
        self.time.update(now_ms, |v| *v = time);
        Some(RecordKind::Time)
    }

    fn handle_gnss_info(&mut self, payload: &[u8], now_ms: u64) -> Option<RecordKind> {
        let info = decode_gnss_info(payload)?;
        self.location.update(now_ms, |v| {
            v.satellites = info.satellites;
            if let Some(fix) = info.fix {
                v.fix = fix;
            }
        });
        Some(RecordKind::Location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::crc::crc8;
    use crate::wire::decoder::FrameDecoder;

    fn frame(opcode: u8, payload: &[u8]) -> Frame {
        Frame::new(opcode, payload).unwrap()
    }

    #[test]
    fn test_wire_bytes_update_location_record() {
        // [opcode, len, value, crc] straight off the wire
        let mut bytes = vec![CMD_GNSS_INFO, 0x01, 0x2A];
        bytes.push(crc8(&bytes));

        let mut decoder = FrameDecoder::new();
        let mut store = TelemetryStore::new();
        for &b in &bytes {
            if let Some(frame) = decoder.process_byte(b) {
                store.apply(&frame, 100);
            }
        }

        assert!(store.location.is_updated());
        assert_eq!(store.location.value().satellites, 0x2A);
        assert_eq!(store.location.last_update_time(), Some(100));
    }

    #[test]
    fn test_apply_link_info() {
        let mut store = TelemetryStore::new();
        let kind = store.apply(&frame(CMD_INFO, &[80, 95, 7]), 10);

        assert_eq!(kind, Some(RecordKind::Info));
        assert_eq!(store.info.value().lq, 95);
        assert!(store.info.is_updated());
        assert!(!store.data.is_updated());
    }

    #[test]
    fn test_apply_gnss_time() {
        let mut store = TelemetryStore::new();
        store.apply(&frame(CMD_GNSS_TIME, &[8, 15, 30]), 10);
        assert_eq!(store.time.value().minute, 15);
    }

    #[test]
    fn test_apply_remote_data() {
        let mut payload = [0u8; RX_PAYLOAD_SIZE];
        payload[0] = 0x01; // state = 1

        let mut store = TelemetryStore::new();
        assert_eq!(store.apply(&frame(CMD_RX, &payload), 5), Some(RecordKind::Data));
        assert!(store.data.value().is_testing_armed());
    }

    #[test]
    fn test_gnss_info_merges_into_location() {
        let mut store = TelemetryStore::new();
        let mut loc = Vec::new();
        loc.extend_from_slice(&47.0f32.to_le_bytes());
        loc.extend_from_slice(&8.0f32.to_le_bytes());

        store.apply(&frame(CMD_GNSS_LOC, &loc), 1);
        store.apply(&frame(CMD_GNSS_INFO, &[9, 1]), 2);

        let value = store.location.value();
        assert_eq!(value.latitude, 47.0);
        assert_eq!(value.satellites, 9);
        assert!(value.fix);
        assert!(value.is_valid());
        assert_eq!(store.location.sequence(), 2);
    }

    #[test]
    fn test_unknown_opcode_is_noop() {
        let mut store = TelemetryStore::new();
        assert_eq!(store.apply(&frame(0x99, &[1, 2, 3]), 1), None);
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_outbound_opcode_is_not_dispatched() {
        let mut store = TelemetryStore::new();
        assert_eq!(store.apply(&frame(CMD_DIRECTION, &[1]), 1), None);
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_short_payload_is_noop() {
        let mut store = TelemetryStore::new();
        assert_eq!(store.apply(&frame(CMD_RX, &[1, 2, 3]), 1), None);
        assert_eq!(store.apply(&frame(CMD_INFO, &[1]), 1), None);
        assert_eq!(store.apply(&frame(CMD_GNSS_LOC, &[1, 2]), 1), None);
        assert_eq!(store.apply(&frame(CMD_GNSS_TIME, &[]), 1), None);
        assert_eq!(store.apply(&frame(CMD_GNSS_INFO, &[]), 1), None);
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_acknowledge_by_kind() {
        let mut store = TelemetryStore::new();
        store.apply(&frame(CMD_INFO, &[1, 2, 3]), 1);
        store.apply(&frame(CMD_GNSS_TIME, &[1, 2, 3]), 1);

        store.acknowledge(RecordKind::Info);
        assert!(!store.info.is_updated());
        assert!(store.time.is_updated());
    }
}
