//! # Link Protocol Constants and Types
//!
//! Core protocol definitions shared with the radio module.
//!
//! Frame structure: `opcode(1) + length(1) + payload(length) + crc8(1)`

use crate::error::{GroundLinkError, Result};

/// Maximum payload carried by a single frame
pub const MAX_PAYLOAD_SIZE: usize = 16;

/// Header bytes preceding the payload (opcode + length)
pub const FRAME_HEADER_SIZE: usize = 2;

/// Bytes added around the payload (header + crc)
pub const FRAME_OVERHEAD: usize = FRAME_HEADER_SIZE + 1;

// Outbound commands (ground station -> radio module)

/// Set transmission direction
pub const CMD_DIRECTION: u8 = 0x10;
/// Set power amplifier gain
pub const CMD_PA_GAIN: u8 = 0x11;
/// Set transmission mode
pub const CMD_MODE: u8 = 0x13;
/// Link phrase checksum (4-byte payload)
pub const CMD_LINK_PHRASE: u8 = 0x15;
/// Enable the radio link
pub const CMD_ENABLE: u8 = 0x20;
/// Disable the radio link
pub const CMD_DISABLE: u8 = 0x21;
/// Transmit a raw payload to the remote device
pub const CMD_TX: u8 = 0x31;

// Inbound commands (radio module -> ground station)

/// Remote telemetry payload received over the air
pub const CMD_RX: u8 = 0x30;
/// Link quality information
pub const CMD_INFO: u8 = 0x32;
/// Local GNSS position of the radio module
pub const CMD_GNSS_LOC: u8 = 0x40;
/// Local GNSS time of the radio module
pub const CMD_GNSS_TIME: u8 = 0x41;
/// Local GNSS receiver information
pub const CMD_GNSS_INFO: u8 = 0x42;

/// RX telemetry payload size (107 packed bits)
pub const RX_PAYLOAD_SIZE: usize = 14;
/// Link info payload size
pub const INFO_PAYLOAD_SIZE: usize = 3;
/// GNSS location payload size
pub const GNSS_LOC_PAYLOAD_SIZE: usize = 8;
/// GNSS time payload size
pub const GNSS_TIME_PAYLOAD_SIZE: usize = 3;
/// GNSS info payload minimum size (satellites only)
pub const GNSS_INFO_MIN_PAYLOAD_SIZE: usize = 1;

/// Header byte of every testing message
pub const TESTING_MSG_HEADER: u8 = 0x72;
/// Serialized testing message length
pub const TESTING_MSG_SIZE: usize = 15;

/// Remote flight state reported while testing mode is armed
pub const REMOTE_STATE_TESTING_ARMED: u8 = 1;

/// Transmission direction of the radio module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Transmitter = 0,
    #[default]
    Receiver = 1,
}

/// Transmission mode of the radio module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Unidirectional = 0,
    Bidirectional = 1,
}

/// A single link frame with a bounded payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Command opcode
    pub opcode: u8,

    len: u8,
    data: [u8; MAX_PAYLOAD_SIZE],
}

impl Frame {
    /// Create a new frame
    ///
    /// # Errors
    ///
    /// Returns error if payload exceeds [`MAX_PAYLOAD_SIZE`] (16 bytes)
    pub fn new(opcode: u8, payload: &[u8]) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(GroundLinkError::Protocol(format!(
                "Payload size {} exceeds maximum {}",
                payload.len(),
                MAX_PAYLOAD_SIZE
            )));
        }

        let mut data = [0u8; MAX_PAYLOAD_SIZE];
        data[..payload.len()].copy_from_slice(payload);

        Ok(Self {
            opcode,
            len: payload.len() as u8,
            data,
        })
    }

    /// Frame without payload
    pub const fn empty(opcode: u8) -> Self {
        Self {
            opcode,
            len: 0,
            data: [0u8; MAX_PAYLOAD_SIZE],
        }
    }

    /// Declared payload length
    pub fn length(&self) -> u8 {
        self.len
    }

    /// Valid payload bytes
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }
}

/// Testing/arming message carried inside a `CMD_TX` frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestingMessage {
    /// Passcode derived from the testing phrase
    pub passcode: u32,

    /// Allow the remote to fire pyro channels
    pub enable_pyros: bool,

    /// Event index to trigger (0 = none)
    pub event: u8,
}

impl TestingMessage {
    /// Serialize into the 15-byte wire layout
    ///
    /// ```text
    /// [0]     header (0x72)
    /// [1..5]  passcode, little-endian
    /// [5]     enable_pyros
    /// [6]     event
    /// [7..15] reserved
    /// ```
    pub fn to_bytes(&self) -> [u8; TESTING_MSG_SIZE] {
        let mut out = [0u8; TESTING_MSG_SIZE];
        out[0] = TESTING_MSG_HEADER;
        out[1..5].copy_from_slice(&self.passcode.to_le_bytes());
        out[5] = self.enable_pyros as u8;
        out[6] = self.event;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_new() {
        let frame = Frame::new(CMD_MODE, &[1]).unwrap();
        assert_eq!(frame.opcode, CMD_MODE);
        assert_eq!(frame.length(), 1);
        assert_eq!(frame.payload(), &[1]);
    }

    #[test]
    fn test_frame_payload_too_large() {
        let result = Frame::new(CMD_TX, &[0u8; 17]);
        assert!(result.is_err());
    }

    #[test]
    fn test_frame_max_payload() {
        let frame = Frame::new(CMD_TX, &[0xAB; MAX_PAYLOAD_SIZE]).unwrap();
        assert_eq!(frame.payload().len(), 16);
    }

    #[test]
    fn test_empty_frame() {
        let frame = Frame::empty(CMD_ENABLE);
        assert_eq!(frame.length(), 0);
        assert!(frame.payload().is_empty());
    }

    #[test]
    fn test_testing_message_layout() {
        let msg = TestingMessage {
            passcode: 0x1234_5678,
            enable_pyros: true,
            event: 3,
        };
        let bytes = msg.to_bytes();

        assert_eq!(bytes.len(), 15);
        assert_eq!(bytes[0], 0x72);
        assert_eq!(&bytes[1..5], &[0x78, 0x56, 0x34, 0x12]);
        assert_eq!(bytes[5], 1);
        assert_eq!(bytes[6], 3);
        assert!(bytes[7..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_enum_wire_values() {
        assert_eq!(Direction::Transmitter as u8, 0);
        assert_eq!(Direction::Receiver as u8, 1);
        assert_eq!(Mode::Unidirectional as u8, 0);
        assert_eq!(Mode::Bidirectional as u8, 1);
    }
}
