//! # Link Frame Encoder
//!
//! Encodes outbound commands into checksummed frames.

use super::crc::crc8;
use super::protocol::*;

/// Encode a frame into its wire representation
///
/// # Returns
///
/// * `Vec<u8>` - `opcode + length + payload + crc8` (`length + 3` bytes)
///
/// # Examples
///
/// ```
/// use ground_link::wire::encoder::encode_frame;
/// use ground_link::wire::protocol::{Frame, CMD_MODE};
///
/// let frame = Frame::new(CMD_MODE, &[1]).unwrap();
/// assert_eq!(encode_frame(&frame).len(), 4);
/// ```
pub fn encode_frame(frame: &Frame) -> Vec<u8> {
    encode_raw(frame.opcode, frame.payload())
}

/// Encode a single-byte setting command (direction, mode, gain)
pub fn encode_setting(opcode: u8, value: u8) -> Vec<u8> {
    encode_raw(opcode, &[value])
}

/// Encode the link enable command
pub fn encode_enable() -> Vec<u8> {
    encode_frame(&Frame::empty(CMD_ENABLE))
}

/// Encode the link disable command
pub fn encode_disable() -> Vec<u8> {
    encode_frame(&Frame::empty(CMD_DISABLE))
}

/// Encode the link phrase checksum (little-endian)
pub fn encode_link_phrase_crc(crc: u32) -> Vec<u8> {
    encode_raw(CMD_LINK_PHRASE, &crc.to_le_bytes())
}

/// Encode a testing message into a `CMD_TX` frame
pub fn encode_testing_message(msg: &TestingMessage) -> Vec<u8> {
    encode_raw(CMD_TX, &msg.to_bytes())
}

// Callers only pass payloads of at most MAX_PAYLOAD_SIZE bytes.
fn encode_raw(opcode: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert!(payload.len() <= MAX_PAYLOAD_SIZE);

    let mut out = Vec::with_capacity(payload.len() + FRAME_OVERHEAD);
    out.push(opcode);
    out.push(payload.len() as u8);
    out.extend_from_slice(payload);

    // CRC over Opcode + Length + Payload
    let crc = crc8(&out);
    out.push(crc);

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_frame_structure() {
        let frame = Frame::new(CMD_DIRECTION, &[1]).unwrap();
        let bytes = encode_frame(&frame);

        assert_eq!(bytes.len(), 4);
        assert_eq!(bytes[0], CMD_DIRECTION);
        assert_eq!(bytes[1], 1);
        assert_eq!(bytes[2], 1);
        assert_eq!(bytes[3], crc8(&bytes[..3]));
    }

    #[test]
    fn test_encode_setting_matches_frame() {
        let frame = Frame::new(CMD_MODE, &[Mode::Bidirectional as u8]).unwrap();
        assert_eq!(encode_setting(CMD_MODE, 1), encode_frame(&frame));
    }

    #[test]
    fn test_encode_enable_disable() {
        let enable = encode_enable();
        let disable = encode_disable();

        assert_eq!(enable.len(), 3);
        assert_eq!(&enable[..2], &[CMD_ENABLE, 0]);
        assert_eq!(enable[2], crc8(&[CMD_ENABLE, 0]));

        assert_eq!(disable.len(), 3);
        assert_eq!(&disable[..2], &[CMD_DISABLE, 0]);
    }

    #[test]
    fn test_encode_link_phrase_crc() {
        let bytes = encode_link_phrase_crc(0xDEAD_BEEF);

        assert_eq!(bytes.len(), 7);
        assert_eq!(bytes[0], CMD_LINK_PHRASE);
        assert_eq!(bytes[1], 4);
        assert_eq!(&bytes[2..6], &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(bytes[6], crc8(&bytes[..6]));
    }

    #[test]
    fn test_encode_testing_message() {
        let msg = TestingMessage {
            passcode: 42,
            enable_pyros: true,
            event: 5,
        };
        let bytes = encode_testing_message(&msg);

        // opcode + len + 15 payload + crc
        assert_eq!(bytes.len(), 18);
        assert_eq!(bytes[0], CMD_TX);
        assert_eq!(bytes[1], 15);
        assert_eq!(bytes[2], TESTING_MSG_HEADER);
        assert_eq!(bytes[8], 5);
    }

    #[test]
    fn test_different_data_different_crc() {
        let a = encode_setting(CMD_PA_GAIN, 0);
        let b = encode_setting(CMD_PA_GAIN, 1);
        assert_ne!(a[3], b[3]);
    }
}
