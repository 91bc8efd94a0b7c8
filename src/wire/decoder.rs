//! # Link Frame Decoder
//!
//! Byte-at-a-time frame reassembly and payload decoding for inbound telemetry
//! (remote data, link info, GNSS location/time/info).
//!
//! The wire has no sync byte. A checksum mismatch or an impossible length
//! drops the frame and the next byte is taken as a new opcode.

use super::crc::crc8;
use super::protocol::*;
use crate::telemetry::types::{GnssInfo, GnssTime, LinkInfo, RemoteData};

/// Position of the decoder inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderState {
    #[default]
    AwaitingOpcode,
    AwaitingLength,
    AwaitingPayload,
    AwaitingChecksum,
}

/// Counters of decoded and dropped frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct DecoderStats {
    /// Frames that passed the checksum
    pub frames_decoded: u64,

    /// Frames dropped on checksum mismatch
    pub checksum_errors: u64,

    /// Frames dropped because the declared length exceeded the buffer
    pub length_errors: u64,
}

/// Incremental frame decoder
///
/// Single reader only: feed bytes in arrival order from one stream.
///
/// # Examples
///
/// ```
/// use ground_link::wire::decoder::FrameDecoder;
/// use ground_link::wire::encoder::encode_setting;
///
/// let mut decoder = FrameDecoder::new();
/// let bytes = encode_setting(0x42, 7);
///
/// let frames: Vec<_> = bytes.iter().filter_map(|&b| decoder.process_byte(b)).collect();
/// assert_eq!(frames.len(), 1);
/// assert_eq!(frames[0].payload(), &[7]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct FrameDecoder {
    state: DecoderState,
    opcode: u8,
    length: u8,
    buffer: [u8; MAX_PAYLOAD_SIZE],
    index: usize,
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one byte, returning a frame once its checksum has been verified
    pub fn process_byte(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            DecoderState::AwaitingOpcode => {
                self.opcode = byte;
                self.state = DecoderState::AwaitingLength;
                None
            }
            DecoderState::AwaitingLength => {
                if byte as usize > MAX_PAYLOAD_SIZE {
                    self.stats.length_errors += 1;
                    self.reset();
                    return None;
                }

                self.length = byte;
                self.index = 0;
                self.state = if byte == 0 {
                    DecoderState::AwaitingChecksum
                } else {
                    DecoderState::AwaitingPayload
                };
                None
            }
            DecoderState::AwaitingPayload => {
                self.buffer[self.index] = byte;
                self.index += 1;

                if self.index >= self.length as usize {
                    self.state = DecoderState::AwaitingChecksum;
                }
                None
            }
            DecoderState::AwaitingChecksum => {
                let expected = self.checksum();
                let frame = Frame::new(self.opcode, &self.buffer[..self.length as usize]).ok();
                self.reset();

                if byte != expected {
                    self.stats.checksum_errors += 1;
                    return None;
                }

                self.stats.frames_decoded += 1;
                frame
            }
        }
    }

    /// Discard any partial frame and wait for the next opcode
    pub fn reset(&mut self) {
        self.state = DecoderState::AwaitingOpcode;
        self.opcode = 0;
        self.length = 0;
        self.index = 0;
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    fn checksum(&self) -> u8 {
        let len = self.length as usize;
        let mut data = [0u8; MAX_PAYLOAD_SIZE + FRAME_HEADER_SIZE];
        data[0] = self.opcode;
        data[1] = self.length;
        data[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + len].copy_from_slice(&self.buffer[..len]);
        crc8(&data[..FRAME_HEADER_SIZE + len])
    }
}

/// LSB-first reader over a packed bit stream
struct BitReader<'a> {
    data: &'a [u8],
    bit_index: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, bit_index: 0 }
    }

    /// Read `bits` (<= 32) unsigned bits; bits past the end read as zero
    fn read(&mut self, bits: u32) -> u32 {
        let mut value = 0u32;

        for bit in 0..bits {
            let byte_index = self.bit_index / 8;
            let bit_offset = self.bit_index % 8;
            let set = self
                .data
                .get(byte_index)
                .map_or(false, |b| (b >> bit_offset) & 1 == 1);
            if set {
                value |= 1 << bit;
            }
            self.bit_index += 1;
        }

        value
    }

    /// Read `bits` as a two's complement signed value
    fn read_signed(&mut self, bits: u32) -> i32 {
        let raw = self.read(bits);
        let shift = 32 - bits;
        ((raw << shift) as i32) >> shift
    }
}

/// Decode the packed remote telemetry payload (`CMD_RX`)
///
/// # Layout (LSB-first bit fields)
///
/// ```text
/// state:3 timestamp:15 errors:6 lat:22 lon:22 altitude:17
/// velocity:10 voltage:8 pyro_continuity:2 testing_mode:1 reserved:1
/// ```
///
/// Returns `None` if the payload is shorter than [`RX_PAYLOAD_SIZE`].
pub fn decode_remote_data(payload: &[u8]) -> Option<RemoteData> {
    if payload.len() < RX_PAYLOAD_SIZE {
        return None;
    }

    let mut bits = BitReader::new(&payload[..RX_PAYLOAD_SIZE]);

    let state = bits.read(3) as u8;
    let timestamp = bits.read(15) as u16;
    let errors = bits.read(6) as u8;
    // Latitude / longitude: degrees × 10^4
    let lat_raw = bits.read_signed(22);
    let lon_raw = bits.read_signed(22);
    let altitude = bits.read_signed(17);
    let velocity = bits.read_signed(10) as i16;
    // Voltage: volts × 10
    let voltage_raw = bits.read(8);
    let pyro_continuity = bits.read(2) as u8;
    let testing_mode = bits.read(1) == 1;

    Some(RemoteData {
        state,
        timestamp,
        errors,
        latitude: lat_raw as f64 / 10_000.0,
        longitude: lon_raw as f64 / 10_000.0,
        altitude,
        velocity,
        voltage: voltage_raw as f32 / 10.0,
        pyro_continuity,
        testing_mode,
    })
}

/// Decode the link quality payload (`CMD_INFO`)
pub fn decode_link_info(payload: &[u8]) -> Option<LinkInfo> {
    if payload.len() < INFO_PAYLOAD_SIZE {
        return None;
    }

    Some(LinkInfo {
        rssi: payload[0],
        lq: payload[1],
        snr: payload[2] as i8,
    })
}

/// Decode the GNSS position payload (`CMD_GNSS_LOC`)
///
/// Latitude and longitude are little-endian `f32` degrees.
pub fn decode_gnss_location(payload: &[u8]) -> Option<(f32, f32)> {
    if payload.len() < GNSS_LOC_PAYLOAD_SIZE {
        return None;
    }

    let lat = f32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let lon = f32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);

    if !lat.is_finite() || !lon.is_finite() {
        return None;
    }

    Some((lat, lon))
}

/// Decode the GNSS time payload (`CMD_GNSS_TIME`)
pub fn decode_gnss_time(payload: &[u8]) -> Option<GnssTime> {
    if payload.len() < GNSS_TIME_PAYLOAD_SIZE {
        return None;
    }

    Some(GnssTime {
        hour: payload[0],
        minute: payload[1],
        second: payload[2],
    })
}

/// Decode the GNSS receiver info payload (`CMD_GNSS_INFO`)
///
/// The fix byte is optional; older radio firmware only reports satellites.
pub fn decode_gnss_info(payload: &[u8]) -> Option<GnssInfo> {
    if payload.len() < GNSS_INFO_MIN_PAYLOAD_SIZE {
        return None;
    }

    Some(GnssInfo {
        satellites: payload[0],
        fix: payload.get(1).map(|&b| b != 0),
    })
}
