//! # Link Wire Protocol
//!
//! Framing used between the ground station and its radio module.
//!
//! This module handles:
//! - Frame construction and encoding of outbound commands
//! - Byte-at-a-time decoding of inbound frames
//! - CRC-8 frame checksums and CRC-32 phrase checksums
//! - Decoding of telemetry payloads (remote data, link info, GNSS)

pub mod protocol;
pub mod encoder;
pub mod decoder;
pub mod crc;
