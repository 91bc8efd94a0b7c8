//! # Link Checksums
//!
//! - **CRC-8** (poly 0x07, init 0x00): per-frame integrity check over
//!   `opcode + length + payload`.
//! - **CRC-32** (IEEE 802.3, reflected): checksum of the link and testing
//!   phrases, sent to the radio module instead of the phrase itself.

/// CRC-8 polynomial
const CRC8_POLY: u8 = 0x07;

/// CRC-32 polynomial (reflected form of 0x04C11DB7)
const CRC32_POLY: u32 = 0xEDB8_8320;

/// Precomputed CRC8 lookup table
const CRC8_TABLE: [u8; 256] = generate_crc8_table();

/// Precomputed CRC32 lookup table
const CRC32_TABLE: [u32; 256] = generate_crc32_table();

/// Generate CRC8 lookup table at compile time
const fn generate_crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u8;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ CRC8_POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Generate CRC32 lookup table at compile time
const fn generate_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;

        while j < 8 {
            if (crc & 1) != 0 {
                crc = (crc >> 1) ^ CRC32_POLY;
            } else {
                crc >>= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Calculate the frame CRC8 checksum
///
/// # Arguments
///
/// * `data` - Byte slice to calculate CRC for (Opcode + Length + Payload)
///
/// # Examples
///
/// ```
/// use ground_link::wire::crc::crc8;
///
/// assert_eq!(crc8(b"123456789"), 0xF4);
/// ```
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;

    for &byte in data {
        crc = CRC8_TABLE[(crc ^ byte) as usize];
    }

    crc
}

/// Calculate the IEEE CRC32 checksum
///
/// # Examples
///
/// ```
/// use ground_link::wire::crc::crc32;
///
/// assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
/// ```
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;

    for &byte in data {
        crc = CRC32_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8);
    }

    !crc
}

/// Bitwise CRC8, used to verify the lookup table
#[cfg(test)]
fn crc8_slow(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;

    for &byte in data {
        crc ^= byte;

        for _ in 0..8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ CRC8_POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}
