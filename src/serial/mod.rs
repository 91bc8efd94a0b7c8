//! # Serial Communication Module
//!
//! Handles serial communication with the radio module.
//!
//! This module handles:
//! - Opening the serial port (8N1, no flow control)
//! - Writing queued link frames to the port
//! - Reading received bytes into the link's input buffer

pub mod port_trait;

use crate::error::{GroundLinkError, Result};
use port_trait::{BufferedTransport, SerialPortIO, TokioSerialPort};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, trace, warn};

pub use port_trait::LinkTransport;

/// Radio module baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default device paths to try (in order of preference)
pub const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // USB-to-serial adapters
    "/dev/ttyACM0", // USB CDC devices
];

/// Size of a single read from the port
pub const READ_CHUNK_SIZE: usize = 256;

/// Serial connection to one radio module
pub struct LinkSerial<P: SerialPortIO = TokioSerialPort> {
    port: P,
    device_path: String,
}

impl<P: SerialPortIO> std::fmt::Debug for LinkSerial<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl LinkSerial<TokioSerialPort> {
    /// Open the first available device from [`DEFAULT_DEVICE_PATHS`]
    pub fn open(baud_rate: u32) -> Result<Self> {
        Self::open_with_paths(DEFAULT_DEVICE_PATHS, baud_rate)
    }

    /// Open the first device from `paths` that can be opened
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` listing every path tried
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened radio module at {} ({} baud)", path, baud_rate);
                    return Ok(Self {
                        port: TokioSerialPort::new(port),
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(GroundLinkError::SerialPortNotFound(paths.join(", ")))
    }

    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| GroundLinkError::Serial(format!("Failed to open {}: {}", path, e)))
    }
}

impl<P: SerialPortIO> LinkSerial<P> {
    /// Wrap an already opened port
    pub fn with_port(port: P, device_path: impl Into<String>) -> Self {
        Self {
            port,
            device_path: device_path.into(),
        }
    }

    /// Write one encoded frame and flush
    pub async fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.port
            .write_all(frame)
            .await
            .map_err(|e| GroundLinkError::Serial(format!("Failed to write frame: {}", e)))?;

        self.port
            .flush()
            .await
            .map_err(|e| GroundLinkError::Serial(format!("Failed to flush serial port: {}", e)))?;

        trace!("Sent frame ({} bytes) to {}", frame.len(), self.device_path);
        Ok(())
    }

    /// Write every queued frame in order
    ///
    /// Frames are written one by one; on error the failing frame is dropped
    /// and the remaining frames stay queued for the next attempt.
    pub async fn flush_outbound(&mut self, transport: &mut BufferedTransport) -> Result<usize> {
        let mut sent = 0;
        while let Some(frame) = transport.pop_outbound() {
            self.send_frame(&frame).await?;
            sent += 1;
        }
        Ok(sent)
    }

    /// Read one chunk from the port into the transport's input buffer
    pub async fn read_into(&mut self, transport: &mut BufferedTransport) -> Result<usize> {
        let mut buf = [0u8; READ_CHUNK_SIZE];
        let n = self.read(&mut buf).await?;
        transport.push_received(&buf[..n]);
        Ok(n)
    }

    /// Read available bytes from the port
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.port
            .read(buf)
            .await
            .map_err(|e| GroundLinkError::Serial(format!("Failed to read: {}", e)))
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}
