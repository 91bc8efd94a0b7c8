//! Transport abstractions between the link logic and the serial port
//!
//! - [`LinkTransport`]: synchronous byte source/sink consumed by the link
//!   session during a tick. Never blocks.
//! - [`SerialPortIO`]: async port operations used by the I/O loop to move
//!   bytes between the real port and a [`BufferedTransport`].

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;
use std::io;

/// Byte source and frame sink used by the link session
#[cfg_attr(test, mockall::automock)]
pub trait LinkTransport {
    /// Queue one encoded frame for transmission
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Next received byte, `None` if nothing is buffered
    fn read_byte(&mut self) -> Option<u8>;
}

/// In-memory transport filled and drained by the serial I/O loop
#[derive(Debug, Default)]
pub struct BufferedTransport {
    rx: BytesMut,
    tx: VecDeque<Bytes>,
}

impl BufferedTransport {
    pub fn new() -> Self {
        Self {
            rx: BytesMut::with_capacity(1024),
            tx: VecDeque::new(),
        }
    }

    /// Append bytes received from the port
    pub fn push_received(&mut self, data: &[u8]) {
        self.rx.extend_from_slice(data);
    }

    /// Bytes received but not yet consumed
    pub fn received_len(&self) -> usize {
        self.rx.len()
    }

    /// Next frame waiting to be written to the port
    pub fn pop_outbound(&mut self) -> Option<Bytes> {
        self.tx.pop_front()
    }

    /// Remove and return all frames waiting to be written
    pub fn take_outbound(&mut self) -> Vec<Bytes> {
        self.tx.drain(..).collect()
    }

    pub fn has_outbound(&self) -> bool {
        !self.tx.is_empty()
    }
}

impl LinkTransport for BufferedTransport {
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.tx.push_back(Bytes::copy_from_slice(frame));
        Ok(())
    }

    fn read_byte(&mut self) -> Option<u8> {
        if self.rx.has_remaining() {
            Some(self.rx.get_u8())
        } else {
            None
        }
    }
}

/// Trait for serial port I/O operations
#[async_trait]
pub trait SerialPortIO: Send {
    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;

    /// Read available bytes into `buf`, returning the count
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Wrapper around tokio_serial::SerialStream that implements SerialPortIO
pub struct TokioSerialPort {
    port: tokio_serial::SerialStream,
}

impl TokioSerialPort {
    pub fn new(port: tokio_serial::SerialStream) -> Self {
        Self { port }
    }
}

#[async_trait]
impl SerialPortIO for TokioSerialPort {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.flush().await
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use tokio::io::AsyncReadExt;
        self.port.read(buf).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffered_transport_reads_in_order() {
        let mut transport = BufferedTransport::new();
        transport.push_received(&[1, 2]);
        transport.push_received(&[3]);

        assert_eq!(transport.received_len(), 3);
        assert_eq!(transport.read_byte(), Some(1));
        assert_eq!(transport.read_byte(), Some(2));
        assert_eq!(transport.read_byte(), Some(3));
        assert_eq!(transport.read_byte(), None);
    }

    #[test]
    fn test_buffered_transport_queues_frames() {
        let mut transport = BufferedTransport::new();
        transport.write_frame(&[0x20, 0x00, 0x11]).unwrap();
        transport.write_frame(&[0x21, 0x00, 0x22]).unwrap();

        assert!(transport.has_outbound());
        assert_eq!(transport.pop_outbound().unwrap().as_ref(), &[0x20, 0x00, 0x11]);

        let rest = transport.take_outbound();
        assert_eq!(rest.len(), 1);
        assert!(!transport.has_outbound());
    }
}
