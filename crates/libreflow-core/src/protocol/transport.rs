//! Transport abstraction
//!
//! The dispatcher talks to hardware through the [`Transport`] trait: a byte
//! stream with a blocking write and a non-blocking read. The production
//! implementation wraps a serial port; the simulator and tests provide
//! in-memory implementations.

use std::io::Read;

use serialport::SerialPort;

use crate::error::TransportError;

/// A point-to-point byte stream to one device.
pub trait Transport {
    /// Write all bytes to the link.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Append whatever bytes are currently buffered to `buf` without
    /// blocking. Returns the number of bytes appended (possibly zero).
    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, TransportError>;
}

/// [`Transport`] over a serial port.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Wrap an already-opened serial port.
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }

    /// Open and configure a serial port at the given baud rate.
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let port = super::serial::open_port(port_name, baud_rate)?;
        Ok(Self::new(port))
    }

    /// Discard anything buffered in either direction.
    pub fn clear_buffers(&mut self) -> Result<(), TransportError> {
        self.port
            .clear(serialport::ClearBuffer::All)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        std::io::Write::write_all(&mut self.port, bytes)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }

    fn read_available(&mut self, buf: &mut Vec<u8>) -> Result<usize, TransportError> {
        // bytes_to_read() polling avoids blocking read() calls on Linux.
        let available = self
            .port
            .bytes_to_read()
            .map_err(|e| TransportError::ReadFailed(e.to_string()))? as usize;
        if available == 0 {
            return Ok(0);
        }

        let mut chunk = vec![0u8; available];
        match self.port.read(&mut chunk) {
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Ok(0)
            }
            Err(e) => Err(TransportError::ReadFailed(e.to_string())),
        }
    }
}
