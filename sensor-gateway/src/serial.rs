//! Serial line source backed by the `serialport` crate.
//!
//! Reads are non-blocking polls: the port is asked how many bytes are
//! waiting and only those are read, so [`SerialLineSource::next_line`] returns
//! immediately when the device is quiet.

use std::io::{self, Read};
use std::time::Duration;

use serialport::SerialPort;
use tracing::{debug, info};

use crate::line_source::{LineSource, SourceError};

/// Read timeout passed to the port; only hit if the driver under-reports.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Largest chunk pulled from the driver in one poll.
const READ_CHUNK: usize = 1024;

/// Accumulates bytes and splits them into `\n`-terminated lines.
///
/// The terminator is removed; any `\r` before it is kept so callers see the
/// line as the device sent it.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes read from the device.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Pop the next complete line, if one is buffered.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; the parser reports it
    /// as a malformed line.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=end).take(end).collect();
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Number of bytes waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// Line source reading from a physical serial device.
pub struct SerialLineSource {
    address: String,
    baud_rate: u32,
    port: Option<Box<dyn SerialPort>>,
    buffer: LineBuffer,
    read_buf: [u8; READ_CHUNK],
}

impl SerialLineSource {
    /// Create a closed source for the device at `address`.
    pub fn new(address: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            address: address.into(),
            baud_rate,
            port: None,
            buffer: LineBuffer::new(),
            read_buf: [0u8; READ_CHUNK],
        }
    }

    /// Wrap a port that is already open, e.g. one end of a pseudo-terminal.
    pub fn from_port(address: impl Into<String>, port: Box<dyn SerialPort>) -> Self {
        let baud_rate = port.baud_rate().unwrap_or(0);
        Self {
            address: address.into(),
            baud_rate,
            port: Some(port),
            buffer: LineBuffer::new(),
            read_buf: [0u8; READ_CHUNK],
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Pull whatever the driver has buffered into the line buffer.
    ///
    /// Returns `Ok(false)` when nothing was waiting.
    fn fill(&mut self) -> Result<bool, SourceError> {
        let port = self.port.as_mut().ok_or_else(|| {
            SourceError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "serial port is not open",
            ))
        })?;

        let available = port.bytes_to_read().map_err(io::Error::from)? as usize;
        if available == 0 {
            return Ok(false);
        }

        let want = available.min(READ_CHUNK);
        match port.read(&mut self.read_buf[..want]) {
            Ok(0) => Err(SourceError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "device reported data but returned none",
            ))),
            Ok(n) => {
                self.buffer.extend(&self.read_buf[..n]);
                Ok(true)
            }
            Err(ref e)
                if e.kind() == io::ErrorKind::TimedOut || e.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(false)
            }
            Err(e) => Err(SourceError::Io(e)),
        }
    }
}

impl LineSource for SerialLineSource {
    fn open(&mut self) -> Result<(), SourceError> {
        if self.port.is_some() {
            return Ok(());
        }

        let port = serialport::new(&self.address, self.baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| SourceError::connection(&self.address, e))?;

        info!(
            port = %self.address,
            baud_rate = self.baud_rate,
            "Serial port opened"
        );

        self.buffer.clear();
        self.port = Some(port);
        Ok(())
    }

    fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        if let Some(line) = self.buffer.next_line() {
            return Ok(Some(line));
        }

        if self.fill()? {
            return Ok(self.buffer.next_line());
        }

        Ok(None)
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!(
                port = %self.address,
                discarded_bytes = self.buffer.pending(),
                "Serial port closed"
            );
        }
        self.buffer.clear();
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn describe(&self) -> String {
        format!("serial {} @ {} baud", self.address, self.baud_rate)
    }
}

impl Drop for SerialLineSource {
    fn drop(&mut self) {
        self.close();
    }
}
