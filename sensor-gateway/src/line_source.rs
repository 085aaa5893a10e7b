//! Line source abstraction.
//!
//! A line source is wherever raw sensor text comes from: a serial device or
//! the built-in simulator. The gateway only talks to the [`LineSource`] trait,
//! so tests can substitute a scripted source without hardware.

use std::io;

/// Errors reported by a line source.
#[derive(Debug)]
pub enum SourceError {
    /// The device could not be acquired
    Connection { address: String, reason: String },

    /// The connection broke while reading
    Io(io::Error),
}

impl SourceError {
    /// Shorthand for a connection failure against `address`.
    pub fn connection(address: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        SourceError::Connection {
            address: address.into(),
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Connection { address, reason } => {
                write!(f, "Failed to open {}: {}", address, reason)
            }
            SourceError::Io(e) => write!(f, "Connection lost: {}", e),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SourceError::Io(e) => Some(e),
            SourceError::Connection { .. } => None,
        }
    }
}

impl From<io::Error> for SourceError {
    fn from(err: io::Error) -> Self {
        SourceError::Io(err)
    }
}

/// Capability set shared by every line source.
///
/// Implementations must never block indefinitely in [`next_line`]: when no
/// complete line is available they return `Ok(None)` so the caller can idle,
/// check for shutdown and poll again.
///
/// [`next_line`]: LineSource::next_line
pub trait LineSource {
    /// Acquire the underlying resource.
    ///
    /// Opening an already open source is a no-op.
    fn open(&mut self) -> Result<(), SourceError>;

    /// Return the next raw line, without its `\n` terminator.
    ///
    /// `Ok(None)` means nothing is available right now. `Err(SourceError::Io)`
    /// means the connection is broken and must be reopened.
    fn next_line(&mut self) -> Result<Option<String>, SourceError>;

    /// Release the underlying resource. Safe to call repeatedly.
    fn close(&mut self);

    /// Whether the resource is currently held.
    fn is_open(&self) -> bool;

    /// Human readable identity for logs, e.g. the port name.
    fn describe(&self) -> String;
}

/// Which line source variant a deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// A physical serial device
    #[default]
    Serial,

    /// Synthetic readings from the built-in simulator
    Simulated,
}

impl SourceKind {
    /// Parse a configuration value (`serial` or `simulated`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "serial" => Some(SourceKind::Serial),
            "simulated" | "simulator" | "sim" => Some(SourceKind::Simulated),
            _ => None,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Serial => write!(f, "serial"),
            SourceKind::Simulated => write!(f, "simulated"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_from_name() {
        assert_eq!(SourceKind::from_name("serial"), Some(SourceKind::Serial));
        assert_eq!(SourceKind::from_name(" Simulated "), Some(SourceKind::Simulated));
        assert_eq!(SourceKind::from_name("sim"), Some(SourceKind::Simulated));
        assert_eq!(SourceKind::from_name("usb"), None);
        assert_eq!(SourceKind::default(), SourceKind::Serial);
    }

    #[test]
    fn test_source_error_display() {
        let err = SourceError::connection("/dev/ttyUSB0", "No such file or directory");
        assert_eq!(
            err.to_string(),
            "Failed to open /dev/ttyUSB0: No such file or directory"
        );

        let err = SourceError::from(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
        assert!(err.to_string().contains("unplugged"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
