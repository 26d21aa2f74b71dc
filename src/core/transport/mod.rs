//! Transport layer for the instrument link
//!
//! Supports:
//! - Serial ports (RS-232, USB-Serial adapters)
//! - The scripted [`VirtualInstrument`](crate::core::simulator::VirtualInstrument)
//!
//! All operations are blocking. A receive waits at most the given timeout and
//! returns an empty chunk when nothing arrived.

mod serial;

pub use serial::{list_ports, SerialConfig, SerialTransport};

use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Disconnected
    #[error("Disconnected")]
    Disconnected,
}

/// Transport statistics
#[derive(Debug, Clone, Default)]
pub struct TransportStats {
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
    /// Writes issued
    pub packets_sent: u64,
    /// Non-empty reads
    pub packets_received: u64,
    /// Baud rate changes
    pub baud_changes: u64,
}

/// Transport trait for the instrument link
pub trait TransportTrait {
    /// Send data, returning the number of bytes written
    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError>;

    /// Receive whatever is available, waiting at most `timeout`.
    ///
    /// An empty chunk means nothing arrived within the timeout.
    fn receive(&mut self, timeout: Duration) -> Result<Bytes, TransportError>;

    /// Switch the line rate
    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError>;

    /// Current line rate
    fn baud_rate(&self) -> u32;

    /// Discard anything buffered on the receive side
    fn clear_input(&mut self) -> Result<(), TransportError>;

    /// Get connection info string
    fn connection_info(&self) -> String;

    /// Get statistics
    fn stats(&self) -> TransportStats;
}

impl<T: TransportTrait + ?Sized> TransportTrait for Box<T> {
    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        (**self).send(data)
    }

    fn receive(&mut self, timeout: Duration) -> Result<Bytes, TransportError> {
        (**self).receive(timeout)
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        (**self).set_baud_rate(baud_rate)
    }

    fn baud_rate(&self) -> u32 {
        (**self).baud_rate()
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        (**self).clear_input()
    }

    fn connection_info(&self) -> String {
        (**self).connection_info()
    }

    fn stats(&self) -> TransportStats {
        (**self).stats()
    }
}
