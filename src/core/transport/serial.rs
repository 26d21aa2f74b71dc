//! Serial port transport implementation

use super::{TransportError, TransportStats, TransportTrait};
use bytes::Bytes;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

/// Shortest read timeout handed to the driver
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Serial port configuration
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name (e.g., COM3, /dev/ttyUSB0)
    pub port: String,
    /// Initial baud rate
    pub baud_rate: u32,
}

impl SerialConfig {
    /// Create a new serial configuration (8N1, no flow control)
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new("/dev/ttyUSB0", 9600)
    }
}

/// Serial port transport
pub struct SerialTransport {
    config: SerialConfig,
    port: Box<dyn SerialPort>,
    stats: TransportStats,
}

impl SerialTransport {
    /// Open the port described by `config`
    pub fn open(config: SerialConfig) -> Result<Self, TransportError> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => TransportError::PortNotFound(config.port.clone()),
                serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                    TransportError::PermissionDenied(config.port.clone())
                }
                _ => TransportError::ConnectionFailed(e.to_string()),
            })?;

        debug!("Opened {} @ {} baud", config.port, config.baud_rate);

        Ok(Self {
            config,
            port,
            stats: TransportStats::default(),
        })
    }
}

impl TransportTrait for SerialTransport {
    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.port.write_all(data)?;
        self.port.flush()?;

        self.stats.bytes_sent += data.len() as u64;
        self.stats.packets_sent += 1;

        Ok(data.len())
    }

    fn receive(&mut self, timeout: Duration) -> Result<Bytes, TransportError> {
        self.port
            .set_timeout(timeout.max(MIN_READ_TIMEOUT))
            .map_err(|e| TransportError::ConfigError(e.to_string()))?;

        let mut buffer = vec![0u8; 4096];

        match self.port.read(&mut buffer) {
            Ok(0) => Err(TransportError::Disconnected),
            Ok(n) => {
                buffer.truncate(n);
                self.stats.bytes_received += n as u64;
                self.stats.packets_received += 1;
                Ok(Bytes::from(buffer))
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Bytes::new()),
            Err(e) => Err(TransportError::IoError(e)),
        }
    }

    fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        self.port
            .set_baud_rate(baud_rate)
            .map_err(|e| TransportError::ConfigError(e.to_string()))?;
        self.config.baud_rate = baud_rate;
        self.stats.baud_changes += 1;
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.config.baud_rate
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| TransportError::ConfigError(e.to_string()))
    }

    fn connection_info(&self) -> String {
        format!("{} @ {} baud (8N1)", self.config.port, self.config.baud_rate)
    }

    fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::IoError(e.into()))
}
