//! Synchronous serial port implementation.
//!
//! Wraps the `serialport` crate's `SerialPort` trait with our own `SerialPortAdapter`
//! trait for dependency injection and testing.

use super::discovery;
use super::error::PortError;
use super::traits::{PortInfo, SerialBackend, SerialPortAdapter};
use crate::state::PortConfig;
use std::io::{Read, Write};
use tracing::debug;

/// Synchronous serial port implementation wrapping `serialport::SerialPort`.
pub struct SyncSerialPort {
    /// The underlying serial port implementation.
    port: Box<dyn serialport::SerialPort>,
    /// The port name/path for identification.
    name: String,
}

impl SyncSerialPort {
    /// Open a serial port with the given configuration.
    ///
    /// Parameters the transport cannot express (1.5 stop bits, mark/space
    /// parity) are rejected before the device is touched.
    ///
    /// # Example
    /// ```no_run
    /// use uart_term::port::SyncSerialPort;
    /// use uart_term::state::PortConfig;
    ///
    /// let port = SyncSerialPort::open(&PortConfig::new("/dev/ttyUSB0"))?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(config: &PortConfig) -> Result<Self, PortError> {
        let port_name = config.port_name.as_str();
        let parity = serialport::Parity::try_from(config.parity)?;
        let stop_bits = serialport::StopBits::try_from(config.stop_bits)?;

        let port = serialport::new(port_name, config.baud_rate)
            .data_bits(config.data_bits.into())
            .flow_control(serialport::FlowControl::None)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(config.timeout())
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::not_found(port_name),
                serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
                _ => PortError::Serial(e),
            })?;

        debug!(port = port_name, settings = %config.summary(), "serial port opened");

        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }
}

impl SerialPortAdapter for SyncSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        self.port.write(data).map_err(PortError::Io)
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        self.port.read(buffer).map_err(PortError::Io)
    }

    fn flush(&mut self) -> Result<(), PortError> {
        self.port.flush().map_err(PortError::Io)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn try_clone_port(&self) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        let port = self.port.try_clone().map_err(PortError::Serial)?;
        Ok(Box::new(Self {
            port,
            name: self.name.clone(),
        }))
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate().ok())
            .finish()
    }
}

/// Backend over the operating system's serial devices.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBackend;

impl SerialBackend for SystemBackend {
    fn available_ports(&self) -> Result<Vec<PortInfo>, PortError> {
        discovery::list_ports()
    }

    fn open(&self, config: &PortConfig) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        Ok(Box::new(SyncSerialPort::open(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{Parity, StopBits};

    #[test]
    fn test_port_not_found_error() {
        let config = PortConfig::new("/dev/nonexistent_port_12345");
        let result = SyncSerialPort::open(&config);

        match result {
            Err(PortError::NotFound(name)) => assert!(name.contains("nonexistent")),
            // Some platforms report a missing node as a plain I/O failure.
            Err(PortError::Serial(_)) | Err(PortError::Io(_)) => {}
            other => panic!("Expected NotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_parameters_rejected_before_open() {
        let mut config = PortConfig::new("/dev/nonexistent_port_12345");
        config.parity = Parity::Mark;
        assert!(matches!(
            SyncSerialPort::open(&config),
            Err(PortError::Unsupported(_))
        ));

        config.parity = Parity::None;
        config.stop_bits = StopBits::OneAndHalf;
        assert!(matches!(
            SystemBackend.open(&config),
            Err(PortError::Unsupported(_))
        ));
    }
}
