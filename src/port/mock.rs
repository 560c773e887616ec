//! Mock serial port implementation for testing.
//!
//! A [`MockPortController`] is the test's side of a simulated device: it queues
//! incoming bursts, injects faults and inspects what was written. Every
//! [`MockSerialPort`] handle opened on it shares that state, and the
//! controller counts how many handles are still alive so tests can assert
//! that a session released its port.

use super::error::PortError;
use super::traits::{PortInfo, SerialBackend, SerialPortAdapter};
use crate::state::PortConfig;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct MockPortState {
    /// Pending incoming bursts; one read never spans two bursts.
    bursts: VecDeque<Vec<u8>>,
    /// Log of all successful writes.
    write_log: Vec<Vec<u8>>,
    /// Number of write calls, including failed ones.
    write_calls: usize,
    /// Error returned by the next read, if set.
    read_fault: Option<io::ErrorKind>,
    /// Error returned by the next write, if set.
    write_fault: Option<io::ErrorKind>,
    /// Handles currently alive.
    live_handles: usize,
    /// Handles ever created.
    handles_opened: usize,
    /// The next read reports end-of-file.
    read_eof: bool,
}

#[derive(Debug, Default)]
struct MockShared {
    state: Mutex<MockPortState>,
    data_ready: Condvar,
}

/// Test-side controller for a simulated serial device.
///
/// # Example
/// ```
/// use uart_term::port::{MockPortController, SerialPortAdapter};
/// use std::time::Duration;
///
/// let device = MockPortController::new("MOCK0");
/// let mut port = device.open_handle(Duration::from_millis(10));
///
/// device.enqueue_read(b"Hello, World!");
/// let mut buffer = [0u8; 32];
/// let n = port.read_bytes(&mut buffer).unwrap();
/// assert_eq!(&buffer[..n], b"Hello, World!");
///
/// port.write_bytes(b"Response").unwrap();
/// assert_eq!(device.write_log(), vec![b"Response".to_vec()]);
/// ```
#[derive(Debug, Clone)]
pub struct MockPortController {
    name: String,
    shared: Arc<MockShared>,
}

impl MockPortController {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(MockShared::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open a new handle on this device.
    pub fn open_handle(&self, timeout: Duration) -> MockSerialPort {
        let mut state = self.shared.state.lock();
        state.live_handles += 1;
        state.handles_opened += 1;
        MockSerialPort {
            name: self.name.clone(),
            shared: Arc::clone(&self.shared),
            timeout,
        }
    }

    /// Queue one incoming burst. Reads return it whole if the buffer allows.
    pub fn enqueue_read(&self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.shared.state.lock().bursts.push_back(data.to_vec());
        self.shared.data_ready.notify_all();
    }

    /// Make the next read fail with an I/O error of `kind`.
    pub fn fail_next_read(&self, kind: io::ErrorKind) {
        self.shared.state.lock().read_fault = Some(kind);
        self.shared.data_ready.notify_all();
    }

    /// Make the next read return zero bytes, as a handle at end-of-file does.
    pub fn eof_next_read(&self) {
        self.shared.state.lock().read_eof = true;
        self.shared.data_ready.notify_all();
    }

    /// Make the next write fail with an I/O error of `kind`.
    pub fn fail_next_write(&self, kind: io::ErrorKind) {
        self.shared.state.lock().write_fault = Some(kind);
    }

    /// Copy of all data written so far, one entry per write call.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().write_log.clone()
    }

    /// Number of write calls made, including failed ones.
    pub fn write_calls(&self) -> usize {
        self.shared.state.lock().write_calls
    }

    /// Bursts queued but not yet read.
    pub fn pending_bursts(&self) -> usize {
        self.shared.state.lock().bursts.len()
    }

    pub fn live_handles(&self) -> usize {
        self.shared.state.lock().live_handles
    }

    pub fn handles_opened(&self) -> usize {
        self.shared.state.lock().handles_opened
    }
}

/// One handle on a [`MockPortController`] device.
pub struct MockSerialPort {
    name: String,
    shared: Arc<MockShared>,
    timeout: Duration,
}

impl SerialPortAdapter for MockSerialPort {
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError> {
        let mut state = self.shared.state.lock();
        state.write_calls += 1;
        if let Some(kind) = state.write_fault.take() {
            return Err(PortError::Io(io::Error::new(kind, "injected write fault")));
        }
        state.write_log.push(data.to_vec());
        Ok(data.len())
    }

    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError> {
        let deadline = Instant::now() + self.timeout;
        let mut state = self.shared.state.lock();

        loop {
            if let Some(kind) = state.read_fault.take() {
                return Err(PortError::Io(io::Error::new(kind, "injected read fault")));
            }
            if std::mem::take(&mut state.read_eof) {
                return Ok(0);
            }

            if let Some(burst) = state.bursts.front_mut() {
                let n = burst.len().min(buffer.len());
                buffer[..n].copy_from_slice(&burst[..n]);
                if n == burst.len() {
                    state.bursts.pop_front();
                } else {
                    burst.drain(..n);
                }
                return Ok(n);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(PortError::timeout(self.timeout));
            }
            self.shared.data_ready.wait_for(&mut state, deadline - now);
        }
    }

    fn flush(&mut self) -> Result<(), PortError> {
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn try_clone_port(&self) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        let controller = MockPortController {
            name: self.name.clone(),
            shared: Arc::clone(&self.shared),
        };
        Ok(Box::new(controller.open_handle(self.timeout)))
    }
}

impl Drop for MockSerialPort {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.live_handles = state.live_handles.saturating_sub(1);
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Backend serving [`MockPortController`] devices by name.
///
/// Opening applies the same parameter checks as the real transport, so
/// unsupported stop-bit/parity values fail here too.
#[derive(Debug, Default)]
pub struct MockBackend {
    devices: Mutex<HashMap<String, MockPortController>>,
    denied: Mutex<HashSet<String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device and return its controller.
    pub fn add_device(&self, name: impl Into<String>) -> MockPortController {
        let controller = MockPortController::new(name);
        self.devices
            .lock()
            .insert(controller.name().to_string(), controller.clone());
        controller
    }

    /// Remove a device, as if it were unplugged.
    pub fn remove_device(&self, name: &str) -> Option<MockPortController> {
        self.devices.lock().remove(name)
    }

    /// Make opening `name` fail with a permission error.
    pub fn deny(&self, name: impl Into<String>) {
        self.denied.lock().insert(name.into());
    }
}

impl SerialBackend for MockBackend {
    fn available_ports(&self) -> Result<Vec<PortInfo>, PortError> {
        let mut names: Vec<String> = self.devices.lock().keys().cloned().collect();
        names.sort();
        Ok(names.into_iter().map(PortInfo::plain).collect())
    }

    fn open(&self, config: &PortConfig) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        serialport::Parity::try_from(config.parity)?;
        serialport::StopBits::try_from(config.stop_bits)?;

        if self.denied.lock().contains(&config.port_name) {
            return Err(PortError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("permission denied: {}", config.port_name),
            )));
        }

        let devices = self.devices.lock();
        let controller = devices
            .get(&config.port_name)
            .ok_or_else(|| PortError::not_found(&config.port_name))?;
        Ok(Box::new(controller.open_handle(config.timeout())))
    }
}
