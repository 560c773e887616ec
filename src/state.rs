use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::port::{DataBits, Parity, StopBits};

/// Configuration for one serial session.
///
/// Fixed for the lifetime of a session; changing any field means closing and
/// opening again.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortConfig {
    pub port_name: String,
    #[serde(default = "default_baud")]
    pub baud_rate: u32,
    #[serde(default = "default_data_bits")]
    pub data_bits: DataBits,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: StopBits,
    #[serde(default = "default_parity")]
    pub parity: Parity,
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

// Default configuration constants
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Baud rates offered by the terminal front-end.
pub const STANDARD_BAUD_RATES: [u32; 8] = [1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200];

/// Default baud rate for serial port configuration (9600 bps).
pub fn default_baud() -> u32 {
    DEFAULT_BAUD_RATE
}

/// Default read timeout (100 ms).
pub fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Default data bits configuration (8 bits).
pub fn default_data_bits() -> DataBits {
    DataBits::Eight
}

/// Default parity configuration (none).
pub fn default_parity() -> Parity {
    Parity::None
}

/// Default stop bits configuration (1 bit).
pub fn default_stop_bits() -> StopBits {
    StopBits::One
}

impl PortConfig {
    /// 9600 8N1 with the default timeout on `port_name`.
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate: default_baud(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: default_parity(),
            timeout_ms: default_timeout(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Check the fields that are invalid on every transport.
    ///
    /// Whether a given stop-bit/parity value is supported is the backend's
    /// call and is checked at open time.
    pub fn validate(&self) -> Result<(), String> {
        if self.port_name.trim().is_empty() {
            return Err("no port name given".to_string());
        }
        if self.baud_rate == 0 {
            return Err("baud rate must be positive".to_string());
        }
        if self.timeout_ms == 0 {
            return Err("read timeout must be positive".to_string());
        }
        Ok(())
    }

    /// Compact description such as `9600 8N1`.
    pub fn summary(&self) -> String {
        format!(
            "{} {}{}{}",
            self.baud_rate,
            self.data_bits,
            self.parity.letter(),
            self.stop_bits
        )
    }
}

/// Lifecycle state of a [`SerialSession`](crate::session::SerialSession).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Closed,
    Open,
    /// Teardown in progress: the receive loop is being stopped and the
    /// handle has not been released yet.
    Closing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        f.write_str(s)
    }
}
