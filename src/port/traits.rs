//! Core traits for serial port abstraction.
//!
//! `SerialPortAdapter` is one open handle; `SerialBackend` is the factory that
//! opens handles and enumerates devices. Both have real and mock versions so
//! the session can be driven without hardware.

use super::error::PortError;
use crate::state::PortConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl DataBits {
    pub const ALL: [DataBits; 4] = [Self::Five, Self::Six, Self::Seven, Self::Eight];

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => serialport::DataBits::Five,
            DataBits::Six => serialport::DataBits::Six,
            DataBits::Seven => serialport::DataBits::Seven,
            DataBits::Eight => serialport::DataBits::Eight,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = PortError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(PortError::config(format!(
                "data bits must be 5, 6, 7 or 8 (got {other})"
            ))),
        }
    }
}

impl FromStr for DataBits {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u8 = s
            .trim()
            .parse()
            .map_err(|_| PortError::config(format!("invalid data bits '{s}'")))?;
        Self::try_from(value)
    }
}

impl fmt::Display for DataBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Parity checking modes.
///
/// `Mark` and `Space` are part of the model but the `serialport` transport
/// cannot set them; opening with either fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Parity {
    None,
    Even,
    Odd,
    Mark,
    Space,
}

impl Parity {
    pub const ALL: [Parity; 5] = [Self::None, Self::Even, Self::Odd, Self::Mark, Self::Space];

    /// Single-letter code used in "8N1"-style summaries.
    pub fn letter(self) -> char {
        match self {
            Self::None => 'N',
            Self::Even => 'E',
            Self::Odd => 'O',
            Self::Mark => 'M',
            Self::Space => 'S',
        }
    }
}

impl TryFrom<Parity> for serialport::Parity {
    type Error = PortError;

    fn try_from(parity: Parity) -> Result<Self, Self::Error> {
        match parity {
            Parity::None => Ok(serialport::Parity::None),
            Parity::Odd => Ok(serialport::Parity::Odd),
            Parity::Even => Ok(serialport::Parity::Even),
            Parity::Mark | Parity::Space => Err(PortError::unsupported(format!(
                "{parity} parity is not supported by the serial transport"
            ))),
        }
    }
}

impl FromStr for Parity {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "n" | "none" => Ok(Self::None),
            "e" | "even" => Ok(Self::Even),
            "o" | "odd" => Ok(Self::Odd),
            "m" | "mark" => Ok(Self::Mark),
            "s" | "space" => Ok(Self::Space),
            _ => Err(PortError::config(format!("invalid parity '{s}'"))),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Even => "even",
            Self::Odd => "odd",
            Self::Mark => "mark",
            Self::Space => "space",
        };
        f.write_str(name)
    }
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopBits {
    One,
    OneAndHalf,
    Two,
}

impl StopBits {
    pub const ALL: [StopBits; 3] = [Self::One, Self::OneAndHalf, Self::Two];
}

impl TryFrom<StopBits> for serialport::StopBits {
    type Error = PortError;

    fn try_from(bits: StopBits) -> Result<Self, Self::Error> {
        match bits {
            StopBits::One => Ok(serialport::StopBits::One),
            StopBits::Two => Ok(serialport::StopBits::Two),
            StopBits::OneAndHalf => Err(PortError::unsupported(
                "1.5 stop bits are not supported by the serial transport",
            )),
        }
    }
}

impl FromStr for StopBits {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "one" => Ok(Self::One),
            "1.5" | "one_and_half" => Ok(Self::OneAndHalf),
            "2" | "two" => Ok(Self::Two),
            _ => Err(PortError::config(format!("invalid stop bits '{s}'"))),
        }
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::One => "1",
            Self::OneAndHalf => "1.5",
            Self::Two => "2",
        };
        f.write_str(s)
    }
}

/// Kind of device behind an enumerated port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortKind {
    Usb,
    Pci,
    Bluetooth,
    Unknown,
}

/// One entry of the port enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub name: String,
    pub kind: PortKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
}

impl PortInfo {
    /// A port with no extra device details.
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PortKind::Unknown,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
        }
    }
}

/// Trait for serial port I/O operations.
///
/// Reads are bounded by the handle's timeout; an implementation must return
/// (with data, or an error for which [`PortError::is_timeout`] holds) once the
/// timeout elapses.
pub trait SerialPortAdapter: Send + fmt::Debug {
    /// Write bytes to the serial port.
    ///
    /// Returns the number of bytes actually written.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize, PortError>;

    /// Read bytes from the serial port into the provided buffer.
    ///
    /// Returns the number of bytes actually read.
    fn read_bytes(&mut self, buffer: &mut [u8]) -> Result<usize, PortError>;

    /// Flush pending output.
    fn flush(&mut self) -> Result<(), PortError>;

    /// Get the name/path of this serial port.
    fn name(&self) -> &str;

    /// Open a second handle to the same device.
    ///
    /// The session reads on the clone and writes on the original, so the two
    /// directions never contend for a lock.
    fn try_clone_port(&self) -> Result<Box<dyn SerialPortAdapter>, PortError>;

    /// Write the entire buffer, looping over short writes.
    fn write_all_bytes(&mut self, mut data: &[u8]) -> Result<(), PortError> {
        while !data.is_empty() {
            match self.write_bytes(data)? {
                0 => {
                    return Err(PortError::Io(std::io::Error::new(
                        std::io::ErrorKind::WriteZero,
                        "serial port accepted zero bytes",
                    )))
                }
                n => data = &data[n..],
            }
        }
        Ok(())
    }
}

/// Opens port handles and enumerates devices.
pub trait SerialBackend: Send + Sync {
    /// Currently available devices. Never cached; call again for fresh data.
    fn available_ports(&self) -> Result<Vec<PortInfo>, PortError>;

    /// Open `config.port_name` with the given parameters.
    fn open(&self, config: &PortConfig) -> Result<Box<dyn SerialPortAdapter>, PortError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_bits_conversion() {
        let serialport_bits: serialport::DataBits = DataBits::Seven.into();
        assert_eq!(serialport_bits, serialport::DataBits::Seven);
        assert_eq!(DataBits::try_from(5).unwrap(), DataBits::Five);
        assert!(DataBits::try_from(9).is_err());
        assert_eq!("8".parse::<DataBits>().unwrap(), DataBits::Eight);
    }

    #[test]
    fn test_parity_conversion() {
        let serialport_parity = serialport::Parity::try_from(Parity::Even).unwrap();
        assert_eq!(serialport_parity, serialport::Parity::Even);

        let err = serialport::Parity::try_from(Parity::Mark).unwrap_err();
        assert!(matches!(err, PortError::Unsupported(_)));
        assert!(serialport::Parity::try_from(Parity::Space).is_err());
    }

    #[test]
    fn test_stop_bits_conversion() {
        let serialport_stop_bits = serialport::StopBits::try_from(StopBits::Two).unwrap();
        assert_eq!(serialport_stop_bits, serialport::StopBits::Two);
        assert!(serialport::StopBits::try_from(StopBits::OneAndHalf).is_err());
    }

    #[test]
    fn test_parse_user_spellings() {
        assert_eq!("E".parse::<Parity>().unwrap(), Parity::Even);
        assert_eq!("space".parse::<Parity>().unwrap(), Parity::Space);
        assert!("x".parse::<Parity>().is_err());
        assert_eq!("1.5".parse::<StopBits>().unwrap(), StopBits::OneAndHalf);
        assert_eq!("2".parse::<StopBits>().unwrap(), StopBits::Two);
        assert!("3".parse::<StopBits>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_from_str() {
        for parity in Parity::ALL {
            assert_eq!(parity.to_string().parse::<Parity>().unwrap(), parity);
        }
        for bits in StopBits::ALL {
            assert_eq!(bits.to_string().parse::<StopBits>().unwrap(), bits);
        }
    }
}
