//! Configuration schema definitions.
//!
//! All sections default field-by-field, so a config file only needs the
//! values it changes.

use super::error::{ConfigError, ConfigResult};
use crate::display::{DisplayMode, LineEnding};
use crate::port::{DataBits, Parity, StopBits};
use crate::state::{self, PortConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial port defaults
    pub serial: SerialConfig,
    /// Terminal front-end behaviour
    pub terminal: TerminalConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values no session or terminal could work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::validation("serial.baud_rate", "must be positive"));
        }
        if self.serial.timeout_ms == 0 {
            return Err(ConfigError::validation("serial.timeout_ms", "must be positive"));
        }
        if self.terminal.queue_capacity == 0 {
            return Err(ConfigError::validation(
                "terminal.queue_capacity",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Serial port configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port to open when none is given on the command line
    pub port: Option<String>,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    /// Read timeout in milliseconds; also bounds how long a close can take
    pub timeout_ms: u64,
    /// Port aliases for convenience
    pub port_aliases: BTreeMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: state::DEFAULT_BAUD_RATE,
            data_bits: state::default_data_bits(),
            stop_bits: state::default_stop_bits(),
            parity: state::default_parity(),
            timeout_ms: state::DEFAULT_TIMEOUT_MS,
            port_aliases: BTreeMap::new(),
        }
    }
}

impl SerialConfig {
    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Session parameters for `port_name` (after alias resolution).
    pub fn port_config(&self, port_name: &str) -> PortConfig {
        PortConfig {
            port_name: self.resolve_port(port_name),
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
            timeout_ms: self.timeout_ms,
        }
    }
}

/// Terminal front-end configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub display: DisplayMode,
    /// Echo every sent line as `[sent] ...`
    pub echo_sent: bool,
    /// Terminator appended to each sent line
    pub line_ending: LineEnding,
    /// Prefix received chunks with a local timestamp
    pub timestamps: bool,
    /// Chunks buffered between the receive loop and the printer
    pub queue_capacity: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            display: DisplayMode::Text,
            echo_sent: true,
            line_ending: LineEnding::None,
            timestamps: false,
            queue_capacity: 64,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive, e.g. "info" or "uart_term=debug"
    pub level: String,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    Pretty,
    /// Compact format
    #[default]
    Compact,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            _ => Err(ConfigError::invalid_value(
                "log format",
                s,
                "'json', 'pretty' or 'compact'",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.serial.timeout_ms, 100);
        assert!(config.terminal.echo_sent);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_port_alias_resolution() {
        let mut config = SerialConfig::default();
        config
            .port_aliases
            .insert("arduino".to_string(), "/dev/ttyACM0".to_string());

        assert_eq!(config.resolve_port("arduino"), "/dev/ttyACM0");
        assert_eq!(config.resolve_port("COM5"), "COM5");
        assert_eq!(config.port_config("arduino").port_name, "/dev/ttyACM0");
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[serial]"));
        assert!(toml_str.contains("[terminal]"));
        assert!(toml_str.contains("[logging]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [serial]
            baud_rate = 115200
            parity = "even"
            stop_bits = "two"

            [terminal]
            display = "hex"
            line_ending = "crlf"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.serial.parity, Parity::Even);
        assert_eq!(config.serial.stop_bits, StopBits::Two);
        assert_eq!(config.terminal.display, DisplayMode::Hex);
        assert_eq!(config.terminal.line_ending, LineEnding::Crlf);
        // Defaults should still work
        assert_eq!(config.serial.data_bits, DataBits::Eight);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = Config::default();
        config.terminal.queue_capacity = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { .. })
        ));

        let mut config = Config::default();
        config.serial.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_format_words() {
        assert_eq!(" JSON ".parse::<LogFormat>().unwrap(), LogFormat::Json);
        match "xml".parse::<LogFormat>() {
            Err(ConfigError::InvalidValue { what, value, .. }) => {
                assert_eq!(what, "log format");
                assert_eq!(value, "xml");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
