//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "UART_TERM";

/// Config file name looked up in the current directory
const LOCAL_CONFIG_FILE_NAME: &str = "uart-term.toml";

/// Config file name inside the platform config directory
const CONFIG_FILE_NAME: &str = "config.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "UART_TERM_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `UART_TERM_CONFIG` environment variable (explicit path)
    /// 2. `./uart-term.toml` (current directory)
    /// 3. `<platform config dir>/uart-term/config.toml`
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables can override any config file values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Still apply env overrides even with defaults
        if apply_env_overrides(&mut config).is_err() || config.validate().is_err() {
            config = Config::default();
        }

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }

    /// Save the current configuration to a specific file.
    pub fn save_to(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        save_to_file(&self.config, path.as_ref())
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(LOCAL_CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. Platform config directory
    if let Some(app_config) = get_default_config_path() {
        if app_config.exists() {
            return Some(app_config);
        }
    }

    None
}

/// Get the default config directory for creating new config files.
pub fn get_default_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "uart-term").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_default_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

/// Save configuration to a file.
fn save_to_file(config: &Config, path: &Path) -> ConfigResult<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read `UART_TERM_<suffix>` and parse it, if set.
fn env_value<T>(suffix: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let var = format!("{}_{}", ENV_PREFIX, suffix);
    match std::env::var(&var) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::env_parse(var, e.to_string())),
        Err(_) => Ok(None),
    }
}

fn env_flag(suffix: &str) -> Option<bool> {
    std::env::var(format!("{}_{}", ENV_PREFIX, suffix))
        .ok()
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `UART_TERM_<SECTION>_<KEY>`
/// For example:
/// - `UART_TERM_SERIAL_PORT=/dev/ttyUSB0`
/// - `UART_TERM_SERIAL_BAUD_RATE=115200`
/// - `UART_TERM_TERMINAL_DISPLAY=hex`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Serial overrides
    if let Some(port) = env_value::<String>("SERIAL_PORT")? {
        config.serial.port = Some(port);
    }
    if let Some(baud) = env_value("SERIAL_BAUD_RATE")? {
        config.serial.baud_rate = baud;
    }
    if let Some(bits) = env_value("SERIAL_DATA_BITS")? {
        config.serial.data_bits = bits;
    }
    if let Some(bits) = env_value("SERIAL_STOP_BITS")? {
        config.serial.stop_bits = bits;
    }
    if let Some(parity) = env_value("SERIAL_PARITY")? {
        config.serial.parity = parity;
    }
    if let Some(timeout) = env_value("SERIAL_TIMEOUT_MS")? {
        config.serial.timeout_ms = timeout;
    }

    // Terminal overrides
    if let Some(display) = env_value("TERMINAL_DISPLAY")? {
        config.terminal.display = display;
    }
    if let Some(ending) = env_value("TERMINAL_LINE_ENDING")? {
        config.terminal.line_ending = ending;
    }
    if let Some(echo) = env_flag("TERMINAL_ECHO_SENT") {
        config.terminal.echo_sent = echo;
    }
    if let Some(timestamps) = env_flag("TERMINAL_TIMESTAMPS") {
        config.terminal.timestamps = timestamps;
    }

    // Logging overrides
    if let Some(level) = env_value::<String>("LOGGING_LEVEL")? {
        config.logging.level = level;
    }
    if let Some(format) = env_value("LOGGING_FORMAT")? {
        config.logging.format = format;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DisplayMode;
    use crate::port::Parity;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_default_loader() {
        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.baud_rate, 9600);
        assert!(loader.config_path.is_none());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        env::set_var("UART_TERM_SERIAL_BAUD_RATE", "57600");
        env::set_var("UART_TERM_SERIAL_PARITY", "o");
        env::set_var("UART_TERM_TERMINAL_DISPLAY", "hex");

        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.baud_rate, 57600);
        assert_eq!(loader.config().serial.parity, Parity::Odd);
        assert_eq!(loader.config().terminal.display, DisplayMode::Hex);

        env::remove_var("UART_TERM_SERIAL_BAUD_RATE");
        env::remove_var("UART_TERM_SERIAL_PARITY");
        env::remove_var("UART_TERM_TERMINAL_DISPLAY");
    }

    #[test]
    #[serial]
    fn test_bad_env_value_is_reported() {
        env::set_var("UART_TERM_SERIAL_BAUD_RATE", "fast");
        let mut config = Config::default();
        let err = apply_env_overrides(&mut config).unwrap_err();
        assert!(matches!(err, ConfigError::EnvParseError { .. }));
        env::remove_var("UART_TERM_SERIAL_BAUD_RATE");

        env::set_var("UART_TERM_LOGGING_FORMAT", "xml");
        let err = apply_env_overrides(&mut config).unwrap_err();
        env::remove_var("UART_TERM_LOGGING_FORMAT");
        match err {
            ConfigError::EnvParseError { var, message } => {
                assert_eq!(var, "UART_TERM_LOGGING_FORMAT");
                assert!(message.contains("Invalid log format 'xml'"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn test_env_flags() {
        env::set_var("UART_TERM_TERMINAL_ECHO_SENT", "0");
        env::set_var("UART_TERM_TERMINAL_TIMESTAMPS", "TRUE");

        let loader = ConfigLoader::with_defaults();
        assert!(!loader.config().terminal.echo_sent);
        assert!(loader.config().terminal.timestamps);

        env::remove_var("UART_TERM_TERMINAL_ECHO_SENT");
        env::remove_var("UART_TERM_TERMINAL_TIMESTAMPS");
    }
}
