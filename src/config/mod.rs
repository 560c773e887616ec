//! Configuration module for uart-term.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `UART_TERM_CONFIG` environment variable (explicit path)
//! 2. `./uart-term.toml` (current directory)
//! 3. `<platform config dir>/uart-term/config.toml`
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is: `UART_TERM_<SECTION>_<KEY>`
//!
//! Examples:
//! - `UART_TERM_SERIAL_PORT=/dev/ttyUSB0`
//! - `UART_TERM_SERIAL_BAUD_RATE=115200`
//! - `UART_TERM_LOGGING_LEVEL=debug`
//!
//! # Example
//!
//! ```rust,no_run
//! use uart_term::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//! println!("Default baud: {}", config.serial.baud_rate);
//! # Ok::<(), uart_term::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_default_config_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{Config, LogFormat, LoggingConfig, SerialConfig, TerminalConfig};
