//! Loading and saving configuration files.

use pretty_assertions::assert_eq;
use serial_test::serial;
use std::fs;
use uart_term::config::{Config, ConfigError, ConfigLoader, LogFormat};
use uart_term::display::{DisplayMode, LineEnding};
use uart_term::{Parity, StopBits};

#[test]
#[serial]
fn load_from_file_merges_with_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("uart-term.toml");
    fs::write(
        &path,
        r#"
            [serial]
            port = "arduino"
            baud_rate = 115200
            parity = "odd"

            [serial.port_aliases]
            arduino = "/dev/ttyACM0"

            [terminal]
            display = "hex"
            line_ending = "lf"

            [logging]
            format = "json"
        "#,
    )
    .unwrap();

    let loader = ConfigLoader::load_from(&path).unwrap();
    assert_eq!(loader.config_path.as_deref(), Some(path.as_path()));

    let config = loader.config();
    assert_eq!(config.serial.baud_rate, 115200);
    assert_eq!(config.serial.parity, Parity::Odd);
    assert_eq!(config.serial.stop_bits, StopBits::One);
    assert_eq!(config.terminal.display, DisplayMode::Hex);
    assert_eq!(config.terminal.line_ending, LineEnding::Lf);
    assert_eq!(config.logging.format, LogFormat::Json);

    let port = config.serial.port.clone().unwrap();
    let port_config = config.serial.port_config(&port);
    assert_eq!(port_config.port_name, "/dev/ttyACM0");
    assert_eq!(port_config.summary(), "115200 8O1");
}

#[test]
#[serial]
fn save_then_load_preserves_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::default();
    config.serial.port = Some("COM3".to_string());
    config.serial.stop_bits = StopBits::Two;
    config.terminal.timestamps = true;
    config.terminal.queue_capacity = 8;

    let loader = ConfigLoader {
        config_path: None,
        config: config.clone(),
    };
    loader.save_to(&path).unwrap();

    let reloaded = ConfigLoader::load_from(&path).unwrap().into_config();
    assert_eq!(reloaded, config);
}

#[test]
#[serial]
fn invalid_files_are_rejected() {
    let dir = tempfile::tempdir().unwrap();

    let broken = dir.path().join("broken.toml");
    fs::write(&broken, "[serial\nbaud_rate = ").unwrap();
    assert!(matches!(
        ConfigLoader::load_from(&broken),
        Err(ConfigError::ParseError(_))
    ));

    let zero = dir.path().join("zero.toml");
    fs::write(&zero, "[serial]\ntimeout_ms = 0\n").unwrap();
    assert!(matches!(
        ConfigLoader::load_from(&zero),
        Err(ConfigError::ValidationError { .. })
    ));

    let missing = dir.path().join("missing.toml");
    assert!(matches!(
        ConfigLoader::load_from(&missing),
        Err(ConfigError::ReadError { .. })
    ));
}

#[test]
#[serial]
fn explicit_config_path_variable_wins() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    fs::write(&path, "[serial]\nbaud_rate = 4800\n").unwrap();

    std::env::set_var("UART_TERM_CONFIG", &path);
    let loader = ConfigLoader::load();
    std::env::remove_var("UART_TERM_CONFIG");

    let loader = loader.unwrap();
    assert_eq!(loader.config_path.as_deref(), Some(path.as_path()));
    assert_eq!(loader.config().serial.baud_rate, 4800);
}
