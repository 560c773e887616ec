//! uart-term library
//!
//! A restartable, cancellable serial (UART) session core, plus the pieces
//! the `uart-term` terminal front-end is built from.
//!
//! # Modules
//!
//! - `session`: `SerialSession`, its receive loop and chunk sinks
//! - `port`: Port abstraction layer (real `serialport` backend and mocks)
//! - `state`: Port configuration and session state
//! - `error`: Session error type
//! - `config`: Configuration management with TOML support
//! - `display`: Rendering of received and sent data for a terminal
//! - `logging`: `tracing` subscriber setup

pub mod config;
pub mod display;
pub mod error;
pub mod logging;
pub mod port;
pub mod session;
pub mod state;

// Re-export commonly used types for convenience
pub use error::{SessionError, SessionResult};
pub use port::{
    DataBits, MockBackend, MockPortController, Parity, PortError, PortInfo, SerialBackend,
    SerialPortAdapter, StopBits, SystemBackend,
};
pub use session::{
    CallbackSink, ChannelSink, ChunkSink, Delivery, ReceivedChunk, SerialSession, SessionEvent,
    SessionStats,
};
pub use state::{PortConfig, SessionState, STANDARD_BAUD_RATES};

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
