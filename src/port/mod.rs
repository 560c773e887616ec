//! Port abstraction layer for serial communication.
//!
//! Provides traits and implementations for serial I/O and device
//! enumeration, enabling dependency injection and testing via mocks.

pub mod discovery;
pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::{MockBackend, MockPortController, MockSerialPort};
pub use sync_port::{SyncSerialPort, SystemBackend};
pub use traits::*;
