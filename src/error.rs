use thiserror::Error;

use crate::port::PortError;

/// Errors surfaced by [`SerialSession`](crate::session::SerialSession).
///
/// Every failure is reported once; nothing is retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Bad device path, permission failure or rejected parameter combination.
    #[error("Failed to open serial port: {reason}")]
    OpenFailed { reason: String },

    #[error("Port is already open. Close it before opening it again.")]
    AlreadyOpen,

    #[error("Operation requires an open serial port, but the port is closed.")]
    NotOpen,

    #[error("Failed to write to serial port: {reason}")]
    WriteFailed { reason: String },

    /// The receive loop hit an unrecoverable transport error; the session
    /// has been closed.
    #[error("Failed to read from serial port: {reason}")]
    ReadFailed { reason: String },

    #[error("Refusing to send an empty payload")]
    EmptyPayload,
}

impl SessionError {
    pub fn open_failed(err: impl std::fmt::Display) -> Self {
        Self::OpenFailed {
            reason: err.to_string(),
        }
    }

    pub fn write_failed(err: &PortError) -> Self {
        Self::WriteFailed {
            reason: err.to_string(),
        }
    }

    pub fn read_failed(err: &PortError) -> Self {
        Self::ReadFailed {
            reason: err.to_string(),
        }
    }
}

/// A specialized `Result` type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SessionError::open_failed(PortError::not_found("COM7"));
        assert_eq!(
            err.to_string(),
            "Failed to open serial port: Serial port not found: COM7"
        );
        assert_eq!(
            SessionError::EmptyPayload.to_string(),
            "Refusing to send an empty payload"
        );
    }

    #[test]
    fn test_transport_errors_keep_reason() {
        let io = PortError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"));
        assert!(SessionError::read_failed(&io).to_string().contains("gone"));
        assert!(SessionError::write_failed(&io).to_string().contains("gone"));
    }
}
