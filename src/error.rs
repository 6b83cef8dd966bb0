use std::time::Duration;

use crate::modbus::packet::ExceptionCode;

/// Errors raised by the Modbus protocol layer.
///
/// `Connect`/`ConnectTimeout` only occur during the initial session setup and
/// are fatal to startup. Everything else is a per-read failure: the collector
/// absorbs it into the error counter and moves on to the next register.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    #[error("timed out connecting to {addr} after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("not connected")]
    NotConnected,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("device exception for function {function:#04x}: {code}")]
    Exception { function: u8, code: ExceptionCode },

    #[error("malformed response frame: {0}")]
    MalformedFrame(String),

    #[error("register value {0} is out of range")]
    OutOfRange(u16),
}

impl Error {
    /// True for errors that can only happen while establishing the session.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connect { .. } | Error::ConnectTimeout { .. })
    }
}
