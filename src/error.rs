//! Crate-level error types

use tokio_tungstenite::tungstenite;

use crate::codec::CodecError;
use crate::registry::HubError;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Socket or listener I/O failure
    Io(std::io::Error),
    /// WebSocket protocol or handshake failure
    WebSocket(tungstenite::Error),
    /// Payload could not be encoded or decoded
    Codec(CodecError),
    /// The hub rejected or could not accept a request
    Hub(HubError),
    /// The WebSocket upgrade did not finish in time
    HandshakeTimeout,
    /// Request path did not name a group and identity
    InvalidPath(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::WebSocket(e) => write!(f, "WebSocket error: {}", e),
            Error::Codec(e) => write!(f, "Codec error: {}", e),
            Error::Hub(e) => write!(f, "Hub error: {}", e),
            Error::HandshakeTimeout => write!(f, "WebSocket handshake timed out"),
            Error::InvalidPath(path) => write!(f, "Invalid connection path: {}", path),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::WebSocket(e) => Some(e),
            Error::Codec(e) => Some(e),
            Error::Hub(e) => Some(e),
            Error::HandshakeTimeout | Error::InvalidPath(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<tungstenite::Error> for Error {
    fn from(e: tungstenite::Error) -> Self {
        Error::WebSocket(e)
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Error::Codec(e)
    }
}

impl From<HubError> for Error {
    fn from(e: HubError) -> Self {
        Error::Hub(e)
    }
}
