//! Frame codecs
//!
//! A [`Codec`] sits between the raw WebSocket payload and the application. Inbound
//! frames go through [`Codec::from_wire`] to become a `(kind, message)` pair for the
//! router; outbound messages go through [`Codec::to_wire`].
//!
//! Two codecs ship with the crate:
//! - [`RawCodec`]: kind is always 0 and the message is the payload itself
//! - [`TaggedCodec`]: the first byte of the payload carries the kind

pub mod tagged;

use bytes::Bytes;

pub use tagged::TaggedCodec;

/// Error returned when a payload cannot be converted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Payload was empty where a header was required
    Empty,
    /// Message kind does not fit in the wire representation
    KindOutOfRange(u32),
    /// Payload could not be interpreted
    Malformed(String),
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Empty => write!(f, "Empty payload"),
            CodecError::KindOutOfRange(kind) => write!(f, "Message kind out of range: {}", kind),
            CodecError::Malformed(reason) => write!(f, "Malformed payload: {}", reason),
        }
    }
}

impl std::error::Error for CodecError {}

/// Converts between raw frame payloads and typed messages
///
/// One codec instance is shared by every connection, so implementations must be
/// `Send + Sync` and should keep no per-connection state.
pub trait Codec: Send + Sync + 'static {
    /// Decoded message type handed to the router
    type Message: Send + 'static;

    /// Parse an inbound payload into its kind and message
    fn from_wire(&self, raw: Bytes) -> Result<(u32, Self::Message), CodecError>;

    /// Serialize an outbound message of the given kind
    fn to_wire(&self, kind: u32, message: &Self::Message) -> Result<Bytes, CodecError>;
}

/// Pass-through codec: every frame is kind 0 and its payload is the message
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    type Message = Bytes;

    fn from_wire(&self, raw: Bytes) -> Result<(u32, Bytes), CodecError> {
        Ok((0, raw))
    }

    fn to_wire(&self, _kind: u32, message: &Bytes) -> Result<Bytes, CodecError> {
        Ok(message.clone())
    }
}
