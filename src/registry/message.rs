//! Requests accepted by the dispatcher

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::oneshot;

use super::entry::{ConnectionHandle, ConnectionKey};

/// Payload for a single connection
#[derive(Debug, Clone)]
pub struct AddressedMessage {
    /// Target connection
    pub key: ConnectionKey,
    /// Frame body, delivered unmodified
    pub payload: Bytes,
}

/// Payload for every member of one group
#[derive(Debug, Clone)]
pub struct GroupMessage {
    /// Target group
    pub group: Arc<str>,
    /// Frame body, delivered unmodified
    pub payload: Bytes,
}

/// Payload for every connection
#[derive(Debug, Clone)]
pub struct BroadcastMessage {
    /// Frame body, delivered unmodified
    pub payload: Bytes,
}

/// Add a connection; `ack` fires once the dispatcher has applied it
pub(crate) struct RegisterRequest {
    pub handle: ConnectionHandle,
    pub ack: oneshot::Sender<()>,
}

/// Remove a connection if its serial still matches; `ack` reports whether it was removed
pub(crate) struct UnregisterRequest {
    pub key: ConnectionKey,
    pub serial: u64,
    pub ack: oneshot::Sender<bool>,
}
