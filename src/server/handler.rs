//! Application routing hook
//!
//! Every decoded inbound frame is handed to a [`Router`] together with the context of
//! the connection it arrived on.

use std::net::SocketAddr;

use crate::registry::ConnectionKey;

/// Information about the connection a message arrived on
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    key: ConnectionKey,
    serial: u64,
    peer_addr: Option<SocketAddr>,
}

impl ConnectionContext {
    /// Create a new context
    pub fn new(key: ConnectionKey, serial: u64, peer_addr: Option<SocketAddr>) -> Self {
        Self {
            key,
            serial,
            peer_addr,
        }
    }

    /// Group and identity
    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    /// Identity within the group
    pub fn id(&self) -> &str {
        &self.key.id
    }

    /// Group name
    pub fn group(&self) -> &str {
        &self.key.group
    }

    /// Connection serial assigned by the hub
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Remote address, when the connection came in over TCP
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }
}

/// Receives decoded inbound messages
///
/// Called on the connection's read task, so implementations must return quickly.
/// Long-running work belongs on a separate task. Replies go out through a
/// [`Hub`](crate::registry::Hub) the router holds.
pub trait Router<M>: Send + Sync + 'static {
    /// Dispatch one message of the given kind
    fn route(&self, ctx: &ConnectionContext, kind: u32, message: M);
}

impl<M, F> Router<M> for F
where
    F: Fn(&ConnectionContext, u32, M) + Send + Sync + 'static,
{
    fn route(&self, ctx: &ConnectionContext, kind: u32, message: M) {
        self(ctx, kind, message)
    }
}
