//! Connection keys and handles
//!
//! This module defines what the registry stores for each connection.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::error::HubError;
use super::policy::OverflowPolicy;

/// Address of a connection: its group plus its identity within that group
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    /// Group name (e.g., "lobby")
    pub group: Arc<str>,
    /// Identity, unique within the group
    pub id: Arc<str>,
}

impl ConnectionKey {
    /// Create a new connection key
    pub fn new(group: impl Into<Arc<str>>, id: impl Into<Arc<str>>) -> Self {
        Self {
            group: group.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.group, self.id)
    }
}

/// Registry entry for one connection
///
/// Holds the sending half of the connection's outbound queue. The registry keeps the
/// only long-lived copy; once it drops the handle the queue closes and the
/// connection's write task finishes.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    key: ConnectionKey,
    serial: u64,
    tx: mpsc::Sender<Bytes>,
}

impl ConnectionHandle {
    /// Wrap an existing outbound sender
    pub fn new(key: ConnectionKey, serial: u64, tx: mpsc::Sender<Bytes>) -> Self {
        Self { key, serial, tx }
    }

    /// Create a handle together with the receiving end of its outbound queue
    pub fn channel(
        key: ConnectionKey,
        serial: u64,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(key, serial, tx), rx)
    }

    /// Group and identity of the connection
    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    /// Serial distinguishing this connection from earlier ones with the same key
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Whether the connection's write side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue a payload for the connection's write task
    pub async fn send(&self, payload: Bytes, policy: OverflowPolicy) -> Result<(), HubError> {
        policy.send(&self.tx, payload).await
    }
}
