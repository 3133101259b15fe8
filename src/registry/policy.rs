//! Queue overflow policies
//!
//! Every queue in the hub is bounded. What happens when one fills up is an explicit
//! configuration choice rather than a fixed behaviour.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};

use super::error::HubError;

/// What a sender does when the destination queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Wait until there is room (no timeout)
    #[default]
    Block,
    /// Reject the new item immediately
    DropNewest,
    /// Wait up to the given duration, then reject the item
    Timeout(Duration),
}

impl OverflowPolicy {
    /// Send `item` on `tx` according to this policy
    pub(crate) async fn send<T>(&self, tx: &mpsc::Sender<T>, item: T) -> Result<(), HubError> {
        match *self {
            OverflowPolicy::Block => tx.send(item).await.map_err(|_| HubError::Closed),
            OverflowPolicy::DropNewest => tx.try_send(item).map_err(|e| match e {
                TrySendError::Full(_) => HubError::Full,
                TrySendError::Closed(_) => HubError::Closed,
            }),
            OverflowPolicy::Timeout(limit) => {
                tx.send_timeout(item, limit).await.map_err(|e| match e {
                    SendTimeoutError::Timeout(_) => HubError::Timeout,
                    SendTimeoutError::Closed(_) => HubError::Closed,
                })
            }
        }
    }
}
