//! Per-class delivery lanes
//!
//! A lane consumes one input queue (unicast, group or broadcast), resolves targets
//! against the latest membership snapshot published by the dispatcher, and pushes the
//! payload into each target's outbound queue. A lane blocked on a full outbound queue
//! only holds up its own class.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::entry::ConnectionHandle;
use super::error::HubError;
use super::message::{AddressedMessage, BroadcastMessage, GroupMessage};
use super::policy::OverflowPolicy;

/// Members of one group, keyed by id
pub(crate) type Members = HashMap<Arc<str>, ConnectionHandle>;

/// Every group, keyed by name
///
/// Groups are shared between snapshots and copied on write by the dispatcher.
pub(crate) type Membership = HashMap<Arc<str>, Arc<Members>>;

/// A message that knows which connections it is addressed to
pub(crate) trait Delivery: Send + Sync + 'static {
    fn targets<'a>(&self, membership: &'a Membership) -> Vec<&'a ConnectionHandle>;

    fn payload(&self) -> &Bytes;
}

impl Delivery for AddressedMessage {
    fn targets<'a>(&self, membership: &'a Membership) -> Vec<&'a ConnectionHandle> {
        membership
            .get(&*self.key.group)
            .and_then(|members| members.get(&*self.key.id))
            .into_iter()
            .collect()
    }

    fn payload(&self) -> &Bytes {
        &self.payload
    }
}

impl Delivery for GroupMessage {
    fn targets<'a>(&self, membership: &'a Membership) -> Vec<&'a ConnectionHandle> {
        membership
            .get(&*self.group)
            .map(|members| members.values().collect())
            .unwrap_or_default()
    }

    fn payload(&self) -> &Bytes {
        &self.payload
    }
}

impl Delivery for BroadcastMessage {
    fn targets<'a>(&self, membership: &'a Membership) -> Vec<&'a ConnectionHandle> {
        membership.values().flat_map(|members| members.values()).collect()
    }

    fn payload(&self) -> &Bytes {
        &self.payload
    }
}

/// Spawn a lane task serving `rx` until every sender is dropped
pub(crate) fn spawn<M: Delivery>(
    name: &'static str,
    rx: mpsc::Receiver<M>,
    membership: watch::Receiver<Arc<Membership>>,
    policy: OverflowPolicy,
) -> JoinHandle<()> {
    tokio::spawn(run_lane(name, rx, membership, policy))
}

async fn run_lane<M: Delivery>(
    name: &'static str,
    mut rx: mpsc::Receiver<M>,
    membership: watch::Receiver<Arc<Membership>>,
    policy: OverflowPolicy,
) {
    while let Some(message) = rx.recv().await {
        // Held only while this message is delivered
        let snapshot = Arc::clone(&*membership.borrow());

        let targets = message.targets(&snapshot);
        if targets.is_empty() {
            tracing::debug!(lane = name, "No registered targets");
            continue;
        }

        for target in targets {
            match target.send(message.payload().clone(), policy).await {
                Ok(()) => {}
                // Unregistered after the snapshot was taken
                Err(HubError::Closed) => {
                    tracing::debug!(
                        lane = name,
                        connection = %target.key(),
                        serial = target.serial(),
                        "Outbound queue closed"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        lane = name,
                        connection = %target.key(),
                        serial = target.serial(),
                        error = %e,
                        "Outbound payload dropped"
                    );
                }
            }
        }
    }

    tracing::debug!(lane = name, "Delivery lane finished");
}
