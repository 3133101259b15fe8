//! Hub handle and dispatcher implementation
//!
//! The dispatcher owns the `group → id → handle` map and is the only code that
//! changes it. Delivery lanes read published snapshots of it. The hub handle turns
//! method calls into queued requests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::stats::{Counters, HubInfo};

use super::config::HubConfig;
use super::entry::{ConnectionHandle, ConnectionKey};
use super::error::HubError;
use super::lane::{self, Membership};
use super::message::{
    AddressedMessage, BroadcastMessage, GroupMessage, RegisterRequest, UnregisterRequest,
};

/// Cloneable handle for submitting requests to the dispatcher
///
/// Every method goes through one of five bounded queues. When all handles are
/// dropped the dispatcher finishes.
#[derive(Debug, Clone)]
pub struct Hub {
    register_tx: mpsc::Sender<RegisterRequest>,
    unregister_tx: mpsc::Sender<UnregisterRequest>,
    unicast_tx: mpsc::Sender<AddressedMessage>,
    group_tx: mpsc::Sender<GroupMessage>,
    broadcast_tx: mpsc::Sender<BroadcastMessage>,

    /// Shared with the dispatcher, which is the only writer
    counters: Arc<Mutex<Counters>>,

    next_serial: Arc<AtomicU64>,
    config: Arc<HubConfig>,
}

impl Hub {
    /// Create a hub handle and the dispatcher that serves it
    ///
    /// The dispatcher does nothing until [`Dispatcher::run`] is awaited or spawned.
    pub fn new(config: HubConfig) -> (Self, Dispatcher) {
        let capacity = config.queue_capacity.max(1);
        let (register_tx, register_rx) = mpsc::channel(capacity);
        let (unregister_tx, unregister_rx) = mpsc::channel(capacity);
        let (unicast_tx, unicast_rx) = mpsc::channel(capacity);
        let (group_tx, group_rx) = mpsc::channel(capacity);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(capacity);

        let counters = Arc::new(Mutex::new(Counters::new()));
        let config = Arc::new(config);

        let hub = Self {
            register_tx,
            unregister_tx,
            unicast_tx,
            group_tx,
            broadcast_tx,
            counters: Arc::clone(&counters),
            next_serial: Arc::new(AtomicU64::new(1)),
            config: Arc::clone(&config),
        };

        let (snapshots, _) = watch::channel(Arc::new(Membership::new()));
        let registry = Registry {
            groups: Membership::new(),
            snapshots,
            counters,
            config,
        };

        let dispatcher = Dispatcher {
            registry,
            register_rx,
            unregister_rx,
            unicast_rx,
            group_rx,
            broadcast_rx,
        };

        (hub, dispatcher)
    }

    /// Create a hub and spawn its dispatcher on the current runtime
    pub fn spawn(config: HubConfig) -> (Self, JoinHandle<()>) {
        let (hub, dispatcher) = Self::new(config);
        let task = tokio::spawn(dispatcher.run());
        (hub, task)
    }

    /// Get the hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Allocate a serial for a new connection
    pub fn next_serial(&self) -> u64 {
        self.next_serial.fetch_add(1, Ordering::Relaxed)
    }

    /// Create a handle for `key` with a fresh serial and a configured outbound queue
    pub fn outbound_channel(&self, key: ConnectionKey) -> (ConnectionHandle, mpsc::Receiver<Bytes>) {
        ConnectionHandle::channel(key, self.next_serial(), self.config.outbound_capacity)
    }

    /// Register a connection
    ///
    /// Resolves once the dispatcher has applied the request. A connection already
    /// registered under the same key is dropped from the registry first, which closes
    /// its outbound queue.
    pub async fn register(&self, handle: ConnectionHandle) -> Result<(), HubError> {
        let (ack, done) = oneshot::channel();
        self.submit(&self.register_tx, RegisterRequest { handle, ack })
            .await?;
        done.await.map_err(|_| HubError::Closed)
    }

    /// Unregister a connection
    ///
    /// Only removes the entry if it still carries `serial`. Returns whether an entry
    /// was removed; a missing entry is not an error.
    pub async fn unregister(&self, key: &ConnectionKey, serial: u64) -> Result<bool, HubError> {
        let (ack, done) = oneshot::channel();
        let request = UnregisterRequest {
            key: key.clone(),
            serial,
            ack,
        };
        self.submit(&self.unregister_tx, request).await?;
        done.await.map_err(|_| HubError::Closed)
    }

    /// Send a payload to one connection
    ///
    /// If no such connection is registered the payload is silently dropped.
    pub async fn send_to(
        &self,
        id: &str,
        group: &str,
        payload: impl Into<Bytes>,
    ) -> Result<(), HubError> {
        let message = AddressedMessage {
            key: ConnectionKey::new(group, id),
            payload: payload.into(),
        };
        self.submit(&self.unicast_tx, message).await
    }

    /// Send a payload to every member of a group
    pub async fn send_to_group(&self, group: &str, payload: impl Into<Bytes>) -> Result<(), HubError> {
        let message = GroupMessage {
            group: Arc::from(group),
            payload: payload.into(),
        };
        self.submit(&self.group_tx, message).await
    }

    /// Send a payload to every registered connection
    pub async fn send_to_all(&self, payload: impl Into<Bytes>) -> Result<(), HubError> {
        let message = BroadcastMessage {
            payload: payload.into(),
        };
        self.submit(&self.broadcast_tx, message).await
    }

    /// Current number of non-empty groups
    pub fn group_count(&self) -> usize {
        self.counters().groups
    }

    /// Current number of registered connections
    pub fn connection_count(&self) -> usize {
        self.counters().connections
    }

    /// Snapshot of counters and queue depths
    pub fn info(&self) -> HubInfo {
        let counters = self.counters();
        HubInfo {
            group_count: counters.groups,
            connection_count: counters.connections,
            register_pending: pending(&self.register_tx),
            unregister_pending: pending(&self.unregister_tx),
            unicast_pending: pending(&self.unicast_tx),
            group_pending: pending(&self.group_tx),
            broadcast_pending: pending(&self.broadcast_tx),
        }
    }

    fn counters(&self) -> Counters {
        *self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn submit<T>(&self, tx: &mpsc::Sender<T>, item: T) -> Result<(), HubError> {
        self.config.submit_policy.send(tx, item).await
    }
}

fn pending<T>(tx: &mpsc::Sender<T>) -> usize {
    tx.max_capacity() - tx.capacity()
}

/// Single task owning all group membership
///
/// The dispatcher applies register and unregister requests and publishes a read-only
/// membership snapshot after each change. Unicast, group and broadcast requests are
/// consumed by one lane task each, so a stalled outbound queue never blocks the
/// membership loop or the other classes.
pub struct Dispatcher {
    registry: Registry,

    register_rx: mpsc::Receiver<RegisterRequest>,
    unregister_rx: mpsc::Receiver<UnregisterRequest>,
    unicast_rx: mpsc::Receiver<AddressedMessage>,
    group_rx: mpsc::Receiver<GroupMessage>,
    broadcast_rx: mpsc::Receiver<BroadcastMessage>,
}

impl Dispatcher {
    /// Process requests until every [`Hub`] handle has been dropped
    pub async fn run(self) {
        let Dispatcher {
            mut registry,
            mut register_rx,
            mut unregister_rx,
            unicast_rx,
            group_rx,
            broadcast_rx,
        } = self;

        let policy = registry.config.outbound_policy;
        let lanes = [
            lane::spawn("unicast", unicast_rx, registry.snapshots.subscribe(), policy),
            lane::spawn("group", group_rx, registry.snapshots.subscribe(), policy),
            lane::spawn("broadcast", broadcast_rx, registry.snapshots.subscribe(), policy),
        ];

        tracing::info!(
            queue_capacity = registry.config.queue_capacity,
            outbound_capacity = registry.config.outbound_capacity,
            "Hub dispatcher started"
        );

        loop {
            tokio::select! {
                Some(request) = register_rx.recv() => {
                    registry.register(request.handle);
                    let _ = request.ack.send(());
                }
                Some(request) = unregister_rx.recv() => {
                    let removed = registry.unregister(&request.key, request.serial);
                    let _ = request.ack.send(removed);
                }
                else => break,
            }
        }

        // Lanes drain what was already submitted, then see their queues close
        drop(registry);
        for task in lanes {
            let _ = task.await;
        }

        tracing::info!("Hub dispatcher stopped");
    }
}

/// Membership owned by the dispatcher
struct Registry {
    /// Invariant: every inner map is non-empty
    groups: Membership,

    snapshots: watch::Sender<Arc<Membership>>,
    counters: Arc<Mutex<Counters>>,
    config: Arc<HubConfig>,
}

impl Registry {
    fn register(&mut self, handle: ConnectionHandle) {
        let key = handle.key().clone();
        let serial = handle.serial();

        let new_group = !self.groups.contains_key(&*key.group);
        let members = Arc::make_mut(self.groups.entry(Arc::clone(&key.group)).or_default());
        let previous = members.insert(Arc::clone(&key.id), handle);

        self.update_counters(|c| c.on_register(new_group, previous.is_none()));
        self.publish();

        if let Some(previous) = previous {
            // Dropping the old handle closes its outbound queue, which stops its tasks
            tracing::info!(
                group = %key.group,
                id = %key.id,
                serial = serial,
                previous_serial = previous.serial(),
                "Connection superseded"
            );
        } else {
            tracing::info!(
                group = %key.group,
                id = %key.id,
                serial = serial,
                new_group = new_group,
                "Connection registered"
            );
        }
    }

    fn unregister(&mut self, key: &ConnectionKey, serial: u64) -> bool {
        let Some(members) = self.groups.get_mut(&*key.group) else {
            return false;
        };

        match members.get(&*key.id) {
            Some(handle) if handle.serial() == serial => {}
            Some(handle) => {
                tracing::debug!(
                    group = %key.group,
                    id = %key.id,
                    registered = handle.serial(),
                    requested = serial,
                    "Unregister serial mismatch"
                );
                return false;
            }
            None => return false,
        }

        let group_removed = members.len() == 1;
        if group_removed {
            self.groups.remove(&*key.group);
        } else {
            Arc::make_mut(members).remove(&*key.id);
        }

        self.update_counters(|c| c.on_unregister(group_removed));
        self.publish();

        tracing::info!(
            group = %key.group,
            id = %key.id,
            serial = serial,
            group_removed = group_removed,
            "Connection unregistered"
        );
        true
    }

    /// Replace the lanes' snapshot; the previous one is dropped here unless a lane
    /// is mid-delivery with it
    fn publish(&self) {
        self.snapshots.send_replace(Arc::new(self.groups.clone()));
    }

    fn update_counters(&self, f: impl FnOnce(&mut Counters)) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut counters);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;
    use crate::registry::policy::OverflowPolicy;

    fn spawn_hub() -> Hub {
        let (hub, _task) = Hub::spawn(HubConfig::default());
        hub
    }

    async fn attach(hub: &Hub, group: &str, id: &str) -> (ConnectionHandle, mpsc::Receiver<Bytes>) {
        let (handle, rx) = hub.outbound_channel(ConnectionKey::new(group, id));
        hub.register(handle.clone()).await.unwrap();
        (handle, rx)
    }

    async fn recv(rx: &mut mpsc::Receiver<Bytes>) -> Bytes {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for payload")
            .expect("outbound queue closed")
    }

    #[tokio::test]
    async fn test_register_counts_groups_and_connections() {
        let hub = spawn_hub();

        let _a = attach(&hub, "g1", "u1").await;
        let _b = attach(&hub, "g1", "u2").await;
        let _c = attach(&hub, "g2", "u1").await;

        assert_eq!(hub.connection_count(), 3);
        assert_eq!(hub.group_count(), 2);
    }

    #[tokio::test]
    async fn test_unregister_last_member_removes_group() {
        let hub = spawn_hub();

        let (a, _rx_a) = attach(&hub, "g1", "u1").await;
        let (b, _rx_b) = attach(&hub, "g1", "u2").await;

        // Non-last member: group stays
        assert!(hub.unregister(a.key(), a.serial()).await.unwrap());
        assert_eq!(hub.group_count(), 1);
        assert_eq!(hub.connection_count(), 1);

        // Last member: group goes
        assert!(hub.unregister(b.key(), b.serial()).await.unwrap());
        assert_eq!(hub.group_count(), 0);
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_unregister_unknown_is_noop() {
        let hub = spawn_hub();
        let _a = attach(&hub, "g1", "u1").await;

        let removed = hub
            .unregister(&ConnectionKey::new("g1", "ghost"), 99)
            .await
            .unwrap();
        assert!(!removed);

        let removed = hub
            .unregister(&ConnectionKey::new("nowhere", "u1"), 1)
            .await
            .unwrap();
        assert!(!removed);

        assert_eq!(hub.connection_count(), 1);
        assert_eq!(hub.group_count(), 1);
    }

    #[tokio::test]
    async fn test_unregister_closes_outbound_queue() {
        let hub = spawn_hub();
        let (handle, mut rx) = hub.outbound_channel(ConnectionKey::new("g1", "u1"));
        let key = handle.key().clone();
        let serial = handle.serial();
        hub.register(handle).await.unwrap();

        hub.unregister(&key, serial).await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_hello_scenario() {
        let hub = spawn_hub();
        let (handle, mut rx) = hub.outbound_channel(ConnectionKey::new("g1", "u1"));
        let serial = handle.serial();
        hub.register(handle).await.unwrap();

        hub.send_to("u1", "g1", "hello").await.unwrap();
        assert_eq!(recv(&mut rx).await, Bytes::from_static(b"hello"));

        hub.unregister(&ConnectionKey::new("g1", "u1"), serial)
            .await
            .unwrap();
        assert_eq!(hub.group_count(), 0);
        assert_eq!(hub.connection_count(), 0);

        // Nothing else was delivered before the queue closed
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_to_missing_target_is_dropped() {
        let hub = spawn_hub();
        let (_a, mut rx_a) = attach(&hub, "g1", "u1").await;

        hub.send_to("ghost", "g1", "lost").await.unwrap();
        hub.send_to("u1", "other", "lost").await.unwrap();
        hub.send_to("u1", "g1", "kept").await.unwrap();

        // Same lane, so "kept" arriving first means nothing else was queued
        assert_eq!(recv(&mut rx_a).await, Bytes::from_static(b"kept"));
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unicast_preserves_order() {
        let hub = spawn_hub();
        let (_a, mut rx) = attach(&hub, "g1", "u1").await;

        for i in 0..50u32 {
            hub.send_to("u1", "g1", format!("p{}", i)).await.unwrap();
        }
        for i in 0..50u32 {
            assert_eq!(recv(&mut rx).await, Bytes::from(format!("p{}", i)));
        }
    }

    #[tokio::test]
    async fn test_group_broadcast_stays_in_group() {
        let hub = spawn_hub();
        let (_a, mut rx_a) = attach(&hub, "red", "a").await;
        let (_b, mut rx_b) = attach(&hub, "red", "b").await;
        let (_c, mut rx_c) = attach(&hub, "blue", "c").await;

        let payload = Bytes::from_static(&[0x00, 0xFF, 0x10, b'x']);
        hub.send_to_group("red", payload.clone()).await.unwrap();
        hub.send_to_group("blue", "marker").await.unwrap();

        assert_eq!(recv(&mut rx_a).await, payload);
        assert_eq!(recv(&mut rx_b).await, payload);

        // Blue's first payload is its own marker, not red's broadcast
        assert_eq!(recv(&mut rx_c).await, Bytes::from_static(b"marker"));
    }

    #[tokio::test]
    async fn test_group_broadcast_to_missing_group() {
        let hub = spawn_hub();
        let (_a, mut rx_a) = attach(&hub, "red", "a").await;

        hub.send_to_group("green", "nobody").await.unwrap();
        hub.send_to_group("red", "somebody").await.unwrap();

        assert_eq!(recv(&mut rx_a).await, Bytes::from_static(b"somebody"));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_everyone() {
        let hub = spawn_hub();
        let mut receivers = Vec::new();
        for group in ["g1", "g2", "g3"] {
            for id in ["u1", "u2"] {
                receivers.push(attach(&hub, group, id).await);
            }
        }

        hub.send_to_all("everyone").await.unwrap();

        for (_, rx) in receivers.iter_mut() {
            assert_eq!(recv(rx).await, Bytes::from_static(b"everyone"));
        }
    }

    #[tokio::test]
    async fn test_reregister_supersedes_previous() {
        let hub = spawn_hub();
        let key = ConnectionKey::new("g1", "u1");

        let (old, mut old_rx) = hub.outbound_channel(key.clone());
        let old_serial = old.serial();
        hub.register(old).await.unwrap();

        let (new, mut new_rx) = hub.outbound_channel(key.clone());
        let new_serial = new.serial();
        hub.register(new).await.unwrap();

        // Old queue closed, counts unchanged
        assert!(old_rx.recv().await.is_none());
        assert_eq!(hub.connection_count(), 1);
        assert_eq!(hub.group_count(), 1);

        // Late unregister from the old connection must not evict the new one
        assert!(!hub.unregister(&key, old_serial).await.unwrap());
        assert_eq!(hub.connection_count(), 1);

        hub.send_to("u1", "g1", "fresh").await.unwrap();
        assert_eq!(recv(&mut new_rx).await, Bytes::from_static(b"fresh"));

        assert!(hub.unregister(&key, new_serial).await.unwrap());
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration_converges() {
        let hub = spawn_hub();

        let mut tasks = Vec::new();
        for g in 0..100 {
            for i in 0..10 {
                let hub = hub.clone();
                tasks.push(tokio::spawn(async move {
                    let (handle, rx) =
                        hub.outbound_channel(ConnectionKey::new(format!("group-{}", g), format!("id-{}", i)));
                    hub.register(handle).await.unwrap();
                    rx
                }));
            }
        }

        let mut receivers = Vec::new();
        for task in tasks {
            receivers.push(task.await.unwrap());
        }

        assert_eq!(hub.group_count(), 100);
        assert_eq!(hub.connection_count(), 1000);
        assert!(receivers.iter().all(|rx| !rx.is_closed()));
    }

    #[tokio::test]
    async fn test_stalled_unicast_target_does_not_block_other_classes() {
        let config = HubConfig::default().queue_capacity(2).outbound_capacity(1);
        let (hub, _task) = Hub::spawn(config);

        // Never drained
        let (_slow, _slow_rx) = attach(&hub, "a", "slow").await;
        let (healthy, mut healthy_rx) = attach(&hub, "b", "healthy").await;

        // Fills the slow outbound queue, parks the unicast lane on it and backs up
        // the unicast input queue
        for i in 0..10 {
            let hub = hub.clone();
            tokio::spawn(async move {
                let _ = hub.send_to("slow", "a", format!("u{}", i)).await;
            });
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hub.info().unicast_pending, 2);

        timeout(Duration::from_secs(1), hub.send_to_group("b", "group"))
            .await
            .expect("group submission blocked by unicast lane")
            .unwrap();
        assert_eq!(recv(&mut healthy_rx).await, Bytes::from_static(b"group"));

        let (late, _late_rx) = hub.outbound_channel(ConnectionKey::new("b", "late"));
        timeout(Duration::from_secs(1), hub.register(late))
            .await
            .expect("register blocked by unicast lane")
            .unwrap();
        assert_eq!(hub.connection_count(), 3);

        let removed = timeout(Duration::from_secs(1), hub.unregister(healthy.key(), healthy.serial()))
            .await
            .expect("unregister blocked by unicast lane")
            .unwrap();
        assert!(removed);
    }

    #[tokio::test]
    async fn test_info_snapshot() {
        let hub = spawn_hub();
        let _a = attach(&hub, "g1", "u1").await;
        let _b = attach(&hub, "g2", "u1").await;

        let info = hub.info();
        assert_eq!(info.group_count, 2);
        assert_eq!(info.connection_count, 2);
        assert_eq!(info.total_pending(), 0);
    }

    #[tokio::test]
    async fn test_info_reports_pending_requests() {
        // Dispatcher never runs, so submissions stay queued
        let (hub, _dispatcher) = Hub::new(HubConfig::default().queue_capacity(4));

        hub.send_to("u1", "g1", "a").await.unwrap();
        hub.send_to_group("g1", "b").await.unwrap();
        hub.send_to_group("g1", "c").await.unwrap();
        hub.send_to_all("d").await.unwrap();

        let info = hub.info();
        assert_eq!(info.unicast_pending, 1);
        assert_eq!(info.group_pending, 2);
        assert_eq!(info.broadcast_pending, 1);
        assert_eq!(info.register_pending, 0);
    }

    #[tokio::test]
    async fn test_submit_drop_newest_when_queue_full() {
        let config = HubConfig::default()
            .queue_capacity(1)
            .submit_policy(OverflowPolicy::DropNewest);
        let (hub, _dispatcher) = Hub::new(config);

        hub.send_to_all("first").await.unwrap();
        assert_eq!(hub.send_to_all("second").await, Err(HubError::Full));
    }

    #[tokio::test]
    async fn test_requests_fail_after_dispatcher_gone() {
        let (hub, dispatcher) = Hub::new(HubConfig::default());
        drop(dispatcher);

        assert_eq!(hub.send_to_all("x").await, Err(HubError::Closed));
        let (handle, _rx) = hub.outbound_channel(ConnectionKey::new("g", "u"));
        assert_eq!(hub.register(handle).await, Err(HubError::Closed));
    }

    #[tokio::test]
    async fn test_dispatcher_stops_when_hubs_dropped() {
        let (hub, task) = Hub::spawn(HubConfig::default());
        let _a = attach(&hub, "g1", "u1").await;

        drop(hub);
        timeout(Duration::from_secs(1), task)
            .await
            .expect("dispatcher did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_serials_are_unique() {
        let hub = spawn_hub();
        let a = hub.next_serial();
        let b = hub.clone().next_serial();
        assert_ne!(a, b);
    }
}
