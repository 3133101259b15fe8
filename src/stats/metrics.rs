//! Statistics and metrics for the hub

/// Group and connection cardinality
///
/// Written only by the dispatcher; everyone else reads a copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counters {
    /// Number of non-empty groups
    pub groups: usize,
    /// Number of registered connections across all groups
    pub connections: usize,
}

impl Counters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a registration
    pub(crate) fn on_register(&mut self, new_group: bool, new_connection: bool) {
        if new_group {
            self.groups += 1;
        }
        if new_connection {
            self.connections += 1;
        }
    }

    /// Record an unregistration
    pub(crate) fn on_unregister(&mut self, group_removed: bool) {
        self.connections = self.connections.saturating_sub(1);
        if group_removed {
            self.groups = self.groups.saturating_sub(1);
        }
    }
}

/// Point-in-time view of the hub
///
/// Values may already be stale when read; use for logging and scraping only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubInfo {
    /// Number of non-empty groups
    pub group_count: usize,
    /// Number of registered connections
    pub connection_count: usize,
    /// Requests waiting in the register queue
    pub register_pending: usize,
    /// Requests waiting in the unregister queue
    pub unregister_pending: usize,
    /// Messages waiting in the unicast queue
    pub unicast_pending: usize,
    /// Messages waiting in the group queue
    pub group_pending: usize,
    /// Messages waiting in the broadcast queue
    pub broadcast_pending: usize,
}

impl HubInfo {
    /// Total requests waiting across all input queues
    pub fn total_pending(&self) -> usize {
        self.register_pending
            + self.unregister_pending
            + self.unicast_pending
            + self.group_pending
            + self.broadcast_pending
    }
}

impl std::fmt::Display for HubInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "groups={} connections={} register={} unregister={} unicast={} group={} broadcast={}",
            self.group_count,
            self.connection_count,
            self.register_pending,
            self.unregister_pending,
            self.unicast_pending,
            self.group_pending,
            self.broadcast_pending,
        )
    }
}
