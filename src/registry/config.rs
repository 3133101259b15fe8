//! Hub configuration

use super::policy::OverflowPolicy;

/// Default capacity of each dispatcher input queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// Default capacity of each connection's outbound queue
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 2048;

/// Configuration for the hub and its dispatcher
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of the register, unregister, unicast, group and broadcast queues
    pub queue_capacity: usize,

    /// Capacity of each connection's outbound queue
    pub outbound_capacity: usize,

    /// Policy used when a caller submits to a full input queue
    pub submit_policy: OverflowPolicy,

    /// Policy used when a lane pushes to a full outbound queue
    pub outbound_policy: OverflowPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            submit_policy: OverflowPolicy::Block,
            outbound_policy: OverflowPolicy::Block,
        }
    }
}

impl HubConfig {
    /// Set the input queue capacity (minimum 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set the per-connection outbound capacity (minimum 1)
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Set the overflow policy for caller submissions
    pub fn submit_policy(mut self, policy: OverflowPolicy) -> Self {
        self.submit_policy = policy;
        self
    }

    /// Set the overflow policy for outbound queues
    pub fn outbound_policy(mut self, policy: OverflowPolicy) -> Self {
        self.outbound_policy = policy;
        self
    }
}
