//! Configuration for a watch session.

use serde::{Deserialize, Serialize};

use crate::sink::OverflowPolicy;

/// Tunables for one watched root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Capacity of the raw-event channel between the OS callback and the
    /// control loop. The OS thread blocks when it is full.
    pub event_capacity: usize,

    /// Depth of the downstream record queue.
    pub queue_depth: usize,

    /// What to do when the record queue is full.
    pub overflow: OverflowPolicy,
}

impl WatcherConfig {
    /// Set the raw-event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the record queue depth.
    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Set the overflow policy.
    pub fn with_overflow(mut self, policy: OverflowPolicy) -> Self {
        self.overflow = policy;
        self
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            event_capacity: 1024,
            queue_depth: 256,
            overflow: OverflowPolicy::Block,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_overrides() {
        let config = WatcherConfig::default()
            .with_queue_depth(8)
            .with_overflow(OverflowPolicy::RejectNewest);

        assert_eq!(config.queue_depth, 8);
        assert_eq!(config.overflow, OverflowPolicy::RejectNewest);
        assert_eq!(config.event_capacity, 1024);
    }
}
