//! Relay configuration

/// Tuning knobs for pusher relays
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Capacity of the publisher → pusher packet channel
    pub publish_queue_capacity: usize,

    /// Capacity of each pusher → viewer packet channel
    ///
    /// A viewer whose queue is full misses packets instead of stalling the relay.
    pub viewer_queue_capacity: usize,

    /// Maximum attached viewers per pusher (0 = unlimited)
    pub max_viewers_per_pusher: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            publish_queue_capacity: 256,
            viewer_queue_capacity: 512,
            max_viewers_per_pusher: 0,
        }
    }
}

impl RelayConfig {
    /// Set the publisher queue capacity
    pub fn publish_queue_capacity(mut self, capacity: usize) -> Self {
        self.publish_queue_capacity = capacity.max(1);
        self
    }

    /// Set the per-viewer queue capacity
    pub fn viewer_queue_capacity(mut self, capacity: usize) -> Self {
        self.viewer_queue_capacity = capacity.max(1);
        self
    }

    /// Limit the number of viewers a single pusher accepts
    pub fn max_viewers_per_pusher(mut self, max: usize) -> Self {
        self.max_viewers_per_pusher = max;
        self
    }
}
