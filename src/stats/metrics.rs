//! Statistics and metrics for relay sessions

use std::time::Duration;

/// Relay-level statistics for one pusher
#[derive(Debug, Clone, Default)]
pub struct PusherStats {
    /// Currently attached viewers
    pub viewers: usize,
    /// Packets received from the publisher
    pub packets_in: u64,
    /// Bytes received from the publisher
    pub bytes_in: u64,
    /// Packet deliveries into viewer queues
    pub packets_relayed: u64,
    /// Packet deliveries skipped because a viewer queue was full
    pub packets_dropped: u64,
    /// Time since the pusher was created
    pub uptime: Duration,
}

impl PusherStats {
    /// Inbound bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.bytes_in * 8) / secs
        } else {
            0
        }
    }

    /// Fraction of deliveries lost to full viewer queues
    pub fn drop_ratio(&self) -> f64 {
        let attempts = self.packets_relayed + self.packets_dropped;
        if attempts > 0 {
            self.packets_dropped as f64 / attempts as f64
        } else {
            0.0
        }
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Total connections ever accepted
    pub total_connections: u64,
    /// Sessions currently running
    pub active_connections: u64,
    /// Connections turned away by the connection limit
    pub rejected_connections: u64,
    /// Pushers currently registered
    pub active_pushers: usize,
    /// Time since the accept loop started
    pub uptime: Duration,
}
