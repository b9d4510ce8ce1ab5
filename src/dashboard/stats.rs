//! Broadcast counters kept by the dashboard server

use serde::Serialize;

/// Monotonic broadcast counters; only an explicit reset lowers them
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastStats {
    /// Messages fanned out (immediate, drained, and priority)
    pub total_broadcasts: u64,
    /// Sends that bypassed the limiter
    pub priority_broadcasts: u64,
    /// Messages that had to wait in the queue
    pub queued_broadcasts: u64,
    /// Queued messages delivered by a later drain
    pub drained_broadcasts: u64,
    /// Messages evicted from the queue or discarded at shutdown
    pub dropped_broadcasts: u64,
    /// Frames handed to client queues across all broadcasts
    pub messages_sent: u64,
    /// `broadcast_to_clients` calls
    pub targeted_broadcasts: u64,
    /// Clients named across targeted broadcasts
    pub target_clients: u64,
    /// Frames handed to clients by targeted broadcasts
    pub targeted_sent: u64,
    /// Milliseconds since the Unix epoch
    pub last_broadcast: Option<i64>,
}

impl BroadcastStats {
    pub(crate) fn record_sent(&mut self, sent: usize, at: i64) {
        self.total_broadcasts += 1;
        self.messages_sent += sent as u64;
        self.last_broadcast = Some(at);
    }
}
