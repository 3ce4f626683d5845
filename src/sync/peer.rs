//! Per-connection peer bookkeeping.

use std::time::Instant;

/// Sequence counters and activity timestamps for one connection epoch.
///
/// `local_sequence` strictly increases on every send within an epoch and is
/// reset explicitly by [`reset_for_connection`](Self::reset_for_connection)
/// when a new connection is established, never implicitly. The relay
/// envelope carries no sequence field, so `remote_sequence` counts events
/// received from the peer.
///
/// `partner_alive` is recomputed from `last_received_at`; the only place it
/// is set `true` directly is on receipt of a peer event.
#[derive(Debug, Clone, Default)]
pub struct PeerState {
    /// Sends this epoch, strictly increasing.
    pub local_sequence: u32,
    /// Peer events received this epoch.
    pub remote_sequence: u32,
    /// Value carried by our last data send (heartbeats excluded).
    pub last_local_value: Option<f64>,
    /// When we last sent anything.
    pub last_sent_at: Option<Instant>,
    /// When we last received a peer event.
    pub last_received_at: Option<Instant>,
    /// Whether the partner has been heard from recently.
    pub partner_alive: bool,
}

impl PeerState {
    /// Fresh, never-connected state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outbound send; returns the new sequence number.
    pub fn record_send(&mut self, now: Instant) -> u32 {
        self.local_sequence = self.local_sequence.saturating_add(1);
        self.last_sent_at = Some(now);
        self.local_sequence
    }

    /// Record the value of an outbound data send.
    pub fn record_value(&mut self, value: f64) {
        self.last_local_value = Some(value);
    }

    /// Record receipt of a peer event.
    pub fn record_received(&mut self, now: Instant) {
        self.remote_sequence = self.remote_sequence.saturating_add(1);
        self.last_received_at = Some(now);
        self.partner_alive = true;
    }

    /// Start a new connection epoch.
    ///
    /// Sequence numbers restart at zero and the partner must prove itself
    /// alive again; the last sent value survives so the change threshold
    /// keeps its meaning across the reconnect.
    pub fn reset_for_connection(&mut self) {
        self.local_sequence = 0;
        self.remote_sequence = 0;
        self.last_sent_at = None;
        self.last_received_at = None;
        self.partner_alive = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequences_increase() {
        let mut peer = PeerState::new();
        let now = Instant::now();

        assert_eq!(peer.record_send(now), 1);
        assert_eq!(peer.record_send(now), 2);
        assert_eq!(peer.local_sequence, 2);

        peer.record_received(now);
        peer.record_received(now);
        assert_eq!(peer.remote_sequence, 2);
        assert!(peer.partner_alive);
    }

    #[test]
    fn test_reset_keeps_last_value() {
        let mut peer = PeerState::new();
        let now = Instant::now();

        peer.record_send(now);
        peer.record_value(93.0);
        peer.record_received(now);

        peer.reset_for_connection();
        assert_eq!(peer.local_sequence, 0);
        assert_eq!(peer.remote_sequence, 0);
        assert!(!peer.partner_alive);
        assert!(peer.last_sent_at.is_none());
        // Threshold comparisons stay meaningful across reconnects.
        assert_eq!(peer.last_local_value, Some(93.0));
    }
}
