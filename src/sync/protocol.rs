//! The synchronization state machine.
//!
//! One [`SyncProtocol`] instance per connection-owning device. It decides
//! *when* to publish (threshold, resync, keep-alive, heartbeat), *what* the
//! partner's events mean, and *whether* a send may go out at all (rate
//! window). It never performs I/O; the connection supervisor feeds it
//! timestamps and events and carries its decisions to the socket.
//!
//! ```text
//!          on_connection_established
//!   Idle ────────────────────────────▶ AwaitingResync
//!                                           │ value sent past the
//!                                           │ settle delay
//!                                           ▼
//!   Idle ◀──────────────────────────── Synced
//!          on_disconnect
//! ```
//!
//! `AwaitingResync` is entered on *every* fresh connection, including
//! reconnects, so the partner never keeps operating on pre-drop state.

use std::time::{Duration, Instant};

use tracing::debug;

use super::peer::PeerState;
use super::rate::RateWindow;
use crate::channel::TopicEvent;
use crate::core::LinkConfig;

/// Where the protocol stands relative to its partner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// No connection.
    Idle,
    /// Connected, current state not yet re-published past the settle delay.
    AwaitingResync,
    /// Connected and the partner has our current state.
    Synced,
}

/// The sync state machine.
pub struct SyncProtocol {
    phase: SyncPhase,
    peer: PeerState,
    rate: RateWindow,
    publish_topic: String,
    listen_topic: String,
    change_threshold: f64,
    heartbeat_interval: Duration,
    partner_timeout: Duration,
    resync_settle: Duration,
    value_range: (f64, f64),
    connected_at: Option<Instant>,
}

impl SyncProtocol {
    /// Create a protocol instance from the link configuration.
    pub fn new(config: &LinkConfig) -> Self {
        Self {
            phase: SyncPhase::Idle,
            peer: PeerState::new(),
            rate: RateWindow::new(config.window_length, config.max_messages_per_window),
            publish_topic: config.publish_topic(),
            listen_topic: config.listen_topic.clone(),
            change_threshold: config.change_threshold,
            heartbeat_interval: config.heartbeat_interval,
            partner_timeout: config.partner_timeout,
            resync_settle: config.resync_settle,
            value_range: config.value_range,
            connected_at: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Peer bookkeeping for this connection epoch.
    pub fn peer(&self) -> &PeerState {
        &self.peer
    }

    /// Whether the partner has been heard from within the timeout.
    pub fn partner_alive(&self) -> bool {
        self.peer.partner_alive
    }

    /// A fresh connection (or reconnection) is up.
    ///
    /// Enters `AwaitingResync` and starts a new connection epoch: sequence
    /// numbers restart, the rate window reopens, and the partner must prove
    /// itself alive again.
    pub fn on_connection_established(&mut self, now: Instant) {
        self.phase = SyncPhase::AwaitingResync;
        self.connected_at = Some(now);
        self.peer.reset_for_connection();
        self.rate.reset();
        debug!("connection epoch started, awaiting resync");
    }

    /// The connection is gone.
    pub fn on_disconnect(&mut self) {
        self.phase = SyncPhase::Idle;
        self.connected_at = None;
    }

    /// Offer the current local value; returns a publish if one is due.
    ///
    /// A publish is due when any of these hold:
    /// - the value moved at least `change_threshold` from the last sent value
    ///   (or nothing has ever been sent),
    /// - the phase is `AwaitingResync` and the settle delay has elapsed,
    /// - `partner_timeout` has elapsed since our last send
    ///   (keep-alive-by-data).
    ///
    /// The combination bounds traffic while guaranteeing convergence even
    /// when the physical input stops moving. The value is clamped to the
    /// configured range before comparison.
    pub fn on_local_value_changed(&mut self, new_value: f64, now: Instant) -> Option<TopicEvent> {
        if self.phase == SyncPhase::Idle {
            return None;
        }
        let value = self.clamp(new_value);

        let settle_elapsed = self
            .connected_at
            .is_some_and(|t| now.duration_since(t) >= self.resync_settle);
        let resync_due = self.phase == SyncPhase::AwaitingResync && settle_elapsed;
        let threshold_due = match self.peer.last_local_value {
            None => true,
            Some(prev) => (value - prev).abs() >= self.change_threshold,
        };
        let keepalive_due = self
            .peer
            .last_sent_at
            .is_some_and(|t| now.duration_since(t) >= self.partner_timeout);

        if !(threshold_due || resync_due || keepalive_due) {
            return None;
        }

        let seq = self.peer.record_send(now);
        self.peer.record_value(value);
        if resync_due {
            debug!(seq, value, "resync complete");
            self.phase = SyncPhase::Synced;
        }
        Some(TopicEvent::numeric(self.publish_topic.clone(), value))
    }

    /// Emit a heartbeat if nothing has gone out within the interval.
    pub fn on_heartbeat_due(&mut self, now: Instant) -> Option<TopicEvent> {
        if self.phase == SyncPhase::Idle {
            return None;
        }
        let last_outbound = self.peer.last_sent_at.or(self.connected_at)?;
        if now.duration_since(last_outbound) < self.heartbeat_interval {
            return None;
        }
        let seq = self.peer.record_send(now);
        debug!(seq, "heartbeat");
        Some(TopicEvent::heartbeat(self.publish_topic.clone()))
    }

    /// Process an unwrapped relay broadcast.
    ///
    /// Every event refreshes partner liveness; only numeric values on the
    /// configured listen topic are forwarded (clamped) to the device-role
    /// callback, the sole path by which remote state reaches the hardware.
    pub fn on_remote_event(&mut self, event: &TopicEvent, now: Instant) -> Option<f64> {
        self.peer.record_received(now);

        if event.topic != self.listen_topic {
            return None;
        }
        if event.is_heartbeat() {
            debug!("partner heartbeat");
            return None;
        }
        let value = event.as_number()?;
        Some(self.clamp(value))
    }

    /// Recompute partner liveness at `now`.
    ///
    /// Marks the partner stale after `partner_timeout` without an event.
    /// This never disconnects anything; downstream display/decision logic
    /// reacts to the returned flag.
    pub fn check_partner_liveness(&mut self, now: Instant) -> bool {
        if let Some(last) = self.peer.last_received_at
            && now.duration_since(last) > self.partner_timeout
        {
            self.peer.partner_alive = false;
        }
        self.peer.partner_alive
    }

    /// Rate-window admission for one outbound message.
    ///
    /// `false` means rate-limited: the caller must keep the event and offer
    /// it again later, never drop it silently.
    pub fn try_send(&mut self, now: Instant) -> bool {
        self.rate.try_acquire(now)
    }

    fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.value_range.0, self.value_range.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{self, ChannelEvent};
    use crate::core::Role;
    use crate::ws::{FrameAssembler, Opcode, encode};
    use serde_json::json;

    fn controller() -> SyncProtocol {
        SyncProtocol::new(&LinkConfig::for_role(Role::Controller))
    }

    fn receiver() -> SyncProtocol {
        SyncProtocol::new(&LinkConfig::for_role(Role::Receiver))
    }

    /// Connect and drain the initial publish so tests start from Synced.
    fn synced_controller(t0: Instant) -> SyncProtocol {
        let mut sync = controller();
        sync.on_connection_established(t0);
        assert!(sync.on_local_value_changed(90.0, t0).is_some());
        let settle = t0 + Duration::from_secs(2);
        assert!(sync.on_local_value_changed(90.0, settle).is_some());
        assert_eq!(sync.phase(), SyncPhase::Synced);
        sync
    }

    #[test]
    fn test_idle_emits_nothing() {
        let mut sync = controller();
        let now = Instant::now();
        assert!(sync.on_local_value_changed(90.0, now).is_none());
        assert!(sync.on_heartbeat_due(now).is_none());
    }

    #[test]
    fn test_threshold_boundary() {
        let t0 = Instant::now();
        let mut sync = synced_controller(t0);
        let t = t0 + Duration::from_secs(3);

        // Delta of exactly the threshold publishes.
        let event = sync.on_local_value_changed(93.0, t).unwrap();
        assert_eq!(event.topic, "/controller/status");
        assert_eq!(event.value, json!(93));

        // Delta below the threshold is suppressed.
        assert!(sync.on_local_value_changed(94.9, t).is_none());
        assert!(sync.on_local_value_changed(91.1, t).is_none());
    }

    #[test]
    fn test_repeated_identical_values_publish_once() {
        let t0 = Instant::now();
        let mut sync = synced_controller(t0);

        let mut publishes = 0;
        for i in 0..50 {
            let t = t0 + Duration::from_secs(2) + Duration::from_millis(100 * i);
            if sync.on_local_value_changed(90.0, t).is_some() {
                publishes += 1;
            }
        }
        assert_eq!(publishes, 0);
    }

    #[test]
    fn test_resync_after_reconnect_without_change() {
        let t0 = Instant::now();
        let mut sync = synced_controller(t0);

        // Link drops and comes back; the value never moved.
        sync.on_disconnect();
        let t1 = t0 + Duration::from_secs(60);
        sync.on_connection_established(t1);
        assert_eq!(sync.phase(), SyncPhase::AwaitingResync);

        // Before the settle delay nothing is due (no change).
        assert!(sync.on_local_value_changed(90.0, t1 + Duration::from_millis(500)).is_none());

        // At the settle delay the resync publish fires regardless.
        let event = sync
            .on_local_value_changed(90.0, t1 + Duration::from_secs(2))
            .unwrap();
        assert_eq!(event.value, json!(90));
        assert_eq!(sync.phase(), SyncPhase::Synced);
    }

    #[test]
    fn test_threshold_send_before_settle_keeps_awaiting() {
        let t0 = Instant::now();
        let mut sync = controller();
        sync.on_connection_established(t0);

        // A genuine change publishes immediately but resync isn't complete
        // until a send lands past the settle delay.
        assert!(sync.on_local_value_changed(90.0, t0).is_some());
        assert_eq!(sync.phase(), SyncPhase::AwaitingResync);

        assert!(
            sync.on_local_value_changed(90.0, t0 + Duration::from_secs(2))
                .is_some()
        );
        assert_eq!(sync.phase(), SyncPhase::Synced);
    }

    #[test]
    fn test_keepalive_by_data() {
        let t0 = Instant::now();
        let mut sync = synced_controller(t0);

        // Unchanged value, but the partner timeout elapsed since our last
        // send: publish anyway so the partner keeps seeing us.
        let t = t0 + Duration::from_secs(2) + Duration::from_secs(31);
        assert!(sync.on_local_value_changed(90.0, t).is_some());
    }

    #[test]
    fn test_heartbeat_timing_exactly_two_in_double_interval() {
        let t0 = Instant::now();
        let mut sync = synced_controller(t0);
        let last_send = t0 + Duration::from_secs(2);

        let mut heartbeats = 0;
        let mut step = last_send;
        // Poll every 100ms across two heartbeat intervals.
        while step <= last_send + Duration::from_secs(20) {
            assert!(sync.on_local_value_changed(90.0, step).is_none());
            if sync.on_heartbeat_due(step).is_some() {
                heartbeats += 1;
            }
            step += Duration::from_millis(100);
        }
        assert_eq!(heartbeats, 2);
    }

    #[test]
    fn test_sequence_increases_and_resets_per_epoch() {
        let t0 = Instant::now();
        let mut sync = controller();
        sync.on_connection_established(t0);

        sync.on_local_value_changed(10.0, t0);
        sync.on_local_value_changed(50.0, t0 + Duration::from_millis(10));
        assert_eq!(sync.peer().local_sequence, 2);

        sync.on_disconnect();
        sync.on_connection_established(t0 + Duration::from_secs(5));
        assert_eq!(sync.peer().local_sequence, 0);
    }

    #[test]
    fn test_remote_event_forwarding_and_clamping() {
        let t0 = Instant::now();
        let mut sync = receiver();
        sync.on_connection_established(t0);

        // Numeric value on the listen topic forwards.
        let event = TopicEvent::numeric("/controller/status", 93.0);
        assert_eq!(sync.on_remote_event(&event, t0), Some(93.0));

        // Out-of-range values clamp, never reject.
        let event = TopicEvent::numeric("/controller/status", 500.0);
        assert_eq!(sync.on_remote_event(&event, t0), Some(180.0));
        let event = TopicEvent::numeric("/controller/status", -40.0);
        assert_eq!(sync.on_remote_event(&event, t0), Some(0.0));

        // Other topics and heartbeats do not drive the actuator.
        let event = TopicEvent::numeric("/other/status", 10.0);
        assert_eq!(sync.on_remote_event(&event, t0), None);
        let event = TopicEvent::heartbeat("/controller/status");
        assert_eq!(sync.on_remote_event(&event, t0), None);

        // But every event refreshed liveness.
        assert!(sync.partner_alive());
        assert_eq!(sync.peer().remote_sequence, 4);
    }

    #[test]
    fn test_local_value_clamped_before_publish() {
        let t0 = Instant::now();
        let mut sync = controller();
        sync.on_connection_established(t0);

        let event = sync.on_local_value_changed(999.0, t0).unwrap();
        assert_eq!(event.value, json!(180));
    }

    #[test]
    fn test_partner_liveness_times_out() {
        let t0 = Instant::now();
        let mut sync = receiver();
        sync.on_connection_established(t0);

        let event = TopicEvent::numeric("/controller/status", 90.0);
        sync.on_remote_event(&event, t0);
        assert!(sync.check_partner_liveness(t0 + Duration::from_secs(29)));
        assert!(!sync.check_partner_liveness(t0 + Duration::from_secs(31)));

        // A new event revives the partner.
        sync.on_remote_event(&event, t0 + Duration::from_secs(40));
        assert!(sync.check_partner_liveness(t0 + Duration::from_secs(41)));
    }

    #[test]
    fn test_rate_admission_denies_over_cap() {
        let t0 = Instant::now();
        let mut sync = synced_controller(t0);

        let mut admitted = 0;
        for _ in 0..20 {
            if sync.try_send(t0 + Duration::from_secs(3)) {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }

    /// Controller publishes 90→93, relay rebroadcasts, receiver applies 93
    /// exactly once.
    #[test]
    fn test_end_to_end_value_propagation() {
        let t0 = Instant::now();
        let mut ctl = synced_controller(t0);
        let mut rcv = receiver();
        rcv.on_connection_established(t0);

        // 90 → 93 crosses the threshold: exactly one publish.
        let t = t0 + Duration::from_secs(3);
        let event = ctl.on_local_value_changed(93.0, t).unwrap();
        assert!(ctl.on_local_value_changed(93.0, t).is_none());

        let publish = channel::wrap(&event).unwrap();
        assert_eq!(
            String::from_utf8(publish.clone()).unwrap(),
            r#"{"topic":"/controller/status","value":93}"#
        );

        // The relay double-wraps the publish and broadcasts it as a frame.
        let broadcast =
            json!({"type": "data", "payload": String::from_utf8(publish).unwrap()}).to_string();
        let wire = encode(Opcode::Text, broadcast.as_bytes(), false, 1024).unwrap();

        let mut assembler = FrameAssembler::new(1024);
        let mut applied = Vec::new();
        for frame in assembler.feed(&wire) {
            if let ChannelEvent::Topic(event) = channel::unwrap(&frame)
                && let Some(value) = rcv.on_remote_event(&event, t)
            {
                applied.push(value);
            }
        }
        assert_eq!(applied, vec![93.0]);
    }
}
