//! Connection lifecycle and the cooperative event loop.
//!
//! One [`ConnectionSupervisor`] owns everything per-connection: the byte
//! stream, the frame assembler, the sync state machine, and the
//! reconnect/backoff counters. Its loop interleaves the two duties of the
//! link (draining inbound bytes and emitting outbound events) so socket
//! writes are never concurrent and the frame stream cannot interleave.
//!
//! Suspension points are exactly two: the bounded socket read and the
//! interruptible backoff sleep. The stop signal is checked every iteration,
//! and on shutdown the actuator is commanded to the center of the value
//! range before the socket closes.

use std::collections::VecDeque;
use std::io;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::channel::{self, ChannelEvent, TopicEvent};
use crate::core::constants::MAX_RECONNECT_BACKOFF;
use crate::core::{DeviceIo, LinkConfig, TetherError};
use crate::sync::{SyncPhase, SyncProtocol};
use crate::ws::{self, FrameAssembler, Opcode, RelayStream};

/// Connection lifecycle, observable by the rest of the system.
///
/// Only the supervisor mutates this; everyone else reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No link; waiting out the backoff before the next attempt.
    Disconnected,
    /// Upgrade handshake in flight.
    Handshaking,
    /// Link up and state resynced.
    Connected,
    /// Link up, current state not yet re-published to the partner.
    Resyncing,
}

/// What one bounded read produced.
enum ReadOutcome {
    /// Nothing arrived within the poll window.
    Idle,
    /// Orderly end of stream.
    Eof,
    /// Fresh bytes.
    Data(Vec<u8>),
    /// Transport fault.
    Failed(io::Error),
}

/// Owns one relay link and keeps it alive.
pub struct ConnectionSupervisor<D: DeviceIo> {
    config: LinkConfig,
    device: D,
    state: ConnectionState,
    sync: SyncProtocol,
    assembler: FrameAssembler,
    stream: Option<RelayStream>,
    outbox: VecDeque<TopicEvent>,
    /// Consecutive failed connection attempts.
    attempts: u32,
    /// Successful connections over the supervisor's lifetime.
    reconnects: u32,
    /// Relay `welcome` seen on the current connection.
    channel_ready: bool,
    /// Last time any bytes arrived on the current connection.
    last_rx_at: Instant,
}

impl<D: DeviceIo> ConnectionSupervisor<D> {
    /// Create a supervisor for `device` against the configured relay.
    pub fn new(config: LinkConfig, device: D) -> Result<Self, TetherError> {
        config.validate()?;
        let sync = SyncProtocol::new(&config);
        let assembler = FrameAssembler::new(config.max_message_size);
        Ok(Self {
            config,
            device,
            state: ConnectionState::Disconnected,
            sync,
            assembler,
            stream: None,
            outbox: VecDeque::new(),
            attempts: 0,
            reconnects: 0,
            channel_ready: false,
            last_rx_at: Instant::now(),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The sync state machine (partner liveness, sequences).
    pub fn sync(&self) -> &SyncProtocol {
        &self.sync
    }

    /// Successful connections so far.
    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    /// Whether the relay has welcomed the current connection.
    pub fn channel_ready(&self) -> bool {
        self.channel_ready
    }

    /// The owned device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Drive the link until `stop` flips or reconnects are exhausted.
    ///
    /// Every failure mode short of exhaustion retries with backoff;
    /// [`TetherError::ReconnectExhausted`] is the only error this returns.
    /// In all exits the actuator is parked at the center position and the
    /// socket is closed behind a best-effort Close frame.
    pub async fn run(&mut self, mut stop: watch::Receiver<bool>) -> Result<(), TetherError> {
        info!(device = %self.config.device_name, "supervisor starting");
        let result = loop {
            if *stop.borrow() {
                break Ok(());
            }
            match self.state {
                ConnectionState::Disconnected => {
                    if self.attempts >= self.config.max_reconnect_attempts {
                        break Err(TetherError::ReconnectExhausted {
                            attempts: self.attempts,
                        });
                    }
                    let delay = self.backoff_delay();
                    if !delay.is_zero() {
                        debug!(?delay, attempt = self.attempts, "reconnect backoff");
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            changed = stop.changed() => {
                                if changed.is_err() {
                                    break Ok(());
                                }
                                continue;
                            }
                        }
                    }
                    self.attempt_connect().await;
                }
                _ => self.tick_connected().await,
            }
        };
        self.shutdown().await;
        result
    }

    /// Backoff before attempt number `self.attempts`, doubling per failure.
    fn backoff_delay(&self) -> Duration {
        if self.attempts == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(self.attempts - 1);
        self.config
            .reconnect_backoff
            .saturating_mul(factor)
            .min(MAX_RECONNECT_BACKOFF)
    }

    async fn attempt_connect(&mut self) {
        self.state = ConnectionState::Handshaking;
        match ws::connect(&self.config).await {
            Ok(established) => {
                let now = Instant::now();
                self.attempts = 0;
                self.reconnects += 1;
                self.stream = Some(established.stream);
                self.assembler.reset();
                self.outbox.clear();
                self.channel_ready = false;
                self.last_rx_at = now;
                self.sync.on_connection_established(now);
                self.state = ConnectionState::Resyncing;
                info!(connections = self.reconnects, "relay link up, resyncing");

                // Frame bytes that rode in behind the handshake response
                // are part of the stream, not garbage.
                if !established.leftover.is_empty() {
                    self.process_bytes(&established.leftover, now);
                }
            }
            Err(e) => {
                self.attempts += 1;
                warn!(error = %e, attempt = self.attempts, "handshake failed");
                self.state = ConnectionState::Disconnected;
            }
        }
    }

    /// One iteration of the connected loop: bounded read, timers, writes.
    async fn tick_connected(&mut self) {
        let outcome = match self.stream.as_mut() {
            Some(stream) => {
                let mut buf = [0u8; 1024];
                match tokio::time::timeout(self.config.read_poll_interval, stream.read(&mut buf))
                    .await
                {
                    Err(_elapsed) => ReadOutcome::Idle,
                    Ok(Ok(0)) => ReadOutcome::Eof,
                    Ok(Ok(n)) => ReadOutcome::Data(buf[..n].to_vec()),
                    Ok(Err(e)) if is_transient(&e) => ReadOutcome::Idle,
                    Ok(Err(e)) => ReadOutcome::Failed(e),
                }
            }
            None => ReadOutcome::Eof,
        };

        let now = Instant::now();
        match outcome {
            ReadOutcome::Idle => {}
            ReadOutcome::Eof => {
                self.transition_disconnected("relay closed the stream");
                return;
            }
            ReadOutcome::Data(bytes) => {
                self.last_rx_at = now;
                self.process_bytes(&bytes, now);
            }
            ReadOutcome::Failed(e) => {
                warn!(error = %e, "read failed");
                self.transition_disconnected("transport error");
                return;
            }
        }

        if self.assembler.close_received() {
            // Teardown without answering; no further writes on this link.
            self.transition_disconnected("close frame from relay");
            return;
        }
        if now.duration_since(self.last_rx_at) > self.config.message_timeout {
            self.transition_disconnected("relay idle timeout");
            return;
        }

        // Due-timers and the local input.
        let value = self.device.read_local_value();
        if let Some(event) = self.sync.on_local_value_changed(value, now) {
            self.outbox.push_back(event);
        }
        if let Some(heartbeat) = self.sync.on_heartbeat_due(now) {
            self.outbox.push_back(heartbeat);
        }
        self.sync.check_partner_liveness(now);
        self.state = match self.sync.phase() {
            SyncPhase::AwaitingResync => ConnectionState::Resyncing,
            _ => ConnectionState::Connected,
        };

        if let Err(e) = self.flush_writes(now).await {
            warn!(error = %e, "write failed");
            self.transition_disconnected("transport error");
        }
    }

    /// Decode frames out of fresh bytes and route the results.
    fn process_bytes(&mut self, bytes: &[u8], now: Instant) {
        for frame in self.assembler.feed(bytes) {
            match channel::unwrap(&frame) {
                ChannelEvent::Welcome => {
                    info!("relay channel ready");
                    self.channel_ready = true;
                }
                ChannelEvent::Topic(event) => {
                    if let Some(value) = self.sync.on_remote_event(&event, now) {
                        debug!(topic = %event.topic, value, "applying remote value");
                        self.device.apply_remote_value(value);
                    }
                }
                ChannelEvent::Ignored => debug!("unrecognized broadcast ignored"),
            }
        }
    }

    /// The single writer: pong replies, then at most one outbound event.
    async fn flush_writes(&mut self, now: Instant) -> io::Result<()> {
        let pongs = self.assembler.take_pongs();
        let max = self.config.max_message_size;
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };

        for pong in pongs {
            match ws::encode(Opcode::Pong, &pong.payload, true, max) {
                Ok(bytes) => stream.write_all(&bytes).await?,
                Err(e) => warn!(error = %e, "dropping unencodable pong"),
            }
        }

        if self.outbox.is_empty() {
            return Ok(());
        }
        if !self.sync.try_send(now) {
            debug!(pending = self.outbox.len(), "rate-limited, retrying next tick");
            return Ok(());
        }
        if let Some(event) = self.outbox.pop_front() {
            match channel::wrap(&event) {
                Ok(payload) => match ws::encode(Opcode::Text, &payload, true, max) {
                    Ok(bytes) => {
                        stream.write_all(&bytes).await?;
                        debug!(topic = %event.topic, "published");
                    }
                    Err(e) => warn!(error = %e, "dropping oversized event"),
                },
                Err(e) => warn!(error = %e, "dropping unserializable event"),
            }
        }
        Ok(())
    }

    fn transition_disconnected(&mut self, reason: &str) {
        info!(reason, "connection lost");
        self.stream = None;
        self.assembler.reset();
        self.outbox.clear();
        self.channel_ready = false;
        self.sync.on_disconnect();
        self.state = ConnectionState::Disconnected;
    }

    /// Park the actuator and close the link.
    async fn shutdown(&mut self) {
        self.device.apply_remote_value(self.config.center_value());
        if let Some(mut stream) = self.stream.take() {
            if let Ok(bytes) = ws::encode(Opcode::Close, &[], true, self.config.max_message_size) {
                let _ = stream.write_all(&bytes).await;
            }
            let _ = stream.shutdown().await;
        }
        self.state = ConnectionState::Disconnected;
        info!("supervisor stopped");
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
    )
}
