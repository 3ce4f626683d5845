//! Link configuration.
//!
//! One [`LinkConfig`] describes everything a device needs to join the relay:
//! where the relay lives, which topics to speak, and the timing/limit knobs
//! of the sync protocol. Defaults mirror a deployed device pair.

use std::time::Duration;

use super::constants;
use super::error::TetherError;
use super::traits::Role;

/// Configuration for one relay link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Relay hostname.
    pub host: String,

    /// Relay port (443 for TLS).
    pub port: u16,

    /// Handshake request path, including the channel.
    pub path: String,

    /// Use TLS. Plain TCP is only useful against local test relays.
    pub tls: bool,

    /// `Origin` header sent during the upgrade handshake.
    pub origin: String,

    /// Device name; the publish topic is `/<device_name>/status`.
    pub device_name: String,

    /// Topic this device listens for (the partner's publish topic).
    pub listen_topic: String,

    /// Minimum value change that triggers a publish.
    pub change_threshold: f64,

    /// Emit a heartbeat after this long without any outbound message.
    pub heartbeat_interval: Duration,

    /// Declare the partner stale after this long without a peer event.
    pub partner_timeout: Duration,

    /// Declare the relay link dead after this long without inbound bytes.
    pub message_timeout: Duration,

    /// Consecutive failed connection attempts before giving up.
    pub max_reconnect_attempts: u32,

    /// Base reconnect backoff; doubles per failed attempt.
    pub reconnect_backoff: Duration,

    /// Maximum frame payload accepted or produced.
    pub max_message_size: usize,

    /// Sends admitted per rate window.
    pub max_messages_per_window: u32,

    /// Length of one rate window.
    pub window_length: Duration,

    /// Settle delay before a post-reconnect resync counts as complete.
    pub resync_settle: Duration,

    /// Values are clamped to this closed range before use.
    pub value_range: (f64, f64),

    /// Bounded wait on each socket read poll.
    pub read_poll_interval: Duration,

    /// Overall handshake/connect timeout.
    pub connect_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::for_role(Role::Controller)
    }
}

impl LinkConfig {
    /// Configuration for the given role with default topics.
    ///
    /// A controller publishes `/controller/status` and listens on
    /// `/receiver/status`; a receiver is the mirror image.
    pub fn for_role(role: Role) -> Self {
        Self {
            host: "relay.invalid".to_string(),
            port: 443,
            path: "/api/channels/default".to_string(),
            tls: true,
            origin: "https://tether-device".to_string(),
            device_name: role.device_name().to_string(),
            listen_topic: format!("/{}/status", role.partner().device_name()),
            change_threshold: constants::DEFAULT_CHANGE_THRESHOLD,
            heartbeat_interval: constants::DEFAULT_HEARTBEAT_INTERVAL,
            partner_timeout: constants::DEFAULT_PARTNER_TIMEOUT,
            message_timeout: constants::DEFAULT_MESSAGE_TIMEOUT,
            max_reconnect_attempts: constants::DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_backoff: constants::DEFAULT_RECONNECT_BACKOFF,
            max_message_size: constants::DEFAULT_MAX_MESSAGE_SIZE,
            max_messages_per_window: constants::DEFAULT_MAX_MESSAGES_PER_WINDOW,
            window_length: constants::DEFAULT_WINDOW_LENGTH,
            resync_settle: constants::DEFAULT_RESYNC_SETTLE,
            value_range: constants::DEFAULT_VALUE_RANGE,
            read_poll_interval: constants::DEFAULT_READ_POLL_INTERVAL,
            connect_timeout: constants::DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Topic this device publishes on.
    pub fn publish_topic(&self) -> String {
        format!("/{}/status", self.device_name)
    }

    /// Center of the value range; the safe position applied on shutdown.
    pub fn center_value(&self) -> f64 {
        (self.value_range.0 + self.value_range.1) / 2.0
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<(), TetherError> {
        if self.host.is_empty() {
            return Err(TetherError::Config("host must not be empty".into()));
        }
        if self.device_name.is_empty() {
            return Err(TetherError::Config("device_name must not be empty".into()));
        }
        if self.change_threshold < 0.0 {
            return Err(TetherError::Config(
                "change_threshold must be non-negative".into(),
            ));
        }
        if self.value_range.0 >= self.value_range.1 {
            return Err(TetherError::Config(
                "value_range must be a non-empty interval".into(),
            ));
        }
        if self.max_message_size < constants::MAX_HEADER_SIZE {
            return Err(TetherError::Config("max_message_size too small".into()));
        }
        if self.max_messages_per_window == 0 {
            return Err(TetherError::Config(
                "max_messages_per_window must be at least 1".into(),
            ));
        }
        if self.window_length.is_zero() {
            return Err(TetherError::Config(
                "window_length must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for creating a [`LinkConfig`].
#[derive(Debug)]
pub struct LinkConfigBuilder {
    config: LinkConfig,
}

impl LinkConfigBuilder {
    /// Start from the defaults for `role`.
    pub fn new(role: Role) -> Self {
        Self {
            config: LinkConfig::for_role(role),
        }
    }

    /// Set the relay host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the relay port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the handshake path.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Enable or disable TLS.
    pub fn tls(mut self, tls: bool) -> Self {
        self.config.tls = tls;
        self
    }

    /// Set the device name (publish topic becomes `/<name>/status`).
    pub fn device_name(mut self, name: impl Into<String>) -> Self {
        self.config.device_name = name.into();
        self
    }

    /// Set the listen topic.
    pub fn listen_topic(mut self, topic: impl Into<String>) -> Self {
        self.config.listen_topic = topic.into();
        self
    }

    /// Set the change threshold.
    pub fn change_threshold(mut self, threshold: f64) -> Self {
        self.config.change_threshold = threshold;
        self
    }

    /// Set the heartbeat interval.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Set the partner timeout.
    pub fn partner_timeout(mut self, timeout: Duration) -> Self {
        self.config.partner_timeout = timeout;
        self
    }

    /// Set the relay idle timeout.
    pub fn message_timeout(mut self, timeout: Duration) -> Self {
        self.config.message_timeout = timeout;
        self
    }

    /// Set the reconnect attempt bound.
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    /// Set the base reconnect backoff.
    pub fn reconnect_backoff(mut self, backoff: Duration) -> Self {
        self.config.reconnect_backoff = backoff;
        self
    }

    /// Set the maximum message size.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set the rate window admission count.
    pub fn max_messages_per_window(mut self, count: u32) -> Self {
        self.config.max_messages_per_window = count;
        self
    }

    /// Set the rate window length.
    pub fn window_length(mut self, length: Duration) -> Self {
        self.config.window_length = length;
        self
    }

    /// Set the resync settle delay.
    pub fn resync_settle(mut self, settle: Duration) -> Self {
        self.config.resync_settle = settle;
        self
    }

    /// Set the accepted value range.
    pub fn value_range(mut self, min: f64, max: f64) -> Self {
        self.config.value_range = (min, max);
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<LinkConfig, TetherError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
