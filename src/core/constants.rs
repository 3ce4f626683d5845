//! Protocol constants and configuration defaults.
//!
//! Wire-format values are fixed by RFC 6455 and the relay's envelope
//! contract; the timing defaults mirror a deployed device pair and can all
//! be overridden through [`LinkConfig`](super::LinkConfig).

use std::time::Duration;

// =============================================================================
// WEBSOCKET WIRE FORMAT (RFC 6455)
// =============================================================================

/// FIN bit in the first header byte.
pub const FIN_BIT: u8 = 0x80;

/// Reserved bits RSV1-RSV3 (no extensions are negotiated, must be zero).
pub const RSV_MASK: u8 = 0x70;

/// Opcode nibble mask in the first header byte.
pub const OPCODE_MASK: u8 = 0x0F;

/// Mask bit in the second header byte (mandatory client to server).
pub const MASK_BIT: u8 = 0x80;

/// 7-bit length sentinel for a 16-bit extended length.
pub const LEN_EXTENDED_16: u8 = 126;

/// 7-bit length sentinel for a 64-bit extended length.
pub const LEN_EXTENDED_64: u8 = 127;

/// Largest payload expressible in the 7-bit length field.
pub const MAX_INLINE_LEN: usize = 125;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Mask key size in bytes.
pub const MASK_KEY_SIZE: usize = 4;

/// Largest possible frame header: 2 base + 8 extended length + 4 mask key.
pub const MAX_HEADER_SIZE: usize = 14;

/// WebSocket protocol version sent during the upgrade handshake.
pub const WS_VERSION: &str = "13";

/// Size of the random nonce behind `Sec-WebSocket-Key`, before base64.
pub const HANDSHAKE_KEY_SIZE: usize = 16;

/// Upper bound on the upgrade response head we are willing to buffer.
pub const MAX_HANDSHAKE_RESPONSE: usize = 4096;

// =============================================================================
// DEFAULT TIMING AND LIMITS
// =============================================================================

/// Minimum value change that triggers a publish.
pub const DEFAULT_CHANGE_THRESHOLD: f64 = 3.0;

/// Heartbeat is emitted after this long without any outbound message.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Partner is considered stale after this long without a peer event.
pub const DEFAULT_PARTNER_TIMEOUT: Duration = Duration::from_secs(30);

/// Relay link is considered dead after this long without inbound bytes.
pub const DEFAULT_MESSAGE_TIMEOUT: Duration = Duration::from_secs(45);

/// Base reconnect backoff; doubles per failed attempt.
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Backoff never grows past this.
pub const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(60);

/// Consecutive failed connection attempts before giving up.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Maximum frame payload accepted or produced.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024;

/// Sends admitted per rate window.
pub const DEFAULT_MAX_MESSAGES_PER_WINDOW: u32 = 5;

/// Length of one rate window.
pub const DEFAULT_WINDOW_LENGTH: Duration = Duration::from_secs(1);

/// Settle delay before a post-reconnect resync send counts as complete.
pub const DEFAULT_RESYNC_SETTLE: Duration = Duration::from_secs(2);

/// Values are clamped to this closed range before use.
pub const DEFAULT_VALUE_RANGE: (f64, f64) = (0.0, 180.0);

/// Bounded wait on each socket read poll.
pub const DEFAULT_READ_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Overall handshake/connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
