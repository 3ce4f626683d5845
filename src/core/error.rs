//! Error types for the TETHER protocol.
//!
//! Each layer defines its own error enum next to its code
//! ([`FrameError`](crate::ws::FrameError), [`EnvelopeError`](crate::channel::EnvelopeError),
//! [`HandshakeError`](crate::ws::HandshakeError) with `transport`); this is
//! the top-level aggregation the public API surfaces.
//!
//! Two classes never appear here at all: transient I/O (read timeouts,
//! would-block) is absorbed where it happens, and a malformed relay envelope
//! is a skipped event, not an error.

use thiserror::Error;

/// Top-level TETHER errors.
#[derive(Debug, Error)]
pub enum TetherError {
    /// WebSocket frame violation.
    #[error("frame error: {0}")]
    Frame(#[from] crate::ws::FrameError),

    /// Envelope serialization failure.
    #[error("envelope error: {0}")]
    Envelope(#[from] crate::channel::EnvelopeError),

    /// Upgrade handshake failure.
    #[cfg(feature = "transport")]
    #[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
    #[error("handshake failed: {0}")]
    Handshake(#[from] crate::ws::HandshakeError),

    /// All reconnect attempts failed; the supervisor has stopped retrying.
    #[cfg(feature = "transport")]
    #[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
    #[error("reconnect exhausted after {attempts} attempts")]
    ReconnectExhausted {
        /// How many attempts were made.
        attempts: u32,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
