//! # TETHER Protocol
//!
//! **T**opic-**E**nveloped **T**ransport over an **H**ttp-upgraded
//! **E**ndpoint **R**elay
//!
//! TETHER keeps two constrained devices (a *controller* reading an analog
//! input and a *receiver* driving an actuator) synchronized through a shared
//! publish/subscribe relay reachable only over a WebSocket. Neither device
//! can open a socket to the other; everything is multiplexed through one
//! relay connection per device, addressed by topic. It provides:
//!
//! - **Framing**: a minimal RFC 6455 client codec (masking, 7/16/64-bit
//!   lengths, control frames) with bounded-memory reassembly
//! - **Envelopes**: the relay's JSON-in-JSON broadcast format unwrapped into
//!   plain `(topic, value)` events
//! - **Convergence**: change-threshold suppression, heartbeats, partner
//!   liveness, and a guaranteed state resync after every reconnect
//! - **Resilience**: bounded reconnect with backoff, send-rate capping, and
//!   a single-writer cooperative loop that never corrupts the stream
//!
//! ## Feature Flags
//!
//! - `transport` (default): handshake, TLS, and the connection supervisor
//!
//! ## Modules
//!
//! - [`core`]: configuration, constants, errors, and the device I/O trait
//! - [`ws`]: WebSocket frame codec, reassembly, and the upgrade handshake
//! - [`channel`]: relay envelope wrap/unwrap
//! - [`sync`]: the synchronization state machine
//! - [`client`]: connection supervisor (requires `transport`)
//!
//! ## Example Usage
//!
//! ```rust
//! use std::time::Instant;
//! use tether_protocol::prelude::*;
//!
//! let config = LinkConfig::for_role(Role::Controller);
//! let mut sync = SyncProtocol::new(&config);
//!
//! let now = Instant::now();
//! sync.on_connection_established(now);
//!
//! // The first reading after a connection always publishes.
//! let event = sync.on_local_value_changed(120.0, now).unwrap();
//! assert_eq!(event.topic, "/controller/status");
//!
//! // A wiggle below the change threshold is suppressed.
//! assert!(sync.on_local_value_changed(121.0, now).is_none());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// WebSocket client protocol engine (handshake requires `transport`)
pub mod ws;

// Relay envelope layer
pub mod channel;

// Synchronization state machine
pub mod sync;

// Connection supervisor (feature-gated)
#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
pub mod client;

/// Prelude module for convenient imports.
pub mod prelude {
    // Core configuration, errors, and the hardware seam
    pub use crate::core::*;

    // Frame codec and reassembly
    pub use crate::ws::{DecodeOutcome, Frame, FrameAssembler, FrameError, Opcode};

    // Envelope layer
    pub use crate::channel::{ChannelEvent, EnvelopeError, TopicEvent};

    // Sync state machine
    pub use crate::sync::{PeerState, RateWindow, SyncPhase, SyncProtocol};

    // Supervisor (when enabled)
    #[cfg(feature = "transport")]
    pub use crate::client::{ConnectionState, ConnectionSupervisor};
}

// Re-export commonly used items at crate root
pub use crate::channel::TopicEvent;
pub use crate::core::{DeviceIo, LinkConfig, Role, TetherError};
pub use crate::sync::SyncProtocol;

#[cfg(feature = "transport")]
pub use crate::client::ConnectionSupervisor;
