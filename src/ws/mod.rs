//! TETHER Protocol - WebSocket Client Engine
//!
//! A minimal RFC 6455 client. It provides:
//!
//! - **Frame codec**: [`encode`]/[`decode`] for single frames with masking
//!   and 7/16/64-bit length handling
//! - **Reassembly**: [`FrameAssembler`] turns arbitrarily chunked socket
//!   reads into complete frames under a hard memory cap
//! - **Handshake**: [`connect`] performs the HTTP Upgrade exchange
//!   (requires the `transport` feature)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           Envelope Layer                │
//! ├─────────────────────────────────────────┤
//! │         WebSocket Engine                │  ← this module
//! │   handshake, frames, reassembly         │
//! ├─────────────────────────────────────────┤
//! │           TCP / TLS                     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Deliberately not a general WebSocket implementation: no server side, no
//! extensions or subprotocol negotiation, and no continuation reassembly:
//! the relay speaks in single logical frames.

mod assembler;
mod frame;

#[cfg(feature = "transport")]
#[cfg_attr(docsrs, doc(cfg(feature = "transport")))]
mod handshake;

pub use assembler::FrameAssembler;
pub use frame::{DecodeOutcome, Frame, FrameError, Opcode, decode, encode};

#[cfg(feature = "transport")]
pub use handshake::{Established, HandshakeError, RelayStream, connect};
