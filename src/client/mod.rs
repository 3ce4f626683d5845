//! TETHER Protocol - Connection Supervisor
//!
//! The high-level client: owns the socket, drives the handshake and
//! reconnect/backoff policy, and runs the cooperative loop that moves bytes
//! between the relay and the sync state machine. The rest of the system sees
//! a single always-valid "connected or retrying" contract through
//! [`ConnectionSupervisor::state`].

mod supervisor;

pub use supervisor::{ConnectionState, ConnectionSupervisor};
