//! TETHER Protocol - Relay Envelope Layer
//!
//! The relay wraps every broadcast in a two-level JSON envelope: an outer
//! `{type, payload}` object whose `payload` is a *string* containing the
//! application-level `{topic, value}` JSON. This module unwraps inbound
//! broadcasts into [`TopicEvent`]s and wraps outbound publishes, which are
//! single-level, never double-wrapped.

mod envelope;

pub use envelope::{ChannelEvent, EnvelopeError, TopicEvent, unwrap, wrap};
