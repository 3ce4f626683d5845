//! Envelope wrap/unwrap.
//!
//! Inbound broadcasts (exact relay format):
//!
//! ```text
//! {"type":"welcome", ...}                           connection-ready signal
//! {"type":"data","payload":"{\"topic\":\"/controller/status\",\"value\":93}"}
//! ```
//!
//! Outbound publishes are the single-level inner object only:
//!
//! ```text
//! {"topic":"/controller/status","value":93}
//! ```
//!
//! Malformed JSON at either level yields [`ChannelEvent::Ignored`]: a relay
//! hiccup or a half-received frame must never take the connection down.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::ws::{Frame, Opcode};

/// Value published for heartbeats.
const HEARTBEAT_VALUE: &str = "heartbeat";

/// Outer relay envelope. `payload` stays a string here; the inner JSON is
/// parsed in a second pass.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<String>,
}

/// One application-level message: a topic and its JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicEvent {
    /// Topic string, e.g. `/controller/status`.
    pub topic: String,
    /// Payload value: a number, `"heartbeat"`, or an object.
    pub value: Value,
}

impl TopicEvent {
    /// A numeric publish. Whole numbers are published as JSON integers.
    pub fn numeric(topic: impl Into<String>, value: f64) -> Self {
        let value = if value.fract() == 0.0 && value.is_finite() {
            Value::from(value as i64)
        } else {
            Value::from(value)
        };
        Self {
            topic: topic.into(),
            value,
        }
    }

    /// A heartbeat publish.
    pub fn heartbeat(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            value: Value::from(HEARTBEAT_VALUE),
        }
    }

    /// Whether this is a heartbeat.
    pub fn is_heartbeat(&self) -> bool {
        self.value.as_str() == Some(HEARTBEAT_VALUE)
    }

    /// The value as a number, if numeric.
    pub fn as_number(&self) -> Option<f64> {
        self.value.as_f64()
    }
}

/// What a frame unwrapped to.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The relay's handshake-completion broadcast.
    Welcome,
    /// A data broadcast carrying a topic and value.
    Topic(TopicEvent),
    /// Not interpretable: non-text frame, malformed JSON at either level,
    /// or an unknown envelope type. Dropped, never fatal.
    Ignored,
}

/// Errors producing outbound envelope bytes.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Value could not be serialized.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Unwrap a frame into a channel event.
///
/// Only `Text` frames are interpreted; everything else is `Ignored`.
pub fn unwrap(frame: &Frame) -> ChannelEvent {
    if frame.opcode != Opcode::Text {
        return ChannelEvent::Ignored;
    }
    let Some(text) = frame.text_payload() else {
        debug!("text frame with invalid utf-8, ignoring");
        return ChannelEvent::Ignored;
    };

    let envelope: RawEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(error = %e, "unparseable outer envelope, ignoring");
            return ChannelEvent::Ignored;
        }
    };

    match envelope.kind.as_str() {
        "welcome" => ChannelEvent::Welcome,
        "data" => {
            let Some(payload) = envelope.payload else {
                debug!("data envelope without payload, ignoring");
                return ChannelEvent::Ignored;
            };
            match serde_json::from_str::<TopicEvent>(&payload) {
                Ok(event) => ChannelEvent::Topic(event),
                Err(e) => {
                    debug!(error = %e, "unparseable inner payload, ignoring");
                    ChannelEvent::Ignored
                }
            }
        }
        other => {
            debug!(kind = other, "unknown envelope type, ignoring");
            ChannelEvent::Ignored
        }
    }
}

/// Wrap an event into the bytes of an outbound publish.
///
/// Produces the single-level `{"topic":…,"value":…}` object the relay
/// expects; only inbound broadcasts are double-wrapped.
pub fn wrap(event: &TopicEvent) -> Result<Vec<u8>, EnvelopeError> {
    Ok(serde_json::to_vec(event)?)
}
