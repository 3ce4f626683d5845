//! Frame reassembly from arbitrarily chunked socket reads.
//!
//! The relay link delivers bytes with no respect for frame boundaries: a
//! read may carry half a frame, three frames and a tail, or a lone header
//! byte. [`FrameAssembler`] accumulates reads and drains complete frames off
//! the front, under a hard memory cap suitable for constrained targets.
//!
//! Control frames are intercepted here: a `Ping` is answered by queueing a
//! `Pong` with the same payload (collected via [`take_pongs`]), and a
//! `Close` raises a flag the connection supervisor polls. Data frames that
//! were already complete in the buffer are still delivered when a `Close`
//! arrives behind them in the same read.
//!
//! [`take_pongs`]: FrameAssembler::take_pongs

use tracing::{debug, warn};

use super::frame::{self, DecodeOutcome, Frame, Opcode};
use crate::core::constants::MAX_HEADER_SIZE;

/// Turns raw reads into complete frames.
pub struct FrameAssembler {
    /// Accumulated bytes not yet forming a complete frame.
    buffer: Vec<u8>,
    /// Maximum payload passed through to the decoder.
    max_frame_size: usize,
    /// Hard cap on the accumulator.
    capacity: usize,
    /// Pong replies waiting to be written.
    pongs: Vec<Frame>,
    /// Set once a Close frame has been seen.
    close_received: bool,
}

impl FrameAssembler {
    /// Create an assembler for frames up to `max_frame_size` payload bytes.
    ///
    /// The accumulator cap leaves room for two maximum frames plus headers,
    /// so one complete frame can sit in front of a partial one.
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_frame_size,
            capacity: 2 * (max_frame_size + MAX_HEADER_SIZE),
            pongs: Vec::new(),
            close_received: false,
        }
    }

    /// Feed bytes from a socket read; returns the data frames completed.
    ///
    /// Ping and Close frames are consumed here and never returned. On a
    /// corrupt header the whole accumulator is discarded; resynchronizing
    /// on the next read beats compounding a lost framing offset. If the
    /// accumulator would exceed its cap without yielding a frame, the
    /// *oldest* bytes are dropped; newer data is the likelier carrier of
    /// the still-incoming frame's tail.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(bytes);

        let mut out = Vec::new();
        loop {
            match frame::decode(&self.buffer, self.max_frame_size) {
                Ok(DecodeOutcome::Complete { frame, consumed }) => {
                    self.buffer.drain(..consumed);
                    self.dispatch(frame, &mut out);
                }
                Ok(DecodeOutcome::Incomplete) => break,
                Err(e) => {
                    warn!(error = %e, discarded = self.buffer.len(), "corrupt frame, resetting accumulator");
                    self.buffer.clear();
                    break;
                }
            }
        }

        if self.buffer.len() > self.capacity {
            let excess = self.buffer.len() - self.capacity;
            debug!(dropped = excess, "accumulator over cap, dropping oldest bytes");
            self.buffer.drain(..excess);
        }

        out
    }

    fn dispatch(&mut self, frame: Frame, out: &mut Vec<Frame>) {
        match frame.opcode {
            Opcode::Ping => {
                debug!(len = frame.payload.len(), "ping, queueing pong");
                self.pongs.push(Frame::pong(frame.payload));
            }
            Opcode::Pong => {
                // Unsolicited pongs are allowed and carry no obligation.
                debug!("pong received");
            }
            Opcode::Close => {
                debug!("close frame received");
                self.close_received = true;
            }
            Opcode::Continuation => {
                // Continuation reassembly is out of scope; the relay sends
                // single logical frames.
                debug!("continuation frame ignored");
            }
            Opcode::Text | Opcode::Binary => out.push(frame),
        }
    }

    /// Take the pong replies queued since the last call.
    pub fn take_pongs(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.pongs)
    }

    /// Whether a Close frame has been received on this connection.
    pub fn close_received(&self) -> bool {
        self.close_received
    }

    /// Bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clear all per-connection state for a fresh connection.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pongs.clear();
        self.close_received = false;
    }
}
