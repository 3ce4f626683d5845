//! Outbound send-rate capping.
//!
//! A fixed window of `window_length` admits at most `max_per_window` sends.
//! Denial is an admission result, not an error: the caller keeps the event
//! and re-offers it on a later tick.

use std::time::{Duration, Instant};

/// Send admission window.
#[derive(Debug, Clone)]
pub struct RateWindow {
    window_length: Duration,
    max_per_window: u32,
    window_start: Option<Instant>,
    count: u32,
}

impl RateWindow {
    /// Create a window admitting `max_per_window` sends per `window_length`.
    pub fn new(window_length: Duration, max_per_window: u32) -> Self {
        Self {
            window_length,
            max_per_window,
            window_start: None,
            count: 0,
        }
    }

    /// Try to take one send slot at `now`.
    ///
    /// Returns `false` when the current window is full; the count invariant
    /// `count <= max_per_window` is enforced before any send.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        match self.window_start {
            Some(start) if now.duration_since(start) <= self.window_length => {}
            _ => {
                self.window_start = Some(now);
                self.count = 0;
            }
        }

        if self.count >= self.max_per_window {
            return false;
        }
        self.count += 1;
        true
    }

    /// Slots still available at `now`.
    pub fn remaining(&self, now: Instant) -> u32 {
        match self.window_start {
            Some(start) if now.duration_since(start) <= self.window_length => {
                self.max_per_window.saturating_sub(self.count)
            }
            _ => self.max_per_window,
        }
    }

    /// Forget the current window (fresh connection).
    pub fn reset(&mut self) {
        self.window_start = None;
        self.count = 0;
    }
}
