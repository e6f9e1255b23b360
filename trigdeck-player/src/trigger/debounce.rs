//! Debounce timer
//!
//! Elapsed-time measurement over an external tick source. Arming and
//! querying take the current tick explicitly; the timer never reads a clock.

use trigdeck_common::Ticks;

#[derive(Debug, Clone, Copy, Default)]
pub struct DebounceTimer {
    started_at: Option<Ticks>,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or restart) a measurement at `now`
    pub fn start(&mut self, now: Ticks) {
        self.start_at(now);
    }

    /// Start a measurement whose origin is an earlier tick
    pub fn start_at(&mut self, origin: Ticks) {
        self.started_at = Some(origin);
    }

    pub fn stop(&mut self) {
        self.started_at = None;
    }

    pub fn reset(&mut self) {
        self.stop();
    }

    pub fn is_armed(&self) -> bool {
        self.started_at.is_some()
    }

    /// Ticks since start, `None` when not armed
    pub fn elapsed(&self, now: Ticks) -> Option<Ticks> {
        self.started_at.map(|start| now.saturating_sub(start))
    }
}
