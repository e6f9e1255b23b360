//! Edge latch shared between the interrupt context and the poll loop
//!
//! Each input owns one `AtomicU64`. The top bit holds the normalized level,
//! the remaining 63 bits the tick at which that level was first observed.
//! The interrupt side is the only writer; the poll loop is the only reader.
//! A stale read is indistinguishable from "edge not yet seen" and is picked
//! up on the next poll.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use trigdeck_common::config::Polarity;
use trigdeck_common::Ticks;

const LEVEL_BIT: u64 = 1 << 63;
const TICK_MASK: u64 = LEVEL_BIT - 1;

/// Input level after polarity normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PinLevel {
    #[default]
    Deasserted,
    Asserted,
}

impl PinLevel {
    /// Normalize a raw electrical level against the input's polarity
    pub fn from_raw(raw: bool, polarity: Polarity) -> Self {
        let asserted = match polarity {
            Polarity::ActiveHigh => raw,
            Polarity::ActiveLow => !raw,
        };
        if asserted {
            PinLevel::Asserted
        } else {
            PinLevel::Deasserted
        }
    }
}

/// One observation of the latch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeSample {
    pub level: PinLevel,
    /// Tick at which `level` was first observed
    pub at: Ticks,
}

impl EdgeSample {
    fn pack(self) -> u64 {
        let level = match self.level {
            PinLevel::Asserted => LEVEL_BIT,
            PinLevel::Deasserted => 0,
        };
        level | (self.at & TICK_MASK)
    }

    fn unpack(word: u64) -> Self {
        let level = if word & LEVEL_BIT != 0 {
            PinLevel::Asserted
        } else {
            PinLevel::Deasserted
        };
        Self {
            level,
            at: word & TICK_MASK,
        }
    }
}

#[derive(Debug, Default)]
pub struct EdgeLatch {
    word: AtomicU64,
}

impl EdgeLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a level observed at `now`; repeats of the current level are ignored
    pub fn record(&self, level: PinLevel, now: Ticks) {
        let current = EdgeSample::unpack(self.word.load(Ordering::Acquire));
        if current.level != level {
            self.seed(level, now);
        }
    }

    /// Overwrite the latch unconditionally
    pub fn seed(&self, level: PinLevel, now: Ticks) {
        self.word
            .store(EdgeSample { level, at: now }.pack(), Ordering::Release);
    }

    pub fn sample(&self) -> EdgeSample {
        EdgeSample::unpack(self.word.load(Ordering::Acquire))
    }
}

/// Interrupt-context handler registered with the pin layer
#[derive(Debug, Clone)]
pub struct EdgeHandler {
    latch: Arc<EdgeLatch>,
    polarity: Polarity,
}

impl EdgeHandler {
    pub fn new(latch: Arc<EdgeLatch>, polarity: Polarity) -> Self {
        Self { latch, polarity }
    }

    /// Called by the pin layer on every level change
    pub fn on_edge(&self, raw_level: bool, now: Ticks) {
        self.latch
            .record(PinLevel::from_raw(raw_level, self.polarity), now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polarity_normalization() {
        assert_eq!(PinLevel::from_raw(true, Polarity::ActiveHigh), PinLevel::Asserted);
        assert_eq!(PinLevel::from_raw(false, Polarity::ActiveHigh), PinLevel::Deasserted);
        assert_eq!(PinLevel::from_raw(false, Polarity::ActiveLow), PinLevel::Asserted);
        assert_eq!(PinLevel::from_raw(true, Polarity::ActiveLow), PinLevel::Deasserted);
    }

    #[test]
    fn test_latch_starts_deasserted() {
        let latch = EdgeLatch::new();
        assert_eq!(
            latch.sample(),
            EdgeSample { level: PinLevel::Deasserted, at: 0 }
        );
    }

    #[test]
    fn test_record_keeps_first_tick_of_level() {
        let latch = EdgeLatch::new();
        latch.record(PinLevel::Asserted, 7);
        latch.record(PinLevel::Asserted, 9);
        assert_eq!(latch.sample(), EdgeSample { level: PinLevel::Asserted, at: 7 });

        latch.record(PinLevel::Deasserted, 12);
        assert_eq!(latch.sample(), EdgeSample { level: PinLevel::Deasserted, at: 12 });
    }

    #[test]
    fn test_tick_survives_level_bit() {
        let latch = EdgeLatch::new();
        let big = TICK_MASK - 3;
        latch.seed(PinLevel::Asserted, big);
        assert_eq!(latch.sample(), EdgeSample { level: PinLevel::Asserted, at: big });
    }

    #[test]
    fn test_handler_applies_polarity() {
        let latch = Arc::new(EdgeLatch::new());
        let handler = EdgeHandler::new(latch.clone(), Polarity::ActiveLow);
        handler.on_edge(false, 3);
        assert_eq!(latch.sample().level, PinLevel::Asserted);
        handler.on_edge(true, 5);
        assert_eq!(latch.sample(), EdgeSample { level: PinLevel::Deasserted, at: 5 });
    }
}
