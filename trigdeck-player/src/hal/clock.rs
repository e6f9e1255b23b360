//! Wall-clock tick source for the binary

use super::TickSource;
use std::time::Instant;
use trigdeck_common::Ticks;

/// Monotonic clock counting ticks of `tick_ms` milliseconds since creation
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
    tick_ms: u64,
}

impl MonotonicClock {
    pub fn new(tick_ms: u64) -> Self {
        Self {
            origin: Instant::now(),
            tick_ms: tick_ms.max(1),
        }
    }
}

impl TickSource for MonotonicClock {
    fn now(&self) -> Ticks {
        self.origin.elapsed().as_millis() as u64 / self.tick_ms
    }
}
