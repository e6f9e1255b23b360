//! Tick utilities
//!
//! The control core measures time in abstract monotonic ticks supplied by an
//! external tick source. The binary runs the tick source in milliseconds, so
//! configuration values given in milliseconds convert through `tick_ms`.

use std::time::Duration;

/// Monotonic tick count
pub type Ticks = u64;

/// Convert a millisecond value to ticks for a given tick period
///
/// Rounds up so that a non-zero duration never collapses to zero ticks.
pub fn ms_to_ticks(ms: u64, tick_ms: u64) -> Ticks {
    if tick_ms == 0 {
        return ms;
    }
    ms.div_ceil(tick_ms)
}

/// Tick period as a `Duration`
pub fn tick_period(tick_ms: u64) -> Duration {
    Duration::from_millis(tick_ms.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ms_to_ticks_unit_period() {
        assert_eq!(ms_to_ticks(0, 1), 0);
        assert_eq!(ms_to_ticks(20, 1), 20);
    }

    #[test]
    fn test_ms_to_ticks_rounds_up() {
        assert_eq!(ms_to_ticks(20, 10), 2);
        assert_eq!(ms_to_ticks(21, 10), 3);
        assert_eq!(ms_to_ticks(1, 10), 1);
    }

    #[test]
    fn test_ms_to_ticks_zero_period() {
        assert_eq!(ms_to_ticks(15, 0), 15);
    }

    #[test]
    fn test_tick_period_never_zero() {
        assert_eq!(tick_period(0), Duration::from_millis(1));
        assert_eq!(tick_period(5), Duration::from_millis(5));
    }
}
