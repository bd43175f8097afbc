//! Monotonic wall clock for entity timestamps.
//!
//! Timestamps are UTC milliseconds since the Unix epoch. The clock never
//! hands out the same value twice and never goes backwards, even if the
//! system clock does, so `created_at` doubles as a creation-order key.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Strictly increasing millisecond clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock {
    /// Last value handed out.
    last: u64,
}

impl MonotonicClock {
    /// Create a clock that has not issued any timestamp yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock whose next tick is greater than `last`.
    pub fn starting_after(last: u64) -> Self {
        Self { last }
    }

    /// Issue the next timestamp.
    ///
    /// Returns the wall time when it has advanced past the previous value,
    /// otherwise the previous value plus one.
    pub fn tick(&mut self) -> u64 {
        let now = now_millis();
        self.last = if now > self.last { now } else { self.last + 1 };
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_tick_tracks_wall_time() {
        let mut clock = MonotonicClock::new();
        let before = now_millis();
        let ts = clock.tick();
        assert!(ts >= before);
        assert_eq!(clock.last, ts);
    }

    #[test]
    fn test_clock_tick_rapid() {
        let mut clock = MonotonicClock::new();
        let mut prev = clock.tick();

        for _ in 0..1000 {
            let next = clock.tick();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn test_clock_survives_future_start() {
        // A persisted high-water mark ahead of the wall clock still wins.
        let ahead = now_millis() + 60_000;
        let mut clock = MonotonicClock::starting_after(ahead);
        assert_eq!(clock.tick(), ahead + 1);
        assert_eq!(clock.tick(), ahead + 2);
    }
}
