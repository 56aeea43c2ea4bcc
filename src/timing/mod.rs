//! Monotonic time source for event timestamps
//!
//! All keyframe timestamps derive from one clock so event ordering in the
//! log is monotonic by construction.

use std::sync::Arc;
use std::time::Instant;

/// Monotonic millisecond clock.
///
/// Cloning shares the same timebase.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    start: Arc<Instant>,
}

impl MonotonicClock {
    /// Create a clock with the current instant as time zero
    pub fn new() -> Self {
        Self {
            start: Arc::new(Instant::now()),
        }
    }

    /// Create a clock from an existing start instant
    ///
    /// Use this to share the same timebase between components.
    pub fn from_instant(start: Instant) -> Self {
        Self {
            start: Arc::new(start),
        }
    }

    /// Milliseconds elapsed since clock creation.
    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Milliseconds at a given instant.
    ///
    /// The instant must be after the clock's start time.
    #[inline]
    pub fn millis_at(&self, instant: Instant) -> u64 {
        instant.duration_since(*self.start).as_millis() as u64
    }

    /// Get the start instant for sharing with other components
    pub fn start_instant(&self) -> Instant {
        *self.start
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_clock_is_monotonic() {
        let clock = MonotonicClock::new();
        let first = clock.now_ms();
        std::thread::sleep(Duration::from_millis(5));
        let second = clock.now_ms();
        assert!(second >= first, "clock must never run backwards");
    }

    #[test]
    fn test_shared_timebase() {
        let clock = MonotonicClock::new();
        let shared = MonotonicClock::from_instant(clock.start_instant());
        assert_eq!(clock.start_instant(), shared.start_instant());
    }

    #[test]
    fn test_millis_at_start_is_zero() {
        let clock = MonotonicClock::new();
        assert_eq!(clock.millis_at(clock.start_instant()), 0);
    }
}
