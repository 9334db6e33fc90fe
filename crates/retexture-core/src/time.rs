//! Session Time
//!
//! Seconds-since-session-start clocks used to stamp asset access,
//! pick decimation thresholds and record when textures were saved.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of session time in seconds
pub trait Clock: Send + Sync {
    /// Seconds elapsed since the clock's epoch
    fn now(&self) -> f64;
}

/// Shared clock handle
pub type SharedClock = Arc<dyn Clock>;

/// Monotonic wall clock
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    /// Create a clock whose epoch is now
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Clock that only moves when told to
///
/// Stored as microseconds so it can be shared across threads without a lock.
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    /// Create a clock reading the given time
    pub fn starting_at(secs: f64) -> Self {
        let clock = Self::default();
        clock.set(secs);
        clock
    }

    /// Jump to an absolute time
    pub fn set(&self, secs: f64) {
        self.micros.store(to_micros(secs), Ordering::Release);
    }

    /// Move time forward
    pub fn advance(&self, secs: f64) {
        self.micros.fetch_add(to_micros(secs), Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.micros.load(Ordering::Acquire) as f64 / 1_000_000.0
    }
}

fn to_micros(secs: f64) -> u64 {
    (secs.max(0.0) * 1_000_000.0).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(a >= 0.0);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::starting_at(10.0);
        assert_eq!(clock.now(), 10.0);

        clock.advance(2.5);
        assert_eq!(clock.now(), 12.5);

        clock.set(1.0);
        assert_eq!(clock.now(), 1.0);
    }

    #[test]
    fn test_manual_clock_clamps_negative() {
        let clock = ManualClock::starting_at(-5.0);
        assert_eq!(clock.now(), 0.0);
    }
}
