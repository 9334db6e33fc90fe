//! Memory Budgets
//!
//! Budget configuration and resident-size tracking for caches whose
//! payload can be dropped and reloaded:
//! - Pressure as a fraction of a fixed budget
//! - Age thresholds that tighten as pressure rises
//! - Last-observed and peak resident sizes

use std::sync::atomic::{AtomicUsize, Ordering};

const GIB: usize = 1024 * 1024 * 1024;

/// Memory budget for a purgeable cache
#[derive(Debug, Clone)]
pub struct CacheBudget {
    /// Resident size at which pressure reaches 100%
    pub max_bytes: usize,
    /// Below this resident size no pressure is applied
    pub pressure_floor_bytes: usize,
    /// Age in seconds after which unused data is purged without pressure
    pub baseline_age: f64,
    /// Age in seconds used at full pressure
    pub pressure_age: f64,
}

impl Default for CacheBudget {
    fn default() -> Self {
        Self {
            max_bytes: 4 * GIB,
            pressure_floor_bytes: GIB,
            baseline_age: 1800.0,
            pressure_age: 90.0,
        }
    }
}

impl CacheBudget {
    /// Fraction of the budget in use, clamped to `[0, 1]`
    pub fn pressure(&self, resident_bytes: usize) -> f64 {
        if self.max_bytes == 0 {
            return 1.0;
        }
        resident_bytes.min(self.max_bytes) as f64 / self.max_bytes as f64
    }

    /// Purge age for the given resident size.
    ///
    /// At or below the floor the baseline age is used unconditionally.
    /// Above it the age is interpolated linearly between the baseline
    /// (no pressure) and the pressure age (full budget).
    pub fn age_for(&self, resident_bytes: usize) -> f64 {
        if resident_bytes <= self.pressure_floor_bytes {
            return self.baseline_age;
        }
        let pressure = self.pressure(resident_bytes);
        self.pressure_age + (1.0 - pressure) * (self.baseline_age - self.pressure_age)
    }
}

/// Resident size observed by the last purge pass
#[derive(Debug, Default)]
pub struct ResidentStats {
    last: AtomicUsize,
    peak: AtomicUsize,
    passes: AtomicUsize,
}

impl ResidentStats {
    /// Create empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the total measured by a pass
    pub fn record_pass(&self, resident_bytes: usize) {
        self.last.store(resident_bytes, Ordering::Relaxed);
        self.peak.fetch_max(resident_bytes, Ordering::Relaxed);
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Resident bytes seen by the most recent pass
    pub fn last(&self) -> usize {
        self.last.load(Ordering::Relaxed)
    }

    /// Largest resident size ever recorded
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Number of passes recorded
    pub fn passes(&self) -> usize {
        self.passes.load(Ordering::Relaxed)
    }

    /// Reset statistics
    pub fn reset(&self) {
        self.last.store(0, Ordering::Relaxed);
        self.peak.store(0, Ordering::Relaxed);
        self.passes.store(0, Ordering::Relaxed);
    }
}

/// Convert a byte count to GiB for log output
pub fn bytes_to_gib(bytes: usize) -> f64 {
    bytes as f64 / GIB as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_budget() {
        let budget = CacheBudget::default();
        assert_eq!(budget.max_bytes, 4 * GIB);
        assert_eq!(budget.baseline_age, 1800.0);
        assert_eq!(budget.pressure_age, 90.0);
    }

    #[test]
    fn test_pressure_is_clamped() {
        let budget = CacheBudget::default();
        assert_eq!(budget.pressure(0), 0.0);
        assert_eq!(budget.pressure(2 * GIB), 0.5);
        assert_eq!(budget.pressure(8 * GIB), 1.0);
    }

    #[test]
    fn test_age_below_floor_is_baseline() {
        let budget = CacheBudget::default();
        assert_eq!(budget.age_for(0), 1800.0);
        assert_eq!(budget.age_for(GIB), 1800.0);
    }

    #[test]
    fn test_age_at_full_budget_is_aggressive() {
        let budget = CacheBudget::default();
        assert_eq!(budget.age_for(4 * GIB), 90.0);
        assert_eq!(budget.age_for(16 * GIB), 90.0);
    }

    #[test]
    fn test_age_interpolates() {
        let budget = CacheBudget::default();
        let age = budget.age_for(2 * GIB);
        assert!((age - (90.0 + 0.5 * 1710.0)).abs() < 1e-9);

        // Without a floor, zero pressure converges to the baseline.
        let unfloored = CacheBudget {
            pressure_floor_bytes: 0,
            ..CacheBudget::default()
        };
        let age = unfloored.age_for(1);
        assert!((age - 1800.0).abs() < 0.01);
    }

    #[test]
    fn test_resident_stats() {
        let stats = ResidentStats::new();
        stats.record_pass(100);
        stats.record_pass(300);
        stats.record_pass(200);

        assert_eq!(stats.last(), 200);
        assert_eq!(stats.peak(), 300);
        assert_eq!(stats.passes(), 3);

        stats.reset();
        assert_eq!(stats.last(), 0);
    }
}
