//! Decimation
//!
//! Periodic purge of replacement pixel data. Only payload bytes are freed;
//! both cache levels keep their entries so handles held by the renderer
//! never dangle. The purge age comes from the resident size seen by the
//! previous pass, so pressure lags by one pass.

use retexture_core::memory::bytes_to_gib;
use retexture_core::{CacheBudget, ResidentStats};
use serde::Serialize;

use crate::cache::ReplacementCache;

/// Resident size above which each pass logs a warning
const WARN_RESIDENT_BYTES: usize = 1024 * 1024 * 1024;

/// How aggressively to purge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecimateMode {
    /// Age from the last observed resident size
    Normal,
    /// Host reported memory pressure: use the short age
    UnderPressure,
    /// Purge everything
    PurgeAll,
}

/// Summary of one pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DecimationReport {
    pub mode: DecimateMode,
    /// Purge age in seconds
    pub age: f64,
    /// Data unused since this time was purged
    pub threshold: f64,
    pub assets: usize,
    pub purged: usize,
    /// Bytes still resident after the pass
    pub resident_bytes: usize,
}

/// Purge age for a mode, given the resident size of the previous pass
pub fn decimation_age(mode: DecimateMode, budget: &CacheBudget, last_resident: usize) -> f64 {
    match mode {
        DecimateMode::PurgeAll => 0.0,
        DecimateMode::UnderPressure => budget.pressure_age,
        DecimateMode::Normal => budget.age_for(last_resident),
    }
}

/// Run one decimation pass over every asset in `cache`
pub fn decimate(
    cache: &ReplacementCache,
    budget: &CacheBudget,
    stats: &ResidentStats,
    mode: DecimateMode,
    now: f64,
) -> DecimationReport {
    let age = decimation_age(mode, budget, stats.last());
    let threshold = match mode {
        DecimateMode::PurgeAll => f64::INFINITY,
        _ => now - age,
    };

    let mut assets = 0;
    let mut purged = 0;
    let mut resident_bytes = 0;
    cache.for_each_asset(|_, texture| {
        let (was_purged, size) = texture.purge_and_measure(threshold);
        assets += 1;
        purged += was_purged as usize;
        resident_bytes += size;
    });

    if resident_bytes >= WARN_RESIDENT_BYTES {
        log::warn!(
            "Decimated replacements older than {}s, currently using {:.3} GB of RAM",
            age,
            bytes_to_gib(resident_bytes)
        );
    } else {
        log::debug!("Decimated {} of {} replacements older than {}s", purged, assets, age);
    }
    stats.record_pass(resident_bytes);

    DecimationReport {
        mode,
        age,
        threshold,
        assets,
        purged,
        resident_bytes,
    }
}
