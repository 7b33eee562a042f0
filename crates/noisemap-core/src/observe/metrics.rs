//! # Run Metrics
//!
//! Lock-free counters describing one fusion run. Workers bump them while
//! computing receivers; the writer reads a [`RunStatsSnapshot`] at the end.
//!
//! ```rust
//! use noisemap_core::observe::RunStats;
//!
//! let stats = RunStats::new();
//! stats.receivers.inc();
//! stats.rows_written.inc_by(24);
//!
//! let snapshot = stats.snapshot();
//! assert_eq!(snapshot.rows_written, 24);
//! ```

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A simple atomic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter.
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// Increment by 1.
    #[inline]
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by a specific amount.
    #[inline]
    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Get the current value.
    #[inline]
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Reset to zero.
    #[inline]
    pub fn reset(&self) {
        self.value.store(0, Ordering::Relaxed);
    }
}

/// Counters for one run.
#[derive(Debug, Default)]
pub struct RunStats {
    /// Receivers fully written
    pub receivers: Counter,
    /// Receivers without any attenuation record (silence-floor grid)
    pub silent_receivers: Counter,
    /// Output rows written
    pub rows_written: Counter,
    /// Attenuation records visited
    pub attenuation_matched: Counter,
    /// Emission contributions folded into a level
    pub contributions: Counter,
    /// Attenuation records whose source had no emission
    pub sources_without_emission: Counter,
    /// Emission rows dropped because their bin is not on the grid
    pub emission_off_grid: Counter,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> RunStatsSnapshot {
        RunStatsSnapshot {
            receivers: self.receivers.get(),
            silent_receivers: self.silent_receivers.get(),
            rows_written: self.rows_written.get(),
            attenuation_matched: self.attenuation_matched.get(),
            contributions: self.contributions.get(),
            sources_without_emission: self.sources_without_emission.get(),
            emission_off_grid: self.emission_off_grid.get(),
        }
    }

    pub fn reset(&self) {
        self.receivers.reset();
        self.silent_receivers.reset();
        self.rows_written.reset();
        self.attenuation_matched.reset();
        self.contributions.reset();
        self.sources_without_emission.reset();
        self.emission_off_grid.reset();
    }
}

/// Point-in-time copy of [`RunStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatsSnapshot {
    pub receivers: u64,
    pub silent_receivers: u64,
    pub rows_written: u64,
    pub attenuation_matched: u64,
    pub contributions: u64,
    pub sources_without_emission: u64,
    pub emission_off_grid: u64,
}
