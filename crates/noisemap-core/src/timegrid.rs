//! Time-of-day grid
//!
//! Emission and results are discretized into fixed-width bins covering
//! `[bin_min, bin_max)`. Bin labels are the bin start, in seconds since the
//! start of the day:
//!
//! ```text
//! bin_min                                             bin_max
//!   |  bin_size  |            |            |            |
//!   0          3600         7200   ...  82800        86400
//!   ^ bin 0      ^ bin 3600                 ^ bin 82800   (24 bins)
//! ```

use serde::Serialize;

use crate::error::{NoiseMapError, NoiseMapResult};
use crate::types::TimeBin;

/// Seconds in one day, the canonical upper bound of the grid.
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Default bin width: one hour.
pub const DEFAULT_BIN_SIZE: i64 = 3_600;

/// A validated, regular partition of `[bin_min, bin_max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeGrid {
    bin_min: TimeBin,
    bin_max: TimeBin,
    bin_size: TimeBin,
}

impl TimeGrid {
    /// Build a grid, rejecting ranges that do not split into whole bins.
    pub fn new(bin_min: TimeBin, bin_max: TimeBin, bin_size: TimeBin) -> NoiseMapResult<Self> {
        if bin_size <= 0 {
            return Err(NoiseMapError::InvalidGrid(format!(
                "bin_size must be positive, got {}",
                bin_size
            )));
        }
        if bin_min < 0 {
            return Err(NoiseMapError::InvalidGrid(format!(
                "bin_min must be >= 0, got {}",
                bin_min
            )));
        }
        if bin_min >= bin_max {
            return Err(NoiseMapError::InvalidGrid(format!(
                "bin_min ({}) must be below bin_max ({})",
                bin_min, bin_max
            )));
        }
        if (bin_max - bin_min) % bin_size != 0 {
            return Err(NoiseMapError::InvalidGrid(format!(
                "range [{}, {}) is not a multiple of bin_size {}",
                bin_min, bin_max, bin_size
            )));
        }
        Ok(Self {
            bin_min,
            bin_max,
            bin_size,
        })
    }

    /// Whole day with the given bin size.
    pub fn full_day(bin_size: TimeBin) -> NoiseMapResult<Self> {
        Self::new(0, SECONDS_PER_DAY, bin_size)
    }

    pub fn bin_min(&self) -> TimeBin {
        self.bin_min
    }

    pub fn bin_max(&self) -> TimeBin {
        self.bin_max
    }

    pub fn bin_size(&self) -> TimeBin {
        self.bin_size
    }

    /// Number of bins; every receiver produces exactly this many rows.
    pub fn len(&self) -> usize {
        ((self.bin_max - self.bin_min) / self.bin_size) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical bins in ascending order.
    pub fn bins(&self) -> impl Iterator<Item = TimeBin> + '_ {
        (self.bin_min..self.bin_max).step_by(self.bin_size as usize)
    }

    /// True when `bin` is in range and aligned to the grid.
    pub fn contains(&self, bin: TimeBin) -> bool {
        bin >= self.bin_min && bin < self.bin_max && (bin - self.bin_min) % self.bin_size == 0
    }
}

impl Default for TimeGrid {
    fn default() -> Self {
        Self {
            bin_min: 0,
            bin_max: SECONDS_PER_DAY,
            bin_size: DEFAULT_BIN_SIZE,
        }
    }
}
