//! # Noise Map Core
//!
//! Building blocks for fusing a precomputed source→receiver attenuation
//! matrix with time-varying source emission into receiver-level noise maps.
//!
//! ## Overview
//!
//! - **Bands**: 8 octave bands (63 Hz – 8 kHz), decibel energy summation,
//!   flat and A-weighted single-number indicators
//! - **Time grid**: a regular partition of the day into bins
//! - **Records**: receivers, attenuation, source identities, emission, results
//! - **Configuration**: YAML config with a search path
//! - **Observability**: `tracing` logging, run counters, progress reporting
//!
//! ## Example
//!
//! ```rust
//! use noisemap_core::prelude::*;
//!
//! let emission = BandLevels::splat(80.0);
//! let attenuation = BandLevels::splat(-40.0);
//!
//! let mut level = BandLevels::silence();
//! level.accumulate(&emission.offset(&attenuation));
//! assert!((level[Band::Hz1000] - 40.0).abs() < 1e-6);
//!
//! // Two equal sources: +3 dB
//! assert!((energy_sum(60.0, 60.0) - 63.0).abs() < 0.02);
//! ```
//!
//! The fusion engine itself lives in the `noisemap-engine` crate.

pub mod bands;
pub mod config;
pub mod error;
pub mod observe;
pub mod timegrid;
pub mod types;

pub use bands::{
    energy_sum, energy_sum_all, Band, BandLevels, A_WEIGHTING_DB, BAND_CENTERS_HZ, NUM_BANDS,
    SILENCE_FLOOR,
};
pub use config::{DatasetConfig, EngineConfig, GridConfig, NoiseMapConfig};
pub use error::{ConfigError, NoiseMapError, NoiseMapResult};
pub use timegrid::TimeGrid;
pub use types::{
    AttenuationRecord, EmissionRecord, LinkKey, Point, Receiver, ReceiverId, ResultRow,
    SourceId, SourceIdentity, TimeBin,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::bands::{energy_sum, Band, BandLevels, SILENCE_FLOOR};
    pub use crate::config::NoiseMapConfig;
    pub use crate::error::{NoiseMapError, NoiseMapResult};
    pub use crate::timegrid::TimeGrid;
    pub use crate::types::{
        AttenuationRecord, EmissionRecord, Point, Receiver, ResultRow, SourceIdentity, TimeBin,
    };
}
