//! Attenuation/emission fusion
//!
//! Turns a sparse source→receiver attenuation matrix and a time-varying
//! emission table into a dense receiver × time-bin × band level grid.

pub mod accumulator;
pub mod attenuation;
pub mod emission;
pub mod engine;

pub use accumulator::{complete_grid, Accumulation, BinLevels, LevelAccumulator};
pub use attenuation::{AttenuationIndex, SourceAttenuation};
pub use emission::{EmissionIndex, TimedEmission};
pub use engine::{CancelToken, FusionEngine, FusionIndex, RunSummary};
