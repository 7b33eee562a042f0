//! Dataset access
//!
//! The engine only sees two seams: an [`InputStore`] yielding the four
//! upstream datasets and a [`ResultSink`] receiving finished rows. Producing
//! those datasets (propagation, receiver placement, traffic parsing) and
//! exporting results happen elsewhere.

pub mod memory;
pub mod sqlite;

pub use memory::{MemorySink, MemoryStore};
pub use sqlite::{SqliteSink, SqliteStore};

use noisemap_core::{
    AttenuationRecord, EmissionRecord, NoiseMapResult, Receiver, ResultRow, SourceIdentity,
};

/// The four input datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dataset {
    Receivers,
    Attenuation,
    SourceIdentity,
    Emission,
}

impl Dataset {
    pub const ALL: [Dataset; 4] = [
        Dataset::Receivers,
        Dataset::Attenuation,
        Dataset::SourceIdentity,
        Dataset::Emission,
    ];
}

impl std::fmt::Display for Dataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dataset::Receivers => write!(f, "receivers"),
            Dataset::Attenuation => write!(f, "attenuation"),
            Dataset::SourceIdentity => write!(f, "source identity"),
            Dataset::Emission => write!(f, "emission"),
        }
    }
}

/// Read-only access to the upstream datasets.
pub trait InputStore {
    /// Fail with `MissingDataset` if any input is absent.
    fn check_inputs(&self) -> NoiseMapResult<()>;

    fn receivers(&self) -> NoiseMapResult<Vec<Receiver>>;

    fn attenuation(&self) -> NoiseMapResult<Vec<AttenuationRecord>>;

    fn source_identities(&self) -> NoiseMapResult<Vec<SourceIdentity>>;

    fn emissions(&self) -> NoiseMapResult<Vec<EmissionRecord>>;
}

/// Destination of result rows.
pub trait ResultSink {
    /// Drop any previous output and start a fresh one. Destructive.
    fn prepare(&mut self) -> NoiseMapResult<()>;

    /// Append every row of one receiver.
    fn write_receiver(&mut self, rows: &[ResultRow]) -> NoiseMapResult<()>;

    /// Make the output durable.
    fn finish(&mut self) -> NoiseMapResult<()>;

    /// Called when a run fails after `prepare`.
    fn abort(&mut self) {}
}
