//! # Noise Map Engine
//!
//! Fuses a precomputed source→receiver attenuation matrix with time-varying
//! source emission into one row per (receiver, time bin), carrying the
//! per-band levels plus flat and A-weighted totals.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────────────────┐   ┌──────────────┐
//! │  InputStore  │──►│          FusionEngine         │──►│  ResultSink  │
//! │ Memory/SQLite│   │ indices → rayon batches → one │   │ Memory/SQLite│
//! └──────────────┘   │ writer in receiver order      │   └──────────────┘
//!                    └───────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use noisemap_engine::prelude::*;
//!
//! let store = MemoryStore::new()
//!     .with_receivers(vec![Receiver::new(1, Point::new(0.0, 0.0))])
//!     .with_attenuation(vec![AttenuationRecord {
//!         receiver_id: 1,
//!         source_id: 10,
//!         attenuation: BandLevels::splat(-40.0),
//!     }])
//!     .with_source_identities(vec![SourceIdentity { id: 10, link_key: "A".into() }])
//!     .with_emissions(vec![EmissionRecord {
//!         link_key: "A".into(),
//!         time_bin: 0,
//!         emission: BandLevels::splat(80.0),
//!     }]);
//!
//! let engine = FusionEngine::new(TimeGrid::default(), EngineConfig::default());
//! let mut sink = MemorySink::new();
//! let summary = engine.run(&store, &mut sink).unwrap();
//!
//! assert_eq!(summary.rows, 24);
//! assert!((sink.rows()[0].levels[Band::Hz1000] - 40.0).abs() < 1e-6);
//! ```

pub mod fusion;
pub mod store;

pub use fusion::{
    complete_grid, AttenuationIndex, CancelToken, EmissionIndex, FusionEngine, FusionIndex,
    LevelAccumulator, RunSummary,
};
pub use store::{Dataset, InputStore, MemorySink, MemoryStore, ResultSink, SqliteSink, SqliteStore};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::fusion::{CancelToken, FusionEngine, RunSummary};
    pub use crate::store::{InputStore, MemorySink, MemoryStore, ResultSink, SqliteStore};
    pub use noisemap_core::prelude::*;
    pub use noisemap_core::EngineConfig;
}
