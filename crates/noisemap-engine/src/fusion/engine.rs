//! Fusion engine: receivers in, dense receiver × time-bin rows out
//!
//! ```text
//!  InputStore ──► index build (once) ──► AttenuationIndex + EmissionIndex
//!                                                │
//!        receivers ─► batch ─► rayon workers ────┤  accumulate + complete_grid
//!                                                ▼
//!                                 single writer (input order) ──► ResultSink
//! ```
//!
//! Receivers are independent units of work. Workers only read the shared
//! indices; the writer is the only code that touches the sink, and it always
//! writes every row of a receiver in one call. Output order is the receiver
//! input order followed by time bin, so identical inputs give identical
//! output.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

use noisemap_core::observe::{ProgressReporter, RunStats, RunStatsSnapshot};
use noisemap_core::{
    ConfigError, EngineConfig, NoiseMapConfig, NoiseMapError, NoiseMapResult, Receiver,
    ResultRow, TimeGrid,
};

use super::accumulator::{complete_grid, LevelAccumulator};
use super::attenuation::AttenuationIndex;
use super::emission::EmissionIndex;
use crate::store::{InputStore, ResultSink};

/// Shared flag stopping a run at the next receiver boundary.
///
/// A cancellation applies to the run in progress, or to the next one when
/// no run is active. Every run clears the flag when it returns.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Lookup structures built once per run.
#[derive(Debug)]
pub struct FusionIndex {
    pub attenuation: AttenuationIndex,
    pub emission: EmissionIndex,
}

impl FusionIndex {
    /// Load and index attenuation and emission from the store.
    pub fn build<S: InputStore + ?Sized>(store: &S, grid: &TimeGrid) -> NoiseMapResult<Self> {
        let attenuation = AttenuationIndex::build(store.attenuation()?)?;
        let emission = EmissionIndex::build(store.source_identities()?, store.emissions()?, grid)?;

        tracing::info!(
            attenuation_records = attenuation.record_count(),
            receivers_with_sources = attenuation.receiver_count(),
            emitting_sources = emission.source_count(),
            "Indices built"
        );
        let referenced = attenuation.source_ids();
        let silent_sources = referenced
            .iter()
            .filter(|&&source| !emission.resolves(source))
            .count();
        if silent_sources > 0 {
            tracing::info!(
                sources = referenced.len(),
                without_emission = silent_sources,
                "Attenuated sources without emission contribute nothing"
            );
        }
        if emission.unresolved_identities() > 0 {
            tracing::debug!(
                identities = emission.unresolved_identities(),
                "Source identities without emission rows"
            );
        }

        Ok(Self {
            attenuation,
            emission,
        })
    }

    pub fn accumulator(&self) -> LevelAccumulator<'_> {
        LevelAccumulator::new(&self.attenuation, &self.emission)
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub receivers: u64,
    pub rows: u64,
    pub bins_per_receiver: usize,
    pub elapsed: Duration,
    pub stats: RunStatsSnapshot,
}

/// Orchestrates a full noise map run.
#[derive(Debug)]
pub struct FusionEngine {
    grid: TimeGrid,
    config: EngineConfig,
    cancel: CancelToken,
    stats: RunStats,
}

impl FusionEngine {
    pub fn new(grid: TimeGrid, config: EngineConfig) -> Self {
        Self {
            grid,
            config,
            cancel: CancelToken::new(),
            stats: RunStats::new(),
        }
    }

    /// Engine for a validated configuration.
    pub fn from_config(config: &NoiseMapConfig) -> NoiseMapResult<Self> {
        config.validate()?;
        Ok(Self::new(config.time_grid()?, config.engine))
    }

    pub fn grid(&self) -> &TimeGrid {
        &self.grid
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Token that stops this engine's current or next run.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Counters of the last run.
    pub fn stats(&self) -> RunStatsSnapshot {
        self.stats.snapshot()
    }

    /// Rows for one receiver: exactly one per canonical bin.
    pub fn compute_receiver(&self, index: &FusionIndex, receiver: &Receiver) -> Vec<ResultRow> {
        let acc = index.accumulator().accumulate(receiver.id);

        self.stats.attenuation_matched.inc_by(acc.matched);
        self.stats.contributions.inc_by(acc.contributions);
        self.stats.sources_without_emission.inc_by(acc.without_emission);
        if acc.matched == 0 {
            self.stats.silent_receivers.inc();
        }

        complete_grid(acc.levels, &self.grid)
            .into_iter()
            .map(|(bin, levels)| ResultRow::new(receiver, bin, levels))
            .collect()
    }

    /// Run the whole pipeline.
    ///
    /// The engine can be reused: the cancel token is cleared once the run
    /// returns, whatever the outcome.
    ///
    /// The sink is prepared (its previous content destroyed) only after every
    /// input has been loaded and validated. On failure the sink is asked to
    /// abort; whether already written receivers survive depends on the sink.
    pub fn run<S, K>(&self, store: &S, sink: &mut K) -> NoiseMapResult<RunSummary>
    where
        S: InputStore + ?Sized,
        K: ResultSink + ?Sized,
    {
        let result = self.run_inner(store, sink);
        self.cancel.reset();
        match result {
            Ok(summary) => Ok(summary),
            Err(e) => {
                tracing::error!(error = %e, "Noise map run failed");
                sink.abort();
                Err(e)
            }
        }
    }

    fn run_inner<S, K>(&self, store: &S, sink: &mut K) -> NoiseMapResult<RunSummary>
    where
        S: InputStore + ?Sized,
        K: ResultSink + ?Sized,
    {
        let start = Instant::now();
        self.stats.reset();

        tracing::info!(
            bin_min = self.grid.bin_min(),
            bin_max = self.grid.bin_max(),
            bin_size = self.grid.bin_size(),
            threads = self.config.threads,
            "Start noise map fusion"
        );

        store.check_inputs()?;
        let receivers = store.receivers()?;
        check_unique_receivers(&receivers)?;
        let index = FusionIndex::build(store, &self.grid)?;
        self.stats
            .emission_off_grid
            .inc_by(index.emission.off_grid_rows());

        sink.prepare()?;

        let pool = self.thread_pool()?;
        let mut progress = ProgressReporter::new("Processing receiver", receivers.len() as u64);

        for batch in receivers.chunks(self.config.batch_size.max(1)) {
            let computed = self.compute_batch(&index, batch, pool.as_ref());

            // Rows of a receiver are written together, so a stop between
            // receivers never leaves a partial grid behind.
            for rows in computed {
                let Some(rows) = rows else {
                    return Err(NoiseMapError::Cancelled {
                        completed: progress.completed(),
                    });
                };
                sink.write_receiver(&rows)?;
                self.stats.receivers.inc();
                self.stats.rows_written.inc_by(rows.len() as u64);
                progress.tick();
            }
        }

        sink.finish()?;

        let stats = self.stats.snapshot();
        let summary = RunSummary {
            receivers: stats.receivers,
            rows: stats.rows_written,
            bins_per_receiver: self.grid.len(),
            elapsed: start.elapsed(),
            stats,
        };
        tracing::info!(
            receivers = summary.receivers,
            rows = summary.rows,
            silent_receivers = stats.silent_receivers,
            elapsed_s = summary.elapsed.as_secs_f64(),
            "End noise map fusion"
        );
        Ok(summary)
    }

    // `None` marks a receiver skipped after cancellation.
    fn compute_batch(
        &self,
        index: &FusionIndex,
        batch: &[Receiver],
        pool: Option<&rayon::ThreadPool>,
    ) -> Vec<Option<Vec<ResultRow>>> {
        let compute = |receiver: &Receiver| {
            (!self.cancel.is_cancelled()).then(|| self.compute_receiver(index, receiver))
        };

        match pool {
            None => batch.iter().map(compute).collect(),
            Some(pool) => pool.install(|| batch.par_iter().map(compute).collect()),
        }
    }

    fn thread_pool(&self) -> NoiseMapResult<Option<rayon::ThreadPool>> {
        if self.config.threads == 1 {
            return Ok(None);
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .thread_name(|i| format!("noisemap-worker-{}", i))
            .build()
            .map(Some)
            .map_err(|e| {
                NoiseMapError::from(ConfigError::ValidationError(format!("thread pool: {}", e)))
            })
    }
}

fn check_unique_receivers(receivers: &[Receiver]) -> NoiseMapResult<()> {
    let mut seen = HashSet::with_capacity(receivers.len());
    match receivers.iter().find(|r| !seen.insert(r.id)) {
        Some(dup) => Err(NoiseMapError::InvalidRecord {
            dataset: "receivers".to_string(),
            detail: format!("duplicate receiver id {}", dup.id),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemorySink, MemoryStore};
    use noisemap_core::{
        AttenuationRecord, BandLevels, EmissionRecord, Point, SourceIdentity, SILENCE_FLOOR,
    };

    fn store() -> MemoryStore {
        MemoryStore::new()
            .with_receivers(vec![
                Receiver::new(1, Point::new(0.0, 0.0)),
                Receiver::new(2, Point::new(10.0, 0.0)),
            ])
            .with_attenuation(vec![AttenuationRecord {
                receiver_id: 1,
                source_id: 100,
                attenuation: BandLevels::splat(-40.0),
            }])
            .with_source_identities(vec![SourceIdentity {
                id: 100,
                link_key: "road-1".into(),
            }])
            .with_emissions(vec![EmissionRecord {
                link_key: "road-1".into(),
                time_bin: 0,
                emission: BandLevels::splat(80.0),
            }])
    }

    #[test]
    fn test_run_sequential() {
        let engine = FusionEngine::new(
            TimeGrid::default(),
            EngineConfig {
                threads: 1,
                ..Default::default()
            },
        );
        let mut sink = MemorySink::new();
        let summary = engine.run(&store(), &mut sink).unwrap();

        assert_eq!(summary.receivers, 2);
        assert_eq!(summary.rows, 48);
        assert_eq!(summary.stats.silent_receivers, 1);
        assert_eq!(sink.rows().len(), 48);
        assert!(sink.is_finished());
    }

    #[test]
    fn test_compute_receiver_grid() {
        let engine = FusionEngine::new(TimeGrid::default(), EngineConfig::default());
        let store = store();
        let index = FusionIndex::build(&store, engine.grid()).unwrap();

        let rows = engine.compute_receiver(&index, &Receiver::new(2, Point::new(1.0, 1.0)));
        assert_eq!(rows.len(), 24);
        assert!(rows.iter().all(|r| r.flat_level == SILENCE_FLOOR));
    }

    #[test]
    fn test_duplicate_receivers_rejected() {
        let store = store().with_receivers(vec![
            Receiver::new(1, Point::new(0.0, 0.0)),
            Receiver::new(1, Point::new(5.0, 0.0)),
        ]);
        let engine = FusionEngine::new(TimeGrid::default(), EngineConfig::default());
        let mut sink = MemorySink::new();
        let err = engine.run(&store, &mut sink).unwrap_err();
        assert!(err.to_string().contains("duplicate receiver id 1"));
        assert!(!sink.is_prepared());
    }

    /// Cancels the run once `after` receivers have been written.
    struct CancellingSink {
        inner: MemorySink,
        token: CancelToken,
        after: usize,
        written: usize,
    }

    impl ResultSink for CancellingSink {
        fn prepare(&mut self) -> NoiseMapResult<()> {
            self.inner.prepare()
        }

        fn write_receiver(&mut self, rows: &[ResultRow]) -> NoiseMapResult<()> {
            self.inner.write_receiver(rows)?;
            self.written += 1;
            if self.written == self.after {
                self.token.cancel();
            }
            Ok(())
        }

        fn finish(&mut self) -> NoiseMapResult<()> {
            self.inner.finish()
        }

        fn abort(&mut self) {
            self.inner.abort();
        }
    }

    fn many_receivers(n: i64) -> MemoryStore {
        store().with_receivers(
            (1..=n)
                .map(|id| Receiver::new(id, Point::new(id as f64, 0.0)))
                .collect(),
        )
    }

    #[test]
    fn test_cancel_mid_run_keeps_complete_receivers() {
        for threads in [1, 0] {
            let engine = FusionEngine::new(
                TimeGrid::default(),
                EngineConfig {
                    threads,
                    batch_size: 1,
                    ..Default::default()
                },
            );
            let mut sink = CancellingSink {
                inner: MemorySink::new(),
                token: engine.cancel_token(),
                after: 3,
                written: 0,
            };

            let err = engine.run(&many_receivers(10), &mut sink).unwrap_err();
            assert!(matches!(err, NoiseMapError::Cancelled { completed: 3 }));

            let rows = sink.inner.rows();
            assert_eq!(rows.len(), 3 * 24);
            for (i, chunk) in rows.chunks(24).enumerate() {
                assert!(chunk.iter().all(|r| r.receiver_id == i as i64 + 1));
            }
            assert!(sink.inner.is_aborted());
            assert!(!sink.inner.is_finished());
        }
    }

    #[test]
    fn test_engine_reusable_after_cancel() {
        let engine = FusionEngine::new(TimeGrid::default(), EngineConfig::default());
        engine.cancel_token().cancel();
        let mut sink = MemorySink::new();
        assert!(engine.run(&store(), &mut sink).is_err());
        assert!(!engine.cancel_token().is_cancelled());

        let summary = engine.run(&store(), &mut sink).unwrap();
        assert_eq!(summary.rows, 48);
        assert!(sink.is_finished());
    }

    #[test]
    fn test_cancel_before_run() {
        let engine = FusionEngine::new(TimeGrid::default(), EngineConfig::default());
        engine.cancel_token().cancel();
        let mut sink = MemorySink::new();
        let err = engine.run(&store(), &mut sink).unwrap_err();
        assert!(matches!(err, NoiseMapError::Cancelled { completed: 0 }));
        assert!(sink.rows().is_empty());
        assert!(sink.is_aborted());
    }
}
