//! Per-receiver level accumulation and time grid completion
//!
//! ```text
//! for (source, attenuation) in attenuation(receiver):
//!     for (bin, emission) in emission(source):
//!         levels[bin] ⊕= emission + attenuation      (band-wise energy sum)
//!
//! levels ──► complete_grid ──► one entry per canonical bin, silence elsewhere
//! ```

use std::collections::BTreeMap;

use noisemap_core::{BandLevels, ReceiverId, TimeBin, TimeGrid};

use super::attenuation::AttenuationIndex;
use super::emission::EmissionIndex;

/// Accumulated levels of one receiver, keyed by time bin.
pub type BinLevels = BTreeMap<TimeBin, BandLevels>;

/// Result of folding all contributions for one receiver.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulation {
    pub levels: BinLevels,
    /// Attenuation records visited
    pub matched: u64,
    /// Emission bins folded into `levels`
    pub contributions: u64,
    /// Attenuation records whose source has no emission
    pub without_emission: u64,
}

/// Joins attenuation and emission for one receiver at a time.
#[derive(Debug, Clone, Copy)]
pub struct LevelAccumulator<'a> {
    attenuation: &'a AttenuationIndex,
    emission: &'a EmissionIndex,
}

impl<'a> LevelAccumulator<'a> {
    pub fn new(attenuation: &'a AttenuationIndex, emission: &'a EmissionIndex) -> Self {
        Self {
            attenuation,
            emission,
        }
    }

    /// Fold every (source, bin) contribution reaching `receiver`.
    ///
    /// Bins are created lazily at the silence floor, so a bin only exists
    /// when at least one source emits during it.
    pub fn accumulate(&self, receiver: ReceiverId) -> Accumulation {
        let mut acc = Accumulation::default();

        for entry in self.attenuation.lookup(receiver) {
            acc.matched += 1;
            let bins = self.emission.lookup(entry.source_id);
            if bins.is_empty() {
                acc.without_emission += 1;
                continue;
            }
            for bin in bins {
                let contribution = bin.emission.offset(&entry.attenuation);
                acc.levels
                    .entry(bin.time_bin)
                    .or_insert_with(BandLevels::silence)
                    .accumulate(&contribution);
                acc.contributions += 1;
            }
        }

        acc
    }
}

/// Densify accumulated levels over the canonical grid.
///
/// Missing bins are filled with the silence floor; the result always holds
/// exactly `grid.len()` entries in ascending bin order.
pub fn complete_grid(mut levels: BinLevels, grid: &TimeGrid) -> Vec<(TimeBin, BandLevels)> {
    grid.bins()
        .map(|bin| (bin, levels.remove(&bin).unwrap_or_else(BandLevels::silence)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use noisemap_core::{
        energy_sum, AttenuationRecord, Band, EmissionRecord, SourceIdentity, SILENCE_FLOOR,
    };

    fn indices(
        attenuation: Vec<(ReceiverId, i64, f64)>,
        emission: Vec<(&str, TimeBin, f64)>,
        identities: Vec<(i64, &str)>,
    ) -> (AttenuationIndex, EmissionIndex) {
        let att = AttenuationIndex::build(attenuation.into_iter().map(|(r, s, a)| {
            AttenuationRecord {
                receiver_id: r,
                source_id: s,
                attenuation: BandLevels::splat(a),
            }
        }))
        .unwrap();
        let em = EmissionIndex::build(
            identities.into_iter().map(|(id, key)| SourceIdentity {
                id,
                link_key: key.to_string(),
            }),
            emission.into_iter().map(|(key, bin, level)| EmissionRecord {
                link_key: key.to_string(),
                time_bin: bin,
                emission: BandLevels::splat(level),
            }),
            &TimeGrid::default(),
        )
        .unwrap();
        (att, em)
    }

    #[test]
    fn test_single_source_single_bin() {
        let (att, em) = indices(vec![(1, 10, -40.0)], vec![("s", 0, 80.0)], vec![(10, "s")]);
        let acc = LevelAccumulator::new(&att, &em).accumulate(1);

        assert_eq!(acc.levels.len(), 1);
        let level = acc.levels[&0];
        for (_, v) in level.iter() {
            // energy_sum(-99, 40) differs from 40 only far below the 1e-6 dB scale
            assert!((v - 40.0).abs() < 1e-6, "got {}", v);
        }
        assert_eq!(acc.matched, 1);
        assert_eq!(acc.contributions, 1);
    }

    #[test]
    fn test_two_equal_sources_add_three_db() {
        let (att, em) = indices(
            vec![(1, 10, -20.0), (1, 11, -30.0)],
            vec![("a", 3600, 80.0), ("b", 3600, 90.0)],
            vec![(10, "a"), (11, "b")],
        );
        let acc = LevelAccumulator::new(&att, &em).accumulate(1);
        let level = acc.levels[&3600][Band::Hz500];
        assert!((level - 63.0103).abs() < 1e-3, "got {}", level);
    }

    #[test]
    fn test_order_independent() {
        let (att, em) = indices(
            vec![(1, 10, -20.0), (1, 11, -35.0), (1, 12, -12.5)],
            vec![("a", 0, 71.0), ("b", 0, 88.0), ("c", 0, 40.0)],
            vec![(10, "a"), (11, "b"), (12, "c")],
        );
        let forward = LevelAccumulator::new(&att, &em).accumulate(1).levels[&0][Band::Hz63];

        let expected = [51.0, 53.0, 27.5]
            .iter()
            .rev()
            .fold(SILENCE_FLOOR, |acc, &l| energy_sum(acc, l));
        assert!((forward - expected).abs() < 1e-9);
    }

    #[test]
    fn test_unresolved_sources_contribute_nothing() {
        let (att, em) = indices(
            vec![(1, 10, -40.0), (1, 99, -1.0)],
            vec![("s", 0, 80.0)],
            vec![(10, "s")],
        );
        let acc = LevelAccumulator::new(&att, &em).accumulate(1);
        assert_eq!(acc.matched, 2);
        assert_eq!(acc.without_emission, 1);
        assert!((acc.levels[&0][Band::Hz1000] - 40.0).abs() < 1e-6);
    }

    #[test]
    fn test_receiver_without_attenuation() {
        let (att, em) = indices(vec![(1, 10, -40.0)], vec![("s", 0, 80.0)], vec![(10, "s")]);
        let acc = LevelAccumulator::new(&att, &em).accumulate(2);
        assert!(acc.levels.is_empty());
        assert_eq!(acc.matched, 0);
    }

    #[test]
    fn test_complete_grid_fills_silence() {
        let grid = TimeGrid::default();
        let mut levels = BinLevels::new();
        levels.insert(7200, BandLevels::splat(55.0));

        let dense = complete_grid(levels, &grid);
        assert_eq!(dense.len(), 24);
        assert!(dense.windows(2).all(|w| w[0].0 < w[1].0));
        for (bin, level) in &dense {
            if *bin == 7200 {
                assert_eq!(*level, BandLevels::splat(55.0));
            } else {
                assert_eq!(*level, BandLevels::silence());
            }
        }
    }

    #[test]
    fn test_complete_grid_partial_window() {
        let grid = TimeGrid::new(21_600, 64_800, 900).unwrap();
        let dense = complete_grid(BinLevels::new(), &grid);
        assert_eq!(dense.len(), 48);
        assert_eq!(dense[0].0, 21_600);
        assert_eq!(dense[47].0, 64_800 - 900);
    }
}
