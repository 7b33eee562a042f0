//! Source → (time bin, emission) lookup
//!
//! The attenuation matrix and the emission table key sources differently:
//!
//! ```text
//! attenuation.source_id ──► sources.id / sources.link_key ──► emission.link_key
//! ```
//!
//! Emission rows are grouped by link key, then every source id is resolved
//! to its group once. Lookups never touch the identity table again and no
//! cross product of the two datasets is ever built.

use std::collections::HashMap;

use noisemap_core::{
    BandLevels, EmissionRecord, LinkKey, NoiseMapError, NoiseMapResult, SourceId,
    SourceIdentity, TimeBin, TimeGrid,
};

pub const EMISSION_DATASET: &str = "emission";
pub const SOURCE_IDENTITY_DATASET: &str = "source identity";

/// Emission of one source during one bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedEmission {
    pub time_bin: TimeBin,
    pub emission: BandLevels,
}

/// Emission grouped by source id.
#[derive(Debug, Default)]
pub struct EmissionIndex {
    /// Resolved source id → slot in `by_link`
    slot_of_source: HashMap<SourceId, usize>,
    by_link: Vec<Vec<TimedEmission>>,
    unresolved_identities: usize,
    off_grid: u64,
}

impl EmissionIndex {
    /// Build the index.
    ///
    /// Rows whose bin is not a canonical bin of `grid` are dropped and
    /// counted; they could never appear in the dense output. A source id
    /// mapped to two different link keys is rejected.
    pub fn build<I, E>(identities: I, emissions: E, grid: &TimeGrid) -> NoiseMapResult<Self>
    where
        I: IntoIterator<Item = SourceIdentity>,
        E: IntoIterator<Item = EmissionRecord>,
    {
        let mut slot_of_key: HashMap<LinkKey, usize> = HashMap::new();
        let mut by_link: Vec<Vec<TimedEmission>> = Vec::new();
        let mut off_grid = 0u64;

        for record in emissions {
            record.emission.validate(EMISSION_DATASET, || {
                format!("link '{}' bin {}", record.link_key, record.time_bin)
            })?;
            if !grid.contains(record.time_bin) {
                off_grid += 1;
                continue;
            }
            let slot = *slot_of_key.entry(record.link_key).or_insert_with(|| {
                by_link.push(Vec::new());
                by_link.len() - 1
            });
            by_link[slot].push(TimedEmission {
                time_bin: record.time_bin,
                emission: record.emission,
            });
        }

        for bins in &mut by_link {
            bins.sort_by_key(|e| e.time_bin);
        }

        let mut key_of_source: HashMap<SourceId, LinkKey> = HashMap::new();
        let mut slot_of_source = HashMap::new();
        let mut unresolved_identities = 0;
        for identity in identities {
            if let Some(previous) = key_of_source.get(&identity.id) {
                if *previous != identity.link_key {
                    return Err(NoiseMapError::InvalidRecord {
                        dataset: SOURCE_IDENTITY_DATASET.to_string(),
                        detail: format!(
                            "source {} maps to both '{}' and '{}'",
                            identity.id, previous, identity.link_key
                        ),
                    });
                }
                continue;
            }
            match slot_of_key.get(&identity.link_key) {
                Some(&slot) => {
                    slot_of_source.insert(identity.id, slot);
                }
                None => unresolved_identities += 1,
            }
            key_of_source.insert(identity.id, identity.link_key);
        }

        if off_grid > 0 {
            tracing::warn!(
                rows = off_grid,
                bin_min = grid.bin_min(),
                bin_max = grid.bin_max(),
                bin_size = grid.bin_size(),
                "Ignoring emission rows outside the time grid"
            );
        }

        Ok(Self {
            slot_of_source,
            by_link,
            unresolved_identities,
            off_grid,
        })
    }

    /// Emission bins for a source, ascending; empty when unresolved.
    pub fn lookup(&self, source: SourceId) -> &[TimedEmission] {
        self.slot_of_source
            .get(&source)
            .map(|&slot| self.by_link[slot].as_slice())
            .unwrap_or(&[])
    }

    /// True when the source resolves to at least one emission bin.
    pub fn resolves(&self, source: SourceId) -> bool {
        self.slot_of_source.contains_key(&source)
    }

    /// Number of source ids that resolve to emission.
    pub fn source_count(&self) -> usize {
        self.slot_of_source.len()
    }

    /// Identities whose link key has no emission row.
    pub fn unresolved_identities(&self) -> usize {
        self.unresolved_identities
    }

    /// Emission rows dropped for lying outside the grid.
    pub fn off_grid_rows(&self) -> u64 {
        self.off_grid
    }
}
