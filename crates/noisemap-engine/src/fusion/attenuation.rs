//! Receiver → (source, attenuation) lookup
//!
//! Built once from the attenuation matrix before any receiver is processed;
//! afterwards lookups are pure reads and can be shared across workers.

use std::collections::{HashMap, HashSet};

use noisemap_core::{AttenuationRecord, BandLevels, NoiseMapResult, ReceiverId, SourceId};

/// Name used in error messages for this dataset.
pub const ATTENUATION_DATASET: &str = "attenuation";

/// One attenuation entry for a receiver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceAttenuation {
    pub source_id: SourceId,
    pub attenuation: BandLevels,
}

/// Attenuation matrix grouped by receiver.
#[derive(Debug, Default)]
pub struct AttenuationIndex {
    by_receiver: HashMap<ReceiverId, Vec<SourceAttenuation>>,
    records: usize,
}

impl AttenuationIndex {
    /// Group records by receiver, rejecting non-finite band values.
    pub fn build<I>(records: I) -> NoiseMapResult<Self>
    where
        I: IntoIterator<Item = AttenuationRecord>,
    {
        let mut by_receiver: HashMap<ReceiverId, Vec<SourceAttenuation>> = HashMap::new();
        let mut count = 0;

        for record in records {
            record.attenuation.validate(ATTENUATION_DATASET, || {
                format!(
                    "receiver {} source {}",
                    record.receiver_id, record.source_id
                )
            })?;
            by_receiver
                .entry(record.receiver_id)
                .or_default()
                .push(SourceAttenuation {
                    source_id: record.source_id,
                    attenuation: record.attenuation,
                });
            count += 1;
        }

        Ok(Self {
            by_receiver,
            records: count,
        })
    }

    /// Attenuation entries for a receiver; empty when it has none.
    pub fn lookup(&self, receiver: ReceiverId) -> &[SourceAttenuation] {
        self.by_receiver
            .get(&receiver)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Distinct sources referenced by the matrix.
    pub fn source_ids(&self) -> HashSet<SourceId> {
        self.by_receiver
            .values()
            .flatten()
            .map(|e| e.source_id)
            .collect()
    }

    /// Receivers with at least one record.
    pub fn receiver_count(&self) -> usize {
        self.by_receiver.len()
    }

    pub fn record_count(&self) -> usize {
        self.records
    }
}
