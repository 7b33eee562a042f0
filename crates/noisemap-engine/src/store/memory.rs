//! In-memory datasets and sink

use std::collections::HashSet;

use noisemap_core::{
    AttenuationRecord, EmissionRecord, NoiseMapError, NoiseMapResult, Receiver, ResultRow,
    SourceIdentity,
};

use super::{Dataset, InputStore, ResultSink};

/// Datasets held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub receivers: Vec<Receiver>,
    pub attenuation: Vec<AttenuationRecord>,
    pub source_identities: Vec<SourceIdentity>,
    pub emissions: Vec<EmissionRecord>,
    missing: HashSet<Dataset>,
}

impl MemoryStore {
    /// All four datasets present and empty.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_receivers(mut self, receivers: Vec<Receiver>) -> Self {
        self.receivers = receivers;
        self
    }

    pub fn with_attenuation(mut self, attenuation: Vec<AttenuationRecord>) -> Self {
        self.attenuation = attenuation;
        self
    }

    pub fn with_source_identities(mut self, identities: Vec<SourceIdentity>) -> Self {
        self.source_identities = identities;
        self
    }

    pub fn with_emissions(mut self, emissions: Vec<EmissionRecord>) -> Self {
        self.emissions = emissions;
        self
    }

    /// Mark a dataset as absent, as if it had never been produced.
    pub fn without(mut self, dataset: Dataset) -> Self {
        self.missing.insert(dataset);
        self
    }

    fn present(&self, dataset: Dataset) -> NoiseMapResult<()> {
        if self.missing.contains(&dataset) {
            Err(NoiseMapError::MissingDataset(dataset.to_string()))
        } else {
            Ok(())
        }
    }
}

impl InputStore for MemoryStore {
    fn check_inputs(&self) -> NoiseMapResult<()> {
        Dataset::ALL.iter().try_for_each(|&d| self.present(d))
    }

    fn receivers(&self) -> NoiseMapResult<Vec<Receiver>> {
        self.present(Dataset::Receivers)?;
        Ok(self.receivers.clone())
    }

    fn attenuation(&self) -> NoiseMapResult<Vec<AttenuationRecord>> {
        self.present(Dataset::Attenuation)?;
        Ok(self.attenuation.clone())
    }

    fn source_identities(&self) -> NoiseMapResult<Vec<SourceIdentity>> {
        self.present(Dataset::SourceIdentity)?;
        Ok(self.source_identities.clone())
    }

    fn emissions(&self) -> NoiseMapResult<Vec<EmissionRecord>> {
        self.present(Dataset::Emission)?;
        Ok(self.emissions.clone())
    }
}

/// Collects rows in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Vec<ResultRow>,
    prepared: bool,
    finished: bool,
    aborted: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<ResultRow> {
        self.rows
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }
}

impl ResultSink for MemorySink {
    fn prepare(&mut self) -> NoiseMapResult<()> {
        self.rows.clear();
        self.prepared = true;
        self.finished = false;
        self.aborted = false;
        Ok(())
    }

    fn write_receiver(&mut self, rows: &[ResultRow]) -> NoiseMapResult<()> {
        if !self.prepared {
            return Err(NoiseMapError::Store("sink written before prepare".to_string()));
        }
        self.rows.extend_from_slice(rows);
        Ok(())
    }

    fn finish(&mut self) -> NoiseMapResult<()> {
        self.finished = true;
        Ok(())
    }

    fn abort(&mut self) {
        self.aborted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noisemap_core::{BandLevels, Point};

    #[test]
    fn test_missing_dataset() {
        let store = MemoryStore::new().without(Dataset::Emission);
        let err = store.check_inputs().unwrap_err();
        assert_eq!(err.to_string(), "Missing input dataset: emission");
        assert!(store.receivers().is_ok());
        assert!(store.emissions().is_err());
    }

    #[test]
    fn test_prepare_replaces_rows() {
        let receiver = Receiver::new(1, Point::new(0.0, 0.0));
        let row = ResultRow::new(&receiver, 0, BandLevels::silence());

        let mut sink = MemorySink::new();
        assert!(sink.write_receiver(&[row.clone()]).is_err());

        sink.prepare().unwrap();
        sink.write_receiver(&[row.clone(), row]).unwrap();
        assert_eq!(sink.rows().len(), 2);

        sink.prepare().unwrap();
        assert!(sink.rows().is_empty());
    }
}
