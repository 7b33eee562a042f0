//! Error types shared by the noise map crates

use std::io;
use thiserror::Error;

/// Result type for noise map operations
pub type NoiseMapResult<T> = Result<T, NoiseMapError>;

/// Errors that abort a noise map run
#[derive(Error, Debug)]
pub enum NoiseMapError {
    /// A required input dataset does not exist
    #[error("Missing input dataset: {0}")]
    MissingDataset(String),

    /// A record is present but cannot be combined safely
    #[error("Invalid record in {dataset}: {detail}")]
    InvalidRecord { dataset: String, detail: String },

    /// Receiver geometry is absent or unparsable
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Time grid parameters are inconsistent
    #[error("Invalid time grid: {0}")]
    InvalidGrid(String),

    /// Configuration could not be loaded or validated
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Backing store failure (query, insert, schema)
    #[error("Store error: {0}")]
    Store(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Run stopped by its cancel token; `completed` receivers were written
    #[error("Run cancelled after {completed} receivers")]
    Cancelled { completed: u64 },
}

/// Error type for configuration operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("config not found: {0}")]
    NotFound(String),
    /// Failed to read configuration file
    #[error("failed to read config: {0}")]
    ReadError(String),
    /// Failed to parse configuration
    #[error("failed to parse config: {0}")]
    ParseError(String),
    /// Invalid configuration value
    #[error("invalid config: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NoiseMapError::InvalidRecord {
            dataset: "emission".into(),
            detail: "link 'a' bin 0: missing band 63 Hz".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid record in emission: link 'a' bin 0: missing band 63 Hz"
        );

        let err: NoiseMapError = ConfigError::ValidationError("bin_size must be > 0".into()).into();
        assert_eq!(err.to_string(), "invalid config: bin_size must be > 0");
    }
}
