//! # Configuration System
//!
//! YAML configuration for noise map runs:
//!
//! - Time grid (bin size and day window)
//! - Dataset locators (database file, input and output table names)
//! - Engine settings (worker threads, batch size, output atomicity)
//! - Logging
//!
//! ## Configuration Search Path
//!
//! Configuration is loaded from the first file found:
//! 1. Path specified via `NOISEMAP_CONFIG` environment variable
//! 2. `./noisemap.yaml` (current directory)
//! 3. `~/.config/noisemap/config.yaml` (user config)
//! 4. `/etc/noisemap/config.yaml` (system config)
//!
//! ## Example Configuration
//!
//! ```yaml
//! grid:
//!   bin_size: 900
//!   bin_min: 21600
//!   bin_max: 64800
//!
//! datasets:
//!   database: "/data/nantes/noisemap.sqlite"
//!   attenuation: "ATTENUATION_TRAFFIC"
//!   output: "RESULT_GEOM"
//!
//! engine:
//!   threads: 8
//!   atomic_output: true
//! ```
//!
//! The loaded value is immutable once handed to the engine; overrides are
//! applied before the run starts.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::observe::LogConfig;
use crate::timegrid::{TimeGrid, DEFAULT_BIN_SIZE, SECONDS_PER_DAY};
use crate::types::TimeBin;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "NOISEMAP_CONFIG";

/// Time grid configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Bin width in seconds
    pub bin_size: TimeBin,
    /// First bin start (inclusive)
    pub bin_min: TimeBin,
    /// Window end (exclusive)
    pub bin_max: TimeBin,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            bin_size: DEFAULT_BIN_SIZE,
            bin_min: 0,
            bin_max: SECONDS_PER_DAY,
        }
    }
}

impl GridConfig {
    /// Validated time grid.
    pub fn to_grid(&self) -> Result<TimeGrid, ConfigError> {
        TimeGrid::new(self.bin_min, self.bin_max, self.bin_size)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

/// Input and output dataset locators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// SQLite database file holding every table
    pub database: PathBuf,
    /// Receivers table (id, geometry)
    pub receivers: String,
    /// Attenuation matrix table (receiver_id, source_id, hz63..hz8000)
    pub attenuation: String,
    /// Source identity table (id, link_key)
    pub source_identity: String,
    /// Emission table (link_key, time_bin, lw63..lw8000)
    pub emission: String,
    /// Output table; dropped and recreated on every run
    pub output: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("noisemap.sqlite"),
            receivers: "RECEIVERS".to_string(),
            attenuation: "ATTENUATION".to_string(),
            source_identity: "SOURCES".to_string(),
            emission: "SOURCES_LW".to_string(),
            output: "RESULT_GEOM".to_string(),
        }
    }
}

impl DatasetConfig {
    /// Input table names in a fixed order.
    pub fn inputs(&self) -> [&str; 4] {
        [
            &self.receivers,
            &self.attenuation,
            &self.source_identity,
            &self.emission,
        ]
    }
}

/// Fusion engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads (0 = one per core, 1 = sequential)
    pub threads: usize,
    /// Receivers computed per parallel batch before the writer flushes them
    pub batch_size: usize,
    /// Wrap the whole run in one output transaction
    pub atomic_output: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            batch_size: 256,
            atomic_output: false,
        }
    }
}

/// Complete noise map configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseMapConfig {
    /// Configuration version
    pub version: String,
    /// Time grid
    pub grid: GridConfig,
    /// Dataset locators
    pub datasets: DatasetConfig,
    /// Engine settings
    pub engine: EngineConfig,
    /// Logging configuration
    pub logging: LogConfig,
}

impl Default for NoiseMapConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            grid: GridConfig::default(),
            datasets: DatasetConfig::default(),
            engine: EngineConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

impl NoiseMapConfig {
    /// Load configuration from the default search path.
    ///
    /// Returns default config if no file is found.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if Path::new(&path).exists() {
                return Self::load_from(Path::new(&path));
            }
        }

        for path in &Self::config_search_paths() {
            if path.exists() {
                return Self::load_from(path);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        Self::parse(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))
    }

    /// Get configuration search paths.
    pub fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("./noisemap.yaml")];

        if let Some(config_dir) = directories::ProjectDirs::from("", "", "noisemap") {
            paths.push(config_dir.config_dir().join("config.yaml"));
        }

        paths.push(PathBuf::from("/etc/noisemap/config.yaml"));

        paths
    }

    /// Validated time grid for this configuration.
    pub fn time_grid(&self) -> Result<TimeGrid, ConfigError> {
        self.grid.to_grid()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid.to_grid()?;

        let ds = &self.datasets;
        if ds.database.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "datasets.database must be set".to_string(),
            ));
        }
        let names = ds.inputs();
        if ds.output.trim().is_empty() || names.iter().any(|n| n.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "dataset names must not be empty".to_string(),
            ));
        }
        if names.iter().any(|n| n.eq_ignore_ascii_case(&ds.output)) {
            return Err(ConfigError::ValidationError(format!(
                "output '{}' would overwrite an input dataset",
                ds.output
            )));
        }

        if self.engine.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "engine.batch_size must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Generate example configuration YAML.
    pub fn example_yaml() -> String {
        let config = Self {
            grid: GridConfig {
                bin_size: 900,
                ..Default::default()
            },
            datasets: DatasetConfig {
                database: PathBuf::from("/path/to/noisemap.sqlite"),
                ..Default::default()
            },
            ..Default::default()
        };

        serde_yaml::to_string(&config).unwrap_or_default()
    }
}
