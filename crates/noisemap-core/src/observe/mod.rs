//! # Observability
//!
//! - **Logging**: structured logs via `tracing`
//! - **Metrics**: atomic per-run counters
//! - **Progress**: exponentially spaced progress lines with throughput
//!
//! ```text
//! workers ──► RunStats (atomics)
//!                  │
//! writer  ──► ProgressReporter ──► tracing::info!  ──► stderr (json/pretty/compact)
//! ```

pub mod logging;
pub mod metrics;
pub mod progress;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use metrics::{Counter, RunStats, RunStatsSnapshot};
pub use progress::{Progress, ProgressReporter};
