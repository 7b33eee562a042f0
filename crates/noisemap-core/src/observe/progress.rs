//! Exponentially spaced progress reporting
//!
//! Logs after 1, 2, 4, 8, ... completed items so that long runs stay
//! readable without a log line per receiver.

use std::time::{Duration, Instant};

/// Tracks completed items and decides when to report.
#[derive(Debug)]
pub struct ProgressReporter {
    label: &'static str,
    total: u64,
    completed: u64,
    next_report: u64,
    start: Instant,
}

/// One progress report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub completed: u64,
    pub total: u64,
    pub elapsed: Duration,
    /// Items per second since start
    pub rate: f64,
}

impl ProgressReporter {
    pub fn new(label: &'static str, total: u64) -> Self {
        Self {
            label,
            total,
            completed: 0,
            next_report: 1,
            start: Instant::now(),
        }
    }

    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Record one completed item; returns the report when one is due.
    pub fn tick(&mut self) -> Option<Progress> {
        self.completed += 1;
        if self.completed < self.next_report {
            return None;
        }
        self.next_report = self.next_report.saturating_mul(2);

        let progress = self.current();
        tracing::info!(
            target: "noisemap::progress",
            processed = progress.completed,
            total = progress.total,
            elapsed_s = progress.elapsed.as_secs_f64(),
            rate = progress.rate,
            "{} {}/{} ({:.1} it/s)",
            self.label,
            progress.completed,
            progress.total,
            progress.rate
        );
        Some(progress)
    }

    /// Progress at this instant.
    pub fn current(&self) -> Progress {
        let elapsed = self.start.elapsed();
        // +1 ms keeps the rate finite on the very first tick
        let secs = elapsed.as_secs_f64() + 1e-3;
        Progress {
            completed: self.completed,
            total: self.total,
            elapsed,
            rate: self.completed as f64 / secs,
        }
    }
}
