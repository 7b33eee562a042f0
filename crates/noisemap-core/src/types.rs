//! Dataset records
//!
//! The engine consumes four upstream datasets and produces one:
//!
//! ```text
//! Receivers    (id, geometry)
//! Attenuation  (receiver_id, source_id, attenuation[8])
//! Sources      (id, link_key)                    source id -> emission key
//! Emission     (link_key, time_bin, emission[8])
//!                     │
//!                     ▼
//! ResultRow    (receiver_id, geometry, level[8], time_bin, flat, weighted)
//! ```
//!
//! Inputs are immutable snapshots for the duration of a run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::bands::BandLevels;
use crate::error::NoiseMapError;

/// Receiver identity.
pub type ReceiverId = i64;

/// Source identity as keyed in the attenuation dataset.
pub type SourceId = i64;

/// Seconds since the start of the day; bins are labelled by their start.
pub type TimeBin = i64;

/// Source identity as keyed in the emission dataset (road link, segment...).
pub type LinkKey = String;

/// 2D or 3D point, carried through from receivers to results.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }

    /// Well-known text, e.g. `POINT (355000 6689000)` or `POINT Z (1 2 4)`.
    pub fn to_wkt(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.z {
            Some(z) => write!(f, "POINT Z ({} {} {})", self.x, self.y, z),
            None => write!(f, "POINT ({} {})", self.x, self.y),
        }
    }
}

impl FromStr for Point {
    type Err = NoiseMapError;

    /// Parse `POINT (x y)`, `POINT Z (x y z)` or `POINT (x y z)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || NoiseMapError::InvalidGeometry(format!("not a WKT point: '{}'", s));

        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();
        let body = upper.strip_prefix("POINT").ok_or_else(invalid)?.trim_start();
        let body = body.strip_prefix('Z').unwrap_or(body).trim();
        let inner = body
            .strip_prefix('(')
            .and_then(|b| b.strip_suffix(')'))
            .ok_or_else(invalid)?;

        let coords = inner
            .split_whitespace()
            .map(|c| c.parse::<f64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(invalid());
        }

        match coords.as_slice() {
            [x, y] => Ok(Point::new(*x, *y)),
            [x, y, z] => Ok(Point::with_z(*x, *y, *z)),
            _ => Err(invalid()),
        }
    }
}

/// A physical evaluation point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receiver {
    pub id: ReceiverId,
    pub geometry: Point,
}

impl Receiver {
    pub fn new(id: ReceiverId, geometry: Point) -> Self {
        Self { id, geometry }
    }
}

/// Propagation correction between one source and one receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttenuationRecord {
    pub receiver_id: ReceiverId,
    pub source_id: SourceId,
    pub attenuation: BandLevels,
}

/// Maps an attenuation-side source id to its emission-side key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceIdentity {
    pub id: SourceId,
    pub link_key: LinkKey,
}

/// Emitted power of one source during one time bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmissionRecord {
    pub link_key: LinkKey,
    pub time_bin: TimeBin,
    pub emission: BandLevels,
}

/// One output row per (receiver, canonical time bin).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub receiver_id: ReceiverId,
    pub geometry: Point,
    pub levels: BandLevels,
    pub time_bin: TimeBin,
    pub flat_level: f64,
    pub weighted_level: f64,
}

impl ResultRow {
    /// Build a row; derived indicators are computed here, never stored apart.
    pub fn new(receiver: &Receiver, time_bin: TimeBin, levels: BandLevels) -> Self {
        Self {
            receiver_id: receiver.id,
            geometry: receiver.geometry,
            flat_level: levels.flat_level(),
            weighted_level: levels.weighted_level(),
            levels,
            time_bin,
        }
    }
}
