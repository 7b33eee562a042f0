//! Octave Band Levels
//!
//! Every level handled by the engine is an 8-band octave spectrum in decibels.
//! Decibels encode time-averaged acoustic power on a logarithmic scale, so
//! incoherent sources must be combined in the linear power domain:
//!
//! ```text
//! energy_sum(a, b) = 10 * log10(10^(a/10) + 10^(b/10))
//!
//!   60 dB ⊕ 60 dB  = 63.01 dB   (power doubles, +3 dB)
//!   60 dB ⊕ -99 dB ≈ 60.00 dB   (silence contributes nothing measurable)
//! ```
//!
//! ## Bands
//!
//! | Index | Center (Hz) | A-weighting (dB) |
//! |-------|-------------|------------------|
//! | 0     | 63          | -26.2            |
//! | 1     | 125         | -16.1            |
//! | 2     | 250         | -8.6             |
//! | 3     | 500         | -3.2             |
//! | 4     | 1000        | 0.0              |
//! | 5     | 2000        | +1.2             |
//! | 6     | 4000        | +1.0             |
//! | 7     | 8000        | -1.1             |

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

use crate::error::{NoiseMapError, NoiseMapResult};

/// Number of octave bands carried by every level vector.
pub const NUM_BANDS: usize = 8;

/// Conventional level assigned when no measurable contribution exists.
pub const SILENCE_FLOOR: f64 = -99.0;

/// Octave band center frequencies in Hz.
pub const BAND_CENTERS_HZ: [u32; NUM_BANDS] = [63, 125, 250, 500, 1000, 2000, 4000, 8000];

/// A-weighting corrections aligned with [`BAND_CENTERS_HZ`].
pub const A_WEIGHTING_DB: [f64; NUM_BANDS] = [-26.2, -16.1, -8.6, -3.2, 0.0, 1.2, 1.0, -1.1];

/// One of the eight octave bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    Hz63,
    Hz125,
    Hz250,
    Hz500,
    Hz1000,
    Hz2000,
    Hz4000,
    Hz8000,
}

impl Band {
    /// All bands, lowest frequency first.
    pub const ALL: [Band; NUM_BANDS] = [
        Band::Hz63,
        Band::Hz125,
        Band::Hz250,
        Band::Hz500,
        Band::Hz1000,
        Band::Hz2000,
        Band::Hz4000,
        Band::Hz8000,
    ];

    /// Position of this band in a [`BandLevels`] vector.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Center frequency in Hz.
    pub fn center_hz(self) -> u32 {
        BAND_CENTERS_HZ[self.index()]
    }

    /// A-weighting correction in dB.
    pub fn a_weighting_db(self) -> f64 {
        A_WEIGHTING_DB[self.index()]
    }

    /// Suffix used in tabular column names (`hz63`, `level_63`, ...).
    pub fn column_suffix(self) -> &'static str {
        match self {
            Band::Hz63 => "63",
            Band::Hz125 => "125",
            Band::Hz250 => "250",
            Band::Hz500 => "500",
            Band::Hz1000 => "1000",
            Band::Hz2000 => "2000",
            Band::Hz4000 => "4000",
            Band::Hz8000 => "8000",
        }
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} Hz", self.center_hz())
    }
}

/// Convert a decibel level to linear power.
#[inline]
pub fn db_to_power(db: f64) -> f64 {
    10.0_f64.powf(db / 10.0)
}

/// Convert linear power back to decibels.
#[inline]
pub fn power_to_db(power: f64) -> f64 {
    10.0 * power.log10()
}

/// Combine two incoherent levels by summing their linear powers.
///
/// Commutative and associative up to floating-point rounding, so
/// contributions may be folded in any order.
#[inline]
pub fn energy_sum(a: f64, b: f64) -> f64 {
    power_to_db(db_to_power(a) + db_to_power(b))
}

/// Energy sum of any number of levels.
///
/// Returns `None` for an empty input; there is no neutral decibel value.
pub fn energy_sum_all<I>(levels: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let mut any = false;
    let power: f64 = levels
        .into_iter()
        .inspect(|_| any = true)
        .map(db_to_power)
        .sum();
    any.then(|| power_to_db(power))
}

/// Per-band decibel levels, indexed by [`Band`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandLevels(pub [f64; NUM_BANDS]);

impl BandLevels {
    /// Every band at [`SILENCE_FLOOR`].
    pub const fn silence() -> Self {
        Self([SILENCE_FLOOR; NUM_BANDS])
    }

    /// Every band at the same level.
    pub const fn splat(level: f64) -> Self {
        Self([level; NUM_BANDS])
    }

    pub fn as_array(&self) -> &[f64; NUM_BANDS] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = (Band, f64)> + '_ {
        Band::ALL.iter().map(move |&b| (b, self.0[b.index()]))
    }

    /// Reject non-finite values; they cannot be combined by [`energy_sum`].
    pub fn validate(&self, dataset: &str, context: impl FnOnce() -> String) -> NoiseMapResult<()> {
        match self.iter().find(|(_, v)| !v.is_finite()) {
            None => Ok(()),
            Some((band, value)) => Err(NoiseMapError::InvalidRecord {
                dataset: dataset.to_string(),
                detail: format!("{}: non-finite value {} in band {}", context(), value, band),
            }),
        }
    }

    /// Band-wise addition, e.g. emission power plus propagation attenuation.
    pub fn offset(&self, other: &BandLevels) -> BandLevels {
        let mut out = *self;
        for (o, d) in out.0.iter_mut().zip(other.0.iter()) {
            *o += d;
        }
        out
    }

    /// Fold a contribution into this vector band by band with [`energy_sum`].
    pub fn accumulate(&mut self, contribution: &BandLevels) {
        for (acc, c) in self.0.iter_mut().zip(contribution.0.iter()) {
            *acc = energy_sum(*acc, *c);
        }
    }

    /// Unweighted total level across all bands.
    pub fn flat_level(&self) -> f64 {
        total_level(self.0.iter().map(|&v| (v, 0.0)))
    }

    /// A-weighted total level across all bands.
    pub fn weighted_level(&self) -> f64 {
        total_level(self.0.iter().copied().zip(A_WEIGHTING_DB))
    }
}

impl Default for BandLevels {
    fn default() -> Self {
        Self::silence()
    }
}

impl Index<Band> for BandLevels {
    type Output = f64;

    fn index(&self, band: Band) -> &f64 {
        &self.0[band.index()]
    }
}

impl IndexMut<Band> for BandLevels {
    fn index_mut(&mut self, band: Band) -> &mut f64 {
        &mut self.0[band.index()]
    }
}

impl From<[f64; NUM_BANDS]> for BandLevels {
    fn from(levels: [f64; NUM_BANDS]) -> Self {
        Self(levels)
    }
}

// A row where every band sits exactly at the silence floor reports the
// floor itself; summing it would give 8 x -99 dB = -89.97 dB. Any other row
// sums all eight bands.
fn total_level<I>(bands: I) -> f64
where
    I: Iterator<Item = (f64, f64)> + Clone,
{
    if bands.clone().all(|(level, _)| level == SILENCE_FLOOR) {
        return SILENCE_FLOOR;
    }
    energy_sum_all(bands.map(|(level, weight)| level + weight)).unwrap_or(SILENCE_FLOOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    #[test]
    fn test_energy_sum_doubling() {
        let combined = energy_sum(60.0, 60.0);
        assert!((combined - 63.0103).abs() < 1e-3, "got {}", combined);
    }

    #[test]
    fn test_energy_sum_commutative_associative() {
        let (a, b, c) = (42.5, 61.3, -12.0);
        assert!((energy_sum(a, b) - energy_sum(b, a)).abs() < TOL);
        let left = energy_sum(a, energy_sum(b, c));
        let right = energy_sum(energy_sum(a, b), c);
        assert!((left - right).abs() < TOL);
    }

    #[test]
    fn test_energy_sum_silence_negligible() {
        for x in [-79.0, -20.0, 0.0, 40.0, 95.0] {
            assert!((energy_sum(x, SILENCE_FLOOR) - x).abs() < 0.05, "x = {}", x);
        }
    }

    #[test]
    fn test_energy_sum_all_matches_pairwise() {
        let levels = [55.0, 48.2, 61.7, 30.0];
        let pairwise = levels[1..].iter().fold(levels[0], |acc, &l| energy_sum(acc, l));
        let once = energy_sum_all(levels).unwrap();
        assert!((pairwise - once).abs() < TOL);
        assert!(energy_sum_all(std::iter::empty()).is_none());
    }

    #[test]
    fn test_band_metadata() {
        assert_eq!(Band::ALL.len(), NUM_BANDS);
        assert_eq!(Band::Hz1000.center_hz(), 1000);
        assert_eq!(Band::Hz1000.a_weighting_db(), 0.0);
        assert_eq!(Band::Hz63.a_weighting_db(), -26.2);
        assert_eq!(Band::Hz8000.column_suffix(), "8000");
        assert_eq!(format!("{}", Band::Hz250), "250 Hz");
    }

    #[test]
    fn test_accumulate_and_offset() {
        let emission = BandLevels::splat(80.0);
        let attenuation = BandLevels::splat(-40.0);
        let contribution = emission.offset(&attenuation);
        assert_eq!(contribution, BandLevels::splat(40.0));

        let mut acc = BandLevels::silence();
        acc.accumulate(&contribution);
        for (_, v) in acc.iter() {
            assert!((v - 40.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_indicators_single_band() {
        let mut levels = BandLevels::silence();
        levels[Band::Hz1000] = 50.0;
        assert!((levels.flat_level() - 50.0).abs() < 1e-6);
        assert!((levels.weighted_level() - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_indicators_silence() {
        let levels = BandLevels::silence();
        assert_eq!(levels.flat_level(), SILENCE_FLOOR);
        assert_eq!(levels.weighted_level(), SILENCE_FLOOR);
    }

    #[test]
    fn test_indicators_mixed_row_sums_all_bands() {
        let mut levels = BandLevels::silence();
        levels[Band::Hz63] = -95.0;
        let expected = energy_sum_all(std::iter::once(-95.0).chain([SILENCE_FLOOR; 7])).unwrap();
        assert!((levels.flat_level() - expected).abs() < TOL);
        assert!((levels.flat_level() - -89.217).abs() < 1e-3, "got {}", levels.flat_level());

        let expected_a = energy_sum_all(
            levels.as_array().iter().zip(A_WEIGHTING_DB).map(|(l, w)| l + w),
        )
        .unwrap();
        assert!((levels.weighted_level() - expected_a).abs() < TOL);
    }

    #[test]
    fn test_indicators_below_floor_not_clamped() {
        let levels = BandLevels::splat(-120.0);
        let expected = -120.0 + 10.0 * 8.0_f64.log10();
        assert!((levels.flat_level() - expected).abs() < TOL, "got {}", levels.flat_level());
        assert!(levels.weighted_level() < levels.flat_level());
    }

    #[test]
    fn test_indicators_flat_spectrum() {
        let levels = BandLevels::splat(60.0);
        // 8 equal bands: +10*log10(8)
        assert!((levels.flat_level() - (60.0 + 10.0 * 8.0_f64.log10())).abs() < 1e-9);
        let expected_a = energy_sum_all(A_WEIGHTING_DB.iter().map(|w| 60.0 + w)).unwrap();
        assert!((levels.weighted_level() - expected_a).abs() < 1e-9);
        assert!(levels.weighted_level() < levels.flat_level());
    }

    #[test]
    fn test_validate_rejects_non_finite() {
        let mut levels = BandLevels::splat(10.0);
        assert!(levels.validate("attenuation", || "row 1".into()).is_ok());
        levels[Band::Hz500] = f64::NAN;
        let err = levels.validate("attenuation", || "row 1".into()).unwrap_err();
        assert!(err.to_string().contains("500 Hz"));
    }
}
