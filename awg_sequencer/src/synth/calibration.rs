//! Diffraction-efficiency calibration lookup.
//!
//! The AOD diffracts less power at some drive frequencies than at others.
//! Amplitude adjustment scales each tone by `min_efficiency / efficiency(f)`
//! so every trap receives the power of the least efficient one.

use serde::{Deserialize, Serialize};

/// Calibration curve as `(frequency MHz, relative efficiency)` points,
/// sorted by frequency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Calibration points.
    #[serde(default)]
    pub points: Vec<[f64; 2]>,
}

impl Calibration {
    /// Build from points.
    pub fn new(points: Vec<[f64; 2]>) -> Self {
        Self { points }
    }

    /// True when no points are loaded (amplitude adjustment is the identity).
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Check ordering and positivity.
    pub fn validate(&self) -> Result<(), String> {
        for (i, [freq, eff]) in self.points.iter().enumerate() {
            if !(*eff > 0.0) {
                return Err(format!("calibration point {i} ({freq} MHz) has efficiency {eff}"));
            }
            if i > 0 && *freq <= self.points[i - 1][0] {
                return Err(format!(
                    "calibration frequencies must increase ({} MHz follows {} MHz)",
                    freq,
                    self.points[i - 1][0]
                ));
            }
        }
        Ok(())
    }

    /// Efficiency at `freq_mhz`, linearly interpolated and held flat beyond
    /// the first and last points.
    pub fn efficiency(&self, freq_mhz: f64) -> f64 {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return 1.0;
        };
        if freq_mhz <= first[0] {
            return first[1];
        }
        if freq_mhz >= last[0] {
            return last[1];
        }
        for pair in self.points.windows(2) {
            let ([f0, e0], [f1, e1]) = (pair[0], pair[1]);
            if freq_mhz <= f1 {
                return e0 + (e1 - e0) * (freq_mhz - f0) / (f1 - f0);
            }
        }
        last[1]
    }

    /// Lowest efficiency in the table.
    pub fn min_efficiency(&self) -> f64 {
        self.points
            .iter()
            .map(|p| p[1])
            .reduce(f64::min)
            .unwrap_or(1.0)
    }

    /// Amplitude multiplier for a tone at `freq_mhz` (at most 1).
    pub fn gain(&self, freq_mhz: f64) -> f64 {
        if self.is_empty() {
            return 1.0;
        }
        self.min_efficiency() / self.efficiency(freq_mhz)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn curve() -> Calibration {
        Calibration::new(vec![[120.0, 0.5], [170.0, 1.0], [225.0, 0.6]])
    }

    #[test]
    fn empty_table_is_identity() {
        let cal = Calibration::default();
        assert_eq!(cal.gain(150.0), 1.0);
        assert_eq!(cal.efficiency(150.0), 1.0);
    }

    #[test]
    fn interpolates_between_points() {
        let cal = curve();
        assert!((cal.efficiency(145.0) - 0.75).abs() < 1e-12);
        assert_eq!(cal.efficiency(100.0), 0.5);
        assert_eq!(cal.efficiency(300.0), 0.6);
    }

    #[test]
    fn gain_equalises_to_weakest_point() {
        let cal = curve();
        assert!((cal.gain(170.0) - 0.5).abs() < 1e-12);
        assert!((cal.gain(120.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn validate_rejects_unsorted_and_non_positive() {
        assert!(curve().validate().is_ok());
        assert!(Calibration::new(vec![[170.0, 1.0], [120.0, 0.5]]).validate().is_err());
        assert!(Calibration::new(vec![[170.0, 0.0]]).validate().is_err());
    }
}
