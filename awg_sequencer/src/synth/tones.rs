//! Tone-list resolution and per-tone parameter checks.

use crate::config::AodConfig;
use crate::validate::Checker;
use serde::{Deserialize, Serialize};

/// How the frequencies of a static or ramped tone set are given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToneSpec {
    /// Explicit frequencies in MHz.
    Explicit(Vec<f64>),
    /// Evenly spaced comb of traps.
    Comb {
        /// First frequency in MHz.
        start_mhz: f64,
        /// Number of traps.
        count: usize,
        /// Trap spacing in micrometres.
        spacing_um: f64,
    },
}

impl ToneSpec {
    /// Frequencies in MHz, without window checks.
    pub fn frequencies(&self, aod: &AodConfig) -> Vec<f64> {
        match self {
            Self::Explicit(freqs) => freqs.clone(),
            Self::Comb {
                start_mhz,
                count,
                spacing_um,
            } => {
                let step = aod.spacing_mhz(*spacing_um);
                (0..*count).map(|k| start_mhz + k as f64 * step).collect()
            }
        }
    }
}

/// Resolve a tone spec to frequencies in MHz. An empty set or any tone
/// outside the diffraction window is replaced by the single default tone.
pub(crate) fn resolve(spec: &ToneSpec, aod: &AodConfig, checker: &mut Checker) -> Vec<f64> {
    let spec = match spec {
        ToneSpec::Comb {
            start_mhz,
            count: 0,
            spacing_um,
        } => {
            checker.reject("num_of_traps", "number of traps must be positive; using 1");
            ToneSpec::Comb {
                start_mhz: *start_mhz,
                count: 1,
                spacing_um: *spacing_um,
            }
        }
        other => other.clone(),
    };
    let freqs = spec.frequencies(aod);
    window_checked("freqs", freqs, aod, checker)
}

/// Replace a list containing any out-of-window frequency with the default tone.
pub(crate) fn window_checked(
    parameter: &'static str,
    freqs: Vec<f64>,
    aod: &AodConfig,
    checker: &mut Checker,
) -> Vec<f64> {
    if freqs.is_empty() {
        checker.reject(
            parameter,
            format!("no frequencies given; using {} MHz", aod.default_freq_mhz),
        );
        return vec![aod.default_freq_mhz];
    }
    if let Some(bad) = freqs.iter().find(|f| !aod.contains(**f)) {
        checker.reject(
            parameter,
            format!(
                "{bad} MHz lies outside the AOD window [{}, {}] MHz; using {} MHz",
                aod.freq_min_mhz, aod.freq_max_mhz, aod.default_freq_mhz
            ),
        );
        return vec![aod.default_freq_mhz];
    }
    freqs
}

/// Per-tone amplitude fractions: length must match, values must lie in [0, 1].
pub(crate) fn amplitudes(
    parameter: &'static str,
    values: &[f64],
    tones: usize,
    checker: &mut Checker,
) -> Vec<f64> {
    if values.len() != tones {
        checker.reject(
            parameter,
            format!(
                "{} amplitudes given for {} tones; using 1.0 for every tone",
                values.len(),
                tones
            ),
        );
        return vec![1.0; tones];
    }
    if values.iter().any(|v| !(0.0..=1.0).contains(v)) {
        checker.reject(parameter, "amplitudes must lie between 0 and 1; clamped");
        return values.iter().map(|v| v.clamp(0.0, 1.0)).collect();
    }
    values.to_vec()
}

/// Per-tone phases in degrees: length must match.
pub(crate) fn phases(values: &[f64], tones: usize, checker: &mut Checker) -> Vec<f64> {
    if values.len() != tones {
        checker.reject(
            "freq_phase",
            format!(
                "{} phases given for {} tones; using 0 deg for every tone",
                values.len(),
                tones
            ),
        );
        return vec![0.0; tones];
    }
    values.to_vec()
}

/// Nearest frequency completing a whole number of cycles in `samples`
/// samples at `rate_hz`.
#[inline]
pub fn snap_to_buffer(freq_hz: f64, samples: usize, rate_hz: f64) -> f64 {
    let bin = rate_hz / samples as f64;
    (freq_hz / bin).round() * bin
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comb_uses_um_per_mhz() {
        let aod = AodConfig::default();
        let spec = ToneSpec::Comb {
            start_mhz: 150.0,
            count: 3,
            spacing_um: 0.329 * 5.0,
        };
        let freqs = spec.frequencies(&aod);
        assert_eq!(freqs.len(), 3);
        assert!((freqs[2] - 160.0).abs() < 1e-9);
    }

    #[test]
    fn comb_edge_outside_window_falls_back() {
        let aod = AodConfig::default();
        let mut checker = Checker::new();
        let spec = ToneSpec::Comb {
            start_mhz: 220.0,
            count: 4,
            spacing_um: 0.329 * 5.0,
        };
        assert_eq!(resolve(&spec, &aod, &mut checker), vec![170.0]);
        assert!(!checker.is_clean());
    }

    #[test]
    fn zero_traps_becomes_one() {
        let aod = AodConfig::default();
        let mut checker = Checker::new();
        let spec = ToneSpec::Comb {
            start_mhz: 150.0,
            count: 0,
            spacing_um: 1.0,
        };
        assert_eq!(resolve(&spec, &aod, &mut checker), vec![150.0]);
        assert!(!checker.is_clean());
    }

    #[test]
    fn amplitude_checks() {
        let mut checker = Checker::new();
        assert_eq!(amplitudes("a", &[0.5, 1.0], 2, &mut checker), vec![0.5, 1.0]);
        assert!(checker.is_clean());
        assert_eq!(amplitudes("a", &[0.5], 2, &mut checker), vec![1.0, 1.0]);
        assert_eq!(amplitudes("a", &[1.5, -0.1], 2, &mut checker), vec![1.0, 0.0]);
        assert!(!checker.is_clean());
    }

    #[test]
    fn snapping_gives_whole_cycles() {
        let rate = 625e6;
        let n = 1024;
        let f = snap_to_buffer(170.3e6, n, rate);
        let cycles = f * n as f64 / rate;
        assert!((cycles - cycles.round()).abs() < 1e-9);
        assert!((f - 170.3e6).abs() <= rate / n as f64 / 2.0);
    }
}
