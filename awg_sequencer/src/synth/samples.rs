//! Sample rendering, quantisation and channel interleaving.

use super::calibration::Calibration;
use super::profile;
use awg_common::card::consts::FULL_SCALE;
use std::f64::consts::TAU;

/// One tone evolving over a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ToneTrack {
    pub start_hz: f64,
    pub end_hz: f64,
    pub start_amp: f64,
    pub end_amp: f64,
    pub phase_rad: f64,
}

/// How frequencies evolve between start and end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Sweep {
    /// Frequencies held (static traps and ramps).
    Hold,
    /// Hybrid minimum-jerk/linear sweep with the given hybridicity.
    Hybrid(f64),
}

/// Everything needed to render one segment.
pub(crate) struct RenderPlan<'a> {
    pub tracks: &'a [ToneTrack],
    pub sweep: Sweep,
    /// Samples per channel.
    pub samples: usize,
    pub rate_hz: f64,
    /// Duration over which sweeps and ramps run; later samples hold the end values.
    pub active_s: f64,
    /// Millivolt-to-code factor divided by the tone count.
    pub scale: f64,
    pub channels: usize,
    pub calibration: Option<&'a Calibration>,
}

/// Code scale for `total_amp_mv` spread over `tones` tones on a card whose
/// full-scale output is `max_output_mv`.
pub(crate) fn scale(total_amp_mv: f64, max_output_mv: u32, tones: usize) -> f64 {
    total_amp_mv / f64::from(max_output_mv.max(1)) * FULL_SCALE / tones.max(1) as f64
}

#[inline]
fn quantise(value: f64) -> i16 {
    value.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

/// Render the plan into an interleaved buffer of `samples × channels` codes.
pub(crate) fn render(plan: &RenderPlan<'_>) -> Vec<i16> {
    let channels = plan.channels.max(1);
    let mut out = Vec::with_capacity(plan.samples * channels);
    let active = plan.active_s.max(f64::MIN_POSITIVE);

    // Held frequencies take one calibration lookup per tone.
    let fixed_gain: Vec<f64> = plan
        .tracks
        .iter()
        .map(|t| gain(plan.calibration, t.start_hz))
        .collect();

    for i in 0..plan.samples {
        let t = i as f64 / plan.rate_hz;
        let tau = (t / active).min(1.0);
        let mut acc = 0.0;

        for (k, track) in plan.tracks.iter().enumerate() {
            let amp = track.start_amp + (track.end_amp - track.start_amp) * tau;
            let (phase, g) = match plan.sweep {
                Sweep::Hold => (TAU * track.start_hz * t, fixed_gain[k]),
                Sweep::Hybrid(a) => {
                    let delta = track.end_hz - track.start_hz;
                    let cycles = if t <= active {
                        track.start_hz * t + delta * active * profile::hybrid_integral(a, tau)
                    } else {
                        (track.start_hz + delta / 2.0) * active + track.end_hz * (t - active)
                    };
                    let inst = track.start_hz + delta * profile::hybrid(a, tau);
                    (TAU * cycles, gain(plan.calibration, inst))
                }
            };
            acc += amp * g * (phase + track.phase_rad).sin();
        }

        let code = quantise(acc * plan.scale);
        out.extend(std::iter::repeat_n(code, channels));
    }
    out
}

#[inline]
fn gain(calibration: Option<&Calibration>, freq_hz: f64) -> f64 {
    calibration.map_or(1.0, |cal| cal.gain(freq_hz * 1e-6))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(f: f64) -> ToneTrack {
        ToneTrack {
            start_hz: f,
            end_hz: f,
            start_amp: 1.0,
            end_amp: 1.0,
            phase_rad: 0.0,
        }
    }

    fn plan<'a>(tracks: &'a [ToneTrack], sweep: Sweep, channels: usize) -> RenderPlan<'a> {
        RenderPlan {
            tracks,
            sweep,
            samples: 1024,
            rate_hz: 1024.0,
            active_s: 1.0,
            scale: scale(282.0, 282, tracks.len()),
            channels,
            calibration: None,
        }
    }

    #[test]
    fn full_amplitude_reaches_full_scale() {
        let tracks = [tone(256.0)];
        let buf = render(&plan(&tracks, Sweep::Hold, 1));
        // sin peaks at sample 1 of a 4-sample period
        assert_eq!(buf[1], i16::MAX);
        assert_eq!(buf[3], -i16::MAX);
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn channels_are_interleaved_copies() {
        let tracks = [tone(100.0)];
        let buf = render(&plan(&tracks, Sweep::Hold, 3));
        assert_eq!(buf.len(), 3 * 1024);
        for frame in buf.chunks(3) {
            assert!(frame.iter().all(|&v| v == frame[0]));
        }
    }

    #[test]
    fn multi_tone_sum_stays_in_range() {
        let tracks = [tone(100.0), tone(101.0), tone(102.0), tone(103.0)];
        let buf = render(&plan(&tracks, Sweep::Hold, 1));
        assert_eq!(buf[0], 0);
        assert!(buf.iter().all(|v| *v > i16::MIN));
    }

    #[test]
    fn amplitude_ramp_ends_silent() {
        let tracks = [ToneTrack {
            end_amp: 0.0,
            ..tone(256.0)
        }];
        let mut p = plan(&tracks, Sweep::Hold, 1);
        p.active_s = 0.5;
        let buf = render(&p);
        assert!(buf[1].abs() > 30_000);
        assert!(buf[600..].iter().all(|v| *v == 0));
    }

    #[test]
    fn scale_divides_by_tone_count() {
        assert!((scale(141.0, 282, 2) - FULL_SCALE / 4.0).abs() < 1e-9);
    }
}
