//! Waveform synthesis.
//!
//! Pure computation with no device I/O: an [`Action`], a duration and the
//! card context go in; an interleaved signed 16-bit buffer and the
//! frequencies/amplitudes actually realised come out.
//!
//! # Sample count
//!
//! Segment sizes are whole multiples of [`SAMPLE_GRANULE`]. Static traps
//! round **down** (they are looped to reach long hold times, so undershooting
//! by less than a granule is harmless). Moves and ramps round **up** so the
//! motion is never truncated. The result is never below one granule.
//!
//! # Scaling
//!
//! Each tone is weighted by its amplitude fraction (and calibration gain when
//! amplitude adjustment is on), the tones are summed, and the sum is scaled
//! by `total_amp / max_output · 32767 / N`.

pub mod calibration;
pub mod profile;
mod samples;
pub mod tones;

pub use calibration::Calibration;
pub use tones::ToneSpec;

use crate::config::AodConfig;
use crate::validate::{Checker, Validated, clamp_range};
use awg_common::card::consts::{
    MAX_TOTAL_AMP_MV, MIN_TOTAL_AMP_MV, MOTION_FALLBACK_AMP_MV, SAMPLE_GRANULE,
    STATIC_FALLBACK_AMP_MV,
};
use awg_common::card::types::ActionKind;
use samples::{RenderPlan, Sweep, ToneTrack};
use serde::{Deserialize, Serialize};

/// Tolerance absorbing floating-point noise before floor/ceil.
const GRANULE_EPSILON: f64 = 1e-9;

// ─── Actions ────────────────────────────────────────────────────────

/// Static multi-tone trap parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticParams {
    /// Tone frequencies.
    pub tones: ToneSpec,
    /// Total amplitude in millivolts.
    pub total_amp_mv: f64,
    /// Per-tone amplitude fractions in [0, 1].
    pub amplitudes: Vec<f64>,
    /// Per-tone phases in degrees.
    pub phases_deg: Vec<f64>,
    /// Snap tones to whole cycles per buffer.
    pub freq_adjust: bool,
    /// Apply the diffraction-efficiency calibration.
    pub amp_adjust: bool,
}

/// Frequency-interpolated move parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveParams {
    /// Start frequencies in MHz.
    pub start_mhz: Vec<f64>,
    /// End frequencies in MHz (same length as `start_mhz`).
    pub end_mhz: Vec<f64>,
    /// 0 = minimum jerk, 1 = linear.
    pub hybridicity: f64,
    /// Total amplitude in millivolts.
    pub total_amp_mv: f64,
    /// Per-tone amplitude fractions at the start.
    pub start_amps: Vec<f64>,
    /// Per-tone amplitude fractions at the end.
    pub end_amps: Vec<f64>,
    /// Per-tone phases in degrees.
    pub phases_deg: Vec<f64>,
    /// Snap endpoints to whole cycles per buffer.
    pub freq_adjust: bool,
    /// Apply the diffraction-efficiency calibration.
    pub amp_adjust: bool,
}

/// Amplitude ramp parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampParams {
    /// Tone frequencies (held).
    pub tones: ToneSpec,
    /// Total amplitude in millivolts.
    pub total_amp_mv: f64,
    /// Per-tone amplitude fractions at the start.
    pub start_amps: Vec<f64>,
    /// Per-tone amplitude fractions at the end.
    pub end_amps: Vec<f64>,
    /// Per-tone phases in degrees.
    pub phases_deg: Vec<f64>,
    /// Snap tones to whole cycles per buffer.
    pub freq_adjust: bool,
    /// Apply the diffraction-efficiency calibration.
    pub amp_adjust: bool,
}

/// Waveform programmed into one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Fixed multi-tone.
    Static(StaticParams),
    /// Frequency-interpolated move.
    Move(MoveParams),
    /// Amplitude ramp at fixed frequencies.
    Ramp(RampParams),
}

impl Action {
    /// Action kind.
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Static(_) => ActionKind::Static,
            Self::Move(_) => ActionKind::Move,
            Self::Ramp(_) => ActionKind::Ramp,
        }
    }
}

impl StaticParams {
    /// Equal-amplitude, zero-phase comb.
    pub fn comb(start_mhz: f64, count: usize, spacing_um: f64, total_amp_mv: f64) -> Self {
        Self {
            tones: ToneSpec::Comb {
                start_mhz,
                count,
                spacing_um,
            },
            total_amp_mv,
            amplitudes: vec![1.0; count],
            phases_deg: vec![0.0; count],
            freq_adjust: true,
            amp_adjust: false,
        }
    }
}

impl MoveParams {
    /// Constant-amplitude move of every tone from `start_mhz` to `end_mhz`.
    pub fn between(start_mhz: Vec<f64>, end_mhz: Vec<f64>, hybridicity: f64, total_amp_mv: f64) -> Self {
        let n = start_mhz.len();
        Self {
            start_mhz,
            end_mhz,
            hybridicity,
            total_amp_mv,
            start_amps: vec![1.0; n],
            end_amps: vec![1.0; n],
            phases_deg: vec![0.0; n],
            freq_adjust: true,
            amp_adjust: false,
        }
    }
}

// ─── Output ─────────────────────────────────────────────────────────

/// Card context a waveform is synthesised for.
#[derive(Debug, Clone, Copy)]
pub struct SynthContext<'a> {
    /// Achieved sample rate in Hz.
    pub sample_rate_hz: u64,
    /// Number of enabled channels.
    pub channels: usize,
    /// Card full-scale output in millivolts.
    pub max_output_mv: u32,
    /// AOD window and geometry.
    pub aod: &'a AodConfig,
    /// Calibration table for amplitude adjustment.
    pub calibration: &'a Calibration,
}

/// Synthesised segment buffer with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Interleaved samples, `sample_count × channels` long.
    pub samples: Vec<i16>,
    /// Samples per channel.
    pub sample_count: usize,
    /// Channels interleaved in `samples`.
    pub channels: usize,
    /// Realised start frequencies in MHz.
    pub effective_start_mhz: Vec<f64>,
    /// Realised end frequencies in MHz (equal to start unless moving).
    pub effective_end_mhz: Vec<f64>,
    /// Realised start amplitude fractions after calibration.
    pub effective_start_amps: Vec<f64>,
    /// Realised end amplitude fractions after calibration.
    pub effective_end_amps: Vec<f64>,
    /// Total amplitude applied in millivolts.
    pub total_amp_mv: f64,
}

// ─── Operations ─────────────────────────────────────────────────────

/// Samples per channel for a segment of `duration_ms` at `sample_rate_hz`.
pub fn resolve_sample_count(kind: ActionKind, duration_ms: f64, sample_rate_hz: u64) -> usize {
    let granules = sample_rate_hz as f64 * duration_ms * 1e-3 / SAMPLE_GRANULE as f64;
    let rounded = match kind {
        ActionKind::Static => (granules + GRANULE_EPSILON).floor(),
        ActionKind::Move | ActionKind::Ramp => (granules - GRANULE_EPSILON).ceil(),
    };
    let granules = if rounded.is_finite() && rounded >= 1.0 {
        rounded as usize
    } else {
        1
    };
    granules * SAMPLE_GRANULE
}

/// Synthesise `action` over `duration_ms`.
///
/// Out-of-range parameters are replaced by safe values; the result is then
/// [`Validated::Clamped`] and must not be loaded into the card.
pub fn synthesize(action: &Action, duration_ms: f64, ctx: &SynthContext<'_>) -> Validated<Waveform> {
    let kind = action.kind();
    let n = resolve_sample_count(kind, duration_ms, ctx.sample_rate_hz);
    let rate = ctx.sample_rate_hz as f64;
    let mut checker = Checker::new();

    let Resolved {
        mut starts,
        mut ends,
        start_amps,
        end_amps,
        phases,
        total_amp,
        sweep,
        freq_adjust,
        amp_adjust,
    } = resolve_action(action, ctx, &mut checker);

    if freq_adjust {
        for f in starts.iter_mut().chain(ends.iter_mut()) {
            *f = tones::snap_to_buffer(*f * 1e6, n, rate) * 1e-6;
        }
    }

    let calibration = (amp_adjust && !ctx.calibration.is_empty()).then_some(ctx.calibration);
    let tracks: Vec<ToneTrack> = (0..starts.len())
        .map(|k| ToneTrack {
            start_hz: starts[k] * 1e6,
            end_hz: ends[k] * 1e6,
            start_amp: start_amps[k],
            end_amp: end_amps[k],
            phase_rad: phases[k].to_radians(),
        })
        .collect();

    // Sweeps and ramps span the requested duration, the padded tail holds.
    let active_s = match kind {
        ActionKind::Static => n as f64 / rate,
        ActionKind::Move | ActionKind::Ramp => (duration_ms * 1e-3).min(n as f64 / rate),
    };

    let samples = samples::render(&RenderPlan {
        tracks: &tracks,
        sweep,
        samples: n,
        rate_hz: rate,
        active_s,
        scale: samples::scale(total_amp, ctx.max_output_mv, tracks.len()),
        channels: ctx.channels,
        calibration,
    });

    let gain = |f: f64| calibration.map_or(1.0, |c| c.gain(f));
    let waveform = Waveform {
        samples,
        sample_count: n,
        channels: ctx.channels.max(1),
        effective_start_amps: starts.iter().zip(&start_amps).map(|(f, a)| a * gain(*f)).collect(),
        effective_end_amps: ends.iter().zip(&end_amps).map(|(f, a)| a * gain(*f)).collect(),
        effective_start_mhz: starts,
        effective_end_mhz: ends,
        total_amp_mv: total_amp,
    };
    checker.finish(waveform)
}

/// Action parameters after validation, ready to render.
struct Resolved {
    starts: Vec<f64>,
    ends: Vec<f64>,
    start_amps: Vec<f64>,
    end_amps: Vec<f64>,
    phases: Vec<f64>,
    total_amp: f64,
    sweep: Sweep,
    freq_adjust: bool,
    amp_adjust: bool,
}

fn resolve_action(action: &Action, ctx: &SynthContext<'_>, checker: &mut Checker) -> Resolved {
    match action {
        Action::Static(p) => {
            let freqs = tones::resolve(&p.tones, ctx.aod, checker);
            let amps = tones::amplitudes("freq_amp", &p.amplitudes, freqs.len(), checker);
            let phases = tones::phases(&p.phases_deg, freqs.len(), checker);
            Resolved {
                starts: freqs.clone(),
                ends: freqs,
                start_amps: amps.clone(),
                end_amps: amps,
                phases,
                total_amp: total_amplitude(p.total_amp_mv, STATIC_FALLBACK_AMP_MV, ctx, checker),
                sweep: Sweep::Hold,
                freq_adjust: p.freq_adjust,
                amp_adjust: p.amp_adjust,
            }
        }
        Action::Move(p) => {
            let mut starts = tones::window_checked("start_freq", p.start_mhz.clone(), ctx.aod, checker);
            let mut ends = tones::window_checked("end_freq", p.end_mhz.clone(), ctx.aod, checker);
            if starts.len() != ends.len() {
                let n = starts.len().min(ends.len());
                checker.reject(
                    "end_freq",
                    format!(
                        "{} start and {} end frequencies; keeping the first {n}",
                        starts.len(),
                        ends.len()
                    ),
                );
                starts.truncate(n);
                ends.truncate(n);
            }
            let count = starts.len();
            Resolved {
                start_amps: tones::amplitudes("start_amp", &p.start_amps, count, checker),
                end_amps: tones::amplitudes("end_amp", &p.end_amps, count, checker),
                phases: tones::phases(&p.phases_deg, count, checker),
                total_amp: total_amplitude(p.total_amp_mv, MOTION_FALLBACK_AMP_MV, ctx, checker),
                sweep: Sweep::Hybrid(checker.absorb(clamp_range("hybridicity", p.hybridicity, 0.0, 1.0))),
                starts,
                ends,
                freq_adjust: p.freq_adjust,
                amp_adjust: p.amp_adjust,
            }
        }
        Action::Ramp(p) => {
            let freqs = tones::resolve(&p.tones, ctx.aod, checker);
            let count = freqs.len();
            Resolved {
                starts: freqs.clone(),
                ends: freqs,
                start_amps: tones::amplitudes("initial_amp", &p.start_amps, count, checker),
                end_amps: tones::amplitudes("final_amp", &p.end_amps, count, checker),
                phases: tones::phases(&p.phases_deg, count, checker),
                total_amp: total_amplitude(p.total_amp_mv, MOTION_FALLBACK_AMP_MV, ctx, checker),
                sweep: Sweep::Hold,
                freq_adjust: p.freq_adjust,
                amp_adjust: p.amp_adjust,
            }
        }
    }
}

/// Total amplitude must lie in the AOD range and below the card output.
fn total_amplitude(requested: f64, fallback: f64, ctx: &SynthContext<'_>, checker: &mut Checker) -> f64 {
    let amp = if (MIN_TOTAL_AMP_MV..=MAX_TOTAL_AMP_MV).contains(&requested) {
        requested
    } else {
        checker.reject(
            "total_amp",
            format!(
                "{requested} mV outside [{MIN_TOTAL_AMP_MV}, {MAX_TOTAL_AMP_MV}] mV; using {fallback} mV"
            ),
        );
        fallback
    };
    let max = f64::from(ctx.max_output_mv);
    if amp > max {
        checker.reject(
            "total_amp",
            format!("{amp} mV exceeds the card output of {max} mV; using {max} mV"),
        );
        return max;
    }
    amp
}
