//! Validated device-level parameters.
//!
//! `CardConfig` mirrors what the card has been told. Every setter clamps its
//! input, recomputes the dependent fields and returns the applied value as a
//! [`Validated`]. Device I/O happens in the controller; values the card may
//! alter (sample rate, channel count) are fed back through the `sync_*`
//! methods after read-back.

use crate::config::AodConfig;
use crate::synth::{Calibration, SynthContext, resolve_sample_count};
use crate::validate::{Checker, Diagnostic, Validated, clamp_range};
use awg_common::card::consts::{
    CHANNEL_MASK_ALL, DEFAULT_BYTES_PER_SAMPLE, DEFAULT_STATIC_DURATION_MS,
    DEFAULT_TRIGGER_LEVEL0_MV, DEFAULT_TRIGGER_LEVEL1_MV, MAX_OUTPUT_MV, MAX_SAMPLE_RATE_HZ,
    MAX_SEGMENTS, MAX_STEP_INDEX, MAX_TRIGGER_LEVEL_MV, MIN_SAMPLE_RATE_HZ, MIN_SEGMENTS,
    SAMPLE_GRANULE, TOTAL_MEMORY_BYTES,
};
use awg_common::card::types::{ActionKind, TriggerMode};

/// Trigger configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerSettings {
    /// Detection mode.
    pub mode: TriggerMode,
    /// EXT0 level 0 in millivolts.
    pub level0_mv: i32,
    /// EXT0 level 1 in millivolts.
    pub level1_mv: i32,
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            mode: TriggerMode::default(),
            level0_mv: DEFAULT_TRIGGER_LEVEL0_MV,
            level1_mv: DEFAULT_TRIGGER_LEVEL1_MV,
        }
    }
}

/// Device-level parameters of one card session.
#[derive(Debug, Clone, PartialEq)]
pub struct CardConfig {
    sample_rate_hz: u64,
    channel_mask: u8,
    channel_count: u32,
    bytes_per_sample: u32,
    segment_count: u32,
    start_step: u16,
    max_output_mv: u32,
    static_duration_ms: f64,
    trigger: TriggerSettings,
    max_samples_per_segment: u64,
    max_duration_ms: u64,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CardConfig {
    /// Power-on configuration: 625 MS/s, channel 0, 16 segments.
    pub fn new() -> Self {
        let mut config = Self {
            sample_rate_hz: MAX_SAMPLE_RATE_HZ,
            channel_mask: 1,
            channel_count: 1,
            bytes_per_sample: DEFAULT_BYTES_PER_SAMPLE,
            segment_count: 16,
            start_step: 0,
            max_output_mv: MAX_OUTPUT_MV,
            static_duration_ms: DEFAULT_STATIC_DURATION_MS,
            trigger: TriggerSettings::default(),
            max_samples_per_segment: 0,
            max_duration_ms: 0,
        };
        config.recompute();
        config
    }

    // ─── Setters ────────────────────────────────────────────────────

    /// Request a sample rate. The static granule resets to one granule at
    /// the new rate.
    pub fn set_sample_rate(&mut self, requested_hz: u64) -> Validated<u64> {
        let validated = clamp_range(
            "sample_rate",
            requested_hz,
            MIN_SAMPLE_RATE_HZ,
            MAX_SAMPLE_RATE_HZ,
        );
        self.sync_sample_rate(*validated.value());
        validated
    }

    /// Record the sample rate the card actually achieved.
    pub fn sync_sample_rate(&mut self, achieved_hz: u64) {
        self.sample_rate_hz = achieved_hz.max(1);
        self.recompute();
        self.static_duration_ms = self.granule_duration_ms();
    }

    /// Set the enabled channel mask (bits 0..=3, at least one set).
    pub fn set_channel_mask(&mut self, mask: u8) -> Validated<u8> {
        let mut checker = Checker::new();
        let mut applied = mask & CHANNEL_MASK_ALL;
        if applied != mask {
            checker.reject(
                "channel_mask",
                format!("{mask:#06b} addresses missing channels; using {applied:#06b}"),
            );
        }
        if applied == 0 {
            checker.reject("channel_mask", "no channel enabled; using channel 0");
            applied = 1;
        }
        self.channel_mask = applied;
        self.channel_count = applied.count_ones();
        checker.finish(applied)
    }

    /// Record channel count and sample width read back from the card.
    pub fn sync_channels(&mut self, channel_count: u32, bytes_per_sample: u32) {
        self.channel_count = channel_count.max(1);
        self.bytes_per_sample = bytes_per_sample.max(1);
        self.recompute();
    }

    /// Set the segment count, rounded up to a power of two in [2, 65536].
    pub fn set_segment_count(&mut self, requested: u32) -> Validated<u32> {
        let mut checker = Checker::new();
        let clamped = checker.absorb(clamp_range("num_segments", requested, MIN_SEGMENTS, MAX_SEGMENTS));
        let rounded = clamped.next_power_of_two();
        if rounded != clamped {
            checker.reject(
                "num_segments",
                format!("{clamped} is not a power of two; using {rounded}"),
            );
        }
        self.segment_count = rounded;
        self.recompute();
        checker.finish(rounded)
    }

    /// Set the first step executed on start.
    pub fn set_start_step(&mut self, requested: u32) -> Validated<u16> {
        let validated = clamp_range("start_step", requested, 0, u32::from(MAX_STEP_INDEX));
        self.start_step = *validated.value() as u16;
        validated.map(|v| v as u16)
    }

    /// Set the card output amplitude, capped at the amplifier damage threshold.
    pub fn set_max_output(&mut self, requested_mv: u32) -> Validated<u32> {
        let validated = clamp_range("max_output", requested_mv, 1, MAX_OUTPUT_MV);
        self.max_output_mv = *validated.value();
        validated
    }

    /// Set the duration of the looped static granule in milliseconds.
    pub fn set_static_duration(&mut self, requested_ms: f64) -> Validated<f64> {
        let min = self.granule_duration_ms();
        let max = (self.max_duration_ms as f64).max(min);
        let validated = if requested_ms.is_nan() {
            Validated::Clamped {
                value: min,
                warnings: vec![Diagnostic::new(
                    "static_duration",
                    format!("not a number; using {min} ms"),
                )],
            }
        } else {
            clamp_range("static_duration", requested_ms, min, max)
        };
        self.static_duration_ms = *validated.value();
        validated
    }

    /// Set trigger mode and levels. Invalid modes fall back to positive edge,
    /// out-of-range levels to their defaults.
    pub fn set_trigger(&mut self, mode: u8, level0_mv: i32, level1_mv: i32) -> Validated<TriggerSettings> {
        let mut checker = Checker::new();
        let defaults = TriggerSettings::default();
        let mode = TriggerMode::from_code(mode).unwrap_or_else(|| {
            checker.reject(
                "trig_mode",
                format!("{mode} is not in 0..={}; using positive edge", TriggerMode::MAX_CODE),
            );
            defaults.mode
        });
        let level = |checker: &mut Checker, name: &'static str, value: i32, default: i32| {
            if (-MAX_TRIGGER_LEVEL_MV..=MAX_TRIGGER_LEVEL_MV).contains(&value) {
                value
            } else {
                checker.reject(
                    name,
                    format!("{value} mV outside ±{MAX_TRIGGER_LEVEL_MV} mV; using {default} mV"),
                );
                default
            }
        };
        let settings = TriggerSettings {
            mode,
            level0_mv: level(&mut checker, "trig_level0", level0_mv, defaults.level0_mv),
            level1_mv: level(&mut checker, "trig_level1", level1_mv, defaults.level1_mv),
        };
        self.trigger = settings;
        checker.finish(settings)
    }

    // ─── Derived values ─────────────────────────────────────────────

    fn recompute(&mut self) {
        self.max_samples_per_segment =
            TOTAL_MEMORY_BYTES / u64::from(self.bytes_per_sample) / u64::from(self.segment_count);
        self.max_duration_ms =
            (self.max_samples_per_segment as f64 / self.sample_rate_hz as f64 * 1000.0).floor() as u64;
    }

    /// Duration of one granule at the current rate, in milliseconds.
    pub fn granule_duration_ms(&self) -> f64 {
        SAMPLE_GRANULE as f64 / self.sample_rate_hz as f64 * 1e3
    }

    /// Duration the card actually replays per static loop: the static
    /// granule after floor-to-granule resolution.
    pub fn effective_static_ms(&self) -> f64 {
        let samples = resolve_sample_count(ActionKind::Static, self.static_duration_ms, self.sample_rate_hz);
        samples as f64 / self.sample_rate_hz as f64 * 1e3
    }

    /// Synthesis context at the current rate, channel count and output.
    pub fn synth_context<'a>(&self, aod: &'a AodConfig, calibration: &'a Calibration) -> SynthContext<'a> {
        SynthContext {
            sample_rate_hz: self.sample_rate_hz,
            channels: self.channel_count as usize,
            max_output_mv: self.max_output_mv,
            aod,
            calibration,
        }
    }

    // ─── Getters ────────────────────────────────────────────────────

    /// Achieved sample rate in Hz.
    pub fn sample_rate_hz(&self) -> u64 {
        self.sample_rate_hz
    }

    /// Enabled channel mask.
    pub fn channel_mask(&self) -> u8 {
        self.channel_mask
    }

    /// Number of enabled channels.
    pub fn channel_count(&self) -> u32 {
        self.channel_count
    }

    /// Bytes per sample.
    pub fn bytes_per_sample(&self) -> u32 {
        self.bytes_per_sample
    }

    /// Number of memory segments (power of two).
    pub fn segment_count(&self) -> u32 {
        self.segment_count
    }

    /// First step executed on start.
    pub fn start_step(&self) -> u16 {
        self.start_step
    }

    /// Card output amplitude in millivolts.
    pub fn max_output_mv(&self) -> u32 {
        self.max_output_mv
    }

    /// Static granule duration in milliseconds.
    pub fn static_duration_ms(&self) -> f64 {
        self.static_duration_ms
    }

    /// Trigger configuration.
    pub fn trigger(&self) -> TriggerSettings {
        self.trigger
    }

    /// Largest segment in samples.
    pub fn max_samples_per_segment(&self) -> u64 {
        self.max_samples_per_segment
    }

    /// Longest segment in whole milliseconds.
    pub fn max_duration_ms(&self) -> u64 {
        self.max_duration_ms
    }
}
