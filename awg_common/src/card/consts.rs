//! Card limits and defaults.
//!
//! Single source of truth for the numeric bounds of the sequence-replay
//! card. Imported by all crates.

/// Canonical service name (used for logging and metadata file names).
pub const AWG_SERVICE_NAME: &str = "awg";

// ─── Clock & Memory ─────────────────────────────────────────────────

/// Maximum sample rate of the card in Hz (625 MS/s).
pub const MAX_SAMPLE_RATE_HZ: u64 = 625_000_000;

/// Minimum sample rate accepted by the setters in Hz.
pub const MIN_SAMPLE_RATE_HZ: u64 = 1_000;

/// Total onboard sample memory in bytes (4 GiB).
pub const TOTAL_MEMORY_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// Bytes per sample reported by a 16-bit card.
pub const DEFAULT_BYTES_PER_SAMPLE: u32 = 2;

/// Memory alignment quantum: every segment holds a multiple of this many samples.
pub const SAMPLE_GRANULE: usize = 1024;

// ─── Segments & Steps ───────────────────────────────────────────────

/// Minimum number of memory segments.
pub const MIN_SEGMENTS: u32 = 2;

/// Maximum number of memory segments.
pub const MAX_SEGMENTS: u32 = 65_536;

/// Number of addressable step-memory entries.
pub const STEP_COUNT: usize = 4096;

/// Highest valid step index.
pub const MAX_STEP_INDEX: u16 = (STEP_COUNT - 1) as u16;

/// Maximum loop count of a single step (20-bit field).
pub const MAX_LOOP_COUNT: u32 = 1_048_575;

/// Default duration of one looped static granule in milliseconds.
pub const DEFAULT_STATIC_DURATION_MS: f64 = 0.002;

// ─── Channels ───────────────────────────────────────────────────────

/// Number of analog output channels on the card.
pub const CHANNEL_COUNT: u8 = 4;

/// Mask with every channel enabled.
pub const CHANNEL_MASK_ALL: u8 = (1 << CHANNEL_COUNT) - 1;

/// Default channel mask (channel 0 only).
pub const DEFAULT_CHANNEL_MASK: u8 = 0b0001;

// ─── Output & Trigger ───────────────────────────────────────────────

/// Amplifier damage threshold with a 1 dB safety margin, in dBm.
pub const DAMAGE_THRESHOLD_DBM: f64 = -1.0;

/// Maximum card output in millivolts (`dbm_to_millivolts(DAMAGE_THRESHOLD_DBM)`).
pub const MAX_OUTPUT_MV: u32 = 282;

/// Full-scale value of a signed 16-bit sample.
pub const FULL_SCALE: f64 = i16::MAX as f64;

/// Maximum absolute trigger level in millivolts.
pub const MAX_TRIGGER_LEVEL_MV: i32 = 10_000;

/// Default main trigger level (EXT0 level 0) in millivolts.
pub const DEFAULT_TRIGGER_LEVEL0_MV: i32 = 2500;

/// Default ancilla trigger level (EXT0 level 1) in millivolts.
pub const DEFAULT_TRIGGER_LEVEL1_MV: i32 = 0;

/// Default start timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u32 = 10_000;

// ─── AOD ────────────────────────────────────────────────────────────

/// Lower edge of the AOD diffraction window in MHz.
pub const DEFAULT_FREQ_MIN_MHZ: f64 = 120.0;

/// Upper edge of the AOD diffraction window in MHz.
pub const DEFAULT_FREQ_MAX_MHZ: f64 = 225.0;

/// Safe fallback tone frequency in MHz.
pub const DEFAULT_FREQ_MHZ: f64 = 170.0;

/// Trap displacement per MHz of drive frequency, in micrometres.
pub const DEFAULT_UM_PER_MHZ: f64 = 0.329;

/// Minimum per-segment total amplitude in millivolts.
pub const MIN_TOTAL_AMP_MV: f64 = 2.0;

/// Maximum per-segment total amplitude in millivolts.
pub const MAX_TOTAL_AMP_MV: f64 = 282.0;

/// Fallback total amplitude for static traps in millivolts.
pub const STATIC_FALLBACK_AMP_MV: f64 = 50.0;

/// Fallback total amplitude for moves and ramps in millivolts.
pub const MOTION_FALLBACK_AMP_MV: f64 = 120.0;

/// Convert a power level in dBm into a peak amplitude in millivolts,
/// assuming a 50 Ω termination.
pub fn dbm_to_millivolts(dbm: f64) -> u32 {
    ((2.0e-3 * 50.0 * 10f64.powf(dbm / 10.0)).sqrt() * 1000.0).round() as u32
}
