//! Sequencer configuration (`awg.toml`).
//!
//! Every section except `[shared]` is optional and defaults to the card's
//! power-on values.

use crate::synth::Calibration;
use awg_common::card::consts::{
    DEFAULT_CHANNEL_MASK, DEFAULT_FREQ_MAX_MHZ, DEFAULT_FREQ_MHZ, DEFAULT_FREQ_MIN_MHZ,
    DEFAULT_STATIC_DURATION_MS, DEFAULT_TIMEOUT_MS, DEFAULT_TRIGGER_LEVEL0_MV,
    DEFAULT_TRIGGER_LEVEL1_MV, DEFAULT_UM_PER_MHZ, MAX_OUTPUT_MV, MAX_SAMPLE_RATE_HZ,
};
use awg_common::config::{ConfigError, ConfigLoader, SharedConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ─── Sections ───────────────────────────────────────────────────────

/// `[card]` section: values applied when a session opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardSection {
    /// Driver name in the registry.
    pub driver: String,
    /// Requested sample rate in Hz.
    pub sample_rate_hz: u64,
    /// Enabled channel bitmask.
    pub channel_mask: u8,
    /// Requested number of memory segments.
    pub num_segments: u32,
    /// First step executed on start.
    pub start_step: u32,
    /// Card output amplitude in millivolts.
    pub max_output_mv: u32,
    /// Duration of one looped static granule in milliseconds.
    pub static_duration_ms: f64,
    /// Start timeout in milliseconds.
    pub timeout_ms: u32,
    /// `[card.trigger]` subsection.
    pub trigger: TriggerSection,
}

impl Default for CardSection {
    fn default() -> Self {
        Self {
            driver: "simulation".to_string(),
            sample_rate_hz: MAX_SAMPLE_RATE_HZ,
            channel_mask: DEFAULT_CHANNEL_MASK,
            num_segments: 16,
            start_step: 0,
            max_output_mv: MAX_OUTPUT_MV,
            static_duration_ms: DEFAULT_STATIC_DURATION_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            trigger: TriggerSection::default(),
        }
    }
}

/// `[card.trigger]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerSection {
    /// Trigger mode code (0 = software, 1..=11 EXT0 modes).
    pub mode: u8,
    /// EXT0 level 0 in millivolts.
    pub level0_mv: i32,
    /// EXT0 level 1 in millivolts.
    pub level1_mv: i32,
}

impl Default for TriggerSection {
    fn default() -> Self {
        Self {
            mode: 1,
            level0_mv: DEFAULT_TRIGGER_LEVEL0_MV,
            level1_mv: DEFAULT_TRIGGER_LEVEL1_MV,
        }
    }
}

/// `[aod]` section: the acousto-optic deflector being driven.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AodConfig {
    /// Lower edge of the diffraction window in MHz.
    pub freq_min_mhz: f64,
    /// Upper edge of the diffraction window in MHz.
    pub freq_max_mhz: f64,
    /// Frequency substituted for out-of-window tones in MHz.
    pub default_freq_mhz: f64,
    /// Trap displacement per MHz in micrometres.
    pub um_per_mhz: f64,
}

impl Default for AodConfig {
    fn default() -> Self {
        Self {
            freq_min_mhz: DEFAULT_FREQ_MIN_MHZ,
            freq_max_mhz: DEFAULT_FREQ_MAX_MHZ,
            default_freq_mhz: DEFAULT_FREQ_MHZ,
            um_per_mhz: DEFAULT_UM_PER_MHZ,
        }
    }
}

impl AodConfig {
    /// True if `freq_mhz` lies inside the diffraction window.
    #[inline]
    pub fn contains(&self, freq_mhz: f64) -> bool {
        (self.freq_min_mhz..=self.freq_max_mhz).contains(&freq_mhz)
    }

    /// Convert a trap spacing in micrometres to a frequency step in MHz.
    #[inline]
    pub fn spacing_mhz(&self, distance_um: f64) -> f64 {
        distance_um / self.um_per_mhz
    }

    fn validate(&self) -> Result<(), String> {
        if !(self.um_per_mhz > 0.0) {
            return Err(format!("aod.um_per_mhz must be positive ({})", self.um_per_mhz));
        }
        if !(self.freq_min_mhz < self.freq_max_mhz) {
            return Err(format!(
                "aod window [{}, {}] MHz is empty",
                self.freq_min_mhz, self.freq_max_mhz
            ));
        }
        if !self.contains(self.default_freq_mhz) {
            return Err(format!(
                "aod.default_freq_mhz {} lies outside [{}, {}]",
                self.default_freq_mhz, self.freq_min_mhz, self.freq_max_mhz
            ));
        }
        Ok(())
    }
}

/// `[metadata]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Directory receiving session files written on start.
    pub directory: PathBuf,
    /// Write a session file every time the sequence starts.
    pub save_on_start: bool,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("metadata"),
            save_on_start: true,
        }
    }
}

// ─── Root ───────────────────────────────────────────────────────────

/// Complete sequencer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencerConfig {
    /// Logging and instance name.
    pub shared: SharedConfig,
    /// Card settings applied at open.
    #[serde(default)]
    pub card: CardSection,
    /// AOD window and geometry.
    #[serde(default)]
    pub aod: AodConfig,
    /// Diffraction-efficiency calibration.
    #[serde(default)]
    pub calibration: Calibration,
    /// Metadata persistence.
    #[serde(default)]
    pub metadata: MetadataConfig,
}

impl SequencerConfig {
    /// Configuration with every section at its default.
    pub fn with_service_name(name: impl Into<String>) -> Self {
        Self {
            shared: SharedConfig::new(name),
            card: CardSection::default(),
            aod: AodConfig::default(),
            calibration: Calibration::default(),
            metadata: MetadataConfig::default(),
        }
    }

    /// Load from TOML and validate.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Semantic validation. Card values are clamped at open, not rejected here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.aod.validate().map_err(ConfigError::ValidationError)?;
        self.calibration
            .validate()
            .map_err(ConfigError::ValidationError)?;
        if self.card.driver.is_empty() {
            return Err(ConfigError::ValidationError(
                "card.driver cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}
