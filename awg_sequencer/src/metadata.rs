//! Session metadata persisted as JSON.
//!
//! ```json
//! {
//!   "steps":      { "step_0":    { "step_value": 0, "segment_value": 0, ... } },
//!   "segments":   { "segment_0": { "segment": 0, "action_val": 1, ... } },
//!   "properties": { "card_settings": { "sample_rate_Hz": 625000000, ... } },
//!   "calibration": [[120.0, 0.62], [225.0, 0.58]]
//! }
//! ```
//!
//! Keys sort lexicographically in the file (`segment_10` before `segment_2`);
//! replay order comes from [`SessionMetadata::segments_in_order`] and
//! [`SessionMetadata::steps_in_order`], which sort by numeric suffix.

use crate::card_config::CardConfig;
use crate::error::ControllerError;
use crate::synth::Action;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

const SEGMENT_PREFIX: &str = "segment_";
const STEP_PREFIX: &str = "step_";

// ─── Records ────────────────────────────────────────────────────────

/// One successfully programmed segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    /// Segment index.
    pub segment: usize,
    /// Action code (1 = static, 2 = move, 3 = ramp).
    pub action_val: u8,
    /// Requested duration in milliseconds.
    pub duration: f64,
    /// Action parameters as given.
    pub params: Action,
    /// Samples per channel written to the card.
    #[serde(default)]
    pub num_of_samples: usize,
    /// Realised start frequencies in MHz.
    #[serde(default)]
    pub effective_start_freq_mhz: Vec<f64>,
    /// Realised end frequencies in MHz.
    #[serde(default)]
    pub effective_end_freq_mhz: Vec<f64>,
    /// Realised per-tone amplitudes at the start.
    #[serde(default)]
    pub effective_start_amp: Vec<f64>,
    /// Total amplitude applied in millivolts.
    #[serde(default, rename = "effective_total_amp_mV")]
    pub effective_total_amp_mv: f64,
}

/// One successfully programmed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step index.
    pub step_value: u16,
    /// Segment replayed.
    pub segment_value: u16,
    /// Loop count written to the card.
    pub num_of_loops: u32,
    /// Successor step.
    pub next_step: u16,
    /// End condition code (1 = trigger, 2 = loop complete, 3 = terminate).
    pub condition: u8,
}

/// Device-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSettings {
    /// Achieved sample rate in Hz.
    #[serde(rename = "sample_rate_Hz")]
    pub sample_rate_hz: u64,
    /// Number of memory segments.
    pub num_of_segments: u32,
    /// First step executed on start.
    pub start_step: u16,
    /// Card output amplitude in millivolts.
    #[serde(rename = "max_output_mV")]
    pub max_output_mv: u32,
    /// Trigger mode code.
    pub trig_mode: u8,
    /// EXT0 level 0 in millivolts.
    pub trig_level0_main: i32,
    /// EXT0 level 1 in millivolts.
    pub trig_level1_aux: i32,
    /// Static granule duration in milliseconds.
    pub static_duration_ms: f64,
    /// Driver that produced the session (informational).
    #[serde(default)]
    pub driver: String,
    /// Card serial number (informational).
    #[serde(default)]
    pub serial_number: i64,
}

impl CardSettings {
    /// Snapshot of the current card configuration.
    pub fn capture(card: &CardConfig) -> Self {
        let trigger = card.trigger();
        Self {
            sample_rate_hz: card.sample_rate_hz(),
            num_of_segments: card.segment_count(),
            start_step: card.start_step(),
            max_output_mv: card.max_output_mv(),
            trig_mode: trigger.mode.code(),
            trig_level0_main: trigger.level0_mv,
            trig_level1_aux: trigger.level1_mv,
            static_duration_ms: card.static_duration_ms(),
            driver: String::new(),
            serial_number: 0,
        }
    }
}

/// `properties` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Properties {
    /// Device-level settings.
    pub card_settings: CardSettings,
}

// ─── Session ────────────────────────────────────────────────────────

/// Complete session: card settings, programmed segments and steps, calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Steps keyed `step_<i>`.
    #[serde(default)]
    pub steps: BTreeMap<String, StepRecord>,
    /// Segments keyed `segment_<i>`.
    #[serde(default)]
    pub segments: BTreeMap<String, SegmentRecord>,
    /// Card settings.
    pub properties: Properties,
    /// Calibration points `[freq_mhz, efficiency]`.
    #[serde(default)]
    pub calibration: Vec<[f64; 2]>,
}

impl SessionMetadata {
    /// Session with card settings and no segments or steps.
    pub fn new(card_settings: CardSettings) -> Self {
        Self {
            steps: BTreeMap::new(),
            segments: BTreeMap::new(),
            properties: Properties { card_settings },
            calibration: Vec::new(),
        }
    }

    /// Add or replace a segment record.
    pub fn insert_segment(&mut self, record: SegmentRecord) {
        self.segments
            .insert(format!("{SEGMENT_PREFIX}{}", record.segment), record);
    }

    /// Add or replace a step record.
    pub fn insert_step(&mut self, record: StepRecord) {
        self.steps
            .insert(format!("{STEP_PREFIX}{}", record.step_value), record);
    }

    /// Segment records in ascending index order.
    pub fn segments_in_order(&self) -> Vec<&SegmentRecord> {
        in_index_order(&self.segments, SEGMENT_PREFIX)
    }

    /// Step records in ascending index order.
    pub fn steps_in_order(&self) -> Vec<&StepRecord> {
        in_index_order(&self.steps, STEP_PREFIX)
    }

    /// Write as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ControllerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!(
            "Session saved to {} ({} segments, {} steps)",
            path.display(),
            self.segments.len(),
            self.steps.len()
        );
        Ok(())
    }

    /// Read a session file.
    pub fn load(path: &Path) -> Result<Self, ControllerError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ControllerError::Persistence(format!("{}: {e}", path.display()))
        })?;
        let session: Self = serde_json::from_str(&content)?;
        Ok(session)
    }
}

/// Order records by the numeric suffix of their key. Keys without one go last.
fn in_index_order<'a, T>(map: &'a BTreeMap<String, T>, prefix: &str) -> Vec<&'a T> {
    let mut entries: Vec<(usize, &T)> = map
        .iter()
        .map(|(key, value)| {
            let index = key
                .strip_prefix(prefix)
                .and_then(|suffix| suffix.parse().ok())
                .unwrap_or_else(|| {
                    warn!("Metadata key {key:?} has no numeric {prefix}<i> suffix; replayed last");
                    usize::MAX
                });
            (index, value)
        })
        .collect();
    entries.sort_by_key(|(index, _)| *index);
    entries.into_iter().map(|(_, value)| value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::StaticParams;

    fn step(i: u16) -> StepRecord {
        StepRecord {
            step_value: i,
            segment_value: 0,
            num_of_loops: 1,
            next_step: 0,
            condition: 2,
        }
    }

    fn segment(i: usize) -> SegmentRecord {
        SegmentRecord {
            segment: i,
            action_val: 1,
            duration: 1.0,
            params: Action::Static(StaticParams::comb(150.0, 1, 1.0, 100.0)),
            num_of_samples: 1024,
            effective_start_freq_mhz: vec![150.0],
            effective_end_freq_mhz: vec![150.0],
            effective_start_amp: vec![1.0],
            effective_total_amp_mv: 100.0,
        }
    }

    #[test]
    fn numeric_order_beats_lexicographic() {
        let mut session = SessionMetadata::new(CardSettings::capture(&CardConfig::new()));
        for i in [10, 2, 1] {
            session.insert_step(step(i));
            session.insert_segment(segment(i as usize));
        }
        let order: Vec<u16> = session.steps_in_order().iter().map(|s| s.step_value).collect();
        assert_eq!(order, vec![1, 2, 10]);
        let order: Vec<usize> = session.segments_in_order().iter().map(|s| s.segment).collect();
        assert_eq!(order, vec![1, 2, 10]);
    }

    #[test]
    fn card_settings_use_legacy_key_names() {
        let settings = CardSettings::capture(&CardConfig::new());
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["sample_rate_Hz"], 625_000_000);
        assert_eq!(json["max_output_mV"], 282);
        assert_eq!(json["num_of_segments"], 16);
        assert_eq!(json["trig_mode"], 1);
    }

    #[test]
    fn save_then_load_preserves_session() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/session.json");
        let mut session = SessionMetadata::new(CardSettings::capture(&CardConfig::new()));
        session.insert_segment(segment(0));
        session.insert_step(step(0));
        session.calibration = vec![[120.0, 0.5], [220.0, 1.0]];
        session.save(&path).unwrap();

        let loaded = SessionMetadata::load(&path).unwrap();
        assert_eq!(loaded, session);
    }

    #[test]
    fn missing_file_is_persistence_error() {
        let err = SessionMetadata::load(Path::new("/nonexistent/session.json")).unwrap_err();
        assert!(matches!(err, ControllerError::Persistence(_)));
    }

    #[test]
    fn provenance_fields_are_optional() {
        let json = r#"{
            "properties": { "card_settings": {
                "sample_rate_Hz": 625000000, "num_of_segments": 4, "start_step": 0,
                "max_output_mV": 200, "trig_mode": 0, "trig_level0_main": 2500,
                "trig_level1_aux": 0, "static_duration_ms": 0.002 } },
            "segments": { "segment_0": {
                "segment": 0, "action_val": 1, "duration": 5.0,
                "params": { "kind": "static", "tones": { "explicit": [150.0] },
                            "total_amp_mv": 100.0, "amplitudes": [1.0], "phases_deg": [0.0],
                            "freq_adjust": true, "amp_adjust": false } } }
        }"#;
        let session: SessionMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(session.segments["segment_0"].num_of_samples, 0);
        assert!(session.steps.is_empty());
        assert!(session.calibration.is_empty());
    }
}
