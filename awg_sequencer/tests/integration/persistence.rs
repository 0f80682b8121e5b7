//! Save/load of session metadata.

use super::{config, move_up, open, static_comb, step};
use awg_hal::SimulatedCard;
use awg_sequencer::synth::Calibration;
use awg_sequencer::{
    ControllerError, SequenceController, SequenceState, SequencerConfig, SessionMetadata,
};

fn programmed() -> SequenceController<SimulatedCard> {
    let mut ctl = open(1);
    ctl.set_sample_rate(500_000_000).unwrap();
    ctl.set_start_step(2).unwrap();
    ctl.set_max_output(200).unwrap();
    ctl.set_static_duration(0.004).unwrap();
    ctl.set_trigger(2, 1200, -300).unwrap();
    ctl.assign_segment(0, static_comb(3), 2.5).unwrap();
    ctl.assign_segment(1, move_up(), 0.05).unwrap();
    ctl.assign_segment(6, static_comb(1), 10.0).unwrap();
    for (i, next) in [(2, 3), (3, 10), (10, 2)] {
        ctl.assign_step(step(i, (i % 2) as u32, 2, next, 1)).unwrap();
    }
    ctl
}

#[test]
fn save_then_load_reproduces_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let original = programmed();
    original.save(&path).unwrap();

    let mut restored = open(0);
    let report = restored.load(&path).unwrap();
    assert!(report.warnings.is_empty());
    assert_eq!(report.segments, 3);
    assert_eq!(report.steps, 3);

    assert_eq!(restored.card(), original.card());
    assert!(restored.segments().flagged().is_empty());
    assert!(restored.steps().flagged().is_empty());
    for step in [2u16, 3, 10] {
        assert_eq!(
            restored.driver().step_word(step),
            original.driver().step_word(step)
        );
    }
    for segment in [0usize, 1, 6] {
        assert_eq!(
            restored.driver().segment_data(segment),
            original.driver().segment_data(segment)
        );
        assert_eq!(
            restored.segments().static_duration_of(segment),
            original.segments().static_duration_of(segment)
        );
    }
    assert_eq!(restored.metadata().segments, original.metadata().segments);
    assert_eq!(restored.metadata().steps, original.metadata().steps);
}

#[test]
fn saved_file_uses_legacy_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    programmed().save(&path).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let settings = &json["properties"]["card_settings"];
    assert_eq!(settings["sample_rate_Hz"], 500_000_000);
    assert_eq!(settings["max_output_mV"], 200);
    assert_eq!(settings["trig_mode"], 2);
    assert_eq!(settings["trig_level1_aux"], -300);
    assert_eq!(json["segments"]["segment_1"]["action_val"], 2);
    assert_eq!(json["steps"]["step_10"]["next_step"], 2);
    assert_eq!(json["steps"]["step_10"]["condition"], 1);
    assert!(json["calibration"].as_array().unwrap().is_empty());
}

#[test]
fn failed_assignments_are_not_saved() {
    let mut ctl = open(0);
    ctl.assign_segment(0, static_comb(1), 1.0).unwrap();
    ctl.assign_step(step(0, 0, 1, 0, 3)).unwrap();
    // Reassigning with bad input drops the earlier records.
    ctl.assign_segment(0, static_comb(1), -1.0).unwrap();
    ctl.assign_step(step(0, 0, 1, 0, 7)).unwrap();
    let session = ctl.metadata();
    assert!(session.segments.is_empty());
    assert!(session.steps.is_empty());
}

#[test]
fn load_restores_calibration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let mut cfg = config(0);
    cfg.calibration = Calibration::new(vec![[120.0, 0.6], [225.0, 1.0]]);
    let ctl = SequenceController::open(SimulatedCard::new(), &cfg).unwrap();
    ctl.save(&path).unwrap();

    let mut restored = open(0);
    assert!(restored.calibration().is_empty());
    restored.load(&path).unwrap();
    assert_eq!(restored.calibration(), &cfg.calibration);
}

#[test]
fn load_stops_a_running_card() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    programmed().save(&path).unwrap();

    let mut ctl = open(1);
    ctl.assign_segment(0, static_comb(1), 1.0).unwrap();
    ctl.assign_step(step(0, 0, 1, 0, 1)).unwrap();
    assert_eq!(ctl.start(1000).unwrap(), SequenceState::Armed);
    ctl.load(&path).unwrap();
    assert_eq!(ctl.state(), SequenceState::Idle);
    // The previous step graph is gone from the host tables.
    assert!(ctl.steps().record(0).is_none());
}

#[test]
fn default_start_writes_session_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = SequencerConfig::with_service_name("awg-test");
    assert!(cfg.metadata.save_on_start);
    cfg.card.trigger.mode = 0;
    cfg.metadata.directory = dir.path().join("runs");
    let mut ctl = SequenceController::open(SimulatedCard::new(), &cfg).unwrap();
    ctl.assign_segment(0, static_comb(1), 1.0).unwrap();
    ctl.assign_step(step(0, 0, 1, 0, 3)).unwrap();
    assert_eq!(ctl.start(1000).unwrap(), SequenceState::Idle);

    let files: Vec<_> = std::fs::read_dir(dir.path().join("runs"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("session_") && name.ends_with(".json"));
    let session = SessionMetadata::load(&files[0]).unwrap();
    assert_eq!(session.steps.len(), 1);
    assert_eq!(session.segments.len(), 1);
}

#[test]
fn refused_start_writes_no_session_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = SequencerConfig::with_service_name("awg-test");
    cfg.metadata.directory = dir.path().join("runs");
    let mut ctl = SequenceController::open(SimulatedCard::new(), &cfg).unwrap();
    ctl.assign_step(step(0, 0, 1, 0, 9)).unwrap();
    assert!(ctl.start(1000).is_err());
    assert!(!dir.path().join("runs").exists());
}

#[test]
fn load_of_missing_file_changes_nothing() {
    let mut ctl = open(0);
    let err = ctl.load(std::path::Path::new("/nonexistent/session.json")).unwrap_err();
    assert!(matches!(err, ControllerError::Persistence(_)));
    assert_eq!(ctl.card().segment_count(), 8);
}
