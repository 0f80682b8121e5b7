//! Session open, card settings and release.

use super::{config, open, static_comb, step};
use awg_common::card::driver::{CardDriver, Register};
use awg_common::card::types::{TriggerMask, TriggerModeFlags};
use awg_hal::SimulatedCard;
use awg_sequencer::{CardParameter, ControllerError, SequenceController, SequenceState};

#[test]
fn open_applies_configuration() {
    let ctl = open(1);
    assert_eq!(ctl.info().serial_number, 14_926);
    assert_eq!(ctl.read_parameter(CardParameter::SampleRate).unwrap(), 625_000_000);
    assert_eq!(ctl.read_parameter(CardParameter::SegmentCount).unwrap(), 8);
    assert_eq!(ctl.read_parameter(CardParameter::ChannelCount).unwrap(), 1);
    assert_eq!(ctl.card().segment_count(), 8);
    assert_eq!(ctl.segments().len(), 8);
    assert_eq!(ctl.state(), SequenceState::Idle);
    assert_eq!(
        ctl.driver().get_register(Register::TriggerOrMask).unwrap(),
        i64::from(TriggerMask::EXT0.bits())
    );
}

#[test]
fn open_clamps_bad_configuration() {
    let mut cfg = config(42);
    cfg.card.num_segments = 100;
    cfg.card.max_output_mv = 1000;
    let ctl = SequenceController::open(SimulatedCard::new(), &cfg).unwrap();
    assert_eq!(ctl.card().segment_count(), 128);
    assert_eq!(ctl.card().max_output_mv(), 282);
    assert_eq!(ctl.driver().get_register(Register::Amplitude0).unwrap(), 282);
    assert_eq!(ctl.card().trigger().mode.code(), 1);
}

#[test]
fn sample_rate_is_read_back() {
    let mut ctl = open(0);
    let v = ctl.set_sample_rate(300_000_500).unwrap();
    // The simulated clock runs in 1 kHz steps.
    assert_eq!(*v.value(), 300_000_000);
    assert_eq!(ctl.card().sample_rate_hz(), 300_000_000);
    assert!((ctl.card().static_duration_ms() - 1024.0 / 300_000.0).abs() < 1e-12);
}

#[test]
fn trigger_register_protocol() {
    let mut ctl = open(0);
    assert_eq!(
        ctl.driver().get_register(Register::TriggerOrMask).unwrap(),
        i64::from(TriggerMask::SOFTWARE.bits())
    );

    let v = ctl.set_trigger(3, 1000, 500).unwrap();
    assert!(!v.is_clamped());
    let d = ctl.driver();
    assert_eq!(
        d.get_register(Register::TriggerOrMask).unwrap(),
        i64::from(TriggerMask::EXT0.bits())
    );
    assert_eq!(
        d.get_register(Register::TriggerExt0Mode).unwrap(),
        i64::from((TriggerModeFlags::POS | TriggerModeFlags::REARM).bits())
    );
    assert_eq!(ctl.read_parameter(CardParameter::TriggerLevel0).unwrap(), 1000);
    assert_eq!(ctl.read_parameter(CardParameter::TriggerLevel1).unwrap(), 500);
    assert_eq!(d.get_register(Register::TriggerOut).unwrap(), 0);
}

#[test]
fn segment_count_change_forgets_segments() {
    let mut ctl = open(0);
    ctl.assign_segment(1, static_comb(2), 1.0).unwrap();
    ctl.assign_segment(99, static_comb(2), 1.0).unwrap();
    assert_eq!(ctl.segments().flagged(), vec![99]);

    let v = ctl.set_segment_count(3).unwrap();
    assert_eq!(*v.value(), 4);
    assert!(ctl.segments().flagged().is_empty());
    assert_eq!(ctl.segments().records().count(), 0);
    assert_eq!(ctl.segments().static_duration_of(1), None);
    assert_eq!(ctl.read_parameter(CardParameter::SegmentCount).unwrap(), 4);
}

#[test]
fn segment_write_order_reaches_card() {
    let mut ctl = open(0);
    let record = ctl.assign_segment(5, static_comb(3), 2.0).unwrap().into_value();
    assert_eq!(ctl.read_parameter(CardParameter::WriteSegment).unwrap(), 5);
    assert_eq!(
        ctl.read_parameter(CardParameter::SegmentSize).unwrap(),
        record.num_of_samples as i64
    );
    assert_eq!(
        ctl.driver().segment_data(5).unwrap().len(),
        record.num_of_samples
    );
}

#[test]
fn two_channels_double_the_buffer() {
    let mut ctl = open(0);
    ctl.set_channel_mask(0b0011).unwrap();
    assert_eq!(ctl.card().channel_count(), 2);
    let record = ctl.assign_segment(0, static_comb(1), 1.0).unwrap().into_value();
    assert_eq!(
        ctl.driver().segment_data(0).unwrap().len(),
        2 * record.num_of_samples
    );
}

#[test]
fn restart_releases_the_card() {
    let mut ctl = open(0);
    ctl.restart().unwrap();
    assert_eq!(ctl.state(), SequenceState::Closed);
    assert!(ctl.driver().is_closed());
    assert!(matches!(ctl.start(100), Err(ControllerError::Closed)));
    assert!(matches!(ctl.stop(), Err(ControllerError::Closed)));
    assert!(matches!(
        ctl.assign_step(step(0, 0, 1, 0, 3)),
        Err(ControllerError::Closed)
    ));
    assert!(matches!(ctl.restart(), Err(ControllerError::Closed)));
    assert!(ctl.into_driver().is_closed());
}
