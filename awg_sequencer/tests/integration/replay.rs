//! Start gating, replay of the step graph, timeouts.

use super::{move_up, open, static_comb, step};
use awg_common::card::driver::CardCommand;
use awg_common::card::word::ControlWord;
use awg_hal::drivers::simulation::{EngineState, ReplayEvent};
use awg_sequencer::{Action, ControllerError, SequenceState, StaticParams};

#[test]
fn software_trigger_runs_to_termination() {
    let mut ctl = open(0);
    ctl.set_static_duration(0.0016384).unwrap();
    ctl.assign_segment(0, static_comb(2), 1.0).unwrap();
    ctl.assign_segment(1, move_up(), 0.01).unwrap();
    ctl.assign_step(step(0, 0, 1, 1, 2)).unwrap();
    ctl.assign_step(step(1, 1, 4, 0, 3)).unwrap();

    // Terminates immediately: Armed -> Idle on the first poll.
    assert_eq!(ctl.start(1000).unwrap(), SequenceState::Idle);
    assert_eq!(
        ctl.driver().replay_trace(),
        &[
            ReplayEvent {
                step: 0,
                segment: 0,
                loops: 610,
            },
            ReplayEvent {
                step: 1,
                segment: 1,
                loops: 4,
            },
        ]
    );
}

#[test]
fn external_trigger_walks_the_graph() {
    let mut ctl = open(1);
    ctl.assign_segment(0, static_comb(1), 0.5).unwrap();
    ctl.assign_segment(1, move_up(), 0.02).unwrap();
    ctl.assign_step(step(0, 0, 1, 1, 1)).unwrap();
    ctl.assign_step(step(1, 1, 1, 0, 3)).unwrap();

    assert_eq!(ctl.start(1000).unwrap(), SequenceState::Armed);
    assert_eq!(ctl.poll().unwrap(), SequenceState::Armed);

    let card = ctl.driver_mut();
    assert_eq!(card.fire_trigger().unwrap(), EngineState::WaitingForTrigger(0));
    assert_eq!(ctl.poll().unwrap(), SequenceState::Running);

    ctl.driver_mut().fire_trigger().unwrap();
    assert_eq!(ctl.poll().unwrap(), SequenceState::Idle);
    assert_eq!(ctl.driver().replay_trace().len(), 2);
}

#[test]
fn start_refused_while_flagged() {
    let mut ctl = open(0);
    ctl.assign_segment(0, static_comb(1), 1.0).unwrap();
    let bad = Action::Static(StaticParams::comb(300.0, 1, 1.0, 100.0));
    ctl.assign_segment(3, bad, 1.0).unwrap();
    ctl.assign_step(step(0, 0, 1, 1, 2)).unwrap();
    ctl.assign_step(step(5, 0, 0, 0, 2)).unwrap();
    ctl.assign_step(step(6, 0, 1, 0, 9)).unwrap();
    let commands_before = ctl.driver().command_log().len();

    match ctl.start(1000) {
        Err(ControllerError::NotReady { segments, steps }) => {
            assert_eq!(segments, vec![3]);
            assert_eq!(steps, vec![5, 6]);
        }
        other => panic!("expected NotReady, got {other:?}"),
    }
    assert_eq!(ctl.state(), SequenceState::Idle);
    assert_eq!(ctl.driver().command_log().len(), commands_before);
    assert!(ctl.driver().step_word(5).is_none());
}

#[test]
fn out_of_range_requests_block_start_without_touching_slots() {
    let mut ctl = open(1);
    ctl.assign_segment(7, static_comb(1), 5.0).unwrap();
    ctl.assign_step(step(0, 7, 1, 0, 1)).unwrap();
    let loops = ctl.steps().record(0).unwrap().num_of_loops;

    ctl.assign_segment(99, static_comb(2), 1.0).unwrap();
    ctl.assign_step(step(5000, 0, 1, 0, 1)).unwrap();
    assert_eq!(ctl.segments().static_duration_of(7), Some(5.0));
    assert!(ctl.segments().record(7).is_some());
    assert_eq!(ctl.metadata().segments.len(), 1);

    match ctl.start(1000) {
        Err(ControllerError::NotReady { segments, steps }) => {
            assert_eq!(segments, vec![99]);
            assert_eq!(steps, vec![5000]);
        }
        other => panic!("expected NotReady, got {other:?}"),
    }

    ctl.clear_rejected().unwrap();
    ctl.assign_step(step(0, 7, 1, 0, 1)).unwrap();
    assert_eq!(ctl.steps().record(0).unwrap().num_of_loops, loops);
    assert_eq!(ctl.start(1000).unwrap(), SequenceState::Armed);
}

#[test]
fn refusal_clears_once_fixed() {
    let mut ctl = open(1);
    ctl.assign_segment(0, static_comb(1), 1.0).unwrap();
    ctl.assign_step(step(0, 0, 1, 0, 0)).unwrap();
    assert!(ctl.start(1000).is_err());
    ctl.assign_step(step(0, 0, 1, 0, 1)).unwrap();
    assert_eq!(ctl.start(1000).unwrap(), SequenceState::Armed);
}

#[test]
fn timeout_faults_and_stops() {
    let mut ctl = open(0);
    ctl.assign_segment(0, static_comb(1), 1.0).unwrap();
    ctl.assign_step(step(0, 0, 1, 0, 3)).unwrap();
    ctl.driver_mut().inject_start_timeout();

    assert_eq!(ctl.start(250).unwrap(), SequenceState::Faulted);
    assert_eq!(
        ctl.driver().command_log().last(),
        Some(&CardCommand::CARD_STOP)
    );
    assert!(matches!(
        ctl.start(250),
        Err(ControllerError::InvalidTransition(_))
    ));

    assert_eq!(ctl.stop().unwrap(), SequenceState::Idle);
    assert_eq!(ctl.start(250).unwrap(), SequenceState::Idle);
}

#[test]
fn missing_start_segment_times_out() {
    let mut ctl = open(0);
    ctl.assign_step(step(0, 2, 1, 0, 3)).unwrap();
    assert_eq!(ctl.start(100).unwrap(), SequenceState::Faulted);
}

#[test]
fn stop_returns_to_idle_from_armed() {
    let mut ctl = open(1);
    ctl.assign_segment(0, static_comb(1), 1.0).unwrap();
    ctl.assign_step(step(0, 0, 1, 0, 1)).unwrap();
    assert_eq!(ctl.start(1000).unwrap(), SequenceState::Armed);
    assert!(matches!(
        ctl.start(1000),
        Err(ControllerError::InvalidTransition(_))
    ));
    assert_eq!(ctl.stop().unwrap(), SequenceState::Idle);
    assert!(ctl.driver().engine_state().is_none());
}

#[test]
fn self_loop_is_bounded_by_the_card() {
    let mut ctl = open(0);
    ctl.assign_segment(0, static_comb(1), 1.0).unwrap();
    ctl.assign_step(step(0, 0, 1, 0, 2)).unwrap();
    ctl.driver_mut().set_iteration_limit(50);
    assert_eq!(ctl.start(1000).unwrap(), SequenceState::Running);
    assert_eq!(ctl.driver().engine_state(), Some(EngineState::IterationLimit));
}

#[test]
fn static_reassigned_as_move_keeps_caller_loops() {
    let mut ctl = open(0);
    ctl.assign_segment(2, static_comb(1), 5.0).unwrap();
    ctl.assign_segment(2, move_up(), 0.01).unwrap();
    let record = ctl.assign_step(step(0, 2, 9, 0, 3)).unwrap().into_value();
    assert_eq!(record.num_of_loops, 9);
    let fields = ControlWord::decode(ctl.driver().step_word(0).unwrap()).unwrap();
    assert_eq!(fields.loop_count, 9);
}
