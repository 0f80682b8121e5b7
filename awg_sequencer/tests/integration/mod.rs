//! Shared fixtures.

mod persistence;
mod replay;
mod session;

use awg_hal::SimulatedCard;
use awg_sequencer::{
    Action, MoveParams, SequenceController, SequencerConfig, StaticParams, StepRequest,
};

/// Default configuration with the given trigger mode and 8 segments, no
/// session files.
pub fn config(trigger_mode: u8) -> SequencerConfig {
    let mut config = SequencerConfig::with_service_name("awg-test");
    config.card.num_segments = 8;
    config.card.trigger.mode = trigger_mode;
    config.metadata.save_on_start = false;
    config
}

/// Controller on a fresh simulated card.
pub fn open(trigger_mode: u8) -> SequenceController<SimulatedCard> {
    SequenceController::open(SimulatedCard::new(), &config(trigger_mode)).unwrap()
}

pub fn static_comb(traps: usize) -> Action {
    Action::Static(StaticParams::comb(150.0, traps, 0.329 * 5.0, 100.0))
}

pub fn move_up() -> Action {
    Action::Move(MoveParams::between(vec![150.0], vec![160.0], 0.5, 100.0))
}

pub fn step(step: u32, segment: u32, loops: u32, next: u32, condition: u8) -> StepRequest {
    StepRequest {
        step,
        segment,
        loops,
        next,
        condition,
    }
}
