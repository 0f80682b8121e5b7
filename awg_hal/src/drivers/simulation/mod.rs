//! Simulation driver module.
//!
//! This module provides an in-memory sequence-replay card for development
//! and testing without physical hardware.

mod driver;
mod memory;
mod replay;

pub use driver::SimulatedCard;
pub use memory::{SegmentMemory, StepMemory};
pub use replay::{EngineState, ReplayEngine, ReplayEvent};

use awg_common::card::driver::CardDriver;

/// Factory function to create a simulation driver instance.
pub fn create_driver() -> Box<dyn CardDriver> {
    Box::new(SimulatedCard::new())
}
