//! Signal-generator card vocabulary.
//!
//! This module contains the constants, register identities, replay
//! semantics and driver interface shared by the sequencer and the
//! driver implementations.

pub mod consts;
pub mod driver;
pub mod types;
pub mod word;
