//! # AWG HAL Library
//!
//! Card driver layer of the AWG sequence workspace.
//!
//! Drivers implement the `CardDriver` trait defined in
//! `awg_common::card::driver`; the sequencer picks one by name through the
//! [`DriverRegistry`].
//!
//! # Module Structure
//!
//! - [`driver_registry`] - Driver factory registration
//! - [`drivers`] - Driver implementations
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐      ┌─────────────────────┐
//! │ SequenceController   │─────►│  CardDriver (trait) │
//! │ (awg_sequencer)      │      └──────────┬──────────┘
//! └──────────────────────┘                 │
//!                               ┌──────────▼──────────┐
//!                               │  SimulatedCard      │
//!                               │  registers, memory, │
//!                               │  replay engine      │
//!                               └─────────────────────┘
//! ```

#![deny(missing_docs)]

pub mod driver_registry;
pub mod drivers;

pub use crate::driver_registry::DriverRegistry;
pub use crate::drivers::simulation::SimulatedCard;
