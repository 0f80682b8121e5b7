//! # AWG Sequencer Library
//!
//! Sequence-replay controller for a multi-tone arbitrary waveform generator
//! driving an acousto-optic deflector. Card memory is split into segments,
//! each holding one synthesised waveform; a step graph in card memory tells
//! the card which segment to replay, how often, and where to go next.
//!
//! ## Layers
//!
//! 1. [`card_config`]: validated device-level parameters
//! 2. [`synth`]: waveform synthesis (static traps, moves, amplitude ramps)
//! 3. [`segment`]: segment index → waveform, validity, static hold times
//! 4. [`step`]: step index → control word, validity
//! 5. [`controller`]: session owner and replay state machine
//!
//! ## Validation
//!
//! Out-of-range input never aborts: it is clamped, reported as a
//! [`validate::Diagnostic`], and the owning segment or step is flagged.
//! [`SequenceController::start`] refuses while anything is flagged.

#![deny(missing_docs)]

pub mod card_config;
pub mod config;
pub mod controller;
pub mod error;
pub mod metadata;
pub mod segment;
pub mod step;
pub mod synth;
pub mod validate;

pub use card_config::{CardConfig, TriggerSettings};
pub use config::SequencerConfig;
pub use controller::{CardParameter, LoadReport, SequenceController, SequenceState};
pub use error::ControllerError;
pub use metadata::SessionMetadata;
pub use segment::SegmentStore;
pub use step::{StepRequest, StepTable};
pub use synth::{Action, MoveParams, RampParams, StaticParams, ToneSpec};
pub use validate::{Diagnostic, Validated};
