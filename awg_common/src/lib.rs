//! AWG Common Library
//!
//! This crate provides the shared vocabulary of the AWG sequence workspace:
//! device limits, the register-level driver interface and the step
//! control-word codec, plus TOML configuration loading utilities.
//!
//! # Module Structure
//!
//! - [`card`] - Device constants, driver trait, register vocabulary, control word
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use awg_common::prelude::*;
//!
//! let word = ControlWord::encode(StepCondition::EndOnLoopComplete, 10, 1, 0);
//! assert_eq!(word.decode().unwrap().loop_count, 10);
//! ```

#![deny(missing_docs)]

pub mod card;
pub mod config;
pub mod prelude;
