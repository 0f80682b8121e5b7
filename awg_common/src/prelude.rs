//! Prelude module for common re-exports.
//!
//! ```rust
//! use awg_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, SharedConfig};

// ─── Device Interface ───────────────────────────────────────────────
pub use crate::card::driver::{CardCommand, CardDriver, DeviceError, DriverFactory, Register};

// ─── Replay Vocabulary ──────────────────────────────────────────────
pub use crate::card::types::{ActionKind, CardInfo, ReplayStatus, StepCondition, TriggerMode};
pub use crate::card::word::{ControlWord, StepFields};
