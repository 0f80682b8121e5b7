//! Step control word codec.
//!
//! One step of the replay graph is stored in step memory as a single
//! 64-bit word:
//!
//! ```text
//! word = (condition << 32) | (loop_count << 32) | (next_step << 16) | segment
//!
//!  63 62          52 51                 32 31          16 15           0
//! ┌─────┬──────────┬─────────────────────┬──────────────┬──────────────┐
//! │cond │ (unused) │     loop_count      │  next_step   │   segment    │
//! └─────┴──────────┴─────────────────────┴──────────────┴──────────────┘
//! ```
//!
//! Condition and loop count share the high dword: the firmware reads the
//! condition from the top two bits and the loop count from the low 20.
//! The packing must stay bit-exact; the two fields only stay disjoint
//! because loop counts are bounded by [`MAX_LOOP_COUNT`].

use crate::card::consts::MAX_LOOP_COUNT;
use crate::card::types::StepCondition;
use static_assertions::const_assert;
use thiserror::Error;

/// Shift of the shared condition/loop-count field.
pub const HIGH_SHIFT: u32 = 32;
/// Shift of the next-step field.
pub const NEXT_STEP_SHIFT: u32 = 16;
/// Mask of the 16-bit next-step and segment fields.
pub const FIELD_MASK_16: u64 = 0xFFFF;
/// Loop-count bits inside the high dword.
pub const LOOP_MASK: u64 = 0x000F_FFFF;
/// Condition bits inside the high dword.
pub const CONDITION_MASK: u64 = 0xC000_0000;

const_assert!(MAX_LOOP_COUNT as u64 <= LOOP_MASK);
const_assert!(LOOP_MASK & CONDITION_MASK == 0);
const_assert!(StepCondition::FLAG_END_ON_TRIGGER as u64 & !CONDITION_MASK == 0);
const_assert!(StepCondition::FLAG_TERMINATE as u64 & !CONDITION_MASK == 0);

/// Error decoding a control word read back from step memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ControlWordError {
    /// Condition bits do not name a known end condition.
    #[error("unknown step condition bits {0:#010x}")]
    UnknownCondition(u32),
}

/// Decoded fields of a step control word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepFields {
    /// End condition.
    pub condition: StepCondition,
    /// Number of segment replays.
    pub loop_count: u32,
    /// Successor step index.
    pub next_step: u16,
    /// Segment replayed by the step.
    pub segment: u16,
}

/// Raw 64-bit step-memory word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ControlWord(u64);

impl ControlWord {
    /// Pack the four step fields.
    ///
    /// Callers validate `loop_count` against [`MAX_LOOP_COUNT`] first; the
    /// packing itself is the legacy OR of overlapping shifts.
    #[inline]
    pub const fn encode(
        condition: StepCondition,
        loop_count: u32,
        next_step: u16,
        segment: u16,
    ) -> Self {
        Self(
            ((condition.device_flag() as u64) << HIGH_SHIFT)
                | ((loop_count as u64) << HIGH_SHIFT)
                | ((next_step as u64) << NEXT_STEP_SHIFT)
                | segment as u64,
        )
    }

    /// Wrap a word read back from step memory.
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw word value.
    #[inline]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Split the word back into its fields.
    pub fn decode(self) -> Result<StepFields, ControlWordError> {
        let high = self.0 >> HIGH_SHIFT;
        let flag = (high & CONDITION_MASK) as u32;
        let condition =
            StepCondition::from_device_flag(flag).ok_or(ControlWordError::UnknownCondition(flag))?;
        Ok(StepFields {
            condition,
            loop_count: (high & LOOP_MASK) as u32,
            next_step: ((self.0 >> NEXT_STEP_SHIFT) & FIELD_MASK_16) as u16,
            segment: (self.0 & FIELD_MASK_16) as u16,
        })
    }
}
