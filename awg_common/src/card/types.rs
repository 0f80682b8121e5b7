//! Enumerations shared between the sequencer and the drivers.
//!
//! All enums carry the numeric codes used by the persisted metadata
//! (`action_val`, `condition`, `trig_mode`) and convert from raw codes
//! with `from_code`, returning `None` for out-of-range values.

use bitflags::bitflags;
use serde::Serialize;

// ─── Waveform Actions ───────────────────────────────────────────────

/// Waveform choreography primitive programmed into a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ActionKind {
    /// Fixed multi-tone (static traps).
    Static = 1,
    /// Frequency-interpolated move.
    Move = 2,
    /// Amplitude ramp at fixed frequencies.
    Ramp = 3,
}

impl ActionKind {
    /// Convert from the persisted `action_val` code.
    #[inline]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Static),
            2 => Some(Self::Move),
            3 => Some(Self::Ramp),
            _ => None,
        }
    }

    /// Persisted `action_val` code.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

// ─── Step End Conditions ────────────────────────────────────────────

/// What a step does once its segment has been replayed `loop_count` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StepCondition {
    /// Wait for an external trigger edge before advancing.
    EndOnTrigger = 1,
    /// Advance to the next step immediately.
    EndOnLoopComplete = 2,
    /// Halt the sequence after this step.
    Terminate = 3,
}

impl StepCondition {
    /// Device flag for "end loop on trigger" (high dword of the control word).
    pub const FLAG_END_ON_TRIGGER: u32 = 0x4000_0000;
    /// Device flag for "end loop always".
    pub const FLAG_END_ON_LOOP_COMPLETE: u32 = 0x0000_0000;
    /// Device flag for "end of sequence".
    pub const FLAG_TERMINATE: u32 = 0x8000_0000;

    /// Convert from the persisted `condition` code.
    #[inline]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::EndOnTrigger),
            2 => Some(Self::EndOnLoopComplete),
            3 => Some(Self::Terminate),
            _ => None,
        }
    }

    /// Persisted `condition` code.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Flag value the device firmware expects for this condition.
    #[inline]
    pub const fn device_flag(self) -> u32 {
        match self {
            Self::EndOnTrigger => Self::FLAG_END_ON_TRIGGER,
            Self::EndOnLoopComplete => Self::FLAG_END_ON_LOOP_COMPLETE,
            Self::Terminate => Self::FLAG_TERMINATE,
        }
    }

    /// Convert back from a device flag value.
    #[inline]
    pub const fn from_device_flag(flag: u32) -> Option<Self> {
        match flag {
            Self::FLAG_END_ON_TRIGGER => Some(Self::EndOnTrigger),
            Self::FLAG_END_ON_LOOP_COMPLETE => Some(Self::EndOnLoopComplete),
            Self::FLAG_TERMINATE => Some(Self::Terminate),
            _ => None,
        }
    }
}

// ─── Trigger ────────────────────────────────────────────────────────

bitflags! {
    /// Trigger sources OR-ed into the trigger mask register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TriggerMask: u32 {
        /// Software trigger (fires immediately on start).
        const SOFTWARE = 0x0001;
        /// External trigger input 0 (main trigger).
        const EXT0     = 0x0002;
    }
}

bitflags! {
    /// Edge/level detection flags written to the EXT0 mode register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TriggerModeFlags: u32 {
        /// Positive slope.
        const POS        = 0x0000_0001;
        /// Negative slope.
        const NEG        = 0x0000_0002;
        /// Either slope.
        const BOTH       = 0x0000_0004;
        /// Above level 0 (gate).
        const HIGH       = 0x0000_0008;
        /// Below level 0 (gate).
        const LOW        = 0x0000_0010;
        /// Entering the window between level 0 and level 1.
        const WINENTER   = 0x0000_0020;
        /// Leaving the window between level 0 and level 1.
        const WINLEAVE   = 0x0000_0040;
        /// Inside the window (gate).
        const INWIN      = 0x0000_0080;
        /// Outside the window (gate).
        const OUTSIDEWIN = 0x0000_0100;
        /// Rearm on level 1 to suppress noise triggering.
        const REARM      = 0x0100_0000;
    }
}

/// Trigger mode selected by the persisted `trig_mode` code (0..=11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum TriggerMode {
    /// Software trigger.
    Software = 0,
    /// Positive slope on level 0.
    #[default]
    Positive = 1,
    /// Negative slope on level 0.
    Negative = 2,
    /// Positive slope, rearm on level 1.
    PositiveRearm = 3,
    /// Negative slope, rearm on level 1.
    NegativeRearm = 4,
    /// Either slope.
    Both = 5,
    /// Gate while above level 0.
    High = 6,
    /// Gate while below level 0.
    Low = 7,
    /// Entering the level window.
    WindowEnter = 8,
    /// Leaving the level window.
    WindowLeave = 9,
    /// Gate while inside the level window.
    InsideWindow = 10,
    /// Gate while outside the level window.
    OutsideWindow = 11,
}

impl TriggerMode {
    /// Highest valid mode code.
    pub const MAX_CODE: u8 = 11;

    /// Convert from the persisted `trig_mode` code.
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Software,
            1 => Self::Positive,
            2 => Self::Negative,
            3 => Self::PositiveRearm,
            4 => Self::NegativeRearm,
            5 => Self::Both,
            6 => Self::High,
            7 => Self::Low,
            8 => Self::WindowEnter,
            9 => Self::WindowLeave,
            10 => Self::InsideWindow,
            11 => Self::OutsideWindow,
            _ => return None,
        })
    }

    /// Persisted `trig_mode` code.
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// True for the software trigger.
    #[inline]
    pub const fn is_software(self) -> bool {
        matches!(self, Self::Software)
    }

    /// EXT0 mode register flags. Empty for the software trigger.
    pub fn mode_flags(self) -> TriggerModeFlags {
        use TriggerModeFlags as F;
        match self {
            Self::Software => F::empty(),
            Self::Positive => F::POS,
            Self::Negative => F::NEG,
            Self::PositiveRearm => F::POS | F::REARM,
            Self::NegativeRearm => F::NEG | F::REARM,
            Self::Both => F::BOTH,
            Self::High => F::HIGH,
            Self::Low => F::LOW,
            Self::WindowEnter => F::WINENTER,
            Self::WindowLeave => F::WINLEAVE,
            Self::InsideWindow => F::INWIN,
            Self::OutsideWindow => F::OUTSIDEWIN,
        }
    }
}

// ─── Replay Status ──────────────────────────────────────────────────

/// Sequence-replay status reported through the status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ReplayStatus {
    /// Card stopped.
    #[default]
    Idle = 0,
    /// Started, waiting for the first trigger.
    Armed = 1,
    /// Executing the step graph.
    Running = 2,
    /// A terminating step completed.
    Finished = 3,
}

impl ReplayStatus {
    /// Convert from a raw register value.
    pub const fn from_raw(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::Idle),
            1 => Some(Self::Armed),
            2 => Some(Self::Running),
            3 => Some(Self::Finished),
            _ => None,
        }
    }
}

// ─── Card Identity ──────────────────────────────────────────────────

/// Identity registers read when a session opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CardInfo {
    /// Card type code.
    pub card_type: i64,
    /// Serial number.
    pub serial_number: i64,
    /// Function type (2 = generator).
    pub function_type: i64,
}
