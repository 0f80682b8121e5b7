//! Card driver trait and error types.
//!
//! This module defines:
//! - `CardDriver` trait - Register/memory interface of a sequence-replay card
//! - `DeviceError` enum - Error types for device operations
//! - `Register` enum - Register identities understood by every driver
//! - `CardCommand` flags - Commands written to the command register
//! - `DriverFactory` type alias - Factory function type
//! - `DriverDiagnostics` struct - Optional driver diagnostics

use crate::card::types::ReplayStatus;
use crate::card::word::ControlWord;
use bitflags::bitflags;
use thiserror::Error;

/// Error types for device operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// No card could be opened.
    #[error("Card not found: {0}")]
    NotOpen(String),

    /// The handle was released by `close()`.
    #[error("Card handle has been closed")]
    Closed,

    /// The card did not reach the requested state in time.
    #[error("Card timed out after {timeout_ms} ms")]
    Timeout {
        /// Timeout that elapsed.
        timeout_ms: u32,
    },

    /// Bulk transfer to card memory failed.
    #[error("Buffer transfer failed: {0}")]
    Transfer(String),

    /// Register access rejected by the card.
    #[error("Register access failed: {0}")]
    Register(String),
}

/// Register identities of the sequence-replay card.
///
/// Numeric register addresses are an implementation detail of each driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// Card type code (read only).
    CardType,
    /// Serial number (read only).
    SerialNumber,
    /// Function type (read only).
    FunctionType,
    /// Replay mode selector.
    CardMode,
    /// Clock output enable.
    ClockOut,
    /// Sample rate in Hz. The achieved value may differ from the request.
    SampleRate,
    /// Enabled channel bitmask.
    ChannelEnable,
    /// Number of enabled channels (read only).
    ChannelCount,
    /// Bytes used by one sample (read only).
    BytesPerSample,
    /// Output enable of channel 0.
    EnableOut0,
    /// Output amplitude of channel 0 in millivolts.
    Amplitude0,
    /// Number of memory segments.
    MaxSegments,
    /// First step executed on start.
    StartStep,
    /// Segment selected for the next buffer write.
    WriteSegment,
    /// Size in samples of the selected segment.
    SegmentSize,
    /// Step memory entry at the given index.
    StepMemory(u16),
    /// Start timeout in milliseconds.
    Timeout,
    /// Trigger source OR-mask.
    TriggerOrMask,
    /// EXT0 level 0 in millivolts.
    TriggerExt0Level0,
    /// EXT0 level 1 in millivolts.
    TriggerExt0Level1,
    /// EXT0 detection mode.
    TriggerExt0Mode,
    /// Trigger output enable.
    TriggerOut,
    /// Sequence replay status (read only, see [`ReplayStatus`]).
    SeqModeStatus,
}

/// Card mode value selecting standard sequence replay.
pub const CARD_MODE_SEQUENCE: i64 = 0x0004_0000;

bitflags! {
    /// Commands written to the card command register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CardCommand: u32 {
        /// Start the card.
        const CARD_START         = 0x0000_0004;
        /// Enable trigger detection.
        const CARD_ENABLETRIGGER = 0x0000_0008;
        /// Stop the card.
        const CARD_STOP          = 0x0000_0040;
        /// Block until the output FIFO is pre-filled.
        const CARD_WAITPREFULL   = 0x0000_1000;
    }
}

impl CardCommand {
    /// Start, arm the trigger and wait for the FIFO to fill.
    pub const START_REPLAY: Self = Self::from_bits_truncate(
        Self::CARD_START.bits() | Self::CARD_ENABLETRIGGER.bits() | Self::CARD_WAITPREFULL.bits(),
    );
}

/// Factory function type for creating driver instances.
pub type DriverFactory = fn() -> Box<dyn CardDriver>;

/// Optional driver diagnostics.
#[derive(Debug, Clone, Default)]
pub struct DriverDiagnostics {
    /// Number of register writes
    pub register_writes: u64,
    /// Number of completed buffer transfers
    pub transfers: u64,
    /// Total samples transferred
    pub samples_transferred: u64,
    /// Number of start commands issued
    pub starts: u64,
    /// Driver-specific diagnostics (JSON string)
    pub custom: Option<String>,
}

/// Trait defining the register/memory interface of a sequence-replay card.
///
/// The sequencer owns exactly one driver per physical card and talks to it
/// only through this trait, enabling pluggable backends (simulation,
/// vendor library, remote card).
///
/// # Protocol
///
/// 1. Configure: `set_register` / `get_register` (sample rate is always read back)
/// 2. Load segments: `WriteSegment`, `SegmentSize`, then `write_buffer`
/// 3. Load steps: `set_step_memory`
/// 4. Run: `start(timeout_ms)`, later `stop()`
/// 5. Release: `close()`
///
/// # Blocking Contracts
///
/// | Operation | Blocking | Partial completion |
/// |-----------|----------|--------------------|
/// | `write_buffer()` | until data is in card memory | never exposed |
/// | `start()` | until armed or timeout | never exposed |
/// | `stop()` | until stopped | never exposed |
pub trait CardDriver: Send {
    /// Returns the driver's unique identifier (e.g., "simulation").
    fn name(&self) -> &'static str;

    /// Returns the driver's semantic version.
    fn version(&self) -> &'static str;

    /// Write a register.
    fn set_register(&mut self, register: Register, value: i64) -> Result<(), DeviceError>;

    /// Read a register.
    fn get_register(&self, register: Register) -> Result<i64, DeviceError>;

    /// Blocking bulk transfer of interleaved samples into the segment
    /// selected by `WriteSegment`.
    ///
    /// # Errors
    /// Returns `DeviceError::Transfer` if the buffer does not match the
    /// declared segment size or the transfer fails.
    fn write_buffer(&mut self, samples: &[i16]) -> Result<(), DeviceError>;

    /// Write the command register.
    ///
    /// # Errors
    /// Returns `DeviceError::Timeout` when a waiting command exceeds the
    /// `Timeout` register.
    fn command(&mut self, command: CardCommand) -> Result<(), DeviceError>;

    /// Release the card handle. All later calls fail with `DeviceError::Closed`.
    fn close(&mut self) -> Result<(), DeviceError>;

    /// Write one step-memory entry.
    fn set_step_memory(&mut self, step: u16, word: ControlWord) -> Result<(), DeviceError> {
        self.set_register(Register::StepMemory(step), word.raw() as i64)
    }

    /// Program the timeout, then start replay and wait for the FIFO.
    fn start(&mut self, timeout_ms: u32) -> Result<(), DeviceError> {
        self.set_register(Register::Timeout, i64::from(timeout_ms))?;
        self.command(CardCommand::START_REPLAY)
    }

    /// Stop replay.
    fn stop(&mut self) -> Result<(), DeviceError> {
        self.command(CardCommand::CARD_STOP)
    }

    /// Read the replay status register.
    fn replay_status(&self) -> Result<ReplayStatus, DeviceError> {
        let raw = self.get_register(Register::SeqModeStatus)?;
        ReplayStatus::from_raw(raw)
            .ok_or_else(|| DeviceError::Register(format!("unknown replay status {raw}")))
    }

    /// Get driver-specific diagnostics.
    /// Default: None
    fn diagnostics(&self) -> Option<DriverDiagnostics> {
        None
    }
}

impl<T: CardDriver + ?Sized> CardDriver for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn version(&self) -> &'static str {
        (**self).version()
    }

    fn set_register(&mut self, register: Register, value: i64) -> Result<(), DeviceError> {
        (**self).set_register(register, value)
    }

    fn get_register(&self, register: Register) -> Result<i64, DeviceError> {
        (**self).get_register(register)
    }

    fn write_buffer(&mut self, samples: &[i16]) -> Result<(), DeviceError> {
        (**self).write_buffer(samples)
    }

    fn command(&mut self, command: CardCommand) -> Result<(), DeviceError> {
        (**self).command(command)
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        (**self).close()
    }

    fn set_step_memory(&mut self, step: u16, word: ControlWord) -> Result<(), DeviceError> {
        (**self).set_step_memory(step, word)
    }

    fn start(&mut self, timeout_ms: u32) -> Result<(), DeviceError> {
        (**self).start(timeout_ms)
    }

    fn stop(&mut self) -> Result<(), DeviceError> {
        (**self).stop()
    }

    fn replay_status(&self) -> Result<ReplayStatus, DeviceError> {
        (**self).replay_status()
    }

    fn diagnostics(&self) -> Option<DriverDiagnostics> {
        (**self).diagnostics()
    }
}
