//! Simulation driver implementation.
//!
//! The `SimulatedCard` implements the `CardDriver` trait with an in-memory
//! register file, partitioned sample memory, step memory and a replay engine
//! that executes the programmed step graph.

use super::memory::{SegmentMemory, StepMemory};
use super::replay::{DEFAULT_ITERATION_LIMIT, EngineState, ReplayEngine, ReplayEvent};
use awg_common::card::consts::{
    CHANNEL_MASK_ALL, DEFAULT_BYTES_PER_SAMPLE, MAX_SAMPLE_RATE_HZ, MAX_STEP_INDEX,
    MIN_SAMPLE_RATE_HZ, MIN_SEGMENTS,
};
use awg_common::card::driver::{
    CardCommand, CardDriver, DeviceError, DriverDiagnostics, Register,
};
use awg_common::card::types::{CardInfo, ReplayStatus, TriggerMask};
use awg_common::card::word::ControlWord;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Sample-rate resolution of the simulated clock generator.
const RATE_STEP_HZ: i64 = 1_000;

/// Identity of the simulated card.
const SIMULATED_INFO: CardInfo = CardInfo {
    card_type: 484_898,
    serial_number: 14_926,
    function_type: 2,
};

#[derive(Serialize)]
struct SimulationReport {
    segments: usize,
    loaded_segments: usize,
    programmed_steps: usize,
    replayed_steps: usize,
    engine_state: String,
}

/// Simulation driver implementing the CardDriver trait.
pub struct SimulatedCard {
    /// Driver name
    name: &'static str,
    /// Driver version
    version: &'static str,
    /// Identity registers
    info: CardInfo,
    /// Set once `close()` has run
    closed: bool,
    /// Writable registers without dedicated storage
    registers: HashMap<Register, i64>,
    /// Sample memory
    segments: SegmentMemory,
    /// Step memory
    steps: StepMemory,
    /// Replay engine (present between start and stop)
    engine: Option<ReplayEngine>,
    /// Iteration limit handed to new engines
    iteration_limit: usize,
    /// Fail the next start with a timeout
    fail_start: bool,
    /// Fail the next buffer transfer
    fail_transfer: bool,
    /// Every command written, in order
    command_log: Vec<CardCommand>,
    /// Diagnostics counters
    stats: DriverDiagnostics,
}

impl SimulatedCard {
    /// Create a new simulated card with power-on register values.
    pub fn new() -> Self {
        let registers = HashMap::from([
            (Register::SampleRate, MAX_SAMPLE_RATE_HZ as i64),
            (Register::ChannelEnable, 1),
            (Register::StartStep, 0),
            (Register::TriggerOrMask, i64::from(TriggerMask::SOFTWARE.bits())),
        ]);
        Self {
            name: "simulation",
            version: env!("CARGO_PKG_VERSION"),
            info: SIMULATED_INFO,
            closed: false,
            registers,
            segments: SegmentMemory::new(MIN_SEGMENTS as usize),
            steps: StepMemory::default(),
            engine: None,
            iteration_limit: DEFAULT_ITERATION_LIMIT,
            fail_start: false,
            fail_transfer: false,
            command_log: Vec::new(),
            stats: DriverDiagnostics::default(),
        }
    }

    /// Identity registers.
    pub fn info(&self) -> CardInfo {
        self.info
    }

    // ─── Test hooks ─────────────────────────────────────────────────

    /// Deliver an external trigger edge to the running sequence.
    pub fn fire_trigger(&mut self) -> Result<EngineState, DeviceError> {
        self.ensure_open()?;
        let engine = self
            .engine
            .as_mut()
            .ok_or_else(|| DeviceError::Register("trigger fired while card is stopped".into()))?;
        let state = engine.trigger();
        debug!("Trigger delivered, replay state {:?}", state);
        Ok(state)
    }

    /// Replay engine state, if the card is started.
    pub fn engine_state(&self) -> Option<EngineState> {
        self.engine.as_ref().map(ReplayEngine::state)
    }

    /// Steps executed since the last start.
    pub fn replay_trace(&self) -> &[ReplayEvent] {
        self.engine.as_ref().map(ReplayEngine::trace).unwrap_or(&[])
    }

    /// Samples stored in a segment.
    pub fn segment_data(&self, index: usize) -> Option<&[i16]> {
        self.segments.data(index)
    }

    /// Control word stored at a step.
    pub fn step_word(&self, step: u16) -> Option<ControlWord> {
        self.steps.read(step)
    }

    /// Make the next start time out.
    pub fn inject_start_timeout(&mut self) {
        self.fail_start = true;
    }

    /// Make the next buffer transfer fail.
    pub fn inject_transfer_failure(&mut self) {
        self.fail_transfer = true;
    }

    /// Bound on steps executed between trigger waits.
    pub fn set_iteration_limit(&mut self, limit: usize) {
        self.iteration_limit = limit;
    }

    /// True after `close()`.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Commands written so far.
    pub fn command_log(&self) -> &[CardCommand] {
        &self.command_log
    }

    // ─── Internals ──────────────────────────────────────────────────

    fn ensure_open(&self) -> Result<(), DeviceError> {
        if self.closed {
            Err(DeviceError::Closed)
        } else {
            Ok(())
        }
    }

    fn channel_count(&self) -> i64 {
        let mask = self.registers.get(&Register::ChannelEnable).copied().unwrap_or(1);
        i64::from((mask & i64::from(CHANNEL_MASK_ALL)).count_ones())
    }

    fn register(&self, register: Register) -> i64 {
        self.registers.get(&register).copied().unwrap_or_default()
    }

    fn timeout_ms(&self) -> u32 {
        u32::try_from(self.register(Register::Timeout)).unwrap_or(u32::MAX)
    }

    fn start_replay(&mut self, command: CardCommand) -> Result<(), DeviceError> {
        self.stats.starts += 1;
        let timeout_ms = self.timeout_ms();

        if self.fail_start {
            self.fail_start = false;
            warn!("Injected start timeout after {} ms", timeout_ms);
            return Err(DeviceError::Timeout { timeout_ms });
        }

        // The FIFO never fills when the start step or its segment is missing.
        let start_step = u16::try_from(self.register(Register::StartStep)).unwrap_or(u16::MAX);
        let segment = self
            .steps
            .read(start_step)
            .and_then(|word| word.decode().ok())
            .map(|fields| fields.segment as usize);
        match segment {
            Some(segment) if self.segments.is_loaded(segment) => {}
            _ => {
                warn!(
                    "Start step {} has no loaded segment; prefill timed out after {} ms",
                    start_step, timeout_ms
                );
                return Err(DeviceError::Timeout { timeout_ms });
            }
        }

        let mut engine = ReplayEngine::new(self.steps.snapshot(), start_step)
            .with_iteration_limit(self.iteration_limit);
        let mask = TriggerMask::from_bits_truncate(self.register(Register::TriggerOrMask) as u32);
        if command.contains(CardCommand::CARD_ENABLETRIGGER) && mask.contains(TriggerMask::SOFTWARE)
        {
            engine.trigger();
        }
        info!(
            "Replay started at step {} (trigger mask {:?}), state {:?}",
            start_step,
            mask,
            engine.state()
        );
        self.engine = Some(engine);
        Ok(())
    }
}

impl Default for SimulatedCard {
    fn default() -> Self {
        Self::new()
    }
}

impl CardDriver for SimulatedCard {
    fn name(&self) -> &'static str {
        self.name
    }

    fn version(&self) -> &'static str {
        self.version
    }

    fn set_register(&mut self, register: Register, value: i64) -> Result<(), DeviceError> {
        self.ensure_open()?;
        self.stats.register_writes += 1;

        match register {
            Register::CardType
            | Register::SerialNumber
            | Register::FunctionType
            | Register::ChannelCount
            | Register::BytesPerSample
            | Register::SeqModeStatus => {
                return Err(DeviceError::Register(format!(
                    "{register:?} is read only"
                )));
            }
            Register::SampleRate => {
                let achieved = value.clamp(MIN_SAMPLE_RATE_HZ as i64, MAX_SAMPLE_RATE_HZ as i64)
                    / RATE_STEP_HZ
                    * RATE_STEP_HZ;
                if achieved != value {
                    debug!("Sample rate {} Hz realised as {} Hz", value, achieved);
                }
                self.registers.insert(register, achieved);
            }
            Register::ChannelEnable => {
                let mask = value & i64::from(CHANNEL_MASK_ALL);
                if mask == 0 {
                    return Err(DeviceError::Register(format!(
                        "channel mask {value:#x} enables no channel"
                    )));
                }
                self.registers.insert(register, mask);
            }
            Register::MaxSegments => {
                let count = usize::try_from(value)
                    .map_err(|_| DeviceError::Register(format!("segment count {value}")))?;
                self.segments.partition(count)?;
                self.engine = None;
            }
            Register::WriteSegment => {
                let index = usize::try_from(value)
                    .map_err(|_| DeviceError::Register(format!("write segment {value}")))?;
                self.segments.select(index)?;
            }
            Register::SegmentSize => {
                let samples = usize::try_from(value)
                    .map_err(|_| DeviceError::Register(format!("segment size {value}")))?;
                self.segments.declare_size(samples)?;
            }
            Register::StepMemory(step) => {
                self.steps.write(step, ControlWord::from_raw(value as u64))?;
            }
            Register::StartStep => {
                if !(0..=i64::from(MAX_STEP_INDEX)).contains(&value) {
                    return Err(DeviceError::Register(format!(
                        "start step {value} outside 0..={MAX_STEP_INDEX}"
                    )));
                }
                self.registers.insert(register, value);
            }
            Register::Amplitude0 | Register::Timeout => {
                if value < 0 {
                    return Err(DeviceError::Register(format!(
                        "{register:?} cannot be negative ({value})"
                    )));
                }
                self.registers.insert(register, value);
            }
            _ => {
                self.registers.insert(register, value);
            }
        }
        Ok(())
    }

    fn get_register(&self, register: Register) -> Result<i64, DeviceError> {
        self.ensure_open()?;
        Ok(match register {
            Register::CardType => self.info.card_type,
            Register::SerialNumber => self.info.serial_number,
            Register::FunctionType => self.info.function_type,
            Register::ChannelCount => self.channel_count(),
            Register::BytesPerSample => i64::from(DEFAULT_BYTES_PER_SAMPLE),
            Register::MaxSegments => self.segments.count() as i64,
            Register::WriteSegment => self.segments.selected() as i64,
            Register::SegmentSize => self.segments.declared_size() as i64,
            Register::StepMemory(step) => {
                self.steps.read(step).map(|w| w.raw() as i64).unwrap_or_default()
            }
            Register::SeqModeStatus => {
                let status = self
                    .engine
                    .as_ref()
                    .map(|engine| engine.state().status())
                    .unwrap_or(ReplayStatus::Idle);
                status as i64
            }
            other => self.register(other),
        })
    }

    fn write_buffer(&mut self, samples: &[i16]) -> Result<(), DeviceError> {
        self.ensure_open()?;
        if self.fail_transfer {
            self.fail_transfer = false;
            return Err(DeviceError::Transfer(format!(
                "injected failure writing segment {}",
                self.segments.selected()
            )));
        }
        let channels = self.channel_count() as usize;
        self.segments.store(samples, channels)?;
        self.stats.transfers += 1;
        self.stats.samples_transferred += samples.len() as u64;
        debug!(
            "Segment {} loaded with {} values ({} channels)",
            self.segments.selected(),
            samples.len(),
            channels
        );
        Ok(())
    }

    fn command(&mut self, command: CardCommand) -> Result<(), DeviceError> {
        self.ensure_open()?;
        self.command_log.push(command);

        if command.contains(CardCommand::CARD_STOP) {
            if self.engine.take().is_some() {
                info!("Replay stopped");
            }
            return Ok(());
        }
        if command.contains(CardCommand::CARD_START) {
            return self.start_replay(command);
        }
        // DMA commands complete inside write_buffer.
        Ok(())
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        self.ensure_open()?;
        self.engine = None;
        self.closed = true;
        info!("Simulated card {} closed", self.info.serial_number);
        Ok(())
    }

    fn diagnostics(&self) -> Option<DriverDiagnostics> {
        let report = SimulationReport {
            segments: self.segments.count(),
            loaded_segments: (0..self.segments.count())
                .filter(|&i| self.segments.is_loaded(i))
                .count(),
            programmed_steps: self.steps.snapshot().len(),
            replayed_steps: self.replay_trace().len(),
            engine_state: format!("{:?}", self.engine_state()),
        };
        let mut diagnostics = self.stats.clone();
        diagnostics.custom = serde_json::to_string(&report).ok();
        Some(diagnostics)
    }
}
