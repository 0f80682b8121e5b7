//! Sequence controller.
//!
//! Owns one card session: the driver handle, the validated [`CardConfig`],
//! the [`SegmentStore`] and [`StepTable`], and the replay state machine.
//! All calls are synchronous; polling is caller-driven through [`poll`].
//!
//! # Session lifecycle
//!
//! ```text
//! open ─► set_* / assign_segment / assign_step ─► start ─► poll … ─► stop
//!   │                                                                 │
//!   └──────────────── save / load ◄───────────────────────────────────┘
//!                                 restart ─► Closed (terminal)
//! ```
//!
//! [`poll`]: SequenceController::poll

pub mod state;

pub use state::{SequenceEvent, SequenceState, SequenceStateMachine, TransitionResult};

use crate::card_config::{CardConfig, TriggerSettings};
use crate::config::{AodConfig, MetadataConfig, SequencerConfig};
use crate::error::ControllerError;
use crate::metadata::{CardSettings, SegmentRecord, SessionMetadata, StepRecord};
use crate::segment::SegmentStore;
use crate::step::{StepRequest, StepTable};
use crate::synth::{Action, Calibration};
use crate::validate::{Diagnostic, Validated};
use awg_common::card::driver::{CARD_MODE_SEQUENCE, CardDriver, DeviceError, Register};
use awg_common::card::types::{CardInfo, ReplayStatus, TriggerMask, TriggerMode};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Card value readable through [`SequenceController::read_parameter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardParameter {
    /// Achieved sample rate in Hz.
    SampleRate,
    /// Number of memory segments.
    SegmentCount,
    /// First step executed on start.
    StartStep,
    /// Enabled channel mask.
    ChannelEnable,
    /// Number of enabled channels.
    ChannelCount,
    /// EXT0 level 0 in millivolts.
    TriggerLevel0,
    /// EXT0 level 1 in millivolts.
    TriggerLevel1,
    /// EXT0 mode flags.
    TriggerMode,
    /// Segment selected for writing.
    WriteSegment,
    /// Size of the selected segment.
    SegmentSize,
}

impl CardParameter {
    fn register(self) -> Register {
        match self {
            Self::SampleRate => Register::SampleRate,
            Self::SegmentCount => Register::MaxSegments,
            Self::StartStep => Register::StartStep,
            Self::ChannelEnable => Register::ChannelEnable,
            Self::ChannelCount => Register::ChannelCount,
            Self::TriggerLevel0 => Register::TriggerExt0Level0,
            Self::TriggerLevel1 => Register::TriggerExt0Level1,
            Self::TriggerMode => Register::TriggerExt0Mode,
            Self::WriteSegment => Register::WriteSegment,
            Self::SegmentSize => Register::SegmentSize,
        }
    }
}

/// Outcome of replaying a session file.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Segments replayed.
    pub segments: usize,
    /// Steps replayed.
    pub steps: usize,
    /// Every clamp raised while replaying.
    pub warnings: Vec<Diagnostic>,
}

impl LoadReport {
    fn collect<T>(&mut self, validated: Validated<T>) -> T {
        match validated {
            Validated::Accepted(value) => value,
            Validated::Clamped { value, warnings } => {
                self.warnings.extend(warnings);
                value
            }
        }
    }
}

/// Single owner of one card session.
pub struct SequenceController<D: CardDriver> {
    driver: D,
    info: CardInfo,
    card: CardConfig,
    segments: SegmentStore,
    steps: StepTable,
    aod: AodConfig,
    calibration: Calibration,
    metadata: MetadataConfig,
    machine: SequenceStateMachine,
}

impl<D: CardDriver> SequenceController<D> {
    // ─── Session ────────────────────────────────────────────────────

    /// Open a session on `driver` and apply the `[card]` settings.
    ///
    /// # Errors
    /// Any register access failure aborts the open.
    pub fn open(driver: D, config: &SequencerConfig) -> Result<Self, ControllerError> {
        let info = CardInfo {
            card_type: driver.get_register(Register::CardType)?,
            serial_number: driver.get_register(Register::SerialNumber)?,
            function_type: driver.get_register(Register::FunctionType)?,
        };
        info!(
            "Opened {} driver v{}: card type {}, serial {}, function {}",
            driver.name(),
            driver.version(),
            info.card_type,
            info.serial_number,
            info.function_type
        );

        let card = CardConfig::new();
        let mut controller = Self {
            driver,
            info,
            segments: SegmentStore::new(card.segment_count() as usize),
            card,
            steps: StepTable::new(),
            aod: config.aod,
            calibration: config.calibration.clone(),
            metadata: config.metadata.clone(),
            machine: SequenceStateMachine::new(),
        };
        controller.initialise(config)?;
        Ok(controller)
    }

    fn initialise(&mut self, config: &SequencerConfig) -> Result<(), ControllerError> {
        let section = &config.card;
        self.driver.set_register(Register::CardMode, CARD_MODE_SEQUENCE)?;
        self.driver.set_register(Register::ClockOut, 0)?;
        self.set_sample_rate(section.sample_rate_hz)?;
        self.set_channel_mask(section.channel_mask)?;
        self.set_segment_count(section.num_segments)?;
        self.set_start_step(section.start_step)?;
        self.driver.set_register(Register::EnableOut0, 1)?;
        self.set_max_output(section.max_output_mv)?;
        self.write_trigger(TriggerSettings {
            mode: TriggerMode::Software,
            ..TriggerSettings::default()
        })?;
        self.set_trigger(
            section.trigger.mode,
            section.trigger.level0_mv,
            section.trigger.level1_mv,
        )?;
        self.set_static_duration(section.static_duration_ms)?;
        info!(
            "Card ready: {} Hz, {} segments of up to {} ms, {} channel(s)",
            self.card.sample_rate_hz(),
            self.card.segment_count(),
            self.card.max_duration_ms(),
            self.card.channel_count()
        );
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), ControllerError> {
        if self.machine.state() == SequenceState::Closed {
            Err(ControllerError::Closed)
        } else {
            Ok(())
        }
    }

    fn transition(&mut self, event: SequenceEvent) -> SequenceState {
        let from = self.machine.state();
        match self.machine.handle_event(event) {
            TransitionResult::Ok(to) => {
                if to != from {
                    info!("Sequence {:?} -> {:?} on {:?}", from, to, event);
                }
                to
            }
            TransitionResult::Rejected(reason) => {
                debug!("Ignored {:?} in {:?}: {}", event, from, reason);
                from
            }
        }
    }

    /// Stop the card and return to Idle.
    fn halt(&mut self) -> Result<(), ControllerError> {
        self.driver.stop()?;
        self.transition(SequenceEvent::Stop);
        Ok(())
    }

    // ─── Card settings ──────────────────────────────────────────────

    /// Stop the card, request a sample rate and read back the achieved one.
    pub fn set_sample_rate(&mut self, requested_hz: u64) -> Result<Validated<u64>, ControllerError> {
        self.ensure_open()?;
        self.halt()?;
        let validated = self.card.set_sample_rate(requested_hz);
        self.driver
            .set_register(Register::SampleRate, *validated.value() as i64)?;
        let achieved = u64::try_from(self.driver.get_register(Register::SampleRate)?)
            .map_err(|_| DeviceError::Register("negative sample rate read back".into()))?;
        if achieved != *validated.value() {
            info!("Requested {} Hz, card runs at {} Hz", validated.value(), achieved);
        }
        self.card.sync_sample_rate(achieved);
        Ok(validated.map(|_| achieved))
    }

    /// Enable channels and read back channel count and sample width.
    pub fn set_channel_mask(&mut self, mask: u8) -> Result<Validated<u8>, ControllerError> {
        self.ensure_open()?;
        let validated = self.card.set_channel_mask(mask);
        self.driver
            .set_register(Register::ChannelEnable, i64::from(*validated.value()))?;
        let channels = self.driver.get_register(Register::ChannelCount)?;
        let bytes = self.driver.get_register(Register::BytesPerSample)?;
        self.card
            .sync_channels(channels.max(1) as u32, bytes.max(1) as u32);
        Ok(validated)
    }

    /// Re-partition card memory. Every segment is forgotten.
    pub fn set_segment_count(&mut self, requested: u32) -> Result<Validated<u32>, ControllerError> {
        self.ensure_open()?;
        let validated = self.card.set_segment_count(requested);
        let count = *validated.value();
        self.driver.set_register(Register::MaxSegments, i64::from(count))?;
        self.segments.reset(count as usize);
        info!(
            "Memory split into {} segments of {} samples",
            count,
            self.card.max_samples_per_segment()
        );
        Ok(validated)
    }

    /// Set the first step executed on start.
    pub fn set_start_step(&mut self, step: u32) -> Result<Validated<u16>, ControllerError> {
        self.ensure_open()?;
        let validated = self.card.set_start_step(step);
        self.driver
            .set_register(Register::StartStep, i64::from(*validated.value()))?;
        Ok(validated)
    }

    /// Set the card output amplitude.
    pub fn set_max_output(&mut self, mv: u32) -> Result<Validated<u32>, ControllerError> {
        self.ensure_open()?;
        let validated = self.card.set_max_output(mv);
        self.driver
            .set_register(Register::Amplitude0, i64::from(*validated.value()))?;
        Ok(validated)
    }

    /// Set the static granule duration. Host-side only.
    pub fn set_static_duration(&mut self, ms: f64) -> Result<Validated<f64>, ControllerError> {
        self.ensure_open()?;
        Ok(self.card.set_static_duration(ms))
    }

    /// Stop the card and reprogram the trigger.
    pub fn set_trigger(
        &mut self,
        mode: u8,
        level0_mv: i32,
        level1_mv: i32,
    ) -> Result<Validated<TriggerSettings>, ControllerError> {
        self.ensure_open()?;
        self.halt()?;
        let validated = self.card.set_trigger(mode, level0_mv, level1_mv);
        self.write_trigger(*validated.value())?;
        Ok(validated)
    }

    fn write_trigger(&mut self, settings: TriggerSettings) -> Result<(), DeviceError> {
        let d = &mut self.driver;
        if settings.mode.is_software() {
            d.set_register(Register::TriggerOrMask, i64::from(TriggerMask::SOFTWARE.bits()))?;
        } else {
            d.set_register(Register::TriggerOrMask, 0)?;
            d.set_register(Register::TriggerOrMask, i64::from(TriggerMask::EXT0.bits()))?;
            d.set_register(Register::TriggerExt0Level0, i64::from(settings.level0_mv))?;
            d.set_register(Register::TriggerExt0Level1, i64::from(settings.level1_mv))?;
            d.set_register(
                Register::TriggerExt0Mode,
                i64::from(settings.mode.mode_flags().bits()),
            )?;
        }
        d.set_register(Register::TriggerOut, 0)?;
        debug!("Trigger set to {:?}", settings);
        Ok(())
    }

    /// Read a value back from the card.
    pub fn read_parameter(&self, parameter: CardParameter) -> Result<i64, ControllerError> {
        self.ensure_open()?;
        Ok(self.driver.get_register(parameter.register())?)
    }

    // ─── Programming ────────────────────────────────────────────────

    /// Synthesise and load one segment. See [`SegmentStore::assign`].
    pub fn assign_segment(
        &mut self,
        index: usize,
        action: Action,
        duration_ms: f64,
    ) -> Result<Validated<SegmentRecord>, ControllerError> {
        self.ensure_open()?;
        let ctx = self.card.synth_context(&self.aod, &self.calibration);
        Ok(self.segments.assign(
            &mut self.driver,
            &self.card,
            &ctx,
            index,
            action,
            duration_ms,
        )?)
    }

    /// Validate and write one step. See [`StepTable::assign`].
    pub fn assign_step(&mut self, request: StepRequest) -> Result<Validated<StepRecord>, ControllerError> {
        self.ensure_open()?;
        Ok(self
            .steps
            .assign(&mut self.driver, &self.card, &self.segments, request)?)
    }

    /// Drop out-of-range segment and step requests from the refusal list.
    ///
    /// They never reached a slot, so no reassignment can clear them.
    pub fn clear_rejected(&mut self) -> Result<(), ControllerError> {
        self.ensure_open()?;
        self.segments.clear_rejected();
        self.steps.clear_rejected();
        Ok(())
    }

    // ─── Replay ─────────────────────────────────────────────────────

    /// Start replay.
    ///
    /// Refused with [`ControllerError::NotReady`] while any segment or step
    /// is flagged, including requests for indices past the card's range;
    /// nothing reaches the card in that case. With
    /// `metadata.save_on_start` the session is written before the card is
    /// started. A start timeout
    /// stops the card and returns `Ok(SequenceState::Faulted)`.
    pub fn start(&mut self, timeout_ms: u32) -> Result<SequenceState, ControllerError> {
        self.ensure_open()?;
        if let TransitionResult::Rejected(reason) = self.machine.clone().handle_event(SequenceEvent::Start) {
            return Err(ControllerError::InvalidTransition(reason));
        }

        let segments = self.segments.flagged();
        let steps = self.steps.flagged();
        if !segments.is_empty() || !steps.is_empty() {
            warn!(
                "Start refused: flagged segments {:?}, flagged steps {:?}",
                segments, steps
            );
            return Err(ControllerError::NotReady { segments, steps });
        }

        if self.metadata.save_on_start {
            let path = self.session_path();
            if let Err(err) = self.save(&path) {
                warn!("Could not save session to {}: {}", path.display(), err);
            }
        }

        match self.driver.start(timeout_ms) {
            Ok(()) => {
                self.transition(SequenceEvent::Start);
                self.poll()
            }
            Err(DeviceError::Timeout { timeout_ms }) => {
                error!("Card did not start within {} ms; stopping", timeout_ms);
                self.transition(SequenceEvent::DeviceFault);
                if let Err(err) = self.driver.stop() {
                    error!("Stop after timeout failed: {}", err);
                }
                Ok(SequenceState::Faulted)
            }
            Err(err) => {
                error!("Start failed: {}", err);
                self.transition(SequenceEvent::DeviceFault);
                Err(err.into())
            }
        }
    }

    /// Read the replay status and advance the state machine.
    pub fn poll(&mut self) -> Result<SequenceState, ControllerError> {
        self.ensure_open()?;
        if !self.machine.is_active() {
            return Ok(self.machine.state());
        }
        let status = match self.driver.replay_status() {
            Ok(status) => status,
            Err(err) => {
                self.transition(SequenceEvent::DeviceFault);
                return Err(err.into());
            }
        };
        let state = match status {
            ReplayStatus::Armed => self.machine.state(),
            ReplayStatus::Running => self.transition(SequenceEvent::Progress),
            ReplayStatus::Finished => self.transition(SequenceEvent::Finished),
            ReplayStatus::Idle => self.transition(SequenceEvent::Stopped),
        };
        Ok(state)
    }

    /// Stop replay. Valid from every state except Closed.
    pub fn stop(&mut self) -> Result<SequenceState, ControllerError> {
        self.ensure_open()?;
        self.halt()?;
        Ok(self.machine.state())
    }

    /// Stop the card and release the handle. Terminal for this session.
    pub fn restart(&mut self) -> Result<(), ControllerError> {
        self.ensure_open()?;
        if let Err(err) = self.driver.stop() {
            warn!("Stop before release failed: {}", err);
        }
        self.driver.close()?;
        self.transition(SequenceEvent::Release);
        info!("Card {} released", self.info.serial_number);
        Ok(())
    }

    // ─── Persistence ────────────────────────────────────────────────

    /// Snapshot of the current session.
    pub fn metadata(&self) -> SessionMetadata {
        let mut settings = CardSettings::capture(&self.card);
        settings.driver = self.driver.name().to_string();
        settings.serial_number = self.info.serial_number;
        let mut session = SessionMetadata::new(settings);
        for record in self.segments.records() {
            session.insert_segment(record.clone());
        }
        for record in self.steps.records() {
            session.insert_step(*record);
        }
        session.calibration = self.calibration.points.clone();
        session
    }

    /// Write the current session to `path`.
    pub fn save(&self, path: &Path) -> Result<(), ControllerError> {
        self.metadata().save(path)
    }

    /// Stop the card and replay a session file.
    pub fn load(&mut self, path: &Path) -> Result<LoadReport, ControllerError> {
        self.ensure_open()?;
        let session = SessionMetadata::load(path)?;
        self.halt()?;
        let settings = &session.properties.card_settings;
        let mut report = LoadReport::default();

        let v = self.set_sample_rate(settings.sample_rate_hz)?;
        report.collect(v);
        let v = self.set_segment_count(settings.num_of_segments)?;
        report.collect(v);
        let v = self.set_start_step(u32::from(settings.start_step))?;
        report.collect(v);
        let v = self.set_max_output(settings.max_output_mv)?;
        report.collect(v);
        let v = self.set_static_duration(settings.static_duration_ms)?;
        report.collect(v);
        let v = self.set_trigger(
            settings.trig_mode,
            settings.trig_level0_main,
            settings.trig_level1_aux,
        )?;
        report.collect(v);

        if !session.calibration.is_empty() {
            let calibration = Calibration::new(session.calibration.clone());
            match calibration.validate() {
                Ok(()) => self.calibration = calibration,
                Err(reason) => warn!("Keeping current calibration: {}", reason),
            }
        }
        self.steps.reset();

        for record in session.segments_in_order() {
            if record.action_val != record.params.kind().code() {
                warn!(
                    "segment_{}: action_val {} disagrees with {:?} parameters; using the parameters",
                    record.segment,
                    record.action_val,
                    record.params.kind()
                );
            }
            let v = self.assign_segment(record.segment, record.params.clone(), record.duration)?;
            report.collect(v);
            report.segments += 1;
        }
        for record in session.steps_in_order() {
            let v = self.assign_step(StepRequest {
                step: u32::from(record.step_value),
                segment: u32::from(record.segment_value),
                loops: record.num_of_loops,
                next: u32::from(record.next_step),
                condition: record.condition,
            })?;
            report.collect(v);
            report.steps += 1;
        }

        info!(
            "Loaded {}: {} segments, {} steps, {} warnings",
            path.display(),
            report.segments,
            report.steps,
            report.warnings.len()
        );
        Ok(report)
    }

    fn session_path(&self) -> PathBuf {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.metadata.directory.join(format!("session_{secs}.json"))
    }

    // ─── Accessors ──────────────────────────────────────────────────

    /// Current replay state.
    pub fn state(&self) -> SequenceState {
        self.machine.state()
    }

    /// Identity read at open.
    pub fn info(&self) -> CardInfo {
        self.info
    }

    /// Card configuration.
    pub fn card(&self) -> &CardConfig {
        &self.card
    }

    /// Segment store.
    pub fn segments(&self) -> &SegmentStore {
        &self.segments
    }

    /// Step table.
    pub fn steps(&self) -> &StepTable {
        &self.steps
    }

    /// Calibration in use.
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Driver handle.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Mutable driver handle, for driver-specific hooks.
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Give up the session and return the driver.
    pub fn into_driver(self) -> D {
        self.driver
    }
}
