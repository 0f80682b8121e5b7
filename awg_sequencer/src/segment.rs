//! Segment store: what each card memory segment holds.
//!
//! Each slot carries a validity flag and, once programmed, the record that
//! goes into the session metadata. Requests for an index past the last slot
//! touch no slot; the index is kept in a rejection list instead. Static segments additionally register
//! their requested hold time in a side table; the step that replays the
//! segment turns it into a loop count (see [`SegmentStore::static_duration_of`]).
//!
//! # Device protocol
//!
//! `WriteSegment(index)` → `SegmentSize(samples)` → `write_buffer`. Nothing
//! is written for a flagged segment.

use crate::card_config::CardConfig;
use crate::metadata::SegmentRecord;
use crate::synth::{Action, SynthContext, Waveform, synthesize};
use crate::validate::{Checker, Validated, clamp_range};
use awg_common::card::driver::{CardDriver, DeviceError, Register};
use awg_common::card::types::ActionKind;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
struct Slot {
    flagged: bool,
    record: Option<SegmentRecord>,
}

/// Segment index → programmed waveform and validity.
#[derive(Debug, Clone)]
pub struct SegmentStore {
    slots: Vec<Slot>,
    static_durations: BTreeMap<usize, f64>,
    rejected: BTreeSet<usize>,
}

impl SegmentStore {
    /// Store with `count` empty, valid slots.
    pub fn new(count: usize) -> Self {
        Self {
            slots: vec![Slot::default(); count],
            static_durations: BTreeMap::new(),
            rejected: BTreeSet::new(),
        }
    }

    /// Forget every segment and resize to `count` slots.
    pub fn reset(&mut self, count: usize) {
        self.slots = vec![Slot::default(); count];
        self.static_durations.clear();
        self.rejected.clear();
    }

    /// Forget requests made for indices past the last slot.
    pub fn clear_rejected(&mut self) {
        self.rejected.clear();
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if the store has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Requested hold time of a static segment, in milliseconds.
    pub fn static_duration_of(&self, index: usize) -> Option<f64> {
        self.static_durations.get(&index).copied()
    }

    /// True if the last assignment of `index` failed.
    pub fn is_flagged(&self, index: usize) -> bool {
        self.slots.get(index).is_some_and(|slot| slot.flagged) || self.rejected.contains(&index)
    }

    /// Indices whose last assignment failed, out-of-range requests last.
    pub fn flagged(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.flagged)
            .map(|(index, _)| index)
            .chain(self.rejected.iter().copied())
            .collect()
    }

    /// Record of a programmed segment.
    pub fn record(&self, index: usize) -> Option<&SegmentRecord> {
        self.slots.get(index)?.record.as_ref()
    }

    /// Records of every programmed segment, in index order.
    pub fn records(&self) -> impl Iterator<Item = &SegmentRecord> {
        self.slots.iter().filter_map(|slot| slot.record.as_ref())
    }

    /// Synthesise `action` into segment `index` and load it into the card.
    ///
    /// Static segments are synthesised over the card's static granule and
    /// `duration_ms` is registered as their hold time. Other actions use
    /// `duration_ms` directly, bounded by one granule and the card's
    /// maximum segment duration.
    ///
    /// Returns the record written, [`Validated::Clamped`] when any input was
    /// replaced (the segment is then flagged and nothing is transferred).
    /// An index past the last slot is flagged on its own and leaves every
    /// slot, its record and its static registration as they were.
    ///
    /// # Errors
    /// A device error during the transfer flags the segment and is returned.
    pub fn assign<D: CardDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        card: &CardConfig,
        ctx: &SynthContext<'_>,
        index: usize,
        action: Action,
        duration_ms: f64,
    ) -> Result<Validated<SegmentRecord>, DeviceError> {
        let mut checker = Checker::new();
        let kind = action.kind();

        let requested = index;
        let last = self.slots.len().saturating_sub(1);
        let in_range = requested < self.slots.len();
        let index = if in_range {
            requested
        } else {
            checker.reject(
                "segment",
                format!("{requested} outside 0..={last}; nothing stored"),
            );
            last
        };

        if in_range && self.static_durations.remove(&index).is_some() {
            debug!("Segment {} leaves the static duration table", index);
        }

        let synth_ms = match kind {
            ActionKind::Static => {
                if duration_ms.is_finite() && duration_ms > 0.0 {
                    if in_range {
                        self.static_durations.insert(index, duration_ms);
                    }
                } else {
                    checker.reject(
                        "duration",
                        format!("static hold time {duration_ms} ms must be positive"),
                    );
                }
                card.static_duration_ms()
            }
            ActionKind::Move | ActionKind::Ramp => {
                let min = card.granule_duration_ms();
                let max = (card.max_duration_ms() as f64).max(min);
                if duration_ms.is_nan() {
                    checker.reject("duration", format!("not a number; using {min} ms"));
                    min
                } else {
                    checker.absorb(clamp_range("duration", duration_ms, min, max))
                }
            }
        };

        let waveform = checker.absorb(synthesize(&action, synth_ms, ctx));
        let record = SegmentRecord {
            segment: index,
            action_val: kind.code(),
            duration: duration_ms,
            params: action,
            num_of_samples: waveform.sample_count,
            effective_start_freq_mhz: waveform.effective_start_mhz.clone(),
            effective_end_freq_mhz: waveform.effective_end_mhz.clone(),
            effective_start_amp: waveform.effective_start_amps.clone(),
            effective_total_amp_mv: waveform.total_amp_mv,
        };

        if !in_range {
            self.rejected.insert(requested);
            warn!("Segment {} rejected; no slot changed", requested);
            return Ok(checker.finish(record));
        }
        let Some(slot) = self.slots.get_mut(index) else {
            return Ok(checker.finish(record));
        };
        slot.record = None;

        if !checker.is_clean() {
            slot.flagged = true;
            warn!("Segment {} flagged; nothing written to the card", index);
            return Ok(checker.finish(record));
        }

        if let Err(err) = load(driver, index, &waveform) {
            slot.flagged = true;
            warn!("Segment {} transfer failed: {}", index, err);
            return Err(err);
        }

        slot.flagged = false;
        slot.record = Some(record.clone());
        info!(
            "Segment {} loaded: {:?}, {} samples, {} ms requested",
            index, kind, waveform.sample_count, duration_ms
        );
        Ok(checker.finish(record))
    }
}

fn load<D: CardDriver + ?Sized>(driver: &mut D, index: usize, waveform: &Waveform) -> Result<(), DeviceError> {
    driver.set_register(Register::WriteSegment, index as i64)?;
    driver.set_register(Register::SegmentSize, waveform.sample_count as i64)?;
    driver.write_buffer(&waveform.samples)
}
