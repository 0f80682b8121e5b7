//! Step table: the replay graph in card step memory.
//!
//! A step replays one segment `loops` times, then waits for a trigger,
//! moves on to `next` or halts. When the segment is static, the loop count
//! is derived from its registered hold time instead of taken from the
//! caller:
//!
//! ```text
//! loops = round(hold_ms / effective_static_ms)
//! ```
//!
//! where `effective_static_ms` is the static granule after the card's
//! floor-to-granule resolution.

use crate::card_config::CardConfig;
use crate::metadata::StepRecord;
use crate::segment::SegmentStore;
use crate::validate::{Checker, Validated, clamp_range};
use awg_common::card::consts::{MAX_LOOP_COUNT, MAX_STEP_INDEX, STEP_COUNT};
use awg_common::card::driver::{CardDriver, DeviceError};
use awg_common::card::types::StepCondition;
use awg_common::card::word::ControlWord;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Caller-supplied step fields, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRequest {
    /// Step index.
    pub step: u32,
    /// Segment replayed.
    pub segment: u32,
    /// Loop count (ignored for static segments).
    pub loops: u32,
    /// Successor step.
    pub next: u32,
    /// End condition code.
    pub condition: u8,
}

/// Step index → programmed control word and validity.
#[derive(Debug, Clone)]
pub struct StepTable {
    flags: Vec<bool>,
    records: BTreeMap<u16, StepRecord>,
    rejected: BTreeSet<u32>,
}

impl Default for StepTable {
    fn default() -> Self {
        Self::new()
    }
}

impl StepTable {
    /// Empty table, every step valid.
    pub fn new() -> Self {
        Self {
            flags: vec![false; STEP_COUNT],
            records: BTreeMap::new(),
            rejected: BTreeSet::new(),
        }
    }

    /// Forget every step.
    pub fn reset(&mut self) {
        self.flags.fill(false);
        self.records.clear();
        self.rejected.clear();
    }

    /// Forget requests made for step indices past the step memory.
    pub fn clear_rejected(&mut self) {
        self.rejected.clear();
    }

    /// True if the last assignment of `step` failed.
    pub fn is_flagged(&self, step: u16) -> bool {
        self.flags.get(usize::from(step)).copied().unwrap_or(false)
    }

    /// Steps whose last assignment failed, out-of-range requests last.
    pub fn flagged(&self) -> Vec<u32> {
        self.flags
            .iter()
            .enumerate()
            .filter(|(_, flagged)| **flagged)
            .map(|(step, _)| step as u32)
            .chain(self.rejected.iter().copied())
            .collect()
    }

    /// Record of a programmed step.
    pub fn record(&self, step: u16) -> Option<&StepRecord> {
        self.records.get(&step)
    }

    /// Records of every programmed step, in index order.
    pub fn records(&self) -> impl Iterator<Item = &StepRecord> {
        self.records.values()
    }

    /// Validate, encode and write one step.
    ///
    /// A step index past [`MAX_STEP_INDEX`] is flagged on its own; the
    /// step it would clamp to keeps its flag, record and card word.
    ///
    /// # Errors
    /// A device error while writing step memory flags the step and is returned.
    pub fn assign<D: CardDriver + ?Sized>(
        &mut self,
        driver: &mut D,
        card: &CardConfig,
        segments: &SegmentStore,
        request: StepRequest,
    ) -> Result<Validated<StepRecord>, DeviceError> {
        let mut checker = Checker::new();
        let max_step = u32::from(MAX_STEP_INDEX);

        let in_range = request.step <= max_step;
        let step = checker.absorb(clamp_range("step_value", request.step, 0, max_step)) as u16;
        let last_segment = card.segment_count().saturating_sub(1);
        let segment =
            checker.absorb(clamp_range("segment_value", request.segment, 0, last_segment)) as u16;
        let next = checker.absorb(clamp_range("next_step", request.next, 0, max_step)) as u16;

        let loops = match segments.static_duration_of(usize::from(segment)) {
            Some(hold_ms) => static_loops(hold_ms, card.effective_static_ms(), &mut checker),
            None => checker.absorb(clamp_range("num_of_loops", request.loops, 1, MAX_LOOP_COUNT)),
        };

        let condition = StepCondition::from_code(request.condition).unwrap_or_else(|| {
            checker.reject(
                "condition",
                format!(
                    "{} is not 1 (trigger), 2 (loop complete) or 3 (terminate); using 2",
                    request.condition
                ),
            );
            StepCondition::EndOnLoopComplete
        });

        if next == step && condition != StepCondition::Terminate {
            warn!(
                "Step {} loops onto itself; replay only leaves it when stopped",
                step
            );
        }

        let record = StepRecord {
            step_value: step,
            segment_value: segment,
            num_of_loops: loops,
            next_step: next,
            condition: condition.code(),
        };
        if !in_range {
            self.rejected.insert(request.step);
            warn!("Step {} rejected; no step changed", request.step);
            return Ok(checker.finish(record));
        }
        self.records.remove(&step);

        if !checker.is_clean() {
            self.flags[usize::from(step)] = true;
            warn!("Step {} flagged; step memory left unchanged", step);
            return Ok(checker.finish(record));
        }

        let word = ControlWord::encode(condition, loops, next, segment);
        if let Err(err) = driver.set_step_memory(step, word) {
            self.flags[usize::from(step)] = true;
            warn!("Step {} write failed: {}", step, err);
            return Err(err);
        }

        self.flags[usize::from(step)] = false;
        self.records.insert(step, record);
        info!(
            "Step {}: segment {} x{} -> {} ({:?}), word {:#018x}",
            step,
            segment,
            loops,
            next,
            condition,
            word.raw()
        );
        Ok(checker.finish(record))
    }
}

/// Loop count realising a static hold time.
fn static_loops(hold_ms: f64, granule_ms: f64, checker: &mut Checker) -> u32 {
    let loops = (hold_ms / granule_ms).round();
    if loops < 1.0 {
        checker.reject(
            "num_of_loops",
            format!("static hold of {hold_ms} ms is shorter than one {granule_ms} ms granule; using 1"),
        );
        1
    } else if loops > f64::from(MAX_LOOP_COUNT) {
        checker.reject(
            "num_of_loops",
            format!(
                "static hold of {hold_ms} ms needs {loops} loops; using {MAX_LOOP_COUNT}, raise the static duration"
            ),
        );
        MAX_LOOP_COUNT
    } else {
        loops as u32
    }
}
