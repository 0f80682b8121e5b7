//! Step-graph replay engine.
//!
//! Executes the control words held in step memory the way the card
//! firmware does:
//!
//! - a step replays its segment `loop_count` times;
//! - `EndOnTrigger` then waits for a trigger edge before moving to `next_step`;
//! - `EndOnLoopComplete` moves to `next_step` immediately;
//! - `Terminate` halts the sequence.
//!
//! A step whose `next_step` is itself (or any cycle without a trigger wait)
//! never halts on its own. The engine stops such graphs after
//! `iteration_limit` executed steps and reports `EngineState::IterationLimit`.

use awg_common::card::types::{ReplayStatus, StepCondition};
use awg_common::card::word::ControlWord;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Default bound on steps executed between two trigger waits.
pub const DEFAULT_ITERATION_LIMIT: usize = 100_000;

/// One executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplayEvent {
    /// Step index.
    pub step: u16,
    /// Segment replayed.
    pub segment: u16,
    /// Number of times the segment was replayed.
    pub loops: u32,
}

/// Execution state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Started, waiting for the first trigger.
    Armed,
    /// Parked on an `EndOnTrigger` step.
    WaitingForTrigger(u16),
    /// A `Terminate` step completed.
    Finished,
    /// Cycle without trigger wait exceeded the iteration limit.
    IterationLimit,
    /// The referenced step memory entry is missing or undecodable.
    Fault(u16),
}

impl EngineState {
    /// Status reported through the status register.
    pub fn status(self) -> ReplayStatus {
        match self {
            Self::Armed => ReplayStatus::Armed,
            Self::WaitingForTrigger(_) | Self::IterationLimit => ReplayStatus::Running,
            Self::Finished => ReplayStatus::Finished,
            Self::Fault(_) => ReplayStatus::Idle,
        }
    }
}

/// Replay engine over a snapshot of step memory.
#[derive(Debug, Clone)]
pub struct ReplayEngine {
    steps: BTreeMap<u16, ControlWord>,
    current: u16,
    state: EngineState,
    trace: Vec<ReplayEvent>,
    iteration_limit: usize,
}

impl ReplayEngine {
    /// Create an engine armed at `start_step`.
    pub fn new(steps: BTreeMap<u16, ControlWord>, start_step: u16) -> Self {
        Self {
            steps,
            current: start_step,
            state: EngineState::Armed,
            trace: Vec::new(),
            iteration_limit: DEFAULT_ITERATION_LIMIT,
        }
    }

    /// Override the iteration limit.
    pub fn with_iteration_limit(mut self, limit: usize) -> Self {
        self.iteration_limit = limit.max(1);
        self
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Steps executed so far.
    #[inline]
    pub fn trace(&self) -> &[ReplayEvent] {
        &self.trace
    }

    /// Deliver a trigger edge.
    ///
    /// From `Armed` the replay starts at the start step. From
    /// `WaitingForTrigger` the waiting step advances to its successor.
    /// In any other state the edge is ignored.
    pub fn trigger(&mut self) -> EngineState {
        match self.state {
            EngineState::Armed => self.run(),
            EngineState::WaitingForTrigger(step) => {
                match self.fields(step) {
                    Some((_, next)) => self.current = next,
                    None => {
                        self.state = EngineState::Fault(step);
                        return self.state;
                    }
                }
                self.run()
            }
            other => {
                debug!("Trigger ignored in state {:?}", other);
                other
            }
        }
    }

    /// Execute steps from `current` until a wait, halt or the iteration limit.
    fn run(&mut self) -> EngineState {
        for _ in 0..self.iteration_limit {
            let step = self.current;
            let Some(word) = self.steps.get(&step).copied() else {
                warn!("Replay reached unprogrammed step {}", step);
                self.state = EngineState::Fault(step);
                return self.state;
            };
            let fields = match word.decode() {
                Ok(fields) => fields,
                Err(e) => {
                    warn!("Step {} holds an invalid control word: {}", step, e);
                    self.state = EngineState::Fault(step);
                    return self.state;
                }
            };

            self.trace.push(ReplayEvent {
                step,
                segment: fields.segment,
                loops: fields.loop_count,
            });

            match fields.condition {
                StepCondition::EndOnTrigger => {
                    self.state = EngineState::WaitingForTrigger(step);
                    return self.state;
                }
                StepCondition::EndOnLoopComplete => self.current = fields.next_step,
                StepCondition::Terminate => {
                    self.state = EngineState::Finished;
                    return self.state;
                }
            }
        }

        warn!(
            "Replay exceeded {} steps without waiting or terminating (step {} loops forever)",
            self.iteration_limit, self.current
        );
        self.state = EngineState::IterationLimit;
        self.state
    }

    fn fields(&self, step: u16) -> Option<(StepCondition, u16)> {
        let fields = self.steps.get(&step)?.decode().ok()?;
        Some((fields.condition, fields.next_step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(entries: &[(u16, StepCondition, u32, u16, u16)]) -> BTreeMap<u16, ControlWord> {
        entries
            .iter()
            .map(|&(step, cond, loops, next, seg)| (step, ControlWord::encode(cond, loops, next, seg)))
            .collect()
    }

    #[test]
    fn linear_sequence_terminates() {
        let steps = graph(&[
            (0, StepCondition::EndOnLoopComplete, 3, 1, 0),
            (1, StepCondition::EndOnLoopComplete, 1, 2, 1),
            (2, StepCondition::Terminate, 5, 0, 2),
        ]);
        let mut engine = ReplayEngine::new(steps, 0);
        assert_eq!(engine.state(), EngineState::Armed);
        assert_eq!(engine.trigger(), EngineState::Finished);
        let segments: Vec<u16> = engine.trace().iter().map(|e| e.segment).collect();
        assert_eq!(segments, vec![0, 1, 2]);
        assert_eq!(engine.trace()[0].loops, 3);
    }

    #[test]
    fn trigger_wait_parks_until_next_edge() {
        let steps = graph(&[
            (0, StepCondition::EndOnTrigger, 1, 1, 0),
            (1, StepCondition::EndOnLoopComplete, 1, 0, 1),
        ]);
        let mut engine = ReplayEngine::new(steps, 0);
        assert_eq!(engine.trigger(), EngineState::WaitingForTrigger(0));
        assert_eq!(engine.trace().len(), 1);
        // Step 1 loops back to step 0 which waits again.
        assert_eq!(engine.trigger(), EngineState::WaitingForTrigger(0));
        assert_eq!(engine.trace().len(), 3);
        assert_eq!(engine.state().status(), ReplayStatus::Running);
    }

    #[test]
    fn self_loop_hits_iteration_limit() {
        let steps = graph(&[(4, StepCondition::EndOnLoopComplete, 1, 4, 0)]);
        let mut engine = ReplayEngine::new(steps, 4).with_iteration_limit(50);
        assert_eq!(engine.trigger(), EngineState::IterationLimit);
        assert_eq!(engine.trace().len(), 50);
    }

    #[test]
    fn missing_step_faults() {
        let steps = graph(&[(0, StepCondition::EndOnLoopComplete, 1, 7, 0)]);
        let mut engine = ReplayEngine::new(steps, 0);
        assert_eq!(engine.trigger(), EngineState::Fault(7));
        assert_eq!(engine.state().status(), ReplayStatus::Idle);
    }

    #[test]
    fn trigger_after_finish_is_ignored() {
        let steps = graph(&[(0, StepCondition::Terminate, 1, 0, 0)]);
        let mut engine = ReplayEngine::new(steps, 0);
        engine.trigger();
        assert_eq!(engine.trigger(), EngineState::Finished);
        assert_eq!(engine.trace().len(), 1);
    }
}
