//! Sequence lifecycle: Idle → Armed → Running → Idle, with Faulted and Closed.
//!
//! `Stop` is accepted from every live state. `Release` is terminal.

/// Sequence replay state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SequenceState {
    /// Not started, or stopped.
    #[default]
    Idle,
    /// Started, waiting for the first trigger.
    Armed,
    /// Executing the step graph.
    Running,
    /// Start timed out or the device failed.
    Faulted,
    /// Device handle released.
    Closed,
}

/// Result of a state transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition succeeded: new state.
    Ok(SequenceState),
    /// Transition rejected: reason.
    Rejected(&'static str),
}

/// Event driving a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceEvent {
    /// Start command accepted by the card.
    Start,
    /// Card reports the step graph executing.
    Progress,
    /// Card reports a terminating step completed.
    Finished,
    /// Card reports replay stopped on its own.
    Stopped,
    /// Start timeout or device error.
    DeviceFault,
    /// Explicit stop.
    Stop,
    /// Device handle released.
    Release,
}

/// Holds the current sequence state.
#[derive(Debug, Clone, Default)]
pub struct SequenceStateMachine {
    state: SequenceState,
}

impl SequenceStateMachine {
    /// New machine in Idle.
    pub const fn new() -> Self {
        Self {
            state: SequenceState::Idle,
        }
    }

    /// Current state.
    #[inline]
    pub const fn state(&self) -> SequenceState {
        self.state
    }

    /// True while the card is replaying or waiting for a trigger.
    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(self.state, SequenceState::Armed | SequenceState::Running)
    }

    /// Attempt a transition.
    pub fn handle_event(&mut self, event: SequenceEvent) -> TransitionResult {
        use SequenceEvent::*;
        use SequenceState::*;

        let next = match (self.state, event) {
            (Closed, _) => {
                return TransitionResult::Rejected(invalid_transition_reason(self.state, event));
            }

            (Idle, Start) => Armed,

            (Armed, Progress) => Running,
            (Running, Progress) => Running,

            (Armed | Running, Finished | Stopped) => Idle,

            (Idle | Armed | Running, DeviceFault) => Faulted,

            // Stop from any live state.
            (_, Stop) => Idle,

            (_, Release) => Closed,

            _ => {
                return TransitionResult::Rejected(invalid_transition_reason(self.state, event));
            }
        };

        self.state = next;
        TransitionResult::Ok(next)
    }
}

fn invalid_transition_reason(state: SequenceState, event: SequenceEvent) -> &'static str {
    use SequenceEvent::*;
    use SequenceState::*;
    match (state, event) {
        (Closed, _) => "Closed: device handle released",
        (Faulted, _) => "Faulted: only Stop or Release allowed",
        (Armed | Running, Start) => "sequence already started",
        (Idle, _) => "Idle: sequence not started",
        (Armed, _) => "Armed: invalid event for current state",
        (Running, _) => "Running: invalid event for current state",
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
